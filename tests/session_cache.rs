//! 会话缓存的端到端行为：窗口内幂等、clearCache 强制重新生成。
//!
//! 用退化区间（min == max）构造确定性取值，使缓存命中与重新生成
//! 都能被精确断言，不依赖随机结果。

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use rng_backend::config::AppConfig;
use rng_backend::router::build_router;
use rng_backend::state::AppState;

fn build_app() -> Router {
    let config = AppConfig::ensure_global();
    build_router(config, AppState::new(&config.session))
}

async fn get_with_cookie(
    app: &Router,
    uri: &str,
    cookie: Option<&str>,
) -> (StatusCode, Option<String>, Bytes) {
    let mut builder = Request::builder().uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    let resp = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .expect("request");

    let status = resp.status();
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        // "name=value; Path=/; ..." 只取第一段作为回传 cookie
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, set_cookie, bytes)
}

#[tokio::test]
async fn responses_within_a_cache_window_are_byte_identical() {
    let app = build_app();

    let (status, cookie, first) = get_with_cookie(
        &app,
        "/number?min=5&max=5&cacheTime=1min&format=json",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cookie = cookie.expect("first response must set a session cookie");

    let (status, _, second) = get_with_cookie(
        &app,
        "/number?min=5&max=5&cacheTime=1min&format=json",
        Some(&cookie),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second, "缓存窗口内的两次响应应字节级一致");
}

#[tokio::test]
async fn cached_value_survives_changed_bounds_until_cleared() {
    let app = build_app();

    // 建立缓存窗口，值必为 5
    let (_, cookie, first) = get_with_cookie(
        &app,
        "/number?min=5&max=5&cacheTime=1min&format=json",
        None,
    )
    .await;
    let cookie = cookie.expect("session cookie");
    let v: serde_json::Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(v["number"], 5);

    // 窗口内改变区间不触发重新生成，仍返回缓存的 5
    let (_, _, cached) = get_with_cookie(
        &app,
        "/number?min=99&max=99&cacheTime=1min&format=json",
        Some(&cookie),
    )
    .await;
    let v: serde_json::Value = serde_json::from_slice(&cached).unwrap();
    assert_eq!(v["number"], 5, "窗口内应返回缓存值而不是重新生成");

    // clearCache 强制重新生成，退化区间证明新值来自本次请求
    let (_, _, cleared) = get_with_cookie(
        &app,
        "/number?min=99&max=99&clearCache=true&format=json",
        Some(&cookie),
    )
    .await;
    let v: serde_json::Value = serde_json::from_slice(&cleared).unwrap();
    assert_eq!(v["number"], 99, "clearCache 后必须重新生成");
}

#[tokio::test]
async fn without_cache_time_every_request_regenerates() {
    let app = build_app();

    // 无 cacheTime：expires 缺省，每次请求都应重新生成
    let (_, cookie, _) =
        get_with_cookie(&app, "/number?min=1&max=1&format=json", None).await;
    let cookie = cookie.expect("session cookie");

    let (_, _, second) = get_with_cookie(
        &app,
        "/number?min=2&max=2&format=json",
        Some(&cookie),
    )
    .await;
    let v: serde_json::Value = serde_json::from_slice(&second).unwrap();
    assert_eq!(v["number"], 2);
}

#[tokio::test]
async fn cache_expires_is_reported_only_when_caching() {
    let app = build_app();

    let (_, _, body) = get_with_cookie(
        &app,
        "/number?min=1&max=1&cacheTime=1min&format=json",
        None,
    )
    .await;
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(v["cacheExpires"].is_string());

    let (_, _, body) = get_with_cookie(&app, "/number?min=1&max=1&format=json", None).await;
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(v.get("cacheExpires").is_none());
}

#[tokio::test]
async fn per_kind_slots_are_cached_independently() {
    let app = build_app();

    let (_, cookie, number) = get_with_cookie(
        &app,
        "/number?min=7&max=7&cacheTime=1min&format=json",
        None,
    )
    .await;
    let cookie = cookie.expect("session cookie");

    // 同一会话同一窗口内请求另一种端点，number 槽位不受影响
    let (_, _, item) = get_with_cookie(
        &app,
        "/listItem?items=only&format=json",
        Some(&cookie),
    )
    .await;
    let v: serde_json::Value = serde_json::from_slice(&item).unwrap();
    assert_eq!(v["item"], "only");

    let (_, _, number_again) = get_with_cookie(
        &app,
        "/number?min=7&max=7&cacheTime=1min&format=json",
        Some(&cookie),
    )
    .await;
    assert_eq!(number, number_again);
}
