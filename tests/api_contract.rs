use axum::{http::StatusCode, response::IntoResponse};

/// 契约关键点：所有客户端错误响应体都是 `{success: false, error: <message>}`。
#[tokio::test]
async fn app_error_into_response_matches_wire_contract() {
    let resp = rng_backend::AppError::MissingParameter("items".to_string()).into_response();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let v: serde_json::Value = serde_json::from_slice(&bytes).expect("parse json");

    assert_eq!(v["success"], false);
    assert_eq!(v["error"], "Query parameter items is missing");
    assert_eq!(v.as_object().unwrap().len(), 2);
}

/// OpenAPI 文档应可生成且覆盖三个随机端点。
#[test]
fn openapi_doc_lists_all_random_endpoints() {
    use utoipa::OpenApi;

    let doc = rng_backend::router::ApiDoc::openapi();
    let json = serde_json::to_value(&doc).expect("serialize openapi");
    let paths = json["paths"].as_object().expect("paths object");

    for path in ["/number", "/listItem", "/listOrder", "/health"] {
        assert!(paths.contains_key(path), "OpenAPI 缺少路径 {path}");
    }
}
