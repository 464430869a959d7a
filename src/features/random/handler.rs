//! 三个端点共用的请求流水线。
//!
//! 端点差异被收敛到 [`EndpointKind`]：只有取值生成与响应字段名两处
//! 按 kind 分支，其余（参数解析、格式解析、会话缓存、渲染、组装）
//! 是同一条路径。每一步的失败都原样冒泡到统一错误出口。

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use tokio::task::spawn_blocking;

use crate::error::AppError;
use crate::features::image::renderer;
use crate::features::random::generator;
use crate::features::random::models::{
    EndpointKind, Format, ImageSpec, RandomResult, RandomValue, format_timestamp, resolve_format,
};
use crate::features::random::query::{ParamKey, QueryParams, RawQuery, parse_query_params};
use crate::state::AppState;

/// 所有端点共用的键
const COMMON_KEYS: [ParamKey; 9] = [
    ParamKey::Width,
    ParamKey::Height,
    ParamKey::ShowUpdatedDate,
    ParamKey::Font,
    ParamKey::Format,
    ParamKey::FontColor,
    ParamKey::BgColor,
    ParamKey::ClearCache,
    ParamKey::CacheTime,
];

fn keys_for(kind: EndpointKind) -> Vec<ParamKey> {
    let mut keys = COMMON_KEYS.to_vec();
    match kind {
        EndpointKind::Number => keys.extend([ParamKey::Min, ParamKey::Max]),
        EndpointKind::ListItem => keys.push(ParamKey::Items),
        EndpointKind::ListOrder => keys.extend([ParamKey::Items, ParamKey::Delimiter]),
    }
    keys
}

fn generate_value(kind: EndpointKind, params: &QueryParams) -> Result<RandomValue, AppError> {
    match kind {
        EndpointKind::Number => {
            let min = params.min.unwrap_or(0);
            let max = params.max.unwrap_or(min + 10);
            Ok(RandomValue::Number(generator::generate_number(min, max)?))
        }
        EndpointKind::ListItem => {
            let items = params.items.as_deref().unwrap_or(&[]);
            Ok(RandomValue::Item(generator::pick_item(items)?))
        }
        EndpointKind::ListOrder => {
            let items = params.items.as_deref().unwrap_or(&[]);
            Ok(RandomValue::Order(generator::shuffle(items)))
        }
    }
}

/// 流水线主体：解析、格式解析、会话缓存、生成、渲染、组装。
async fn run_pipeline(
    state: &AppState,
    kind: EndpointKind,
    raw: RawQuery,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let params = parse_query_params(&raw, &keys_for(kind))?;
    let format = resolve_format(
        params.format,
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );

    // 会话句柄显式入参，核心不读任何环境态
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    let (session_id, session) = state.sessions.acquire(cookie).await;

    // 顺序约定：先判失效（生成之前），失效则清空并重设窗口，
    // 再复用或生成，最后写回。保证一个缓存窗口内只有一个可见值，
    // 且 clearCache 必然触发重新生成。
    let now = Utc::now();
    let result = {
        let mut session_state = session
            .lock()
            .map_err(|_| AppError::Internal("会话锁中毒".to_string()))?;
        if session_state.should_invalidate(now, params.clear_cache.unwrap_or(false)) {
            session_state.invalidate();
            session_state.set_expiry(params.cache_time, now);
        }
        match session_state.get(kind) {
            Some(cached) => cached,
            None => {
                let result = RandomResult {
                    kind,
                    value: generate_value(kind, &params)?,
                    updated_date: format_timestamp(now),
                    cache_expires: session_state.expires_at.map(format_timestamp),
                };
                session_state.store(kind, result.clone());
                result
            }
        }
    };

    let mut response = assemble_response(format, &params, result).await?;

    let cookie_value = state.sessions.set_cookie_value(&session_id);
    if let Ok(value) = HeaderValue::from_str(&cookie_value) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

/// 响应组装：JSON 直接发结构化数据，图片格式先渲染再发原始字节。
async fn assemble_response(
    format: Format,
    params: &QueryParams,
    result: RandomResult,
) -> Result<Response, AppError> {
    if format == Format::Json {
        return Ok(Json(result).into_response());
    }

    let delimiter = params.delimiter.clone().unwrap_or_else(|| ", ".to_string());
    let spec = ImageSpec {
        value: result.value.display_text(&delimiter),
        width: params.width.unwrap_or(500),
        height: params.height.unwrap_or(500),
        font: params.font.unwrap_or(crate::features::random::models::Font::Roboto),
        font_color: params.font_color.clone().unwrap_or_else(|| "#333".to_string()),
        bg_color: params.bg_color.clone().unwrap_or_else(|| "#fff".to_string()),
        show_updated_date: params.show_updated_date.unwrap_or(false),
        updated_date: result.updated_date.clone(),
    };

    // 栅格化是阻塞 CPU 工作，移出异步执行线程
    let bytes = spawn_blocking(move || renderer::generate_image(&spec, format))
        .await
        .map_err(|e| AppError::Internal(format!("渲染任务失败: {e}")))??;

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()))],
        bytes,
    )
        .into_response())
}

/// 查询参数形态：重复键聚合为列表，其余保持单值。
type RawPairs = Query<Vec<(String, String)>>;

#[utoipa::path(
    get,
    path = "/number",
    summary = "区间随机数",
    description = "返回 [min, max] 闭区间内的均匀随机整数。format=json 返回结构化数据，其余格式返回渲染图片；识别的 Content-Type 请求头优先于 format 参数。",
    params(
        ("min" = Option<i64>, Query, description = "下界（默认 0）"),
        ("max" = Option<i64>, Query, description = "上界（默认 min + 10）"),
        ("format" = Option<String>, Query, description = "输出格式：json|svg|png|jpeg，默认 png"),
        ("width" = Option<u32>, Query, description = "图片宽度像素（默认 500）"),
        ("height" = Option<u32>, Query, description = "图片高度像素（默认继承 width）"),
        ("font" = Option<String>, Query, description = "字体：Roboto|Roboto Serif|Roboto Mono|Roboto Slab"),
        ("fontColor" = Option<String>, Query, description = "文字颜色（默认 #333）"),
        ("bgColor" = Option<String>, Query, description = "背景颜色（默认 #fff）"),
        ("showUpdatedDate" = Option<bool>, Query, description = "是否渲染生成时间"),
        ("cacheTime" = Option<String>, Query, description = "缓存时长（如 10min、1d）"),
        ("clearCache" = Option<bool>, Query, description = "强制重新生成")
    ),
    responses(
        (status = 200, description = "JSON 数据或图片字节"),
        (status = 400, description = "参数错误", body = crate::error::ErrorBody)
    ),
    tag = "Random"
)]
pub async fn get_number(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): RawPairs,
) -> Result<Response, AppError> {
    run_pipeline(&state, EndpointKind::Number, RawQuery::from_pairs(pairs), &headers).await
}

#[utoipa::path(
    get,
    path = "/listItem",
    summary = "列表随机取一项",
    description = "从 items（可重复传递）中均匀随机取一个元素。",
    params(
        ("items" = Vec<String>, Query, description = "候选列表（必填，可重复传递）"),
        ("format" = Option<String>, Query, description = "输出格式：json|svg|png|jpeg，默认 png"),
        ("cacheTime" = Option<String>, Query, description = "缓存时长（如 10min、1d）"),
        ("clearCache" = Option<bool>, Query, description = "强制重新生成")
    ),
    responses(
        (status = 200, description = "JSON 数据或图片字节"),
        (status = 400, description = "参数错误", body = crate::error::ErrorBody)
    ),
    tag = "Random"
)]
pub async fn get_list_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): RawPairs,
) -> Result<Response, AppError> {
    run_pipeline(&state, EndpointKind::ListItem, RawQuery::from_pairs(pairs), &headers).await
}

#[utoipa::path(
    get,
    path = "/listOrder",
    summary = "列表随机乱序",
    description = "返回 items 的一个均匀随机排列，图片输出按 delimiter 拼接展示。",
    params(
        ("items" = Vec<String>, Query, description = "候选列表（必填，可重复传递）"),
        ("delimiter" = Option<String>, Query, description = "图片展示分隔符（默认 \", \"）"),
        ("format" = Option<String>, Query, description = "输出格式：json|svg|png|jpeg，默认 png"),
        ("cacheTime" = Option<String>, Query, description = "缓存时长（如 10min、1d）"),
        ("clearCache" = Option<bool>, Query, description = "强制重新生成")
    ),
    responses(
        (status = 200, description = "JSON 数据或图片字节"),
        (status = 400, description = "参数错误", body = crate::error::ErrorBody)
    ),
    tag = "Random"
)]
pub async fn get_list_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): RawPairs,
) -> Result<Response, AppError> {
    run_pipeline(&state, EndpointKind::ListOrder, RawQuery::from_pairs(pairs), &headers).await
}

pub fn create_random_router() -> Router<AppState> {
    Router::new()
        .route("/number", get(get_number))
        .route("/listItem", get(get_list_item))
        .route("/listOrder", get(get_list_order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lists_only_differ_in_kind_specific_keys() {
        let number = keys_for(EndpointKind::Number);
        let item = keys_for(EndpointKind::ListItem);
        let order = keys_for(EndpointKind::ListOrder);

        for key in COMMON_KEYS {
            assert!(number.contains(&key) && item.contains(&key) && order.contains(&key));
        }
        assert!(number.contains(&ParamKey::Min) && !item.contains(&ParamKey::Min));
        assert!(item.contains(&ParamKey::Items) && !number.contains(&ParamKey::Items));
        assert!(order.contains(&ParamKey::Delimiter) && !item.contains(&ParamKey::Delimiter));
    }

    #[test]
    fn generate_value_dispatches_on_kind() {
        let mut params = QueryParams {
            min: Some(5),
            max: Some(5),
            ..Default::default()
        };
        let value = generate_value(EndpointKind::Number, &params).unwrap();
        assert_eq!(value, RandomValue::Number(5));

        params.items = Some(vec!["x".to_string()]);
        let value = generate_value(EndpointKind::ListItem, &params).unwrap();
        assert_eq!(value, RandomValue::Item("x".to_string()));

        let value = generate_value(EndpointKind::ListOrder, &params).unwrap();
        assert_eq!(value, RandomValue::Order(vec!["x".to_string()]));
    }
}
