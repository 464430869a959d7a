use axum::{Router, routing::get};
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::cors::build_cors_layer;
use crate::features::health::health_check;
use crate::features::random::create_random_router;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::random::handler::get_number,
        crate::features::random::handler::get_list_item,
        crate::features::random::handler::get_list_order,
        crate::features::health::handler::health_check,
    ),
    components(schemas(
        crate::error::AppError,
        crate::error::ErrorBody,
        crate::features::health::handler::HealthResponse,
    )),
    tags(
        (name = "Random", description = "随机数 / 列表取值 / 列表乱序"),
        (name = "Health", description = "健康检查")
    ),
    info(
        title = "rng-backend",
        description = "随机值服务：JSON 或渲染图片输出，支持按会话缓存"
    )
)]
pub struct ApiDoc;

/// 组装完整应用路由。
///
/// 压缩层依赖 tower-http 的默认谓词，图片响应（image/*）不会被压缩，
/// SVG/JSON 正常收益。
pub fn build_router(config: &AppConfig, state: AppState) -> Router {
    let mut app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .merge(create_random_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/public", ServeDir::new(config.public_path()))
        .with_state(state);

    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }

    app.layer(CompressionLayer::new())
}
