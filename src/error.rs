use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
///
/// 前四类为确定性的客户端输入错误（HTTP 400），不做重试；
/// 其余为服务端错误（HTTP 500），渲染失败直接中止请求。
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 必填查询参数缺失
    #[error("Query parameter {0} is missing")]
    MissingParameter(String),

    /// 查询参数类型或取值非法
    #[error("{0}")]
    InvalidParameter(String),

    /// 随机区间非法（min > max）
    #[error("min cannot be bigger than max! min: {min}, max: {max}")]
    InvalidRange { min: i64, max: i64 },

    /// 不支持的输出格式
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    /// 图像渲染错误
    #[error("图像渲染错误: {0}")]
    ImageRenderer(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 对外错误响应体，与成功响应共用 `success` 判别字段。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// 恒为 false
    #[schema(example = false)]
    pub success: bool,
    /// 人类可读的错误信息
    #[schema(example = "Query parameter width must be a number")]
    pub error: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingParameter(_)
            | AppError::InvalidParameter(_)
            | AppError::InvalidRange { .. }
            | AppError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            AppError::ImageRenderer(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 服务端错误不向外暴露细节，只记录日志。
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("请求处理失败: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut res = Json(ErrorBody {
            success: false,
            error: message,
        })
        .into_response();
        *res.status_mut() = status;
        res
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        AppError::ImageRenderer(format!("SVG 模板渲染失败: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O 错误: {err}"))
    }
}
