/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 启动检查模块
pub mod startup;

/// CORS 中间件构建
pub mod cors;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

/// 路由组装模块
pub mod router;

// 导出常用类型供外部使用
pub use config::AppConfig;
pub use error::AppError;
pub use state::AppState;
