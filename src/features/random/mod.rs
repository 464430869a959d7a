//! 随机值流水线：参数解析、格式解析、取值生成、会话缓存、响应组装。

pub mod generator;
pub mod handler;
pub mod models;
pub mod query;
pub mod session;

pub use handler::create_random_router;
