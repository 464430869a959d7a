use crate::features::random::session::SessionStore;

/// 聚合的应用共享状态
///
/// 除会话存储外各请求相互独立；会话对象也只在同一客户端的请求间共享。
#[derive(Clone)]
pub struct AppState {
    /// 每客户端的会话缓存存储
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(session_config: &crate::config::SessionConfig) -> Self {
        Self {
            sessions: SessionStore::new(session_config),
        }
    }
}
