//! 每客户端会话缓存。
//!
//! 会话由 cookie 中的不透明 id 标识，状态存放在进程内 moka 缓存里，
//! TTL 上限 24 小时。会话状态只做一件事：为三类端点各保存一份已生成
//! 的随机结果和一个共享的过期时刻。状态句柄作为显式参数穿过整条流
//! 水线，核心逻辑不触碰任何环境态。
//!
//! 已知限制：同一会话的两个并发请求可能同时观察到"无缓存值"并各自
//! 生成、写入（后写覆盖）。窗口极短且结果同构，按接受的限制处理。

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::features::random::models::{EndpointKind, RandomResult};

/// 会话状态本体。三个槽位分别对应 number / listItem / listOrder。
#[derive(Debug, Default)]
pub struct SessionState {
    /// 缓存窗口右端点；缺省表示未启用缓存（每次请求重新生成）
    pub expires_at: Option<DateTime<Utc>>,
    number: Option<RandomResult>,
    list_item: Option<RandomResult>,
    list_order: Option<RandomResult>,
}

impl SessionState {
    fn slot(&self, kind: EndpointKind) -> &Option<RandomResult> {
        match kind {
            EndpointKind::Number => &self.number,
            EndpointKind::ListItem => &self.list_item,
            EndpointKind::ListOrder => &self.list_order,
        }
    }

    fn slot_mut(&mut self, kind: EndpointKind) -> &mut Option<RandomResult> {
        match kind {
            EndpointKind::Number => &mut self.number,
            EndpointKind::ListItem => &mut self.list_item,
            EndpointKind::ListOrder => &mut self.list_order,
        }
    }

    /// 该端点种类当前缓存的结果（不检查过期，过期判定见 should_invalidate）。
    pub fn get(&self, kind: EndpointKind) -> Option<RandomResult> {
        self.slot(kind).clone()
    }

    /// 失效判定：无过期时刻、已到期、或请求显式要求清缓存。
    /// 每个请求在生成之前先做此判定，保证清缓存请求必然触发重新生成。
    pub fn should_invalidate(&self, now: DateTime<Utc>, clear_cache: bool) -> bool {
        clear_cache
            || match self.expires_at {
                None => true,
                Some(expires_at) => now >= expires_at,
            }
    }

    /// 清空全部三个槽位。
    pub fn invalidate(&mut self) {
        self.number = None;
        self.list_item = None;
        self.list_order = None;
    }

    /// 设置缓存窗口：有 cacheTime 时为 now + cacheTime，否则不缓存。
    pub fn set_expiry(&mut self, cache_time_ms: Option<i64>, now: DateTime<Utc>) {
        self.expires_at = cache_time_ms.map(|ms| now + Duration::milliseconds(ms));
    }

    pub fn store(&mut self, kind: EndpointKind, result: RandomResult) {
        *self.slot_mut(kind) = Some(result);
    }
}

/// 会话句柄：跨 await 点传递，锁只在同步临界区内短暂持有。
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// cookie id 到会话状态的进程内存储。
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache<String, SessionHandle>,
    cookie_name: String,
    max_age_secs: u64,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(config.max_age_duration())
            .build();
        Self {
            cache,
            cookie_name: config.cookie_name.clone(),
            max_age_secs: config.max_age_secs,
        }
    }

    /// 从 Cookie 头解析会话 id 并取出（或创建）对应状态。
    /// 返回会话 id 与状态句柄；无效或伪造的 id 一律换发新会话。
    pub async fn acquire(&self, cookie_header: Option<&str>) -> (String, SessionHandle) {
        let id = cookie_header
            .and_then(|h| self.extract_session_id(h))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let handle = self
            .cache
            .get_with(id.clone(), async { SessionHandle::default() })
            .await;
        (id, handle)
    }

    /// Set-Cookie 值，生命周期与存储 TTL 一致。
    pub fn set_cookie_value(&self, session_id: &str) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name, session_id, self.max_age_secs
        )
    }

    fn extract_session_id(&self, cookie_header: &str) -> Option<String> {
        cookie_header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            // 只接受合法 UUID，杜绝任意键进入存储
            .and_then(|(_, value)| Uuid::parse_str(value).ok())
            .map(|u| u.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::random::models::RandomValue;

    fn result(kind: EndpointKind, n: i64) -> RandomResult {
        RandomResult {
            kind,
            value: RandomValue::Number(n),
            updated_date: "01.01.2026 12:00:00".into(),
            cache_expires: None,
        }
    }

    #[test]
    fn missing_expiry_always_invalidates() {
        let state = SessionState::default();
        assert!(state.should_invalidate(Utc::now(), false));
    }

    #[test]
    fn unexpired_window_is_kept_unless_clear_requested() {
        let mut state = SessionState::default();
        let now = Utc::now();
        state.set_expiry(Some(60_000), now);

        assert!(!state.should_invalidate(now, false));
        assert!(state.should_invalidate(now, true));
        assert!(state.should_invalidate(now + Duration::milliseconds(60_000), false));
    }

    #[test]
    fn invalidate_clears_all_three_slots() {
        let mut state = SessionState::default();
        state.store(EndpointKind::Number, result(EndpointKind::Number, 1));
        state.store(EndpointKind::ListItem, result(EndpointKind::ListItem, 2));
        state.store(EndpointKind::ListOrder, result(EndpointKind::ListOrder, 3));

        state.invalidate();

        assert!(state.get(EndpointKind::Number).is_none());
        assert!(state.get(EndpointKind::ListItem).is_none());
        assert!(state.get(EndpointKind::ListOrder).is_none());
    }

    #[test]
    fn slots_are_independent_per_kind() {
        let mut state = SessionState::default();
        state.store(EndpointKind::Number, result(EndpointKind::Number, 1));
        assert!(state.get(EndpointKind::Number).is_some());
        assert!(state.get(EndpointKind::ListItem).is_none());
    }

    #[test]
    fn set_expiry_without_cache_time_disables_caching() {
        let mut state = SessionState::default();
        state.set_expiry(None, Utc::now());
        assert!(state.expires_at.is_none());
        assert!(state.should_invalidate(Utc::now(), false));
    }

    #[tokio::test]
    async fn acquire_reuses_state_for_known_cookie() {
        let store = SessionStore::new(&SessionConfig::default());
        let (id, handle) = store.acquire(None).await;
        handle
            .lock()
            .unwrap()
            .store(EndpointKind::Number, result(EndpointKind::Number, 9));

        let cookie = format!("other=1; {}={}", "rng-backend-session", id);
        let (id2, handle2) = store.acquire(Some(&cookie)).await;
        assert_eq!(id, id2);
        assert!(handle2.lock().unwrap().get(EndpointKind::Number).is_some());
    }

    #[tokio::test]
    async fn forged_session_id_gets_a_fresh_session() {
        let store = SessionStore::new(&SessionConfig::default());
        let (id, _) = store.acquire(Some("rng-backend-session=../../etc/passwd")).await;
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
