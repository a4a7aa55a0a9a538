pub mod eviction;
pub mod session_id;
pub mod session_manager;

pub use eviction::{policy_from_config, EvictionPolicy, NeverEvict, TtlPolicy};
pub use session_id::SessionIdIssuer;
pub use session_manager::{
    SessionInfo, SessionManager, SessionSlot, DEFAULT_MAX_ALLOWED_CONNECTIONS,
    DEFAULT_SESSION_IDLE_TIMEOUT,
};
