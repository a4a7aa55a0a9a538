pub mod error;
pub mod types;

// 错误和结果类型
pub use error::{
    AdapterError, AdapterResult, BackendError, ErrorCode, FailureKind, RuntimeError,
    RuntimeResult, SessionError, SessionGone, SessionResult,
};

// 核心数据类型
pub use types::*;
