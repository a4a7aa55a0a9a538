//! 驱动错误分类
//!
//! 能从驱动的结构化错误里判断的先判断，剩下的交给文本匹配。

use scylla::transport::errors::{DbError, NewSessionError, QueryError};
use std::io;

use crate::core::error::{BackendError, FailureKind};

fn classify_db_error(err: &DbError) -> Option<FailureKind> {
    match err {
        DbError::SyntaxError | DbError::Invalid => Some(FailureKind::QuerySyntaxError),
        DbError::AuthenticationError | DbError::Unauthorized => {
            Some(FailureKind::AuthenticationFailed)
        }
        DbError::ReadTimeout { .. } | DbError::WriteTimeout { .. } => Some(FailureKind::Timeout),
        DbError::Unavailable { .. } | DbError::Overloaded | DbError::IsBootstrapping => {
            Some(FailureKind::ConnectionRefused)
        }
        _ => None,
    }
}

fn classify_io_error(err: &io::Error) -> Option<FailureKind> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => Some(FailureKind::ConnectionRefused),
        io::ErrorKind::TimedOut => Some(FailureKind::Timeout),
        _ => None,
    }
}

pub fn from_query_error(err: &QueryError) -> BackendError {
    let kind = match err {
        QueryError::DbError(db, _) => classify_db_error(db),
        QueryError::IoError(io) => classify_io_error(io),
        QueryError::TimeoutError | QueryError::RequestTimeout(_) => Some(FailureKind::Timeout),
        _ => None,
    };
    BackendError {
        kind,
        message: err.to_string(),
    }
}

pub fn from_new_session_error(err: &NewSessionError) -> BackendError {
    let kind = match err {
        NewSessionError::DbError(db, _) => classify_db_error(db),
        NewSessionError::IoError(io) => classify_io_error(io),
        NewSessionError::TimeoutError | NewSessionError::RequestTimeout(_) => {
            Some(FailureKind::Timeout)
        }
        NewSessionError::FailedToResolveAnyHostname(_) | NewSessionError::EmptyKnownNodesList => {
            Some(FailureKind::ConnectionRefused)
        }
        _ => None,
    };
    BackendError {
        kind,
        message: err.to_string(),
    }
}
