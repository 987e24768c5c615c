//! Typed error kinds for the storage engine's HTTP and CLI boundaries.
//!
//! Internal engine code returns `anyhow::Result` the way the rest of this
//! crate does; `EngineError` is attached only where a caller needs to know
//! *which* kind of failure happened (an HTTP handler choosing a status code,
//! a CLI entry point choosing an exit code).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend protocol error: {0}")]
    BackendProtocolError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("programmer error: {0}")]
    ProgrammerError(String),
}

impl EngineError {
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::BadRequest(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::NotImplemented(_) => 501,
            EngineError::BackendUnavailable(_) => 503,
            EngineError::BackendProtocolError(_) => 500,
            EngineError::ConfigError(_) => 500,
            EngineError::ProgrammerError(_) => 500,
        }
    }

    /// Exit code for CLI entry points (loader, server).
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::ConfigError(_) | EngineError::BadRequest(_) => 2,
            _ => 1,
        }
    }
}
