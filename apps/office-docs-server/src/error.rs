//! Error types for the Office Docs server

use thiserror::Error;

use crate::engine::EngineError;

/// Service-wide result type
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors returned by [`crate::service::OfficeService`] operations
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Access denied.")]
    AccessDenied,

    #[error("Wrong or no identifier.")]
    NoIdentifier,

    #[error("No data to be converted.")]
    NoData,

    #[error("Failed to initiate connection to OpenOffice/LibreOffice {attempts} times in a row.")]
    NoOfficeConnection { attempts: u32 },

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("Invalid base64 payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    #[error("No free spool identifier after {0} attempts")]
    IdentifierSpaceExhausted(usize),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// JSON-RPC error code for this error
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::AccessDenied => -32001,
            Self::NoIdentifier => -32002,
            Self::NoData => -32003,
            Self::NoOfficeConnection { .. } => -32004,
            Self::UnknownFormat(_) => -32005,
            Self::IdentifierSpaceExhausted(_) => -32006,
            Self::Engine(_) => -32010,
            Self::InvalidPayload(_) => -32602,
            Self::Io(_) | Self::Internal(_) => -32603,
        }
    }

    /// Message sent back to RPC callers
    ///
    /// Internal failures are logged in full and reported generically.
    pub fn public_message(&self) -> String {
        match self {
            Self::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal error".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
