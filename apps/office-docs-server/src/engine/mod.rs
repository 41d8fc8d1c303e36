//! Conversion Engine
//!
//! The engine is an external OpenOffice/LibreOffice-compatible service. It
//! holds at most one open document at a time: a document is put, optionally
//! extended by joining further documents, saved through an export filter and
//! then closed.
//!
//! Backends:
//! - [`BridgeEngine`]: HTTP client for a UNO bridge sidecar
//! - [`SofficeEngine`]: local headless `soffice` runs (no joining)

mod bridge;
mod soffice;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{EngineConfig, EngineKind};

pub use bridge::{BridgeConnector, BridgeEngine};
pub use soffice::{SofficeConnector, SofficeEngine};

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached at all
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An established connection broke mid-request
    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine answered but refused the operation
    #[error("Engine rejected request: {0}")]
    Rejected(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the held connection should be dropped and re-established
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Transport(_))
    }
}

/// A live connection to the conversion engine
#[async_trait]
pub trait OfficeEngine: Send {
    /// Open `data` as the current document
    async fn put_document(&mut self, data: Vec<u8>) -> Result<(), EngineError>;

    /// Append documents, in order, to the current document
    async fn join_documents(&mut self, documents: Vec<Vec<u8>>) -> Result<(), EngineError>;

    /// Export the current document through `filter`
    async fn save_by_stream(&mut self, filter: &str) -> Result<Vec<u8>, EngineError>;

    /// Close the current document
    async fn close_document(&mut self) -> Result<(), EngineError>;
}

/// Opens engine connections
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Human-readable target, used in logs
    fn describe(&self) -> String;

    async fn connect(&self) -> Result<Box<dyn OfficeEngine>, EngineError>;
}

/// Build the connector selected by configuration
pub fn connector_from_config(config: &EngineConfig) -> Result<Arc<dyn EngineConnector>, EngineError> {
    Ok(match config.kind {
        EngineKind::Bridge => Arc::new(BridgeConnector::new(config.base_url(), config.timeout())?),
        EngineKind::Soffice => Arc::new(SofficeConnector::new(config.soffice_bin.clone())),
    })
}

/// Recording in-memory engine for tests
#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Engine calls as observed by [`MockEngine`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Put(Vec<u8>),
        Join(Vec<Vec<u8>>),
        Save(String),
        Close,
    }

    /// Engine whose export output is `<filter>:` followed by the current
    /// document, which is the put document with joined documents appended
    pub struct MockEngine {
        calls: Arc<Mutex<Vec<Call>>>,
        current: Option<Vec<u8>>,
        fail_save: bool,
    }

    #[async_trait]
    impl OfficeEngine for MockEngine {
        async fn put_document(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(Call::Put(data.clone()));
            self.current = Some(data);
            // Give concurrent requests a chance to interleave
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(())
        }

        async fn join_documents(&mut self, documents: Vec<Vec<u8>>) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(Call::Join(documents.clone()));
            let current = self
                .current
                .as_mut()
                .ok_or_else(|| EngineError::Rejected("no open document".to_string()))?;
            for document in documents {
                current.extend_from_slice(&document);
            }
            Ok(())
        }

        async fn save_by_stream(&mut self, filter: &str) -> Result<Vec<u8>, EngineError> {
            self.calls.lock().unwrap().push(Call::Save(filter.to_string()));
            if self.fail_save {
                return Err(EngineError::Rejected("export failed".to_string()));
            }
            let current = self
                .current
                .as_ref()
                .ok_or_else(|| EngineError::Rejected("no open document".to_string()))?;
            let mut out = format!("{}:", filter).into_bytes();
            out.extend_from_slice(current);
            Ok(out)
        }

        async fn close_document(&mut self) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(Call::Close);
            self.current = None;
            Ok(())
        }
    }

    /// Connector that fails a configurable number of times before handing
    /// out [`MockEngine`]s sharing one call log
    #[derive(Clone, Default)]
    pub struct MockConnector {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub connects: Arc<AtomicUsize>,
        failures_left: Arc<AtomicUsize>,
        fail_save: bool,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(times: usize) -> Self {
            let connector = Self::default();
            connector.failures_left.store(times, Ordering::SeqCst);
            connector
        }

        pub fn with_failing_save() -> Self {
            Self {
                fail_save: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EngineConnector for MockConnector {
        fn describe(&self) -> String {
            "mock".to_string()
        }

        async fn connect(&self) -> Result<Box<dyn OfficeEngine>, EngineError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(EngineError::Connection("mock refused".to_string()));
            }
            Ok(Box::new(MockEngine {
                calls: self.calls.clone(),
                current: None,
                fail_save: self.fail_save,
            }))
        }
    }
}
