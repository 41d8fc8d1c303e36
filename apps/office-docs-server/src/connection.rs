//! Engine connection guard
//!
//! Owns the (possibly absent) engine handle and re-establishes it on demand
//! with a fixed number of attempts and a fixed pause between them.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::{EngineConnector, EngineError, OfficeEngine};
use crate::error::ServiceError;

/// Retry policy for establishing the engine connection
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

/// Holds the engine handle and reconnects when it is missing
pub struct ConnectionGuard {
    connector: Arc<dyn EngineConnector>,
    engine: Option<Box<dyn OfficeEngine>>,
    policy: RetryPolicy,
}

impl ConnectionGuard {
    /// Create a guard without connecting
    ///
    /// At least one attempt is always made.
    pub fn new(connector: Arc<dyn EngineConnector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            engine: None,
            policy: RetryPolicy {
                attempts: policy.attempts.max(1),
                ..policy
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_some()
    }

    /// Single connection attempt, replacing the held handle
    ///
    /// Failure leaves the guard disconnected and is only logged.
    pub async fn init_conn(&mut self) -> bool {
        match self.connector.connect().await {
            Ok(engine) => {
                tracing::info!(target_engine = %self.connector.describe(), "Connected to office engine");
                self.engine = Some(engine);
                true
            }
            Err(e) => {
                tracing::warn!(
                    target_engine = %self.connector.describe(),
                    error = %e,
                    "Failed to initiate OpenOffice/LibreOffice connection"
                );
                self.engine = None;
                false
            }
        }
    }

    /// Return the live engine, reconnecting if necessary
    pub async fn conn_healthy(&mut self) -> Result<&mut (dyn OfficeEngine + 'static), ServiceError> {
        if self.engine.is_none() {
            let mut attempt = 0;
            while attempt < self.policy.attempts {
                attempt += 1;
                if self.init_conn().await {
                    break;
                }
                if attempt < self.policy.attempts {
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }

        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => {
                let err = ServiceError::NoOfficeConnection {
                    attempts: self.policy.attempts,
                };
                tracing::warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Drop the handle if `err` means the connection is gone
    pub fn observe(&mut self, err: &EngineError) {
        if err.is_connection_lost() && self.engine.take().is_some() {
            tracing::warn!(error = %err, "Office engine connection lost, will reconnect");
        }
    }
}
