//! Office Service
//!
//! The three RPC operations:
//! - `convert`: convert an inline or spooled document through the engine
//! - `upload`: append a chunk to a spool file, finalize on the last chunk
//! - `join`: merge spooled documents, in order, into one output
//!
//! The engine handle sits behind an async mutex held for the whole
//! put → join → save → close sequence, so the engine never sees two open
//! documents at once. Spool uploads do not touch the engine and run freely.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;

use crate::auth::Authenticator;
use crate::connection::{ConnectionGuard, RetryPolicy};
use crate::engine::{EngineConnector, EngineError, OfficeEngine};
use crate::error::{Result, ServiceError};
use crate::filters::export_filter;
use crate::spool::{decode_payload, encode_payload, optional_identifier, Identifier, Spool};

// ============================================================================
// Request / Response Types
// ============================================================================

/// Parameters of `convert`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertRequest {
    /// Inline base64 document
    #[serde(default, deserialize_with = "optional_text")]
    pub data: Option<String>,

    /// Spooled document to convert instead of `data`
    #[serde(default, deserialize_with = "optional_identifier")]
    pub identifier: Option<Identifier>,

    /// Informational only
    #[serde(default, deserialize_with = "optional_text")]
    pub in_mime: Option<String>,

    /// Output token, `odt` when absent
    #[serde(default, deserialize_with = "optional_text")]
    pub out_mime: Option<String>,

    #[serde(default, deserialize_with = "optional_text")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "optional_text")]
    pub password: Option<String>,
}

/// Parameters of `upload`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadRequest {
    /// Base64 chunk, stored verbatim
    #[serde(default, deserialize_with = "optional_text")]
    pub data: Option<String>,

    #[serde(default)]
    pub is_last: bool,

    /// Continue an upload; a new identifier is assigned when absent
    #[serde(default, deserialize_with = "optional_identifier")]
    pub identifier: Option<Identifier>,

    #[serde(default, deserialize_with = "optional_text")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "optional_text")]
    pub password: Option<String>,
}

/// Parameters of `join`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRequest {
    /// Spooled documents in output order
    #[serde(default, alias = "identifiers")]
    pub idents: Vec<Identifier>,

    #[serde(default, deserialize_with = "optional_text")]
    pub out_mime: Option<String>,

    #[serde(default, deserialize_with = "optional_text")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "optional_text")]
    pub password: Option<String>,
}

/// Result of `upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResponse {
    pub identifier: Identifier,
}

/// Optional string where `null` and `false` both mean "not given"
fn optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => Ok(Some(text)),
        Some(Raw::Flag(true)) => Err(serde::de::Error::custom("expected a string")),
        Some(Raw::Flag(false)) | None => Ok(None),
    }
}

// ============================================================================
// Service
// ============================================================================

/// Document conversion front-end over the spool and the engine
pub struct OfficeService {
    spool: Spool,
    auth: Arc<dyn Authenticator>,
    engine: Mutex<ConnectionGuard>,
}

impl OfficeService {
    /// Create the service and make one attempt to connect to the engine
    ///
    /// A failed attempt is not fatal; requests reconnect on demand.
    pub async fn new(
        spool: Spool,
        auth: Arc<dyn Authenticator>,
        connector: Arc<dyn EngineConnector>,
        policy: RetryPolicy,
    ) -> Self {
        let mut guard = ConnectionGuard::new(connector, policy);
        guard.init_conn().await;

        Self {
            spool,
            auth,
            engine: Mutex::new(guard),
        }
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    /// Whether an engine handle is held; a busy engine counts as connected
    pub fn engine_connected(&self) -> bool {
        match self.engine.try_lock() {
            Ok(guard) => guard.is_connected(),
            Err(_) => true,
        }
    }

    fn authorize(&self, username: Option<&str>, password: Option<&str>) -> Result<()> {
        if self.auth.authenticate(username, password) {
            Ok(())
        } else {
            tracing::debug!(username = ?username, "Authentication failed");
            Err(ServiceError::AccessDenied)
        }
    }

    /// Convert a document given inline or by spool identifier
    pub async fn convert(&self, request: ConvertRequest) -> Result<String> {
        self.authorize(request.username.as_deref(), request.password.as_deref())?;
        let started = Instant::now();
        tracing::debug!(
            identifier = ?request.identifier,
            in_mime = ?request.in_mime,
            out_mime = ?request.out_mime,
            "Opening document"
        );

        let filter = export_filter(request.out_mime.as_deref())?;
        let document = match (request.data, request.identifier) {
            (Some(data), None) => decode_payload(&data)?,
            (None, Some(identifier)) => self.spool.read_document(&identifier).await?,
            _ => return Err(ServiceError::NoIdentifier),
        };
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = document.len(),
            "Read document"
        );

        let converted = self.render(document, Vec::new(), filter).await?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            filter,
            bytes = converted.len(),
            "Conversion finished"
        );

        Ok(encode_payload(&converted))
    }

    /// Append a chunk to an upload, finishing it when `is_last` is set
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResponse> {
        tracing::debug!(identifier = ?request.identifier, is_last = request.is_last, "Upload");
        self.authorize(request.username.as_deref(), request.password.as_deref())?;

        if let Some(identifier) = &request.identifier {
            if !self.spool.has_pending(identifier).await {
                return Err(ServiceError::NoIdentifier);
            }
        }
        let data = request.data.ok_or(ServiceError::NoData)?;

        let started = Instant::now();
        self.store_chunk(request.identifier, &data, request.is_last)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Upload failed");
                e
            })
            .map(|response| {
                tracing::debug!(
                    identifier = %response.identifier,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Chunk finished"
                );
                response
            })
    }

    async fn store_chunk(
        &self,
        identifier: Option<Identifier>,
        data: &str,
        is_last: bool,
    ) -> Result<UploadResponse> {
        let identifier = match identifier {
            Some(identifier) => {
                self.spool.append_chunk(&identifier, data).await?;
                identifier
            }
            None => self.spool.begin_upload(data).await?,
        };

        if is_last {
            self.spool.finalize(&identifier).await?;
            tracing::debug!(identifier = %identifier, "File finished");
        }

        Ok(UploadResponse { identifier })
    }

    /// Merge spooled documents into one, preserving the given order
    pub async fn join(&self, request: JoinRequest) -> Result<String> {
        tracing::debug!(
            count = request.idents.len(),
            idents = ?request.idents,
            "Join"
        );
        self.authorize(request.username.as_deref(), request.password.as_deref())?;
        let started = Instant::now();

        let filter = export_filter(request.out_mime.as_deref())?;
        let mut idents = request.idents.into_iter();
        let first_id = idents.next().ok_or(ServiceError::NoIdentifier)?;
        let first = self.spool.read_document(&first_id).await?;

        let mut rest = Vec::new();
        for identifier in idents {
            rest.push(self.spool.read_document(&identifier).await?);
        }

        let joined = self.render(first, rest, filter).await.map_err(|e| {
            tracing::error!(error = %e, "Join failed");
            e
        })?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = joined.len(),
            "Join finished"
        );

        Ok(encode_payload(&joined))
    }

    /// Run one document through the engine under the engine lock
    ///
    /// On failure the remote document is closed before the error is returned,
    /// and a lost connection is dropped so the next request reconnects.
    async fn render(&self, first: Vec<u8>, rest: Vec<Vec<u8>>, filter: &str) -> Result<Vec<u8>> {
        let mut guard = self.engine.lock().await;

        let outcome = {
            let engine = guard.conn_healthy().await?;
            let outcome = export(&mut *engine, first, rest, filter).await;
            if outcome.is_err() {
                if let Err(e) = engine.close_document().await {
                    tracing::warn!(error = %e, "Failed to close document after error");
                }
            }
            outcome
        };

        if let Err(e) = &outcome {
            guard.observe(e);
        }
        Ok(outcome?)
    }
}

async fn export(
    engine: &mut dyn OfficeEngine,
    first: Vec<u8>,
    rest: Vec<Vec<u8>>,
    filter: &str,
) -> std::result::Result<Vec<u8>, EngineError> {
    engine.put_document(first).await?;
    if !rest.is_empty() {
        engine.join_documents(rest).await?;
    }
    let data = engine.save_by_stream(filter).await?;
    engine.close_document().await?;
    Ok(data)
}

// ============================================================================
// Tests
// ============================================================================
