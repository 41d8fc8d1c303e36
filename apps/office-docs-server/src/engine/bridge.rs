//! UNO bridge client
//!
//! Talks JSON over HTTP to a sidecar that owns the office process. Document
//! payloads travel base64-encoded.
//!
//! - `GET    /status`          - liveness, used to connect
//! - `PUT    /document`        - `{"data"}` opens a document
//! - `POST   /document/join`   - `{"documents": [...]}` appends documents
//! - `POST   /document/export` - `{"filter"}` returns `{"data"}`
//! - `DELETE /document`        - closes the document

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EngineConnector, EngineError, OfficeEngine};
use crate::spool::{decode_payload, encode_payload};

#[derive(Serialize)]
struct PutRequest<'a> {
    data: &'a str,
}

#[derive(Serialize)]
struct JoinRequest {
    documents: Vec<String>,
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    filter: &'a str,
}

#[derive(Deserialize)]
struct ExportResponse {
    data: String,
}

/// Connects to a UNO bridge at a fixed base URL
pub struct BridgeConnector {
    client: reqwest::Client,
    base_url: String,
}

impl BridgeConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EngineConnector for BridgeConnector {
    fn describe(&self) -> String {
        format!("bridge at {}", self.base_url)
    }

    async fn connect(&self) -> Result<Box<dyn OfficeEngine>, EngineError> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Connection(format!("Failed to reach bridge: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Connection(format!(
                "Bridge status returned {}",
                response.status()
            )));
        }

        Ok(Box::new(BridgeEngine {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
        }))
    }
}

/// Engine session backed by the UNO bridge
pub struct BridgeEngine {
    client: reqwest::Client,
    base_url: String,
}

impl BridgeEngine {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Rejected(format!("Bridge returned {}: {}", status, body)))
    }
}

fn transport(e: reqwest::Error) -> EngineError {
    EngineError::Transport(e.to_string())
}

#[async_trait]
impl OfficeEngine for BridgeEngine {
    async fn put_document(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        let encoded = encode_payload(&data);
        let response = self
            .client
            .put(self.url("/document"))
            .json(&PutRequest { data: &encoded })
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn join_documents(&mut self, documents: Vec<Vec<u8>>) -> Result<(), EngineError> {
        let request = JoinRequest {
            documents: documents.iter().map(|d| encode_payload(d)).collect(),
        };
        let response = self
            .client
            .post(self.url("/document/join"))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn save_by_stream(&mut self, filter: &str) -> Result<Vec<u8>, EngineError> {
        let response = self
            .client
            .post(self.url("/document/export"))
            .json(&ExportRequest { filter })
            .send()
            .await
            .map_err(transport)?;
        let exported: ExportResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Rejected(format!("Failed to parse export response: {}", e)))?;

        decode_payload(&exported.data)
            .map_err(|e| EngineError::Rejected(format!("Bridge sent invalid payload: {}", e)))
    }

    async fn close_document(&mut self) -> Result<(), EngineError> {
        let response = self
            .client
            .delete(self.url("/document"))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let connector = BridgeConnector::new("http://localhost:8100/", Duration::from_secs(5)).unwrap();
        assert_eq!(connector.describe(), "bridge at http://localhost:8100");
    }

    #[tokio::test]
    async fn test_connect_unreachable_bridge() {
        // Port 9 (discard) is not expected to host a bridge
        let connector = BridgeConnector::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = connector.connect().await;
        assert!(matches!(result, Err(EngineError::Connection(_))));
    }
}
