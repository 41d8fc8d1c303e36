//! JSON-RPC Endpoint
//!
//! JSON-RPC 2.0 over `POST /`. Methods:
//! - `convert(data, identifier, in_mime, out_mime, username, password)`
//! - `upload(data, is_last, identifier, username, password)`
//! - `join(idents, out_mime, username, password)`
//!
//! Params may be named (object) or positional (array, in the order above).
//! Batches are accepted; notifications (no `id`) get no response body.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::service::{ConvertRequest, JoinRequest, UploadRequest};
use crate::state::AppState;

// ============================================================================
// Protocol Types
// ============================================================================

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

const CONVERT_PARAMS: &[&str] = &["data", "identifier", "in_mime", "out_mime", "username", "password"];
const UPLOAD_PARAMS: &[&str] = &["data", "is_last", "identifier", "username", "password"];
const JOIN_PARAMS: &[&str] = &["idents", "out_mime", "username", "password"];

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
    /// `None` only when the member is absent (a notification)
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Value,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for RpcError {
    fn from(err: ServiceError) -> Self {
        Self::new(err.rpc_code(), err.public_message())
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(handle))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /
async fn handle(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable JSON-RPC body");
            return Json(RpcResponse::failure(
                Value::Null,
                RpcError::new(PARSE_ERROR, "Parse error"),
            ))
            .into_response();
        }
    };

    match payload {
        Value::Array(calls) if calls.is_empty() => Json(RpcResponse::failure(
            Value::Null,
            RpcError::new(INVALID_REQUEST, "Invalid Request"),
        ))
        .into_response(),
        Value::Array(calls) => {
            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                if let Some(response) = handle_call(&state, call).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        call => match handle_call(&state, call).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    }
}

/// Execute one call; `None` for notifications
async fn handle_call(state: &AppState, call: Value) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_value(call) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Invalid JSON-RPC request");
            return Some(RpcResponse::failure(
                Value::Null,
                RpcError::new(INVALID_REQUEST, "Invalid Request"),
            ));
        }
    };

    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return Some(RpcResponse::failure(
            request.id.unwrap_or(Value::Null),
            RpcError::new(INVALID_REQUEST, "Invalid Request"),
        ));
    }

    tracing::debug!(method = %request.method, "JSON-RPC call");
    let outcome = dispatch(state, &request.method, request.params).await;
    if let Err(e) = &outcome {
        tracing::info!(method = %request.method, code = e.code, message = %e.message, "JSON-RPC call failed");
    }

    let id = request.id?;
    Some(match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    })
}

async fn dispatch(state: &AppState, method: &str, params: Value) -> Result<Value, RpcError> {
    let service = state.service();
    match method {
        "convert" => {
            let request: ConvertRequest = parse_params(params, CONVERT_PARAMS)?;
            Ok(Value::String(service.convert(request).await?))
        }
        "upload" => {
            let request: UploadRequest = parse_params(params, UPLOAD_PARAMS)?;
            let response = service.upload(request).await?;
            serde_json::to_value(response).map_err(|e| RpcError::from(ServiceError::Internal(e.to_string())))
        }
        "join" => {
            let request: JoinRequest = parse_params(params, JOIN_PARAMS)?;
            Ok(Value::String(service.join(request).await?))
        }
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deserialize named or positional params into a request type
fn parse_params<T: DeserializeOwned>(params: Value, names: &[&str]) -> Result<T, RpcError> {
    let named = match params {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => params,
        Value::Array(items) => {
            if items.len() > names.len() {
                return Err(RpcError::new(
                    INVALID_PARAMS,
                    format!("Expected at most {} params, got {}", names.len(), items.len()),
                ));
            }
            Value::Object(
                names
                    .iter()
                    .map(|name| name.to_string())
                    .zip(items)
                    .collect(),
            )
        }
        _ => return Err(RpcError::new(INVALID_PARAMS, "Params must be an object or an array")),
    };

    serde_json::from_value(named).map_err(|e| RpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SimpleAuth;
    use crate::config::Config;
    use crate::connection::RetryPolicy;
    use crate::engine::testing::MockConnector;
    use crate::service::OfficeService;
    use crate::spool::{decode_payload, encode_payload, Spool};
    use axum_test::TestServer;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn server(dir: &std::path::Path) -> TestServer {
        let service = OfficeService::new(
            Spool::new(dir),
            Arc::new(SimpleAuth::new("aeroo", "secret")),
            Arc::new(MockConnector::new()),
            RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
        )
        .await;
        let state = AppState::new(Config::default(), service);
        TestServer::new(router().with_state(state)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_convert_named_params() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path()).await;

        let upload: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "upload",
                "params": {
                    "data": encode_payload(b"report"),
                    "is_last": true,
                    "username": "aeroo",
                    "password": "secret",
                },
                "id": 1,
            }))
            .await
            .json();
        assert_eq!(upload["id"], 1);
        let identifier = upload["result"]["identifier"].clone();
        assert!(identifier.is_i64());

        let convert: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "convert",
                "params": {
                    "identifier": identifier,
                    "out_mime": "pdf",
                    "username": "aeroo",
                    "password": "secret",
                },
                "id": 2,
            }))
            .await
            .json();
        let data = convert["result"].as_str().unwrap();
        assert_eq!(decode_payload(data).unwrap(), b"writer_pdf_Export:report");
    }

    #[tokio::test]
    async fn test_positional_params() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path()).await;

        let response: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "convert",
                "params": [encode_payload(b"x"), false, false, "doc", "aeroo", "secret"],
                "id": "a",
            }))
            .await
            .json();

        let data = response["result"].as_str().unwrap();
        assert_eq!(decode_payload(data).unwrap(), b"MS Word 97:x");
    }

    #[tokio::test]
    async fn test_service_errors_map_to_codes() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path()).await;

        let denied: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "convert",
                "params": {"data": encode_payload(b"x"), "username": "aeroo", "password": "nope"},
                "id": 1,
            }))
            .await
            .json();
        assert_eq!(denied["error"]["code"], -32001);
        assert_eq!(denied["error"]["message"], "Access denied.");

        let no_ident: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "convert",
                "params": {"username": "aeroo", "password": "secret"},
                "id": 2,
            }))
            .await
            .json();
        assert_eq!(no_ident["error"]["code"], -32002);

        let no_data: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "upload",
                "params": {"username": "aeroo", "password": "secret"},
                "id": 3,
            }))
            .await
            .json();
        assert_eq!(no_data["error"]["code"], -32003);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path()).await;

        let parse: Value = server.post("/").text("{not json").await.json();
        assert_eq!(parse["error"]["code"], PARSE_ERROR);

        let unknown: Value = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": "shutdown", "id": 1}))
            .await
            .json();
        assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);

        let too_many: Value = server
            .post("/")
            .json(&json!({
                "jsonrpc": "2.0",
                "method": "join",
                "params": [[1], "odt", "aeroo", "secret", "extra"],
                "id": 2,
            }))
            .await
            .json();
        assert_eq!(too_many["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_notification_has_no_body() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path()).await;

        let response = server
            .post("/")
            .json(&json!({"jsonrpc": "2.0", "method": "convert", "params": {}}))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_batch() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path()).await;

        let responses: Value = server
            .post("/")
            .json(&json!([
                {"jsonrpc": "2.0", "method": "convert", "params": {"data": encode_payload(b"1"), "username": "aeroo", "password": "secret"}, "id": 1},
                {"jsonrpc": "2.0", "method": "convert", "params": {}},
                {"jsonrpc": "2.0", "method": "nope", "id": 3},
            ]))
            .await
            .json();

        let responses = responses.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["result"].is_string());
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
    }
}
