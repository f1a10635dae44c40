//! JSON-RPC 2.0 Worker Service client over HTTP.
//!
//! Each call is a single `POST` of a JSON-RPC request; retrying is left to
//! the caller ([`ResultFetcher`](crate::fetcher::ResultFetcher)). Failures are
//! classified so that only transient ones surface as
//! [`TaskError::Transport`]:
//!
//! | Failure | Error |
//! |---------|-------|
//! | connect error, timeout, HTTP 5xx | `Transport` |
//! | JSON-RPC `-32603` (internal error) | `Transport` |
//! | JSON-RPC `-32602` on `getTaskResult` | `NotFound` |
//! | other HTTP status, JSON-RPC error, malformed body | `Protocol` |

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use sealed_compute_types::{Result, TaskError, TaskId};

use super::{WorkerEncryptionKey, WorkerResult, WorkerService};
use crate::config::ClientConfig;

/// JSON-RPC error code for invalid params; reported for unknown tasks.
pub const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC error code for internal errors; treated as transient.
pub const INTERNAL_ERROR: i64 = -32603;

const GET_TASK_RESULT: &str = "getTaskResult";
const GET_WORKER_ENCRYPTION_KEY: &str = "getWorkerEncryptionKey";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Worker Service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpWorkerService {
    url: String,
    client: reqwest::Client,
}

impl HttpWorkerService {
    /// Creates a client for `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Creates a client from `config.worker_url` and
    /// `config.request_timeout_ms`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let url = config
            .worker_url
            .as_deref()
            .ok_or_else(|| TaskError::Configuration("worker_url is not set".to_string()))?;
        Self::new(url, config.request_timeout())
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        task_id: Option<TaskId>,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params,
        };
        debug!(method, id = %request.id, url = %self.url, "worker request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e, task_id))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(transport(task_id, format!("worker returned HTTP {status}")));
        }
        if !status.is_success() {
            return Err(TaskError::Protocol(format!("worker returned HTTP {status}")));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| TaskError::Protocol(format!("malformed JSON-RPC response: {e}")))?;

        if let Some(error) = body.error {
            return Err(classify_rpc_error(method, &error, task_id));
        }
        let result = body
            .result
            .ok_or_else(|| TaskError::Protocol("JSON-RPC response has no result".to_string()))?;
        serde_json::from_value(result)
            .map_err(|e| TaskError::Protocol(format!("malformed {method} result: {e}")))
    }
}

fn transport(task_id: Option<TaskId>, message: String) -> TaskError {
    TaskError::Transport {
        task_id,
        attempts: 1,
        message,
    }
}

fn classify_reqwest(err: &reqwest::Error, task_id: Option<TaskId>) -> TaskError {
    if err.is_timeout() {
        transport(task_id, format!("request timed out: {err}"))
    } else if err.is_connect() {
        transport(task_id, format!("connection failed: {err}"))
    } else if err.is_builder() {
        TaskError::Configuration(format!("invalid worker request: {err}"))
    } else {
        transport(task_id, err.to_string())
    }
}

fn classify_rpc_error(method: &str, error: &JsonRpcError, task_id: Option<TaskId>) -> TaskError {
    match (error.code, task_id) {
        (INVALID_PARAMS, Some(task_id)) if method == GET_TASK_RESULT => {
            TaskError::NotFound { task_id }
        },
        (INTERNAL_ERROR, _) => transport(
            task_id,
            format!("worker internal error: {}", error.message),
        ),
        (code, _) => TaskError::Protocol(format!("{method} failed ({code}): {}", error.message)),
    }
}

#[async_trait]
impl WorkerService for HttpWorkerService {
    async fn get_result(&self, task_id: &TaskId) -> Result<WorkerResult> {
        self.call(GET_TASK_RESULT, json!({ "taskId": task_id }), Some(*task_id))
            .await
    }

    async fn get_encryption_key(&self) -> Result<WorkerEncryptionKey> {
        self.call(GET_WORKER_ENCRYPTION_KEY, json!({}), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: TaskId = TaskId::new([0x77; 32]);

    fn rpc_error(code: i64) -> JsonRpcError {
        JsonRpcError {
            code,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_classify_rpc_errors() {
        assert_eq!(
            classify_rpc_error(GET_TASK_RESULT, &rpc_error(INVALID_PARAMS), Some(ID)),
            TaskError::NotFound { task_id: ID }
        );
        assert!(classify_rpc_error(GET_TASK_RESULT, &rpc_error(INTERNAL_ERROR), Some(ID))
            .is_retryable());
        assert!(matches!(
            classify_rpc_error(GET_WORKER_ENCRYPTION_KEY, &rpc_error(INVALID_PARAMS), None),
            TaskError::Protocol(_)
        ));
        assert!(matches!(
            classify_rpc_error(GET_TASK_RESULT, &rpc_error(-32601), Some(ID)),
            TaskError::Protocol(_)
        ));
    }

    #[test]
    fn test_from_config_requires_url() {
        let err = HttpWorkerService::from_config(&ClientConfig::default()).unwrap_err();
        assert!(matches!(err, TaskError::Configuration(_)));

        let service =
            HttpWorkerService::from_config(&ClientConfig::new().with_worker_url("http://w:3346"))
                .unwrap();
        assert_eq!(service.url(), "http://w:3346");
    }

    #[test]
    fn test_request_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "1".to_string(),
            method: GET_TASK_RESULT,
            params: json!({ "taskId": ID }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["params"]["taskId"], ID.to_string());
    }
}
