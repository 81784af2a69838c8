//! API Server Module
//!
//! This module implements a JSON-RPC server for resource ingestion and
//! read-only status queries over batches and seal records.

use crate::{
    anchoring::AnchoringLifecycleManager,
    batch::{MerkleBatchAggregator, ResourcePool},
    config::ApiConfig,
    error::AnchorError,
    storage::{BatchRecordStore, ObjectStore},
    Resource,
};
use axum::{extract::State, routing::post, Json, Router};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Standard JSON-RPC error code for method not found
const METHOD_NOT_FOUND: i32 = -32601;
/// Standard JSON-RPC error code for invalid params
const INVALID_PARAMS: i32 = -32602;
/// Server error for failures behind a well-formed request
const INTERNAL_FAILURE: i32 = -32000;

/// Shared application state that is accessible across all request handlers
///
/// - `pool`: Buffers submitted resources until the next tick commits them
/// - `aggregator`: Answers batch queries
/// - `records`: Range lookups over sealable batches
/// - `objects`: Where submitted resources are kept, and later receive `_seal`
/// - `lifecycle`: Answers seal record queries
/// - `grace_period`: Age after which a seal counts as long-unconfirmed
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<ResourcePool>,
    pub aggregator: Arc<MerkleBatchAggregator>,
    pub records: Arc<dyn BatchRecordStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub lifecycle: Arc<AnchoringLifecycleManager>,
    pub grace_period: Duration,
}

/// The main API server struct
pub struct Server {
    config: ApiConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Starts the API server and begins listening for incoming requests
    ///
    /// # Returns
    /// `Ok(())` when the server shuts down, or an error if binding fails
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.state);

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Router with a single POST endpoint at "/"
pub fn router(state: AppState) -> Router {
    Router::new().route("/", post(handle_rpc)).with_state(state)
}

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` is populated, never both.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC error object
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// Failure of a single method call, before it is mapped to an error code
enum RpcFailure {
    MethodNotFound,
    InvalidParams(String),
    Internal(AnchorError),
}

impl From<AnchorError> for RpcFailure {
    fn from(e: AnchorError) -> Self {
        match e {
            AnchorError::InvalidInput(msg) => RpcFailure::InvalidParams(msg),
            other => RpcFailure::Internal(other),
        }
    }
}

type RpcResult = std::result::Result<Value, RpcFailure>;

#[derive(Debug, Deserialize)]
struct BatchRangeParams {
    from: u64,
    to: u64,
}

#[derive(Debug, Deserialize)]
struct LinkParams {
    link: String,
}

fn params<T: DeserializeOwned>(value: Value) -> std::result::Result<T, RpcFailure> {
    serde_json::from_value(value).map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> RpcResult {
    serde_json::to_value(value).map_err(|e| RpcFailure::Internal(e.into()))
}

/// Main RPC request handler
///
/// Routes the request by method name and maps any failure to its JSON-RPC
/// error code.
async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    debug!("Received RPC request: {}", request.method);

    let outcome = match request.method.as_str() {
        "submitResource" => submit_resource(&state, request.params).await,
        "getLastBatch" => get_last_batch(&state).await,
        "getBatches" => get_batches(&state, request.params).await,
        "getSeal" => get_seal(&state, request.params).await,
        "getLongUnconfirmed" => get_long_unconfirmed(&state).await,
        _ => Err(RpcFailure::MethodNotFound),
    };

    Json(match outcome {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(RpcFailure::MethodNotFound) => {
            JsonRpcResponse::failure(request.id, METHOD_NOT_FOUND, "Method not found".to_string())
        }
        Err(RpcFailure::InvalidParams(msg)) => {
            warn!("Invalid params for {}: {}", request.method, msg);
            JsonRpcResponse::failure(request.id, INVALID_PARAMS, format!("Invalid params: {}", msg))
        }
        Err(RpcFailure::Internal(e)) => {
            error!("{} failed: {}", request.method, e);
            JsonRpcResponse::failure(request.id, INTERNAL_FAILURE, e.to_string())
        }
    })
}

/// Store a resource and push it into the pool; it is committed on the next tick
async fn submit_resource(state: &AppState, value: Value) -> RpcResult {
    let resource: Resource = params(value)?;
    if resource.link.is_empty() {
        return Err(RpcFailure::InvalidParams("_link must not be empty".to_string()));
    }

    let link = resource.link.clone();
    state.objects.put_object(&link, to_value(&resource)?).await?;
    state.pool.add(resource).await;
    info!("Resource {} queued ({} pooled)", link, state.pool.len().await);
    Ok(json!({ "link": link, "queued": true }))
}

async fn get_last_batch(state: &AppState) -> RpcResult {
    let batch = state.aggregator.get_last_batch().await?;
    to_value(&batch)
}

async fn get_batches(state: &AppState, value: Value) -> RpcResult {
    let range: BatchRangeParams = params(value)?;
    if range.from > range.to {
        return Err(RpcFailure::InvalidParams(format!(
            "from ({}) is after to ({})",
            range.from, range.to
        )));
    }
    let batches = state.records.batch_range(range.from, range.to).await?;
    to_value(&batches)
}

async fn get_seal(state: &AppState, value: Value) -> RpcResult {
    let LinkParams { link } = params(value)?;
    let record = state.lifecycle.get(&link).await?;
    to_value(&record)
}

async fn get_long_unconfirmed(state: &AppState) -> RpcResult {
    let records = state.lifecycle.get_long_unconfirmed(state.grace_period).await?;
    to_value(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::{CreateSeal, MockBlockchain};
    use crate::clock::ManualClock;
    use crate::storage::{MemoryBlobStore, MemoryObjectStore, MemoryRecordStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        test_state_on(Arc::new(MockBlockchain::new("ethereum", "mock")))
    }

    fn test_state_on(chain: Arc<MockBlockchain>) -> AppState {
        let records = Arc::new(MemoryRecordStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let aggregator = MerkleBatchAggregator::new(
            Arc::new(MemoryBlobStore::new()),
            records.clone(),
            clock.clone(),
            2,
        )
        .unwrap();
        let objects = Arc::new(MemoryObjectStore::new());
        let lifecycle = AnchoringLifecycleManager::new(
            records.clone(),
            objects.clone(),
            chain,
            clock,
            3,
        )
        .unwrap();

        AppState {
            pool: Arc::new(ResourcePool::new()),
            aggregator: Arc::new(aggregator),
            records,
            objects,
            lifecycle: Arc::new(lifecycle),
            grace_period: Duration::from_secs(60),
        }
    }

    async fn call(state: AppState, method: &str, params: Value) -> Value {
        let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = call(test_state(), "sendTransaction", Value::Null).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn test_submit_resource_queues_it() {
        let state = test_state();
        let params = json!({ "_time": 5, "_link": "aa", "title": "hello" });
        let response = call(state.clone(), "submitResource", params).await;

        assert_eq!(response["result"]["link"], "aa");
        let pooled = state.pool.drain(10).await;
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled[0].time, 5);
        assert_eq!(pooled[0].body["title"], "hello");
    }

    #[tokio::test]
    async fn test_submitted_resource_receives_seal_metadata() {
        let chain = Arc::new(MockBlockchain::new("ethereum", "mock"));
        let state = test_state_on(chain.clone());
        let params = json!({ "_time": 5, "_link": "aa", "title": "hello" });
        call(state.clone(), "submitResource", params).await;

        let stored = state.objects.get_object("aa").await.unwrap().unwrap();
        assert_eq!(stored["_link"], "aa");
        assert_eq!(stored["title"], "hello");

        state
            .lifecycle
            .create(CreateSeal {
                key: "02abcdef".to_string(),
                link: "aa".to_string(),
                permalink: "aa".to_string(),
            })
            .await
            .unwrap();
        state.lifecycle.seal_pending().await.unwrap();
        chain.mine(3).await;
        assert_eq!(state.lifecycle.sync_unconfirmed().await.unwrap().confirmed, 1);

        let stored = state.objects.get_object("aa").await.unwrap().unwrap();
        assert_eq!(stored["title"], "hello");
        assert_eq!(stored["_seal"]["link"], "aa");
        assert_eq!(stored["_seal"]["confirmations"], 3);
    }

    #[tokio::test]
    async fn test_submit_resource_without_link_rejected() {
        let state = test_state();
        let response = call(state.clone(), "submitResource", json!({ "_time": 5 })).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = call(state.clone(), "submitResource", json!({ "_time": 5, "_link": "" })).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert!(state.pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_batch_queries() {
        let state = test_state();
        let response = call(state.clone(), "getLastBatch", Value::Null).await;
        assert_eq!(response["result"], Value::Null);

        for _ in 0..3 {
            state.aggregator.seal_next_batch().await.unwrap();
        }

        let response = call(state.clone(), "getLastBatch", Value::Null).await;
        assert_eq!(response["result"], json!({ "batchNumber": 2 }));

        let response = call(state.clone(), "getBatches", json!({ "from": 1, "to": 5 })).await;
        assert_eq!(response["result"], json!([{ "batchNumber": 1 }, { "batchNumber": 2 }]));

        let response = call(state, "getBatches", json!({ "from": 3, "to": 1 })).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_seal_queries() {
        let state = test_state();
        let response = call(state.clone(), "getSeal", json!({ "link": "root" })).await;
        assert_eq!(response["result"], Value::Null);

        state
            .lifecycle
            .create(CreateSeal {
                key: "02abcdef".to_string(),
                link: "root".to_string(),
                permalink: "root".to_string(),
            })
            .await
            .unwrap();

        let response = call(state.clone(), "getSeal", json!({ "link": "root" })).await;
        assert_eq!(response["result"]["link"], "root");
        assert_eq!(response["result"]["state"]["status"], "unsealed");

        let response = call(state.clone(), "getSeal", json!({})).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = call(state, "getLongUnconfirmed", Value::Null).await;
        assert_eq!(response["result"], json!([]));
    }
}
