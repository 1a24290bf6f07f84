//! Shared helpers for the front door integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::{BodyExt, Full};
use hyper::http::{header, Method, Request, Response, StatusCode};
use package_registry_mcp::catalog::{OperationCatalog, OperationFuture};
use package_registry_mcp::http::response::ResponseBody;
use package_registry_mcp::http::{SESSION_HEADER, SESSION_HEADER_ALIAS};
use package_registry_mcp::{FrontDoor, PackageRegistryServer, SessionRegistry, ToolError};
use package_registry_mcp::session::TransportConfig;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

/// How long `rendezvous` waits for its partner before giving up.
const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory catalog behind `npm_details`. The package name picks the
/// behaviour: `left-pad` resolves, `slow` takes a moment and records how
/// many calls overlap, `rendezvous` waits for a partner call, `stall` never
/// finishes in test time, `explode` panics and anything else is not found.
pub struct FakeCatalog {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    barrier: Arc<Barrier>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            barrier: Arc::new(Barrier::new(2)),
        }
    }

    /// Most `slow` calls ever running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl OperationCatalog for FakeCatalog {
    fn call(&self, name: &str, arguments: Value) -> Option<OperationFuture> {
        if name != "npm_details" {
            return None;
        }
        let package = arguments["name"].as_str().unwrap_or_default().to_string();
        Some(match package.as_str() {
            "left-pad" => details().boxed(),
            "slow" => slow(Arc::clone(&self.active), Arc::clone(&self.peak)).boxed(),
            "rendezvous" => rendezvous(Arc::clone(&self.barrier)).boxed(),
            "stall" => stall().boxed(),
            "explode" => explode().boxed(),
            other => not_found(other.to_string()).boxed(),
        })
    }
}

async fn details() -> Result<Value, ToolError> {
    Ok(json!({"name": "left-pad", "latestVersion": "1.3.0", "license": "WTFPL"}))
}

async fn slow(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Result<Value, ToolError> {
    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    active.fetch_sub(1, Ordering::SeqCst);
    Ok(json!({"done": true}))
}

async fn rendezvous(barrier: Arc<Barrier>) -> Result<Value, ToolError> {
    match tokio::time::timeout(RENDEZVOUS_TIMEOUT, barrier.wait()).await {
        Ok(_) => Ok(json!({"met": true})),
        Err(_) => Err(ToolError::UpstreamUnavailable("partner never arrived".into())),
    }
}

async fn not_found(package: String) -> Result<Value, ToolError> {
    Err(ToolError::NotFound(package))
}

async fn stall() -> Result<Value, ToolError> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(json!({"done": true}))
}

async fn explode() -> Result<Value, ToolError> {
    panic!("fake operation exploded")
}

/// A front door over a fresh registry and the fake catalog.
pub fn front_door() -> (FrontDoor, Arc<FakeCatalog>) {
    let catalog = Arc::new(FakeCatalog::new());
    let engine = Arc::new(PackageRegistryServer::new(catalog.clone()));
    let registry = SessionRegistry::new(TransportConfig { keep_alive: None });
    (FrontDoor::new(registry, engine), catalog)
}

pub fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "integration", "version": "0.1.0"}
        }
    })
}

pub fn initialized_notification() -> Value {
    json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
}

pub fn call_tool(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

/// `npm_details` for `package`, which the fake catalog dispatches on.
pub fn lookup(id: u64, package: &str) -> Value {
    call_tool(id, "npm_details", json!({"name": package}))
}

/// The JSON a successful tool result carries in its first text block.
pub fn tool_output(reply: &Value) -> Value {
    let text = reply["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    serde_json::from_str(text).expect("json text")
}

pub fn request(method: Method, session: Option<&str>, body: Option<&Value>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(method)
        .uri("/mcp")
        .header(header::ACCEPT, "application/json, text/event-stream");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER_ALIAS, id);
    }
    let bytes = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    builder.body(Full::new(bytes)).expect("request")
}

/// POST with `Accept: application/json` only, so replies are buffered.
pub async fn post_json(door: &FrontDoor, session: Option<&str>, body: &Value) -> Response<ResponseBody> {
    let mut req = request(Method::POST, session, Some(body));
    req.headers_mut()
        .insert(header::ACCEPT, "application/json".parse().expect("header"));
    door.handle(req).await
}

pub async fn body_json(resp: Response<ResponseBody>) -> Value {
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Every `data:` payload of an SSE response.
pub async fn body_events(resp: Response<ResponseBody>) -> Vec<Value> {
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    decode_events(&String::from_utf8_lossy(&bytes))
}

/// Split a `text/event-stream` payload into the JSON data of its events.
/// Comments and malformed data lines are skipped.
pub fn decode_events(payload: &str) -> Vec<Value> {
    payload
        .split("\n\n")
        .filter_map(|block| {
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect();
            if data.is_empty() {
                return None;
            }
            serde_json::from_str(&data.join("\n")).ok()
        })
        .collect()
}

/// Initialize a session and return its id.
pub async fn open_session(door: &FrontDoor) -> String {
    let resp = post_json(door, None, &initialize_body()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let id = resp.headers()[SESSION_HEADER]
        .to_str()
        .expect("session header")
        .to_string();
    let ack = post_json(door, Some(&id), &initialized_notification()).await;
    assert_eq!(ack.status(), StatusCode::ACCEPTED);
    id
}
