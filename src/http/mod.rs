//! HTTP front door for the streamable HTTP transport.
//!
//! Maps each inbound request onto the session registry and a transport
//! exchange, and maps the exchange outcome back onto an HTTP response:
//!
//! | Verb   | Session header   | Outcome                                   |
//! |--------|------------------|-------------------------------------------|
//! | POST   | absent           | initialize body opens a session, else 400 |
//! | POST   | known / unknown  | exchange / 404                            |
//! | GET    | known / other    | server-push stream / 400                  |
//! | DELETE | known / other    | teardown, 200 / 404                       |
//!
//! An unsupported `MCP-Protocol-Version` header fails any of the three verbs
//! with 400 before the session is touched.

pub mod response;
pub mod sse;

use crate::error::TransportError;
use crate::protocol::{error_reply, is_initialize_request, is_supported_version};
use crate::server::{PackageRegistryServer, SERVER_NAME, SERVER_VERSION};
use crate::session::{
    Exchange, ExchangeOutput, ResponseMode, SessionId, SessionRegistry, Transport, TransportState,
};
use bytes::Bytes;
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use response::ResponseBody;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_service::Service;
use tracing::{debug, error, info};

/// Session header set on the initialize response and read on requests.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Bare header name also accepted (and echoed) for the session id.
pub const SESSION_HEADER_ALIAS: &str = "session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

pub const MCP_PATH: &str = "/mcp";
pub const HEALTH_PATH: &str = "/health";

/// Default cap on a POST body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Front door service. Cheap to clone; clones share the registry and engine.
#[derive(Clone)]
pub struct FrontDoor {
    registry: SessionRegistry,
    engine: Arc<PackageRegistryServer>,
    json_response: bool,
    max_body_bytes: usize,
}

impl FrontDoor {
    pub fn new(registry: SessionRegistry, engine: Arc<PackageRegistryServer>) -> Self {
        Self {
            registry,
            engine,
            json_response: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Always answer POSTs with a single JSON body, never a stream.
    pub fn with_json_response(mut self, json_response: bool) -> Self {
        self.json_response = json_response;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        match (method, path.as_str()) {
            (Method::GET, "/") => self.root(),
            (Method::GET, HEALTH_PATH) => response::json(StatusCode::OK, &json!({"status": "ok"})),
            (Method::POST, MCP_PATH) => self.post(req).await,
            (Method::GET, MCP_PATH) => self.get(req).await,
            (Method::DELETE, MCP_PATH) => self.delete(req).await,
            (_, MCP_PATH) => {
                let mut resp = response::error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Method not allowed",
                    "Use POST, GET or DELETE",
                );
                resp.headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("GET, POST, DELETE"));
                resp
            }
            (method, path) => response::error(
                StatusCode::NOT_FOUND,
                "Not found",
                format!("No route for {method} {path}"),
            ),
        }
    }

    fn root(&self) -> Response<ResponseBody> {
        response::json(
            StatusCode::OK,
            &json!({
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
                "description": "MCP server for searching and getting up-to-date information about npm, Cargo, and PyPI packages.",
                "endpoints": {"mcp": MCP_PATH, "health": HEALTH_PATH},
                "transport": "streamable-http",
            }),
        )
    }

    async fn post<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if let Err(resp) = check_protocol_version(req.headers()) {
            return resp;
        }
        let session = session_header(req.headers());
        let mode = self.response_mode(req.headers());
        let body = match read_body(req.into_body(), self.max_body_bytes).await {
            Ok(body) => body,
            Err(resp) => return resp,
        };

        let (transport, created) = match session {
            Some(raw) => match self.lookup(&raw).await {
                Some(transport) => (transport, false),
                None => return session_not_found(),
            },
            None => {
                let initialize = serde_json::from_slice::<Value>(&body)
                    .is_ok_and(|value| is_initialize_request(&value));
                if !initialize {
                    return response::error(
                        StatusCode::BAD_REQUEST,
                        "Invalid request",
                        "Missing session ID or not an initialize request",
                    );
                }
                match self.registry.create().await {
                    Ok((_, transport)) => (transport, true),
                    Err(e) => return internal_error(None, &e.to_string()),
                }
            }
        };

        let id = transport.id();
        let outcome = transport
            .handle_exchange(&self.engine, Exchange::Post { body: &body, mode })
            .await;

        let established = created && transport.state() == TransportState::Active;
        if created && !established {
            // First exchange failed; the session never becomes usable.
            self.registry.remove(&id).await;
        }

        match outcome {
            Ok(output) => {
                let mut resp = render(output, StatusCode::ACCEPTED);
                if established {
                    attach_session_id(resp.headers_mut(), id);
                }
                resp
            }
            Err(err) => self.exchange_error(id, err),
        }
    }

    async fn get<B>(&self, req: Request<B>) -> Response<ResponseBody> {
        if let Err(resp) = check_protocol_version(req.headers()) {
            return resp;
        }
        let transport = match session_header(req.headers()) {
            Some(raw) => self.lookup(&raw).await,
            None => None,
        };
        let Some(transport) = transport else {
            return invalid_session();
        };
        match transport.handle_exchange(&self.engine, Exchange::Listen).await {
            Ok(output) => render(output, StatusCode::OK),
            // Torn down between lookup and listen.
            Err(TransportError::Closed) => invalid_session(),
            Err(err) => self.exchange_error(transport.id(), err),
        }
    }

    async fn delete<B>(&self, req: Request<B>) -> Response<ResponseBody> {
        if let Err(resp) = check_protocol_version(req.headers()) {
            return resp;
        }
        let transport = match session_header(req.headers()) {
            Some(raw) => self.lookup(&raw).await,
            None => None,
        };
        let Some(transport) = transport else {
            return session_not_found();
        };
        let id = transport.id();
        let outcome = transport.handle_exchange(&self.engine, Exchange::Teardown).await;
        self.registry.remove(&id).await;
        match outcome {
            Ok(_) => response::empty(StatusCode::OK),
            Err(err) => self.exchange_error(id, err),
        }
    }

    async fn lookup(&self, raw: &str) -> Option<Arc<Transport>> {
        let id: SessionId = raw.parse().ok()?;
        self.registry.lookup(&id).await
    }

    fn response_mode(&self, headers: &HeaderMap) -> ResponseMode {
        if self.json_response {
            return ResponseMode::Json;
        }
        let wants_stream = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/event-stream"));
        if wants_stream {
            ResponseMode::EventStream
        } else {
            ResponseMode::Json
        }
    }

    fn exchange_error(&self, id: SessionId, err: TransportError) -> Response<ResponseBody> {
        match err {
            TransportError::Protocol(e) => {
                debug!(session_id = %id, error = %e, "protocol error");
                response::json(StatusCode::OK, &error_reply(None, &e.to_error_data()))
            }
            TransportError::Closed => session_not_found(),
            TransportError::StreamConflict => response::error(
                StatusCode::CONFLICT,
                "Conflict",
                "Only one server-push stream is allowed per session",
            ),
            TransportError::Internal(message) => internal_error(Some(id), &message),
        }
    }
}

impl<B> Service<Request<B>> for FrontDoor
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let front_door = self.clone();
        Box::pin(async move { Ok(front_door.handle(req).await) })
    }
}

fn render(output: ExchangeOutput, empty_status: StatusCode) -> Response<ResponseBody> {
    match output {
        ExchangeOutput::Empty => response::empty(empty_status),
        ExchangeOutput::Json(value) => response::json(StatusCode::OK, &value),
        ExchangeOutput::Stream(events) => response::event_stream(events),
    }
}

fn session_not_found() -> Response<ResponseBody> {
    response::error(
        StatusCode::NOT_FOUND,
        "Session not found",
        "No active session with the provided ID",
    )
}

fn invalid_session() -> Response<ResponseBody> {
    response::error(
        StatusCode::BAD_REQUEST,
        "Invalid request",
        "Missing or invalid session ID",
    )
}

fn internal_error(id: Option<SessionId>, message: &str) -> Response<ResponseBody> {
    match id {
        Some(id) => error!(session_id = %id, error = %message, "Error handling MCP request"),
        None => error!(error = %message, "Error handling MCP request"),
    }
    response::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        message,
    )
}

/// Session id from the request, preferring the protocol header name.
fn session_header(headers: &HeaderMap) -> Option<String> {
    [SESSION_HEADER, SESSION_HEADER_ALIAS]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
}

fn attach_session_id(headers: &mut HeaderMap, id: SessionId) {
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        headers.insert(SESSION_HEADER, value.clone());
        headers.insert(SESSION_HEADER_ALIAS, value);
    }
}

fn check_protocol_version(headers: &HeaderMap) -> Result<(), Response<ResponseBody>> {
    let Some(value) = headers.get(PROTOCOL_VERSION_HEADER) else {
        return Ok(());
    };
    match value.to_str() {
        Ok(version) if is_supported_version(version.trim()) => Ok(()),
        _ => Err(response::error(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            format!(
                "Unsupported protocol version: {}",
                String::from_utf8_lossy(value.as_bytes())
            ),
        )),
    }
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response<ResponseBody>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(response::error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Payload too large",
            format!("Request body exceeds {limit} bytes"),
        )),
        Err(e) => Err(response::error(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            format!("Failed to read request body: {e}"),
        )),
    }
}

/// Accept connections until `shutdown` fires, serving each on its own task.
pub async fn serve(
    listener: TcpListener,
    front_door: FrontDoor,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("MCP HTTP server listening on http://{addr}{MCP_PATH}");
    }
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP server shutting down");
                break;
            }
            res = listener.accept() => {
                let (stream, peer) = res?;
                let svc = front_door.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let conn = http1::Builder::new()
                        .serve_connection(io, TowerToHyperService::new(svc));
                    if let Err(err) = conn.await {
                        debug!(peer = %peer, "http connection error: {err}");
                    }
                });
            }
        }
    }
    Ok(())
}
