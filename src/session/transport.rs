//! Per-session transport state machine.
//!
//! A [`Transport`] consumes one HTTP exchange at a time. Exchanges against the
//! same transport are serialized by an async mutex; a streamed POST moves the
//! owned guard into the task that produces the stream, so the next exchange
//! waits until that stream is done.
//!
//! The handshake starts the session's rmcp service. It runs on its own task
//! and talks to the transport over a pair of unbounded channels: client
//! messages go in, and a router task sorts what comes out into replies for
//! waiting exchanges and messages for the server-push stream.

use super::registry::Evictor;
use super::stream::{self, EventSender, EventStream, StreamEvent};
use super::types::{SessionId, TransportState};
use crate::error::{ProtocolError, TransportError};
use crate::protocol::{error_reply, parse_body, Inbound, ParsedBody};
use crate::server::{PackageRegistryServer, SessionSignals};
use chrono::{DateTime, Utc};
use futures::channel::mpsc::{self as channel, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::ServiceExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How replies to a POST are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One buffered JSON body.
    Json,
    /// A stream of events, closed after the last reply.
    EventStream,
}

/// One HTTP exchange, as seen by a transport.
#[derive(Debug, Clone, Copy)]
pub enum Exchange<'a> {
    Post { body: &'a [u8], mode: ResponseMode },
    /// Open the session's server-push stream.
    Listen,
    Teardown,
}

#[derive(Debug)]
pub enum ExchangeOutput {
    /// Accepted; nothing to send back.
    Empty,
    Json(Value),
    Stream(EventStream),
}

/// Per-transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    /// Heartbeat period for server-push streams; `None` disables heartbeats.
    pub keep_alive: Option<Duration>,
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Reply slots keyed by the JSON text of the request id.
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Sending side of a session's rmcp service.
#[derive(Clone)]
struct EngineHandle {
    inbound: UnboundedSender<ClientJsonRpcMessage>,
    pending: Pending,
}

impl EngineHandle {
    fn send(&self, message: ClientJsonRpcMessage) -> Result<(), TransportError> {
        self.inbound
            .unbounded_send(message)
            .map_err(|_| TransportError::Internal("session engine stopped".to_string()))
    }

    fn expect_reply(&self, id: &Value) -> (oneshot::Receiver<Value>, PendingGuard) {
        let key = id.to_string();
        let (slot, reply) = oneshot::channel();
        lock(&self.pending).insert(key.clone(), slot);
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            key,
        };
        (reply, guard)
    }
}

/// Frees a reply slot once nobody waits on it.
struct PendingGuard {
    pending: Pending,
    key: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
    }
}

/// A running rmcp service. Dropping it stops the service and its router.
struct EngineLink {
    handle: EngineHandle,
    tasks: [AbortHandle; 2],
}

impl Drop for EngineLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct Transport {
    id: SessionId,
    created_at: DateTime<Utc>,
    phase: Mutex<TransportState>,
    /// Held for the length of one exchange.
    exchange: Arc<AsyncMutex<()>>,
    link: Mutex<Option<EngineLink>>,
    push: Mutex<Option<EventSender>>,
    /// `shutdown` is cancelled once the transport is closed.
    signals: SessionSignals,
    last_activity: Mutex<Instant>,
    config: TransportConfig,
    evictor: Evictor,
}

impl Transport {
    pub(crate) fn new(id: SessionId, config: TransportConfig, evictor: Evictor) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            phase: Mutex::new(TransportState::Uninitialized),
            exchange: Arc::new(AsyncMutex::new(())),
            link: Mutex::new(None),
            push: Mutex::new(None),
            signals: SessionSignals::default(),
            last_activity: Mutex::new(Instant::now()),
            config,
            evictor,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> TransportState {
        *lock(&self.phase)
    }

    /// Time since the last exchange started or finished.
    pub fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    /// True when idle for at least `max_idle` with nothing in flight and no
    /// live server-push stream.
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        self.idle_for() >= max_idle && self.exchange.try_lock().is_ok() && !self.has_push_stream()
    }

    pub fn has_push_stream(&self) -> bool {
        lock(&self.push)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    /// Run one HTTP exchange through this transport.
    pub async fn handle_exchange(
        self: &Arc<Self>,
        engine: &Arc<PackageRegistryServer>,
        exchange: Exchange<'_>,
    ) -> Result<ExchangeOutput, TransportError> {
        self.touch();
        let outcome = match exchange {
            Exchange::Post { body, mode } => self.post(engine, body, mode).await,
            Exchange::Listen => self.listen(),
            Exchange::Teardown => self.close().await.map(|()| ExchangeOutput::Empty),
        };
        self.touch();

        if let Err(TransportError::Internal(message)) = &outcome {
            self.fail(message).await;
        }
        outcome
    }

    async fn post(
        self: &Arc<Self>,
        engine: &PackageRegistryServer,
        body: &[u8],
        mode: ResponseMode,
    ) -> Result<ExchangeOutput, TransportError> {
        self.ensure_open()?;
        let parsed = parse_body(body)?;

        let guard = Arc::clone(&self.exchange).lock_owned().await;
        self.admit(&parsed)?;
        if self.signals.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let handshake = self.state() == TransportState::Uninitialized;
        let handle = if handshake {
            self.start_engine(engine)
        } else {
            self.engine_handle()?
        };
        let ParsedBody { messages, batch } = parsed;

        if !handshake && mode == ResponseMode::EventStream && messages.iter().any(Inbound::is_request) {
            let (tx, events) = stream::channel();
            let transport = Arc::clone(self);
            let request_ids: Vec<Value> = messages
                .iter()
                .filter_map(|m| m.request_id().cloned())
                .collect();
            tokio::spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        debug!(session_id = %transport.id, "client disconnected mid-stream");
                        transport.cancel_requests(&handle, &request_ids);
                        Ok(())
                    }
                    outcome = transport.stream_replies(&handle, messages, &tx) => outcome,
                };
                drop(guard);
                transport.touch();
                if let Err(TransportError::Internal(message)) = outcome {
                    transport.fail(&message).await;
                }
            });
            return Ok(ExchangeOutput::Stream(events));
        }

        let replies = self.collect_replies(&handle, messages).await?;
        drop(guard);

        if handshake && self.state() != TransportState::Active {
            self.fail("initialize handshake failed").await;
        }

        Ok(match (mode, batch) {
            _ if replies.is_empty() => ExchangeOutput::Empty,
            (ResponseMode::EventStream, _) => ExchangeOutput::Stream(replay(replies, batch)),
            (ResponseMode::Json, true) => ExchangeOutput::Json(Value::Array(replies)),
            (ResponseMode::Json, false) => {
                ExchangeOutput::Json(replies.into_iter().next().unwrap_or(Value::Null))
            }
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.state() == TransportState::Closed || self.signals.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Check a parsed body against the current phase.
    fn admit(&self, parsed: &ParsedBody) -> Result<(), TransportError> {
        match self.state() {
            TransportState::Closed => Err(TransportError::Closed),
            TransportState::Uninitialized => {
                let single_initialize = !parsed.batch
                    && matches!(parsed.messages.as_slice(), [only] if only.is_initialize_request());
                if single_initialize {
                    Ok(())
                } else {
                    Err(ProtocolError::NotInitialized.into())
                }
            }
            TransportState::Active => {
                if parsed.messages.iter().any(Inbound::is_initialize_request) {
                    Err(ProtocolError::AlreadyInitialized.into())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Start this session's rmcp service on a clone of `engine`.
    fn start_engine(self: &Arc<Self>, engine: &PackageRegistryServer) -> EngineHandle {
        let (inbound, inbound_rx) = channel::unbounded::<ClientJsonRpcMessage>();
        let (outbound_tx, outbound) = channel::unbounded::<ServerJsonRpcMessage>();
        let handle = EngineHandle {
            inbound,
            pending: Pending::default(),
        };

        let service = engine.for_session(self.signals.clone());
        let session_id = self.id;
        let serve = tokio::spawn(async move {
            match service.serve((outbound_tx, inbound_rx)).await {
                Ok(running) => {
                    let reason = running.waiting().await;
                    debug!(session_id = %session_id, ?reason, "session engine stopped");
                }
                Err(e) => warn!(session_id = %session_id, error = %e, "session handshake failed"),
            }
        });
        let router = tokio::spawn(route_outbound(
            Arc::downgrade(self),
            outbound,
            Arc::clone(&handle.pending),
        ));

        *lock(&self.link) = Some(EngineLink {
            handle: handle.clone(),
            tasks: [serve.abort_handle(), router.abort_handle()],
        });
        handle
    }

    fn engine_handle(&self) -> Result<EngineHandle, TransportError> {
        lock(&self.link)
            .as_ref()
            .map(|link| link.handle.clone())
            .ok_or(TransportError::Closed)
    }

    async fn collect_replies(
        &self,
        handle: &EngineHandle,
        messages: Vec<Inbound>,
    ) -> Result<Vec<Value>, TransportError> {
        let mut replies = Vec::new();
        for message in messages {
            if let Some(reply) = self.process(handle, message).await? {
                replies.push(reply);
            }
        }
        Ok(replies)
    }

    async fn stream_replies(
        &self,
        handle: &EngineHandle,
        messages: Vec<Inbound>,
        tx: &EventSender,
    ) -> Result<(), TransportError> {
        for message in messages {
            if let Some(reply) = self.process(handle, message).await? {
                if tx.send(StreamEvent::Message(reply)).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Hand one message to the engine and wait for its reply, if it has one.
    async fn process(
        &self,
        handle: &EngineHandle,
        message: Inbound,
    ) -> Result<Option<Value>, TransportError> {
        let decoded = match message.decode() {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!(session_id = %self.id, error = %error.message, "undecodable message");
                return Ok(message.request_id().map(|id| error_reply(Some(id), &error)));
            }
        };
        let Some(id) = message.request_id() else {
            handle.send(decoded)?;
            return Ok(None);
        };

        let (reply, _slot) = handle.expect_reply(id);
        handle.send(decoded)?;
        let reply = tokio::select! {
            biased;
            _ = self.signals.fault.cancelled() => return Err(self.fault()),
            reply = reply => reply.map_err(|_| {
                TransportError::Internal("session engine stopped".to_string())
            })?,
            _ = self.signals.shutdown.cancelled() => return Err(TransportError::Closed),
        };
        if self.signals.fault.is_cancelled() {
            return Err(self.fault());
        }
        if self.signals.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        if message.is_initialize_request() && reply.get("result").is_some() {
            self.activate();
        }
        Ok(Some(reply))
    }

    fn fault(&self) -> TransportError {
        TransportError::Internal("operation panicked".to_string())
    }

    /// Tell the engine that nobody waits for these requests any more.
    fn cancel_requests(&self, handle: &EngineHandle, ids: &[Value]) {
        for id in ids {
            let note = json!({
                "jsonrpc": "2.0",
                "method": "notifications/cancelled",
                "params": {"requestId": id, "reason": "client disconnected"},
            });
            match serde_json::from_value::<ClientJsonRpcMessage>(note) {
                Ok(message) => {
                    let _ = handle.send(message);
                }
                Err(e) => debug!(session_id = %self.id, error = %e, "cannot build cancellation"),
            }
        }
    }

    /// Route one message from the engine that no exchange asked for.
    fn deliver(&self, pending: &Pending, value: Value) {
        if value.get("method").is_none() {
            let key = value.get("id").map(Value::to_string).unwrap_or_default();
            match lock(pending).remove(&key) {
                Some(slot) => {
                    let _ = slot.send(value);
                }
                None => debug!(session_id = %self.id, id = %key, "dropping unclaimed reply"),
            }
            return;
        }

        match lock(&self.push).as_ref() {
            Some(tx) => {
                if tx.try_send(StreamEvent::Message(value)).is_err() {
                    debug!(session_id = %self.id, "push stream full or closed, message dropped");
                }
            }
            None => debug!(session_id = %self.id, "no push stream, message dropped"),
        }
    }

    fn activate(&self) {
        let mut phase = lock(&self.phase);
        if *phase == TransportState::Uninitialized {
            *phase = TransportState::Active;
            info!(session_id = %self.id, "session initialized");
        }
    }

    fn listen(&self) -> Result<ExchangeOutput, TransportError> {
        match self.state() {
            TransportState::Closed => return Err(TransportError::Closed),
            TransportState::Uninitialized => return Err(ProtocolError::NotInitialized.into()),
            TransportState::Active => {}
        }

        let mut push = lock(&self.push);
        if push.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::StreamConflict);
        }
        let (tx, events) = stream::channel();
        if let Some(period) = self.config.keep_alive {
            tokio::spawn(keep_alive(tx.clone(), period, self.signals.shutdown.clone()));
        }
        *push = Some(tx);
        debug!(session_id = %self.id, "server-push stream opened");
        Ok(ExchangeOutput::Stream(events))
    }

    /// Tear the transport down. Cancels whatever exchange is running, waits
    /// for it to release the session, then stops the engine and ends the
    /// push stream.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.signals.shutdown.cancel();
        let _guard = self.exchange.lock().await;
        {
            let mut phase = lock(&self.phase);
            if *phase == TransportState::Closed {
                return Err(TransportError::Closed);
            }
            *phase = TransportState::Closed;
        }
        lock(&self.link).take();
        lock(&self.push).take();
        info!(session_id = %self.id, "session closed");
        Ok(())
    }

    async fn fail(&self, message: &str) {
        error!(session_id = %self.id, error = %message, "transport failed, closing session");
        *lock(&self.phase) = TransportState::Closed;
        self.signals.shutdown.cancel();
        lock(&self.push).take();
        // May run on the router task, which dropping the link aborts.
        let link = lock(&self.link).take();
        self.evictor.evict(&self.id).await;
        drop(link);
    }
}

/// Sort the engine's output until it stops; a stop the transport did not
/// ask for fails the session.
async fn route_outbound(
    transport: Weak<Transport>,
    mut outbound: UnboundedReceiver<ServerJsonRpcMessage>,
    pending: Pending,
) {
    while let Some(message) = outbound.next().await {
        let value = match serde_json::to_value(&message) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "cannot serialize engine message");
                continue;
            }
        };
        let Some(transport) = transport.upgrade() else {
            return;
        };
        transport.deliver(&pending, value);
    }

    lock(&pending).clear();
    if let Some(transport) = transport.upgrade() {
        if transport.state() != TransportState::Closed {
            transport.fail("session engine stopped").await;
        }
    }
}

/// A stream that yields already computed replies and ends.
fn replay(replies: Vec<Value>, batch: bool) -> EventStream {
    let (tx, events) = stream::channel();
    let frames = if batch {
        vec![Value::Array(replies)]
    } else {
        replies
    };
    for frame in frames {
        if tx.try_send(StreamEvent::Message(frame)).is_err() {
            break;
        }
    }
    events
}

async fn keep_alive(tx: EventSender, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tx.closed() => break,
            _ = ticker.tick() => {
                if tx.send(StreamEvent::KeepAlive).await.is_err() {
                    break;
                }
            }
        }
    }
}
