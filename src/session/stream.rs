//! Output channel between a transport and the HTTP response that carries it.
//!
//! The receiving half is owned by the response body. When the client goes
//! away the body is dropped, which closes the channel and tells the producer
//! to stop.

use serde_json::Value;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Events buffered per stream before the producer waits for the client.
pub const STREAM_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A serialized JSON-RPC message.
    Message(Value),
    /// Idle heartbeat with no payload.
    KeepAlive,
}

pub type EventSender = mpsc::Sender<StreamEvent>;

/// Receiving half of a transport output stream.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.rx.poll_recv(cx)
    }
}

pub fn channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    (tx, EventStream { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stream_ends_when_all_senders_drop() {
        let (tx, mut stream) = channel();
        tx.send(StreamEvent::Message(json!({"id": 1})))
            .await
            .expect("send");
        drop(tx);
        assert_eq!(
            stream.next().await,
            Some(StreamEvent::Message(json!({"id": 1})))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropping_stream_closes_sender() {
        let (tx, stream) = channel();
        drop(stream);
        tx.closed().await;
        assert!(tx.send(StreamEvent::KeepAlive).await.is_err());
    }
}
