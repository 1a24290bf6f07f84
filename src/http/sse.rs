//! Server-sent events body over a transport output stream.

use crate::session::{EventStream, StreamEvent};
use bytes::Bytes;
use http_body::{Body, Frame};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body that frames each stream event as SSE.
///
/// Dropping the body (client went away) drops the receiver, which the
/// producing side observes as a closed channel.
#[derive(Debug)]
pub struct SseBody {
    events: EventStream,
}

impl SseBody {
    pub fn new(events: EventStream) -> Self {
        Self { events }
    }
}

impl Body for SseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.get_mut()
            .events
            .poll_next(cx)
            .map(|event| event.map(|event| Ok(Frame::data(encode_event(&event)))))
    }
}

/// Encode one event in `text/event-stream` framing.
pub fn encode_event(event: &StreamEvent) -> Bytes {
    match event {
        StreamEvent::Message(message) => Bytes::from(format!("event: message\ndata: {message}\n\n")),
        StreamEvent::KeepAlive => Bytes::from_static(b": keep-alive\n\n"),
    }
}
