//! Response builders for the front door.

use super::sse::SseBody;
use crate::session::EventStream;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::http::{header, HeaderValue, Response, StatusCode};
use serde_json::{json, Value};
use std::convert::Infallible;

pub type ResponseBody = BoxBody<Bytes, Infallible>;

fn with_status(status: StatusCode, body: ResponseBody) -> Response<ResponseBody> {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

pub fn empty(status: StatusCode) -> Response<ResponseBody> {
    with_status(status, Empty::<Bytes>::new().boxed())
}

pub fn json(status: StatusCode, value: &Value) -> Response<ResponseBody> {
    let mut resp = with_status(status, Full::new(Bytes::from(value.to_string())).boxed());
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

/// `{error, message}` body used for every HTTP-level failure.
pub fn error(status: StatusCode, error: &str, message: impl AsRef<str>) -> Response<ResponseBody> {
    json(
        status,
        &json!({"error": error, "message": message.as_ref()}),
    )
}

pub fn event_stream(events: EventStream) -> Response<ResponseBody> {
    let mut resp = with_status(StatusCode::OK, SseBody::new(events).boxed());
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_body_shape() {
        let resp = error(StatusCode::NOT_FOUND, "Session not found", "gone");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static("application/json")
        );
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value, json!({"error": "Session not found", "message": "gone"}));
    }

    #[tokio::test]
    async fn empty_has_no_body() {
        let resp = empty(StatusCode::ACCEPTED);
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        assert!(bytes.is_empty());
    }
}
