//! Response handling.
//!
//! # Responsibilities
//! - Relay a backend response to the client as a stream (status, content type, body)
//! - Buffer a cacheable backend response into a [`CachedResponse`], up to a cap
//! - Render a buffered response back to the client verbatim
//!
//! # Design Decisions
//! - Backend headers other than Content-Type are not relayed
//! - A body past the buffering cap is not an error: the bytes already read are
//!   stitched back in front of the rest of the stream and relayed uncached

use axum::body::{Body, Bytes};
use axum::http::{header, response::Parts, HeaderValue, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{stream, StreamExt};

use crate::cache::CachedResponse;

/// Outcome of reading a backend response with a size cap.
#[derive(Debug)]
pub enum Buffered {
    Complete(CachedResponse),
    /// Larger than the cap; still streaming, with nothing lost.
    Oversized(Response),
}

/// Relay a backend response without reading its body.
pub fn relay_response<B>(response: HttpResponse<B>) -> Response
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (parts, body) = response.into_parts();
    client_response(&parts, Body::new(body))
}

/// Read a backend response fully if its body fits in `limit` bytes.
pub async fn buffer_response<B>(response: HttpResponse<B>, limit: usize) -> Result<Buffered, axum::Error>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (parts, body) = response.into_parts();
    let mut data = Body::new(body).into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();

    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        if buffered.len() + chunk.len() > limit {
            let head = stream::iter([Ok::<_, axum::Error>(Bytes::from(buffered)), Ok(chunk)]);
            let body = Body::from_stream(head.chain(data));
            return Ok(Buffered::Oversized(client_response(&parts, body)));
        }
        buffered.extend_from_slice(&chunk);
    }

    Ok(Buffered::Complete(CachedResponse {
        status: parts.status.as_u16(),
        content_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: Bytes::from(buffered),
    }))
}

fn client_response(parts: &Parts, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = parts.status;
    if let Some(value) = parts.headers.get(header::CONTENT_TYPE) {
        response.headers_mut().insert(header::CONTENT_TYPE, value.clone());
    }
    response
}

impl CachedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        if let Some(value) = self.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}
