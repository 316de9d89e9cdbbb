//! Header policy for forwarded requests.
//!
//! Only `Content-Type` and `Authorization` cross the gateway; every other
//! inbound header (cookies, forwarding headers, hop-by-hop headers) is dropped.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Headers a backend may receive from a client.
pub const FORWARDED_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, AUTHORIZATION];

/// Content type assumed for a body sent without one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Copy the allowed headers out of an inbound request.
pub fn forwardable_headers(inbound: &HeaderMap, has_body: bool) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(FORWARDED_HEADERS.len());
    for name in FORWARDED_HEADERS.iter() {
        if let Some(value) = inbound.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    if has_body && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    }
    headers
}
