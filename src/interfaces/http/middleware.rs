use crate::infrastructure::security::TrustedSubnet;
use crate::infrastructure::transport::http_client::REAL_IP_HEADER;
use crate::interfaces::http::AppState;
use crate::interfaces::http::error::ApiError;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

/// Largest request body accepted before decoding.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Reject requests whose `X-Real-IP` is missing or outside the trusted subnet.
pub async fn trusted_subnet(
    State(subnet): State<Option<TrustedSubnet>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(subnet) = subnet {
        let real_ip = request
            .headers()
            .get(REAL_IP_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(e) = subnet.check(real_ip) {
            return ApiError(e).into_response();
        }
    }
    next.run(request).await
}

/// Gunzip and decrypt the request body so handlers only ever see plain JSON.
pub async fn decode_body(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let gzipped = request
        .headers()
        .get(CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));
    if !gzipped && !state.envelope.decrypts() {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return ApiError::bad_request(format!("reading body: {}", e)).into_response(),
    };
    let decoded = match state.envelope.open(&bytes, gzipped) {
        Ok(decoded) => decoded,
        Err(e) => return ApiError(e).into_response(),
    };
    debug!(
        "Decoded request body: {} -> {} bytes",
        bytes.len(),
        decoded.len()
    );

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(decoded)))
        .await
}
