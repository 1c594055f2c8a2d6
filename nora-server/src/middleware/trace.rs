use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Bodies at most this large are logged at debug level.
const MAX_LOGGED_BODY: usize = 1024;

pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let mut req = log_small_json("request", req).await;
        if let Some(v) = &trace_header {
            req.headers_mut().insert(X_TRACE_ID, v.clone());
        }

        let mut response = next.run(req).await;

        if let Some(v) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, v);
        }
        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Small JSON request bodies are buffered and logged; anything else
/// (multipart uploads, audio, unknown sizes) passes through untouched.
async fn log_small_json(direction: &str, req: Request<Body>) -> Request<Body> {
    if !is_small_json(req.headers()) {
        return req;
    }
    let (parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };
    match std::str::from_utf8(&bytes) {
        Ok(text) => debug!("{direction} body: {}", redact(text)),
        Err(_) => debug!("{direction} body: [{} bytes, not utf-8]", bytes.len()),
    }
    Request::from_parts(parts, Body::from(bytes))
}

fn is_small_json(headers: &HeaderMap) -> bool {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    is_json && length.is_some_and(|n| n <= MAX_LOGGED_BODY)
}

/// Never log login passwords.
fn redact(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(mut v) => {
            if let Some(obj) = v.as_object_mut() {
                if obj.contains_key("password") {
                    obj.insert("password".into(), "***".into());
                }
            }
            v.to_string()
        }
        Err(_) => text.to_owned(),
    }
}
