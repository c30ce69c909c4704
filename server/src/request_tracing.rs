use axum::body::Body;
use axum::http::Request;
use tracing::Span;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Span constructor for the router's TraceLayer; tags every request log
/// line with the generated request id.
pub fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
