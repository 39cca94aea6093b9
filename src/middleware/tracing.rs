//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Logs one line per request with method, path, status, latency and the
/// proxied client address. Severity follows the status class so 5xx lines
/// stand out in the feed.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Behind the tunnel the peer address is the proxy; the forwarded
    // headers carry the real caller.
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        });

    let start = Instant::now();
    let response = next.run(request).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::error!(%method, %path, status = %status.as_u16(), %latency_ms, client_ip = ?client_ip, "Request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, status = %status.as_u16(), %latency_ms, client_ip = ?client_ip, "Request rejected");
    } else {
        tracing::info!(%method, %path, status = %status.as_u16(), %latency_ms, client_ip = ?client_ip, "Request handled");
    }

    response
}
