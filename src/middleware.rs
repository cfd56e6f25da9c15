//! Logging/metrics middleware wrapping every handler (spec §4.H
//! Middleware): one layer capturing method, path, protocol, remote host,
//! status, and duration into the HTTP latency histogram.

use crate::router::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::time::Instant;

pub async fn track_request(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let proto = format!("{:?}", request.version());
    let from = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status().as_u16();

    state.metrics.observe_http(&method, &path, &proto, &from, status, duration);
    response
}
