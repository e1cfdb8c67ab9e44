use crate::error::AppError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware,
    response::Response,
};
use ipnet::IpNet;
use std::net::SocketAddr;

/// Rejects callers outside the configured ranges. An empty list rejects everyone.
pub async fn allowed_ips(
    State(allowed): State<Vec<IpNet>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: middleware::Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_canonical();
    if !allowed.iter().any(|net| net.contains(&ip)) {
        tracing::info!("Denying request from IP: {addr}");
        return Err((StatusCode::FORBIDDEN, "Forbidden").into());
    }

    Ok(next.run(request).await)
}
