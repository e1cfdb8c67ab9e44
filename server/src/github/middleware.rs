use axum::{
    body::{self, Body},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::{self},
    response::IntoResponse,
};
use secrecy::SecretString;

use crate::error::AppError;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

#[derive(Clone)]
pub struct SignatureKey {
    pub secret: Option<SecretString>,
    pub max_body_bytes: usize,
}

pub async fn validate_request_signature(
    State(key): State<SignatureKey>,
    request: Request<Body>,
    next: middleware::Next,
) -> Result<impl IntoResponse, AppError> {
    let request = do_validate_signature(&key, request).await?;
    Ok(next.run(request).await)
}

fn extract_signature(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
}

// the trick is to take the request apart, buffer the body, do what you need to do, then put
// the request back together
async fn do_validate_signature(
    key: &SignatureKey,
    request: Request<Body>,
) -> Result<Request<Body>, AppError> {
    let Some(secret) = &key.secret else {
        return Ok(request);
    };

    let (parts, body) = request.into_parts();
    let body = body::to_bytes(body, key.max_body_bytes)
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;

    if pushlink::signature::verify(&body, extract_signature(&parts.headers), Some(secret)) {
        Ok(Request::from_parts(parts, Body::from(body)))
    } else {
        Err((StatusCode::UNAUTHORIZED, "Invalid signature").into())
    }
}
