//! Node authentication middleware

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::{header::AUTHORIZATION, HeaderMap},
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::{AppState, AppError};

/// Header collectors put their node key in
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Authenticated node credential
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub credential: String,
}

/// Middleware: Require a node credential
pub async fn require_node_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = extract_credential(req.headers());
    let credential = match state.ingestion.authenticate(presented.as_deref()) {
        Ok(credential) => credential.to_string(),
        Err(e) => {
            tracing::warn!(path = %req.uri().path(), "Rejected node request: missing or invalid credential");
            return Err(e);
        }
    };

    req.extensions_mut().insert(NodeContext { credential });

    Ok(next.run(req).await)
}

/// Credential from `X-API-Key`, else `Authorization` with an optional
/// `Bearer ` prefix. Blank values count as absent.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = header_value(headers, API_KEY_HEADER) {
        return Some(key.to_string());
    }

    let auth = header_value(headers, AUTHORIZATION.as_str())?;
    let token = match auth.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => auth,
    };
    (!token.is_empty()).then(|| token.to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for NodeContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<NodeContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
