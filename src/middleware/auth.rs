use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};
use tracing::warn;

use crate::errors::AppError;
use crate::models::{AuthUser, Role};
use crate::AppState;

// Verified-token cache: token -> (external subject, verified-at). Lets a
// client reuse its token without one introspection round-trip per request.
static TOKEN_CACHE: OnceLock<DashMap<String, (String, Instant)>> = OnceLock::new();

const TOKEN_CACHE_DURATION: Duration = Duration::from_secs(300);

fn get_token_cache() -> &'static DashMap<String, (String, Instant)> {
    TOKEN_CACHE.get_or_init(DashMap::new)
}

#[derive(Debug, Serialize)]
struct IntrospectionRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
}

/// The authenticated identity attached to every request that passes the
/// middleware. `user` is None until the first `/api/auth/sync` creates the
/// database row for this subject.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub subject: String,
    pub user: Option<AuthUser>,
}

/// Bearer-token authentication. Resolves the opaque token to an external
/// identity subject (introspection endpoint, or the raw token itself in
/// bypass mode), then maps the subject to a `users` row.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;

    let subject = resolve_subject(&state, &token).await?;

    let user = sqlx::query_as::<_, (i32, String)>(
        "SELECT id, role FROM users WHERE external_id = $1",
    )
    .bind(&subject)
    .fetch_optional(&state.db)
    .await?
    .map(|(id, role)| {
        let role = Role::parse(&role).ok_or_else(|| {
            AppError::Unauthorized(format!("User {id} has an unrecognized role"))
        })?;
        Ok::<_, AppError>(AuthUser { id, role })
    })
    .transpose()?;

    request.extensions_mut().insert(AuthIdentity { subject, user });

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed Authorization header".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AppError::Unauthorized(
            "Authorization header must be a bearer token".to_string(),
        )),
    }
}

async fn resolve_subject(state: &AppState, token: &str) -> Result<String, AppError> {
    // Development mode: the token is the subject.
    if state.config.auth_bypass {
        return Ok(token.to_string());
    }

    let now = Instant::now();
    let cache = get_token_cache();
    if let Some(entry) = cache.get(token) {
        let (subject, verified_at) = entry.value();
        if now.duration_since(*verified_at) < TOKEN_CACHE_DURATION {
            return Ok(subject.clone());
        }
        drop(entry);
        cache.remove(token);
    }

    let url = state
        .config
        .auth_introspection_url
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("Identity provider not configured".to_string()))?;

    let subject = introspect_token(url, token).await?;
    cache.insert(token.to_string(), (subject.clone(), now));
    Ok(subject)
}

async fn introspect_token(url: &str, token: &str) -> Result<String, AppError> {
    let client = reqwest::Client::new();

    let response = client
        .post(url)
        .json(&IntrospectionRequest { token })
        .send()
        .await
        .map_err(|e| {
            warn!("Identity introspection request failed: {}", e);
            AppError::Unauthorized("Token verification unavailable".to_string())
        })?;

    if !response.status().is_success() {
        warn!("Identity introspection returned {}", response.status());
        return Err(AppError::Unauthorized("Token verification failed".to_string()));
    }

    let body: IntrospectionResponse = response.json().await.map_err(|e| {
        warn!("Identity introspection returned malformed body: {}", e);
        AppError::Unauthorized("Token verification failed".to_string())
    })?;

    match (body.active, body.sub) {
        (true, Some(sub)) if !sub.is_empty() => Ok(sub),
        _ => Err(AppError::Unauthorized("Token is not active".to_string())),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<AuthIdentity>()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

        identity.user.clone().ok_or_else(|| {
            AppError::Unauthorized(
                "No user record for this identity; call /api/auth/sync first".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        let headers = headers_with("Bearer abc123");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        assert!(matches!(
            extract_bearer_token(&HeaderMap::new()),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn non_bearer_schemes_are_rejected() {
        for value in ["Basic dXNlcjpwYXNz", "abc123", "Bearer ", "Bearer    "] {
            assert!(
                extract_bearer_token(&headers_with(value)).is_err(),
                "accepted {value:?}"
            );
        }
    }
}
