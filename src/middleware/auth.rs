use axum::{
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::Deserialize;
use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};
use tracing::{error, warn};

// Global cache of verified ID tokens so we do not hit the identity provider
// on every request. Using OnceLock for thread-safe lazy initialization.
static TOKEN_CACHE: OnceLock<DashMap<String, Instant>> = OnceLock::new();

// Verified tokens can be reused for 5 minutes
const TOKEN_CACHE_DURATION: Duration = Duration::from_secs(300);

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

fn get_token_cache() -> &'static DashMap<String, Instant> {
    TOKEN_CACHE.get_or_init(DashMap::new)
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    email: Option<String>,
    email_verified: Option<String>,
}

/// Bearer-token verification against the identity provider. Every request to
/// the protected routes must carry a Firebase ID token in the Authorization
/// header; CORS preflights and the health check pass through.
pub async fn auth_middleware(
    headers: HeaderMap,
    method: Method,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if method == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path();
    if path == "/health" {
        return Ok(next.run(request).await);
    }

    // Skip verification in development mode
    if std::env::var("AUTH_BYPASS").unwrap_or_default() == "true" {
        return Ok(next.run(request).await);
    }

    let token = match extract_bearer(&headers) {
        Some(token) => token,
        None => {
            warn!("Missing bearer token on {} {}", method, path);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // Check if token is cached and still valid. Copy the timestamp out so the
    // shard lock is released before any remove.
    let now = Instant::now();
    let token_cache = get_token_cache();
    if let Some(cached_time) = token_cache.get(token).map(|t| *t) {
        if now.duration_since(cached_time) < TOKEN_CACHE_DURATION {
            return Ok(next.run(request).await);
        } else {
            token_cache.remove(token);
        }
    }

    match verify_id_token(token).await {
        Ok(true) => {
            token_cache.insert(token.to_string(), now);
            Ok(next.run(request).await)
        }
        Ok(false) => {
            warn!("ID token verification failed on {} {}", method, path);
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            error!("ID token verification error: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn verify_id_token(token: &str) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::new();

    let response = client
        .get(TOKENINFO_URL)
        .query(&[("id_token", token)])
        .send()
        .await?;

    // The tokeninfo endpoint answers 400 for expired or malformed tokens
    if !response.status().is_success() {
        return Ok(false);
    }

    let info: TokenInfoResponse = response.json().await?;

    Ok(info.email.is_some() && info.email_verified.as_deref() == Some("true"))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// Cleanup function to remove expired tokens from cache
#[allow(dead_code)]
pub fn cleanup_expired_tokens() {
    let now = Instant::now();
    get_token_cache().retain(|_, cached_time| now.duration_since(*cached_time) < TOKEN_CACHE_DURATION);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("abc123"));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }
}
