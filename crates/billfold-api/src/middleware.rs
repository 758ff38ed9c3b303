use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use tokio::sync::RwLock;
use tracing::{info, warn};

use billfold_types::api::Claims;

use crate::AppState;

const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Cached key set of the external auth provider. A single entry refreshed on
/// a one-hour TTL, read-mostly, behind a readers/writer lock. Owned by the
/// auth middleware rather than living in a global.
pub struct JwksCache {
    url: String,
    http: reqwest::Client,
    entry: RwLock<Option<CachedKeys>>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

impl JwksCache {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
            entry: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> anyhow::Result<JwkSet> {
        {
            let guard = self.entry.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let mut guard = self.entry.write().await;
        // another task may have refreshed while we waited for the write lock
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < JWKS_TTL {
                return Ok(cached.keys.clone());
            }
        }

        let keys: JwkSet = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!("Fetched JWKS ({} keys)", keys.keys.len());

        *guard = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

/// Extract and validate the bearer token against the provider's JWKS,
/// stashing the verified subject claims in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = decode_header(token).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let kid = header.kid.ok_or(StatusCode::UNAUTHORIZED)?;

    let keys = state.jwks.get().await.map_err(|e| {
        warn!("JWKS fetch failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?;
    let jwk = keys.find(&kid).ok_or(StatusCode::UNAUTHORIZED)?;
    let key = DecodingKey::from_jwk(jwk).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;

    let token_data =
        decode::<Claims>(token, &key, &validation).map_err(|_| StatusCode::UNAUTHORIZED)?;
    if token_data.claims.sub.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
