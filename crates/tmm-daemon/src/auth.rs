//! Caller identity.
//!
//! Token issuance lives elsewhere. This service only resolves a bearer
//! credential to a user id through an [`IdentityResolver`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tmm_config::{sha256_hex, ApiToken};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, bearer: &str) -> Option<CallerIdentity>;
}

/// Fixed token table loaded at startup. Only SHA-256 digests are held.
pub struct StaticTokenResolver {
    tokens: Vec<ApiToken>,
}

impl StaticTokenResolver {
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, bearer: &str) -> Option<CallerIdentity> {
        let presented = sha256_hex(bearer.as_bytes());

        // Visit every entry so timing does not reveal which one matched.
        let mut found = None;
        for t in &self.tokens {
            let hit: bool = presented
                .as_bytes()
                .ct_eq(t.token_sha256.as_bytes())
                .into();
            if hit && found.is_none() {
                found = Some(CallerIdentity { user_id: t.user_id });
            }
        }
        found
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Rejects the request with 401 unless it carries a resolvable bearer token.
pub async fn require_caller(
    State(st): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(bearer) = bearer_token(req.headers()).map(str::to_owned) else {
        return ApiError::Unauthorized.into_response();
    };

    match st.identity.resolve(&bearer).await {
        Some(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        None => ApiError::Unauthorized.into_response(),
    }
}
