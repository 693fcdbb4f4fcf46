//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (`store.database_url_env`,
//!   `auth.tokens_env`).
//! - Callers invoke [`resolve_secrets`] once at startup and pass the
//!   returned [`ResolvedSecrets`] into constructors.
//! - `Debug` output redacts values. Errors name the env var, never its value.
//!
//! # Token format
//! `auth.tokens_env` holds comma separated `user_id:token` pairs. A token may
//! be given pre-hashed as `sha256:<hex>` so the plaintext never has to live in
//! the service environment. Only the SHA-256 digest is kept in memory.

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use crate::{sha256_hex, AppConfig, StoreBackend};

/// One accepted bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub user_id: Uuid,
    /// Lowercase hex SHA-256 of the bearer token.
    pub token_sha256: String,
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiToken")
            .field("user_id", &self.user_id)
            .field("token_sha256", &"<REDACTED>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Postgres URL. `None` when the backend is in-memory.
    pub database_url: Option<String>,
    pub api_tokens: Vec<ApiToken>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .field("api_tokens", &self.api_tokens.len())
            .finish()
    }
}

/// Resolve secrets from the process environment.
pub fn resolve_secrets(cfg: &AppConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_from(cfg, |name| std::env::var(name).ok())
}

/// Resolve secrets through an arbitrary lookup (tests pass a map).
///
/// # Errors
/// - postgres backend and the database URL variable is unset or blank
/// - the token variable is unset, blank, or malformed
pub fn resolve_secrets_from<F>(cfg: &AppConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let database_url = match cfg.store.backend {
        StoreBackend::Memory => None,
        StoreBackend::Postgres => match non_blank(&cfg.store.database_url_env) {
            Some(url) => Some(url),
            None => bail!(
                "SECRETS_MISSING backend=postgres: required env var '{}' (database url) is not set or empty",
                cfg.store.database_url_env
            ),
        },
    };

    let Some(raw_tokens) = non_blank(&cfg.auth.tokens_env) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (api tokens) is not set or empty",
            cfg.auth.tokens_env
        );
    };
    let api_tokens = parse_api_tokens(&raw_tokens)
        .with_context(|| format!("invalid token list in env var '{}'", cfg.auth.tokens_env))?;

    Ok(ResolvedSecrets {
        database_url,
        api_tokens,
    })
}

/// Parse `user_id:token[,user_id:token...]`.
pub fn parse_api_tokens(raw: &str) -> Result<Vec<ApiToken>> {
    let mut out = Vec::new();
    for (idx, pair) in raw.split(',').map(str::trim).enumerate() {
        if pair.is_empty() {
            continue;
        }
        let Some((user, token)) = pair.split_once(':') else {
            bail!("token entry #{idx} is not 'user_id:token'");
        };
        let user_id = Uuid::parse_str(user.trim())
            .with_context(|| format!("token entry #{idx}: user_id is not a uuid"))?;
        let token = token.trim();
        if token.is_empty() {
            bail!("token entry #{idx}: empty token");
        }

        let token_sha256 = match token.strip_prefix("sha256:") {
            Some(digest) => {
                let digest = digest.to_ascii_lowercase();
                if digest.len() != 64 || hex::decode(&digest).is_err() {
                    bail!("token entry #{idx}: sha256 digest must be 64 hex chars");
                }
                digest
            }
            None => sha256_hex(token.as_bytes()),
        };

        out.push(ApiToken {
            user_id,
            token_sha256,
        });
    }

    if out.is_empty() {
        bail!("no tokens configured");
    }
    Ok(out)
}
