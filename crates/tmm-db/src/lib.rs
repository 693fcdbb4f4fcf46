//! tmm-db
//!
//! Persistence for tools and their shot-counter ledgers.
//!
//! - [`LedgerStore`] is the storage boundary; [`MemStore`] and [`PgStore`]
//!   implement it with the same atomicity and ordering guarantees.
//! - [`CounterLedger`] is the service every caller goes through.
//! - Connection and migration helpers for the Postgres backend live here.

mod error;
mod ledger;
mod mem;
mod pg;
mod store;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub use error::StoreError;
pub use ledger::{CounterLedger, Submission};
pub use mem::MemStore;
pub use pg::PgStore;
pub use store::{LedgerStore, LedgerWrite, Recomputed};

pub const ENV_DB_URL: &str = "TMM_DATABASE_URL";

/// Connect to Postgres using TMM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'tools'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_tools_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_tools_table: bool,
}
