use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tmm_config::{load_layered_yaml, report_unused_keys, sha256_hex, UnusedKeyPolicy};
use tmm_db::{CounterLedger, PgStore};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tmm")]
#[command(about = "Tool maintenance ledger CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands (TMM_DATABASE_URL)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> environment -> site...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate layered config: shape, secrets, unused keys
    ConfigCheck {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail on unused keys instead of listing them
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Print the digest form of a bearer token for TMM_API_TOKENS
    TokenHash {
        token: String,
    },

    /// Tool commands against the Postgres store
    Tool {
        #[command(subcommand)]
        cmd: ToolCmd,
    },

    /// Shot-counter ledger commands against the Postgres store
    Ledger {
        #[command(subcommand)]
        cmd: LedgerCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum ToolCmd {
    /// List tools with their running totals
    List,

    /// Print one tool as JSON
    Show {
        #[arg(long)]
        tool_id: Uuid,
    },

    /// Recompute running totals from the ledger
    Recompute {
        #[arg(long, conflicts_with = "all")]
        tool_id: Option<Uuid>,

        /// Every tool
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Print ledger entries in ledger order as JSON lines
    List {
        #[arg(long)]
        tool_id: Option<Uuid>,
    },

    /// Print the audit trail as JSON lines
    Audit {
        #[arg(long)]
        entity_id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tmm_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tmm_db::status(&pool).await?;
                    println!("db_ok={} has_tools_table={}", s.ok, s.has_tools_table);
                }
                DbCmd::Migrate => {
                    tmm_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck { paths, strict } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            let cfg = loaded.app_config()?;
            cfg.bind_addr()?;

            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = report_unused_keys(&loaded.config_json, policy)?;
            for key in &report.unused_leaf_pointers {
                println!("unused_key={key}");
            }
            println!("config_ok=true backend={:?}", cfg.store.backend);
        }

        Commands::TokenHash { token } => {
            if token.trim().is_empty() {
                bail!("token must not be empty");
            }
            println!("sha256:{}", sha256_hex(token.trim().as_bytes()));
        }

        Commands::Tool { cmd } => {
            let ledger = ledger_from_env().await?;
            match cmd {
                ToolCmd::List => {
                    for t in ledger.tools().await? {
                        println!(
                            "{} asset={} status={} initial={} current={}",
                            t.tool_id,
                            t.asset_number,
                            t.status.as_str(),
                            t.initial_shot_count,
                            t.current_shot_count
                        );
                    }
                }
                ToolCmd::Show { tool_id } => {
                    let t = ledger.tool(tool_id).await?;
                    println!("{}", serde_json::to_string_pretty(&t)?);
                }
                ToolCmd::Recompute { tool_id, all } => {
                    let ids: Vec<Uuid> = match (tool_id, all) {
                        (Some(id), false) => vec![id],
                        (None, true) => ledger.tools().await?.into_iter().map(|t| t.tool_id).collect(),
                        _ => bail!("pass --tool-id <uuid> or --all"),
                    };
                    for id in ids {
                        let t = ledger.recompute(id, None).await?;
                        println!("{} current={}", t.tool_id, t.current_shot_count);
                    }
                }
            }
        }

        Commands::Ledger { cmd } => {
            let ledger = ledger_from_env().await?;
            match cmd {
                LedgerCmd::List { tool_id } => {
                    for e in ledger.list(tool_id).await? {
                        println!("{}", serde_json::to_string(&e)?);
                    }
                }
                LedgerCmd::Audit { entity_id } => {
                    for ev in ledger.audit(entity_id).await? {
                        println!("{}", serde_json::to_string(&ev)?);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn ledger_from_env() -> Result<CounterLedger> {
    let pool = tmm_db::connect_from_env()
        .await
        .context("tool and ledger commands need the postgres store")?;
    Ok(CounterLedger::new(Arc::new(PgStore::new(pool))))
}
