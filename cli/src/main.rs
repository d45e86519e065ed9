//! auditchain: tamper-evident audit event store CLI.
//!
//! Usage:
//!   auditchain --config auditchain.toml ingest events.json
//!   auditchain --db events.db verify --all
//!   auditchain --db events.db check 5f0c7c9e-3c1f-4c50-9a43-7e0f6f0d2a11
//!   auditchain --db events.db list --tenant acme --action delete
//!   auditchain --db events.db stats --tenant acme --by actor

mod commands;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use auditchain_config::{LedgerConfig, StorageBackend};
use auditchain_contracts::{
    error::LedgerResult,
    event::{ActionType, ResourceType},
    query::{CountDimension, TimeRange, DEFAULT_PAGE_LIMIT},
};

use crate::commands::ListFilter;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Append-only, per-tenant SHA-256 hash chains of audit events.
#[derive(Parser)]
#[command(
    name = "auditchain",
    about = "Tamper-evident multi-tenant audit event store",
    long_about = "Stores audit events in per-tenant SHA-256 hash chains and verifies\n\
                  that no stored event was altered, removed, or reordered."
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file; overrides the configured storage backend.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append the events in a JSON file (one submission or an array).
    Ingest { file: PathBuf },
    /// Verify tenant chains end to end.
    Verify {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        tenant: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Recompute one event's hash and compare it with the stored hash.
    Check { id: Uuid },
    /// Print a tenant's chain head.
    Head {
        #[arg(long)]
        tenant: String,
    },
    /// Print one event, looked up by id or by hash.
    Show { key: String },
    /// List a tenant's events, newest first.
    List {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        action: Option<ActionType>,
        #[arg(long)]
        resource_type: Option<ResourceType>,
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
    /// Count a tenant's events grouped by action, resource type, or actor.
    Stats {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "action")]
        by: CountDimension,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Delete a tenant's whole chain (compliance purge).
    Purge {
        #[arg(long)]
        tenant: String,
        /// Required; the purge cannot be undone.
        #[arg(long)]
        yes: bool,
    },
}

/// Inclusive RFC 3339 time window.
#[derive(Args)]
struct RangeArgs {
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

impl From<RangeArgs> for TimeRange {
    fn from(args: RangeArgs) -> Self {
        TimeRange {
            from: args.from,
            to: args.to,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("auditchain: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.filter))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    match run(cli.command, &config) {
        Ok((output, success)) => {
            println!("{}", output);
            if !success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("auditchain: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> LedgerResult<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = Some(db.clone());
    }
    config.validate()?;
    Ok(config)
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

fn run(command: Command, config: &LedgerConfig) -> LedgerResult<(String, bool)> {
    let store = commands::open_store(config)?;

    let output = match command {
        Command::Ingest { file } => commands::ingest(&store, &file)?,
        Command::Verify { tenant, .. } => return commands::verify(&store, tenant.as_deref()),
        Command::Check { id } => commands::check(&store, id)?,
        Command::Head { tenant } => commands::head(&store, &tenant)?,
        Command::Show { key } => commands::show(&store, &key)?,
        Command::List {
            tenant,
            actor,
            action,
            resource_type,
            range,
            offset,
            limit,
        } => commands::list(
            &store,
            &tenant,
            ListFilter {
                actor,
                action,
                resource_type,
                from: range.from,
                to: range.to,
                offset,
                limit,
            },
        )?,
        Command::Stats { tenant, by, range } => {
            commands::stats(&store, &tenant, by, range.into())?
        }
        Command::Purge { tenant, yes } => commands::purge(&store, &tenant, yes)?,
    };
    Ok((output, true))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_needs_tenant_or_all() {
        assert!(Cli::try_parse_from(["auditchain", "verify"]).is_err());
        assert!(Cli::try_parse_from(["auditchain", "verify", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["auditchain", "verify", "--tenant", "acme"]).is_ok());
        assert!(
            Cli::try_parse_from(["auditchain", "verify", "--tenant", "acme", "--all"]).is_err()
        );
    }

    #[test]
    fn test_enum_arguments_parse_case_insensitively() {
        let cli = Cli::try_parse_from([
            "auditchain", "list", "--tenant", "acme", "--action", "delete",
            "--resource-type", "Document", "--from", "2025-01-01T00:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Command::List {
                action,
                resource_type,
                range,
                limit,
                ..
            } => {
                assert_eq!(action, Some(ActionType::Delete));
                assert_eq!(resource_type, Some(ResourceType::Document));
                assert!(range.from.is_some());
                assert_eq!(limit, DEFAULT_PAGE_LIMIT);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_db_flag_selects_sqlite() {
        let cli = Cli::try_parse_from(["auditchain", "--db", "x.db", "head", "--tenant", "t"])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, Some(PathBuf::from("x.db")));
    }
}
