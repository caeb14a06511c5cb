//! amsctx CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load a [`FactoryConfig`] from `--config` (JSON)
//!    and apply the `--endpoint` / `--service-version` overrides.
//! 2. **Wire observability**: configure `tracing-subscriber` with an
//!    `EnvFilter` (`RUST_LOG`, default `info`) and, with `--log-json`, a JSON
//!    formatter. Logs go to stderr so stdout carries only command output.
//! 3. **Construct infrastructure**: the `reqwest` transport, the standard
//!    decorator chain and the session that owns every materialized entity,
//!    injected into a [`ContextFactory`].
//! 4. **Run the command**: `resolve` prints the endpoint; `query` prints each
//!    record of an entity set as one JSON line.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use context::config::FactoryConfig;
use context::{
    ContextFactory, Entity, EntityKey, EntitySetName, MaterializedEntity, OwnerAware,
    OwnerHandle, ServiceVersion, Timestamp,
};
use decorators::{media_services_chain, AccessToken, StaticTokenSource};
use http_transport::ReqwestTransport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "amsctx", version, about = "Resolve and query a media data service")]
struct Cli {
    /// JSON factory configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Logical service URI, overriding the configuration.
    #[arg(long, value_name = "URI")]
    endpoint: Option<String>,

    /// `x-ms-version` value, overriding the configuration.
    #[arg(long, value_name = "MAJOR.MINOR")]
    service_version: Option<ServiceVersion>,

    /// Bearer access token.
    #[arg(long, env = "AMS_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved service endpoint.
    Resolve,
    /// Print every record of an entity set as JSON lines.
    Query {
        /// Entity set name, e.g. `Assets`.
        entity_set: String,
    },
}

// ---------------------------------------------------------------------------
// Session and records
// ---------------------------------------------------------------------------

/// The owning context handed to every materialized record.
#[derive(Debug)]
struct Session {
    started: Timestamp,
}

/// An entity of any shape; properties are kept verbatim.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Record {
    #[serde(flatten)]
    properties: Map<String, Value>,
    #[serde(skip)]
    owner: OwnerHandle,
}

impl OwnerAware for Record {
    fn init_with_owner(&mut self, owner: &OwnerHandle) {
        self.owner = owner.clone();
    }
}

impl MaterializedEntity for Record {
    fn owner_aware(&mut self) -> Option<&mut dyn OwnerAware> {
        Some(self)
    }
}

impl Entity for Record {
    fn key(&self) -> Option<EntityKey> {
        self.properties
            .get("Id")
            .and_then(Value::as_str)
            .and_then(EntityKey::new)
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<FactoryConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            FactoryConfig::from_json(&text)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => FactoryConfig::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.service_uri = endpoint.clone();
    }
    if let Some(version) = cli.service_version {
        config.service_version = version;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli)?;
    let transport = ReqwestTransport::with_timeout_secs(config.request_timeout_secs)?;
    let tokens = Arc::new(StaticTokenSource::new(AccessToken::new(cli.token.clone())));
    let session = Arc::new(Session {
        started: Timestamp::now(),
    });

    let factory = ContextFactory::from_config(
        &config,
        media_services_chain(tokens, config.service_version),
        OwnerHandle::new(&session),
        Arc::new(transport),
    )
    .context("failed to resolve the service endpoint")?;

    match &cli.command {
        Command::Resolve => println!("{}", factory.endpoint()),
        Command::Query { entity_set } => {
            let set = EntitySetName::new(entity_set.as_str())
                .context("entity set name must not be empty")?;
            let mut ctx = factory.create_context();
            let records: Vec<Record> = ctx.query(&set)?;
            for record in &records {
                debug!(owned = record.owner.upgrade::<Session>().is_some(), "record");
                println!("{}", serde_json::to_string(record)?);
            }
            info!(
                context_id = %ctx.id(),
                entity_set = %set,
                count = records.len(),
                session_started = %session.started,
                "query complete"
            );
        }
    }
    Ok(())
}
