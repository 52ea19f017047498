use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use investigation_orchestrator::{
    capability::{CapabilityRegistry, OracleCapability, DOMAIN_ANALYSIS, OCR, WEB_INTELLIGENCE},
    config::{Config, LogFormat},
    oracle::{LangbaseOracle, Oracle, OracleGateway, TokenBucket},
    orchestrator::{Orchestrator, OrchestratorSettings},
    planner::{EvidenceItem, EvidenceKind, InvestigationType, Priority},
    storage::{SqliteStorage, Storage},
};

/// Multi-oracle investigation orchestrator
#[derive(Debug, Parser)]
#[command(name = "investigation-orchestrator", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an investigation to completion and print its snapshot as JSON
    Investigate {
        /// Investigation identifier (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// phishing, scam, fraud, impersonation or general
        #[arg(long = "type", default_value = "general")]
        investigation_type: InvestigationType,
        /// low, normal, high or critical
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Evidence as kind=content, e.g. url=https://example.com (repeatable)
        #[arg(long = "item", required = true, value_parser = parse_item)]
        items: Vec<EvidenceItem>,
    },
    /// Print a stored investigation snapshot as JSON
    Show {
        /// Investigation identifier
        id: String,
    },
    /// List stored investigations
    List,
}

fn parse_item(raw: &str) -> Result<EvidenceItem, String> {
    let (kind, content) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected kind=content, got '{}'", raw))?;
    let kind: EvidenceKind = kind.parse()?;
    Ok(EvidenceItem::new(kind, content))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Investigation orchestrator starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Investigate {
            id,
            investigation_type,
            priority,
            items,
        } => {
            let orchestrator = build_orchestrator(&config, Arc::clone(&storage) as Arc<dyn Storage>)?;
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            orchestrator
                .start_investigation(&id, items, investigation_type, priority)
                .await
                .context("failed to start investigation")?;

            let snapshot = tokio::select! {
                snapshot = orchestrator.wait(&id) => snapshot?,
                _ = tokio::signal::ctrl_c() => {
                    info!(investigation_id = %id, "Interrupted, cancelling investigation");
                    if let Err(e) = orchestrator.cancel(&id).await {
                        // Already finished and moved to storage.
                        warn!(investigation_id = %id, error = %e, "Cancel had nothing to stop");
                    }
                    orchestrator.wait(&id).await?
                }
            };

            info!(metrics = ?orchestrator.metrics().await, "Investigation finished");
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Show { id } => {
            let snapshot = storage
                .get_snapshot(&id)
                .await?
                .with_context(|| format!("investigation {} not found", id))?;
            let decisions = storage.get_decisions(&id).await?;
            let report = serde_json::json!({ "snapshot": snapshot, "decisions": decisions });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::List => {
            for summary in storage.list_investigations().await? {
                println!(
                    "{}\t{}\t{:.2}\t{}\t{}",
                    summary.id,
                    summary.phase,
                    summary.confidence_score,
                    summary.node_count,
                    summary.updated_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}

/// Wire the oracle panel, capabilities and planner from configuration.
fn build_orchestrator(config: &Config, storage: Arc<dyn Storage>) -> anyhow::Result<Orchestrator> {
    let mut oracles: Vec<Arc<dyn Oracle>> = Vec::with_capacity(config.oracles.pipes.len());
    for pipe in &config.oracles.pipes {
        let oracle = LangbaseOracle::new(&config.langbase, pipe.clone(), config.request.clone())
            .with_context(|| format!("failed to create oracle for pipe {}", pipe))?;
        oracles.push(Arc::new(oracle));
    }
    info!(
        base_url = %config.langbase.base_url,
        oracles = ?config.oracles.pipes,
        "Oracle panel initialized"
    );

    let gateway = OracleGateway::new(
        oracles,
        Arc::new(TokenBucket::from_config(&config.rate_limit)),
        Duration::from_millis(config.oracles.timeout_ms),
    );

    // No dedicated scrapers or OCR engines are linked in; the panel answers.
    let panel = Arc::new(OracleCapability::new(gateway.clone()));
    let capabilities = CapabilityRegistry::new()
        .register(WEB_INTELLIGENCE, panel.clone())
        .register(DOMAIN_ANALYSIS, panel.clone())
        .register(OCR, panel);

    Ok(Orchestrator::new(
        gateway,
        capabilities,
        Some(storage),
        OrchestratorSettings::from_config(config),
    ))
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
