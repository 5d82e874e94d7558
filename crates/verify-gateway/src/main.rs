//! # Verification Gateway
//!
//! Startup sequence:
//!
//! 1. Parse the command line (`--config`, `VG_CONFIG`, or `gateway.json`)
//! 2. Initialize logging (`VG_LOG_LEVEL` / `RUST_LOG`, `VG_JSON_LOGS`), load configuration
//! 3. Build the store pool lazily, the notifier and the audit sink
//! 4. Serve until Ctrl-C, then shut down gracefully

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use verify_gateway::domain::config::DEFAULT_CONFIG_PATH;
use verify_gateway::{
    AuditSink, GatewayConfig, MySqlVerificationStore, NoopAuditSink, TcpNotifier,
    VerificationGatewayService, WebhookAuditSink,
};

/// Initialize logging from the environment.
fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::try_from_env("VG_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;

    let json = std::env::var("VG_JSON_LOGS")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if json {
        builder
            .json()
            .with_thread_ids(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

/// Verification gateway: checks one-time codes and hands them to the local worker
#[derive(Parser, Debug)]
#[command(name = "verify-gateway", version)]
struct Args {
    /// Path of the JSON configuration file
    #[arg(long, env = "VG_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn audit_sink(config: &GatewayConfig) -> Result<Arc<dyn AuditSink>> {
    match &config.audit.webhook_url {
        Some(url) => {
            let sink = WebhookAuditSink::new(url.clone(), config.audit.timeout)
                .context("building audit webhook client")?;
            info!("Audit webhook enabled");
            Ok(Arc::new(sink))
        }
        None => {
            warn!("No audit webhook configured, audit events are dropped");
            Ok(Arc::new(NoopAuditSink))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let path = args.config;
    let config = GatewayConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    info!(
        config = %path.display(),
        store = %format!("{}:{}/{}", config.store.host, config.store.port, config.store.database),
        downstream = %format!("{}:{}", config.downstream.host, config.downstream.port),
        version = verify_gateway::VERSION,
        "Configuration loaded"
    );

    // Lazy pool: the gateway comes up even if the store is down.
    let store = Arc::new(MySqlVerificationStore::connect_lazy(&config.store));
    let notifier = Arc::new(TcpNotifier::new(&config.downstream));
    let audit = audit_sink(&config)?;

    let service = Arc::new(VerificationGatewayService::new(
        config,
        store.clone(),
        notifier,
        audit,
    )?);

    let mut server = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.start().await })
    };

    tokio::select! {
        // Server exited on its own: bind failure or serve error.
        result = &mut server => {
            result.context("server task panicked")??;
            return Ok(());
        }
        result = tokio::signal::ctrl_c() => {
            result.context("listening for Ctrl-C")?;
            info!("Received shutdown signal");
            service.shutdown();
        }
    }

    server.await.context("server task panicked")??;
    store.close().await;
    info!("Shutdown complete");
    Ok(())
}
