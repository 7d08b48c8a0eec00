//! eck-replicator entry point.
//!
//! Runs one plugin call (`init`, `sync`, `status`) against the cluster of
//! the current kubeconfig context, or a whole two-phase replication
//! (`replicate`) between two contexts.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ddm_plugin_common::{keys, DataSyncPlugin, Orchestrator, PluginParams, TokioClock};
use eck_replicator::{ElasticsearchPlugin, KubeCluster, PluginConfig};
use tracing::{error, info};

/// Elasticsearch cross-cluster replication through snapshots
#[derive(Parser, Debug)]
#[command(name = "eck-replicator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig file (defaults to in-cluster or $KUBECONFIG)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context
    #[arg(long, global = true)]
    context: Option<String>,

    /// Plugin configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default log level if RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Control object coordinates.
#[derive(Args, Debug)]
struct EngineArgs {
    /// MoveEngine name
    #[arg(long)]
    engine_name: String,

    /// MoveEngine namespace
    #[arg(long, default_value = "default")]
    engine_namespace: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the repository plugin and register the snapshot repository
    Init {
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Trigger a snapshot (active) or a restore (standby)
    Sync {
        #[command(flatten)]
        engine: EngineArgs,

        /// Snapshot name
        #[arg(long)]
        snapshot_name: String,
    },
    /// Report the status of the last snapshot or restore
    Status {
        #[command(flatten)]
        engine: EngineArgs,

        /// Snapshot name
        #[arg(long)]
        snapshot_name: String,
    },
    /// Snapshot the active cluster and restore it on the standby cluster
    Replicate {
        #[command(flatten)]
        engine: EngineArgs,

        /// Kubeconfig context of the active cluster
        #[arg(long)]
        src_context: String,

        /// Kubeconfig context of the standby cluster
        #[arg(long)]
        dst_context: String,

        /// Snapshot name (defaults to snapshot-<unix seconds>)
        #[arg(long)]
        snapshot_name: Option<String>,
    },
}

/// Initialize tracing/logging.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_target(true).json())
            .init(),
    }
}

fn params(engine: &EngineArgs, snapshot_name: Option<&str>) -> PluginParams {
    let mut params = PluginParams::new();
    params.insert(keys::ENGINE_NAME.to_string(), engine.engine_name.clone());
    params.insert(
        keys::ENGINE_NAMESPACE.to_string(),
        engine.engine_namespace.clone(),
    );
    if let Some(snapshot) = snapshot_name {
        params.insert(keys::SNAPSHOT_NAME.to_string(), snapshot.to_string());
    }
    params
}

async fn build_plugin(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
    config: Arc<PluginConfig>,
) -> Result<ElasticsearchPlugin> {
    let cluster = KubeCluster::connect(kubeconfig, context)
        .await
        .with_context(|| format!("connecting to context {}", context.unwrap_or("<default>")))?;
    Ok(ElasticsearchPlugin::with_default_clients(
        Arc::new(cluster),
        config,
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PluginConfig::load(path)?,
        None => PluginConfig::default(),
    };
    let config = Arc::new(config);
    let kubeconfig = cli.kubeconfig.as_deref();
    let context = cli.context.as_deref();

    match cli.command {
        Command::Init { engine } => {
            let plugin = build_plugin(kubeconfig, context, config).await?;
            plugin.init(&params(&engine, None)).await?;
            info!(engine = %engine.engine_name, "Init succeeded");
        }
        Command::Sync {
            engine,
            snapshot_name,
        } => {
            let plugin = build_plugin(kubeconfig, context, config).await?;
            plugin
                .sync(&params(&engine, Some(&snapshot_name)), &[])
                .await?;
            info!(snapshot = %snapshot_name, "Sync triggered");
        }
        Command::Status {
            engine,
            snapshot_name,
        } => {
            let plugin = build_plugin(kubeconfig, context, config).await?;
            match plugin.status(&params(&engine, Some(&snapshot_name))).await {
                Ok(status) => println!("{status}"),
                Err(e) => {
                    println!("{}", e.status);
                    return Err(e.into());
                }
            }
        }
        Command::Replicate {
            engine,
            src_context,
            dst_context,
            snapshot_name,
        } => {
            let snapshot_name = snapshot_name
                .unwrap_or_else(|| format!("snapshot-{}", chrono::Utc::now().timestamp()));
            let active = build_plugin(kubeconfig, Some(&src_context), config.clone()).await?;
            let standby = build_plugin(kubeconfig, Some(&dst_context), config.clone()).await?;

            let orchestrator =
                Orchestrator::new(Arc::new(TokioClock), config.status_poll.policy());
            info!(snapshot = %snapshot_name, %src_context, %dst_context, "Starting replication");
            orchestrator
                .replicate(&active, &standby, &params(&engine, Some(&snapshot_name)))
                .await?;
            println!("{snapshot_name}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
