use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use luashim_host::{CancellationToken, HostConfig, ScriptHost, TracingSink};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (.lua or .yaml); defaults to the user config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Module to require before the script runs (repeatable)
    #[arg(long = "module", global = true)]
    modules: Vec<String>,

    /// Resolve `require` from this directory
    #[arg(long, global = true)]
    module_root: Option<PathBuf>,

    /// Cancel the run after this many seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a script file
    Run { file: PathBuf },
    /// Run inline source
    Eval { source: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => HostConfig::load(path).with_context(|| format!("loading config {path:?}"))?,
        None => HostConfig::load_default().context("loading default config")?,
    };
    cfg.modules.extend(cli.modules);
    if let Some(root) = cli.module_root {
        cfg.module_root = Some(root);
    }
    let host = ScriptHost::from_config(&cfg, Arc::new(TracingSink));

    let cancel = CancellationToken::new();
    if let Some(secs) = cli.timeout {
        let after = Duration::try_from_secs_f64(secs).context("invalid --timeout")?;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracing::warn!("timeout reached, cancelling run");
            cancel.cancel();
        });
    }

    let result = match cli.command {
        Cmd::Run { file } => {
            let what = format!("running {}", file.display());
            host.run_file(&file, None, cancel).await.context(what)
        }
        Cmd::Eval { source } => host
            .run_string(source, None, cancel)
            .await
            .context("running inline source"),
    };
    host.shutdown();
    result
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "luashim=info,luashim_host=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    Ok(())
}
