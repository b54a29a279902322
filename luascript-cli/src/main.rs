//! LuaScript command-line host
//!
//! Runs Lua script units against the embedding bridge, with an in-memory
//! document, and keeps the process alive until every timer, request and
//! socket the scripts started has finished.
//!
//! Usage:
//!   luascript app.lua
//!   luascript --config modules.json -e 'print(require("greet").hello("lua"))'
//!
//! Relative paths and URLs resolve against the current directory.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use luascript_bridge::{
    directory_url, Bridge, BridgeConfig, OutputSink, ScriptHost, ScriptUnit, StdoutSink,
    UnitOutcome,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "luascript")]
#[command(about = "Run Lua script units against the LuaScript bridge")]
struct Args {
    /// Script files, run in order
    scripts: Vec<PathBuf>,

    /// Inline code, run after the script files
    #[arg(short, long = "eval", value_name = "CODE")]
    eval: Vec<String>,

    /// Module configuration applied before every unit
    #[arg(short, long, value_name = "URL")]
    config: Option<String>,

    /// Settings file (defaults to ~/.luascript/luascript.toml)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Write script diagnostics to the output
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Persist storage to this SQLite file
    #[arg(long, value_name = "PATH")]
    storage: Option<PathBuf>,

    /// Network timeout for script requests
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Stop waiting for pending work after this many seconds
    #[arg(long, value_name = "SECS")]
    wait_secs: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "warn" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = settings(&args)?;
    tokio::task::LocalSet::new().run_until(run(args, config)).await
}

/// Settings file plus command-line overrides.
fn settings(args: &Args) -> Result<BridgeConfig> {
    let mut config = match &args.settings {
        Some(path) => BridgeConfig::load_from(path),
        None => BridgeConfig::load(),
    };
    if args.debug {
        config.runtime.debug = true;
    }
    if let Some(path) = &args.storage {
        config.storage.path = Some(path.clone());
    }
    if let Some(ms) = args.timeout_ms {
        config.network.timeout_ms = ms;
    }
    if config.runtime.page_url.is_none() {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        config.runtime.page_url = directory_url(&cwd);
    }
    debug!(?config, "effective settings");
    Ok(config)
}

fn units(args: &Args) -> Vec<ScriptUnit> {
    let labelled = args.scripts.len() + args.eval.len() > 1;
    let files = args.scripts.iter().map(|path| {
        let name = path.display().to_string();
        ScriptUnit::remote(name.clone(), name)
    });
    let inline = args
        .eval
        .iter()
        .enumerate()
        .map(|(index, code)| ScriptUnit::inline(format!("eval[{index}]"), code.as_str()));

    files
        .chain(inline)
        .map(|unit| {
            let sink: Rc<dyn OutputSink> = if labelled {
                Rc::new(StdoutSink::with_prefix(unit.name.clone()))
            } else {
                Rc::new(StdoutSink::new())
            };
            let unit = unit.with_sink(sink);
            match &args.config {
                Some(config) => unit.with_config(config.clone()),
                None => unit,
            }
        })
        .collect()
}

async fn run(args: Args, config: BridgeConfig) -> Result<()> {
    let units = units(&args);
    if units.is_empty() {
        warn!("Nothing to run; pass script files or --eval");
        return Ok(());
    }

    let bridge = Bridge::builder()
        .config(config)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to start the Lua bridge: {e}"))?;
    let host = ScriptHost::new(bridge);

    let mut failed = 0;
    for unit in &units {
        let outcome = host.run_unit(unit).await;
        if let Some(diagnostic) = outcome.diagnostic() {
            failed += 1;
            error!(unit = %unit.name, "{diagnostic}");
        }
        if matches!(outcome, UnitOutcome::Skipped(_)) {
            info!(unit = %unit.name, "unit skipped");
        }
    }

    let deadline = async {
        match args.wait_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = host.bridge().wait_idle() => debug!("all pending work finished"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = deadline => {
            warn!(pending = host.bridge().pending(), "Stopped waiting for pending work")
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} script units failed", units.len());
    }
    Ok(())
}
