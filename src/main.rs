use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use alert_dispatch::app::build_dispatcher;
use alert_dispatch::config::Config;
use alert_dispatch::server::{self, AppState};

#[derive(Parser)]
#[command(name = "alert-dispatch", version, about = "Curate, summarize and deliver alert stories")]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single dispatch cycle and exit
    Run,
    /// Serve the authenticated cron trigger
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()).context("could not load config") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_json);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "alert-dispatch failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("alert_dispatch=info,warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&config)
        .await
        .context("could not build the dispatcher")?;

    match command {
        Command::Run => {
            let summary = dispatcher.run_cycle().await.context("dispatch cycle failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Serve { bind } => {
            if config.cron_secret.is_none() {
                tracing::warn!("no cron_secret configured, every trigger request will be rejected");
            }
            let state = Arc::new(AppState::new(dispatcher, config.cron_secret.clone()));
            server::serve(state, bind)
                .await
                .with_context(|| format!("cron trigger on {bind} stopped"))?;
        }
    }
    Ok(())
}
