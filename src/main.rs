// Speed Guard Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use speed_guard::config::GuardConfig;
use speed_guard::guard::burn::{self, LOAD_MARKER};
use speed_guard::guard::sampler::{self, Sampler, SystemSampler};
use speed_guard::guard::{signals, BurnProcessLauncher, SpeedGuard};
use speed_guard::server;
use speed_guard::state::GuardContext;

#[derive(Parser)]
#[command(name = "speed-guard")]
#[command(about = "Synthetic CPU load generator with a self-protecting guard loop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the guard loop and the control API
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "SPEED_GUARD_PORT", default_value_t = 5000)]
        port: u16,

        /// Start with the guard switched off
        #[arg(long)]
        disabled: bool,
    },

    /// Take one host sample and print it as JSON
    Sample,

    /// Internal: burn one core for a fixed time (spawned by the load controller)
    #[command(hide = true)]
    Burn {
        #[arg(long)]
        seconds: u64,

        #[arg(long, default_value = LOAD_MARKER)]
        tag: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,tower_http=warn");
    }
    tracing_subscriber::fmt::init();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        error!("[PANIC] at {}: {}", location, message);
    }));

    let args = Cli::parse();

    match args.command {
        Commands::Burn { seconds, tag } => {
            tracing::debug!(seconds, tag = %tag, "[LOAD] Burn worker starting");
            burn::burn_for(Duration::from_secs(seconds));
        }
        Commands::Sample => {
            let config = GuardConfig::from_env()?;
            let sample = tokio::task::spawn_blocking(move || {
                SystemSampler::new(config.sample_window).sample()
            })
            .await??;
            let host = sampler::host_snapshot();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "sample": sample,
                    "host": host,
                }))?
            );
        }
        Commands::Serve { port, disabled } => {
            let config = GuardConfig::from_env()?;
            info!(
                cpu = config.cpu_threshold,
                safety = config.safety_threshold,
                memory = config.memory_threshold,
                max_workers = config.max_workers,
                "--- SPEED GUARD v{} ---",
                env!("CARGO_PKG_VERSION")
            );

            let launcher = BurnProcessLauncher::current_exe()?;
            let shared_sampler = sampler::shared(SystemSampler::new(config.sample_window));
            let state = Arc::new(GuardContext::new(config, shared_sampler, Box::new(launcher)));
            if disabled {
                state.set_enabled(false);
            }

            let shutdown = CancellationToken::new();
            signals::install_signal_handler(shutdown.clone());

            let guard = SpeedGuard::spawn(state.clone(), shutdown.clone());

            let served = server::start_server(port, state, shutdown.clone()).await;
            shutdown.cancel();

            if let Err(e) = guard.await {
                error!("[GUARD] Guard task ended abnormally: {}", e);
            }
            served?;
            info!("Speed Guard stopped.");
        }
    }

    Ok(())
}
