use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use innkeep::cli::{Cli, CliError, Command};
use innkeep::config::Config;
use innkeep::engine::Engine;
use innkeep::notify::NotifyHub;
use innkeep::{cli, observability, reaper};

fn init_tracing(verbose: bool) {
    let default = if verbose { "innkeep=debug,info" } else { "innkeep=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: Cli) -> Result<(), CliError> {
    let mut config = Config::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::new(config.wal_path(), notify.clone())?.with_lock_timeout(config.lock_timeout);

    match args.command {
        Command::Op(op) => {
            println!("{}", cli::execute(&engine, op).await?);
            Ok(())
        }
        Command::Run => serve(Arc::new(engine), notify, &config).await,
    }
}

/// Long-running maintenance until SIGTERM or ctrl-c.
async fn serve(engine: Arc<Engine>, notify: Arc<NotifyHub>, config: &Config) -> Result<(), CliError> {
    observability::init(config.metrics_port)?;
    info!("innkeep running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  sweep every {:?}, compact after {} appends", config.sweep_interval, config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let reaper_task = tokio::spawn(reaper::run_reaper(engine.clone(), config.sweep_interval));
    let compactor_task = tokio::spawn(reaper::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.sweep_interval,
    ));
    let mut feed = notify.subscribe();
    let feed_task = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => debug!(?event, "committed"),
                Err(RecvError::Lagged(n)) => warn!("change feed lagged, {n} events skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, stopping background tasks");

    reaper_task.abort();
    compactor_task.abort();
    feed_task.abort();
    reaper::compact_if_due(&engine, config.compact_threshold).await;

    info!("innkeep stopped");
    Ok(())
}
