mod bootstrap;
mod server;

use aegis_dns_infrastructure::{Core, CoreHandle};
use aegis_dns_jobs::JobRunner;
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "aegis-dns", about = "Network-wide DNS filtering server", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "aegis-dns.toml")]
    config: PathBuf,

    /// Override the working directory for persisted state.
    #[arg(long)]
    data_dir: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging needs the config, the config loader wants to log; read the
    // file first and bring the subscriber up before anything else happens.
    let config = bootstrap::config::load(&args.config, args.data_dir.as_deref())?;
    bootstrap::logging::init(&config.logging, args.log_level.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "Starting aegis-dns");

    let binds: Vec<SocketAddr> = config
        .server
        .bind
        .iter()
        .map(|b| b.parse().with_context(|| format!("bad bind address: {b}")))
        .collect::<anyhow::Result<_>>()?;

    let core = Core::bootstrap(config).await.context("assembling core")?;
    let handle = Arc::new(CoreHandle::new(core));

    // Pull list contents that were never downloaded (first run) without
    // blocking startup.
    {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move {
            let store = handle.current().store.clone();
            let outcome = store.refresh(false).await;
            if outcome.attempted > 0 {
                info!(
                    attempted = outcome.attempted,
                    updated = outcome.updated,
                    "Initial filter refresh finished"
                );
            }
        });
    }

    let jobs = JobRunner::start(Arc::clone(&handle));

    let shutdown = CancellationToken::new();
    let mut listeners = Vec::new();
    for bind in binds {
        let handle = Arc::clone(&handle);
        let token = shutdown.clone();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = server::dns::serve(bind, handle, token).await {
                error!(bind = %bind, error = %e, "Listener failed");
            }
        }));
    }

    wait_for_signal().await;
    info!("Shutdown signal received");

    // Listeners stop accepting and drain; jobs run their final flushes.
    shutdown.cancel();
    for listener in listeners {
        let _ = listener.await;
    }
    jobs.stop().await;

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
