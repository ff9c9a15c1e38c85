//! Serve-mail command handler: run the mailbox message endpoint.

use anyhow::{Context, Result};
use crawl_fetch::{FetchConfig, Fetcher, mail_endpoint};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::cli::ServeMailArgs;

pub async fn run_serve_mail_command(args: &ServeMailArgs, config: FetchConfig) -> Result<()> {
    let fetcher = Fetcher::new(config).context("Failed to set up document fetcher")?;
    let disposal = fetcher.disposal().clone();
    let app = mail_endpoint::router(fetcher);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind mail endpoint to {}", args.bind))?;
    let local_addr = listener.local_addr().context("Failed to read bound address")?;
    info!(addr = %local_addr, "Mail endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Mail endpoint failed")?;

    let remaining = disposal.purge_deferred();
    if remaining > 0 {
        warn!(remaining, "temporary files could not be deleted");
    }
    info!("Mail endpoint stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
