use std::path::Path;

use d_txn::Error;
use d_txn::NodeBuilder;
use d_txn::Result;
use d_txn::SystemError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Build Node
    let builder = NodeBuilder::new(None, graceful_rx.clone())?;

    // Initializing Logs
    let cluster = &builder.config().cluster;
    let _guard = init_observability(cluster.node_id, &cluster.log_dir)?;

    let node = builder
        .build()?
        .start_metrics_server(graceful_rx.clone())
        .ready()?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    // Start Node
    if let Err(e) = node.run().await {
        error!("node stops: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    info!("Shutdown server..");
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| SystemError::SignalSendFailed(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| SystemError::SignalSendFailed(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::System(SystemError::SignalSendFailed(format!(
            "Failed to send shutdown signal: {}",
            e
        )))
    })?;

    info!("Shutdown completed");
    Ok(())
}

pub fn init_observability(
    node_id: u32,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(log_dir.join(node_id.to_string()), "d.log");

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
