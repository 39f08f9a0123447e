//! Background loops of a coordinator node. Each stops when the shutdown
//! signal fires or its sender is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::utils::time::now_ms;
use crate::ConsumerGroupCoordinator;
use crate::Result;
use crate::TransactionCoordinator;

/// Loads or unloads a coordinator shard whenever leadership of its log changes.
///
/// Each watch yields its current value first, so shards this node already
/// leads are loaded and their prepared transactions re-driven on startup.
pub(crate) async fn watch_leadership(
    txn: Arc<TransactionCoordinator>,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let mut changes = StreamMap::new();
    for shard in txn.shards() {
        changes.insert(shard.id(), WatchStream::new(shard.log().subscribe_leadership()));
    }

    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                info!("leadership watcher stopped");
                return Ok(());
            }
            Some((shard, leadership)) = changes.next() => {
                debug!(shard, ?leadership, "leadership changed");
                if let Err(e) = txn.on_leadership_change(shard, leadership).await {
                    warn!(shard, "leadership change not applied: {:?}", e);
                }
            }
        }
    }
}

/// Periodically aborts timed-out transactions and re-drives stuck completions
pub(crate) async fn expire_transactions(
    txn: Arc<TransactionCoordinator>,
    interval_ms: u64,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                info!("transaction expiration stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                match txn.abort_expired_transactions(now_ms()).await {
                    Ok(0) => {}
                    Ok(n) => info!("aborted {} timed-out transactions", n),
                    Err(e) => warn!("transaction expiration failed: {:?}", e),
                }
            }
        }
    }
}

/// Periodically evicts group members whose session timed out
pub(crate) async fn expire_members(
    groups: Arc<ConsumerGroupCoordinator>,
    interval_ms: u64,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let mut ticker = interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                info!("member expiration stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                match groups.expire_members(now_ms()).await {
                    Ok(evicted) if evicted.is_empty() => {}
                    Ok(evicted) => debug!("evicted {} group members", evicted.len()),
                    Err(e) => warn!("member expiration failed: {:?}", e),
                }
            }
        }
    }
}
