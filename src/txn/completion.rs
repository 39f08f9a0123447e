use std::time::Instant;

use futures::future::join_all;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::TransactionCoordinator;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::utils::time::now_ms;
use crate::ControlMarker;
use crate::LoadedShard;
use crate::Result;
use crate::TopicPartition;
use crate::TransactionMetadata;
use crate::TxnHandle;
use crate::TxnLogRecord;
use crate::TxnOutcome;
use crate::TxnState;
use crate::MARKER_FANOUT_LATENCY_MS;
use crate::MARKER_LEG_FAILURES_TOTAL;
use crate::TXN_COMPLETED_TOTAL;

impl TransactionCoordinator {
    /// Second phase of a completion.
    ///
    /// `snapshot` is a `Prepare*` state already in the log. Markers are written
    /// to every participant concurrently; once all legs ack, `Complete*` is
    /// logged and the transactional id is free for its next transaction. On
    /// failure the transaction stays prepared and may be driven again.
    pub(super) async fn complete(
        &self,
        loaded: &LoadedShard,
        handle: &TxnHandle,
        snapshot: TransactionMetadata,
    ) -> Result<TxnOutcome> {
        let Some(outcome) = snapshot.state.outcome().filter(|_| snapshot.state.is_prepare()) else {
            return Ok(snapshot.last_outcome.unwrap_or(TxnOutcome::Abort));
        };

        let started = Instant::now();
        if let Err(e) = self.write_markers(loaded, &snapshot, outcome).await {
            let mut md = handle.lock().await;
            if same_transaction(&md, &snapshot) {
                md.completing = false;
            }
            return Err(e);
        }
        MARKER_FANOUT_LATENCY_MS
            .with_label_values(&[outcome.as_str()])
            .observe(started.elapsed().as_millis() as f64);

        let mut md = handle.lock().await;
        if !same_transaction(&md, &snapshot) {
            debug!("{} completed elsewhere", snapshot.transactional_id);
            return Ok(outcome);
        }
        let mut next = md.clone();
        next.state = TxnState::complete(outcome);
        next.last_update_ms = now_ms();
        if let Err(e) = self.persist(loaded, &next).await {
            md.completing = false;
            return Err(e);
        }
        *md = TxnLogRecord::from_metadata(&next).into_metadata();

        let reason = snapshot.abort_reason.map_or("none", |r| r.as_str());
        TXN_COMPLETED_TOTAL
            .with_label_values(&[outcome.as_str(), reason])
            .inc();
        info!(
            "{} {} producer {} epoch {} over {} partitions",
            outcome.as_str(),
            snapshot.transactional_id,
            snapshot.producer_id,
            snapshot.producer_epoch,
            snapshot.partitions.len()
        );
        Ok(outcome)
    }

    async fn write_markers(
        &self,
        loaded: &LoadedShard,
        snapshot: &TransactionMetadata,
        outcome: TxnOutcome,
    ) -> Result<()> {
        // The v5 layout drops the term on disk; the write itself is still fenced by it
        let marker = ControlMarker {
            producer_id: snapshot.producer_id,
            producer_epoch: snapshot.producer_epoch,
            outcome,
            coordinator_epoch: Some(loaded.term),
        };

        let legs = snapshot
            .partitions
            .iter()
            .map(|tp| self.write_marker_leg(tp, marker));
        let results = join_all(legs).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        match results.into_iter().find_map(|r| r.err()) {
            Some(e) => {
                warn!(
                    "{} of {} marker legs of {} failed",
                    failed,
                    snapshot.partitions.len(),
                    snapshot.transactional_id
                );
                Err(e)
            }
            None => Ok(()),
        }
    }

    async fn write_marker_leg(
        &self,
        tp: &TopicPartition,
        marker: ControlMarker,
    ) -> Result<()> {
        let result = if self.offsets.is_offsets_partition(tp) {
            task_with_timeout_and_exponential_backoff(
                "finalize_offsets",
                || self.offsets.finalize(tp, marker),
                self.retry.marker_write,
            )
            .await
        } else {
            task_with_timeout_and_exponential_backoff(
                "write_marker",
                || self.partitions.write_marker(tp, marker),
                self.retry.marker_write,
            )
            .await
        };

        result.map(|_| ()).map_err(|e| {
            MARKER_LEG_FAILURES_TOTAL.with_label_values(&[&tp.topic]).inc();
            warn!("marker leg {} failed: {:?}", tp, e);
            e
        })
    }
}

/// Whether `md` still holds the prepared transaction `snapshot` was taken from
fn same_transaction(
    md: &TransactionMetadata,
    snapshot: &TransactionMetadata,
) -> bool {
    md.state == snapshot.state
        && md.producer_id == snapshot.producer_id
        && md.producer_epoch == snapshot.producer_epoch
}
