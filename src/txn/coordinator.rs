use std::collections::BTreeSet;
use std::sync::Arc;

use autometrics::autometrics;
use tokio::sync::MutexGuard;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::utils::hash::bucket_for;
use crate::utils::time::now_ms;
use crate::AbortReason;
use crate::ConsumerGroupCoordinator;
use crate::CoordinatorConfig;
use crate::Error;
use crate::Feature;
use crate::GroupError;
use crate::LeadershipState;
use crate::LoadedShard;
use crate::LogFactory;
use crate::NodeId;
use crate::OffsetCommitManager;
use crate::PartitionError;
use crate::PartitionManager;
use crate::ProducerEpoch;
use crate::ProducerId;
use crate::ProducerIdAndEpoch;
use crate::ProducerIdRegistry;
use crate::Result;
use crate::RetryPolicies;
use crate::TopicPartition;
use crate::TransactionConfig;
use crate::TransactionMetadata;
use crate::TxnError;
use crate::TxnHandle;
use crate::TxnLogRecord;
use crate::TxnOffsetCommitRequest;
use crate::TxnOutcome;
use crate::TxnShard;
use crate::TxnState;
use crate::VersionCompatibilityLayer;
use crate::API_SLO;
use crate::FENCED_REQUESTS_TOTAL;
use crate::TRANSACTION_STATE_TOPIC;

/// Owns the transactional ids of every shard this node leads.
///
/// Requests for one transactional id are serialized by its mutex; distinct ids
/// proceed in parallel. A state transition is applied in memory only after
/// its record was appended under the shard's term.
pub struct TransactionCoordinator {
    pub(super) node_id: NodeId,
    pub(super) config: TransactionConfig,
    pub(super) retry: RetryPolicies,
    pub(super) shards: Vec<TxnShard>,
    pub(super) registry: Arc<ProducerIdRegistry>,
    pub(super) groups: Arc<ConsumerGroupCoordinator>,
    pub(super) offsets: Arc<OffsetCommitManager>,
    pub(super) partitions: Arc<PartitionManager>,
    pub(super) versions: Arc<VersionCompatibilityLayer>,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("node_id", &self.node_id)
            .field("num_shards", &self.shards.len())
            .finish()
    }
}

impl TransactionCoordinator {
    pub fn new(
        config: &CoordinatorConfig,
        factory: &dyn LogFactory,
        versions: Arc<VersionCompatibilityLayer>,
        registry: Arc<ProducerIdRegistry>,
        groups: Arc<ConsumerGroupCoordinator>,
        offsets: Arc<OffsetCommitManager>,
        partitions: Arc<PartitionManager>,
    ) -> Result<Self> {
        let mut shards = Vec::with_capacity(config.transaction.num_shards as usize);
        for n in 0..config.transaction.num_shards {
            let log = factory.open(&TopicPartition::new(TRANSACTION_STATE_TOPIC, n as i32).log_name())?;
            shards.push(TxnShard::new(n, log, versions.clone()));
        }
        Ok(Self {
            node_id: config.cluster.node_id,
            config: config.transaction.clone(),
            retry: config.retry.clone(),
            shards,
            registry,
            groups,
            offsets,
            partitions,
            versions,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn shards(&self) -> &[TxnShard] {
        &self.shards
    }

    /// Shard owning `transactional_id`
    pub fn shard_for(
        &self,
        transactional_id: &str,
    ) -> u32 {
        bucket_for(transactional_id, self.shards.len() as u32)
    }

    async fn route(
        &self,
        transactional_id: &str,
    ) -> Result<Arc<LoadedShard>> {
        if transactional_id.is_empty() {
            return Err(TxnError::InvalidTransactionalId.into());
        }
        self.shards[self.shard_for(transactional_id) as usize]
            .loaded(self.node_id)
            .await
    }

    fn existing(
        loaded: &LoadedShard,
        transactional_id: &str,
        producer_id: ProducerId,
    ) -> Result<TxnHandle> {
        loaded.get(transactional_id).ok_or_else(|| {
            FENCED_REQUESTS_TOTAL.with_label_values(&["producer_id_mapping"]).inc();
            TxnError::InvalidProducerIdMapping {
                transactional_id: transactional_id.to_string(),
                current: crate::NO_PRODUCER_ID,
                received: producer_id,
            }
            .into()
        })
    }

    /// Registers a producer session for `transactional_id`.
    ///
    /// Unseen ids get a fresh producer id at epoch 0. Known ids get their epoch
    /// bumped, or a fresh id once the epoch is exhausted. An ongoing
    /// transaction of the previous session is aborted first, with markers
    /// carrying the bumped epoch so partitions fence the old instance.
    #[autometrics(objective = API_SLO)]
    #[instrument(skip(self))]
    pub async fn init_producer_id(
        &self,
        transactional_id: &str,
        transaction_timeout_ms: Option<u64>,
    ) -> Result<ProducerIdAndEpoch> {
        let timeout_ms = transaction_timeout_ms.unwrap_or(self.config.default_timeout_ms);
        if timeout_ms == 0 || timeout_ms > self.config.max_timeout_ms {
            return Err(TxnError::InvalidTransactionTimeout {
                requested: timeout_ms,
                max: self.config.max_timeout_ms,
            }
            .into());
        }
        let loaded = self.route(transactional_id).await?;
        let handle = loaded.get_or_insert(transactional_id, || {
            TransactionMetadata::unregistered(transactional_id, timeout_ms)
        });

        loop {
            let mut md = self.settle(&loaded, &handle).await?;
            if md.state == TxnState::Ongoing {
                let snapshot = self
                    .prepare(&loaded, &mut md, TxnOutcome::Abort, Some(AbortReason::ProducerReinit))
                    .await?;
                drop(md);
                self.complete(&loaded, &handle, snapshot).await?;
                continue;
            }

            let mut next = md.clone();
            let mut session = md.session();
            if !md.is_registered() {
                session.rotate(self.registry.next_producer_id().await?);
            } else if session.epoch_exhausted() {
                info!("epoch of producer {} exhausted, rotating", md.producer_id);
                session.rotate(self.registry.next_producer_id().await?);
            } else {
                session.bump_epoch();
            }
            next.producer_id = session.producer_id;
            next.producer_epoch = session.producer_epoch;
            next.state = TxnState::Empty;
            next.partitions.clear();
            next.timeout_ms = timeout_ms;
            next.txn_start_ms = 0;
            next.last_update_ms = now_ms();
            next.abort_reason = None;
            next.last_outcome = None;
            self.persist(&loaded, &next).await?;
            *md = next;

            debug!(
                "issued producer {} epoch {} to {}",
                md.producer_id, md.producer_epoch, transactional_id
            );
            return Ok(md.id_and_epoch());
        }
    }

    /// Adds data partitions to the producer's transaction, starting it if needed
    #[autometrics(objective = API_SLO)]
    #[instrument(skip(self, partitions))]
    pub async fn add_partitions_to_txn(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        partitions: Vec<TopicPartition>,
    ) -> Result<()> {
        if let Some(tp) = partitions.iter().find(|tp| tp.is_internal()) {
            return Err(PartitionError::InternalTopic(tp.topic.clone()).into());
        }
        self.register_partitions(transactional_id, producer_id, producer_epoch, partitions)
            .await
    }

    /// Adds the consumer offsets partition of `group_id` to the transaction
    #[autometrics(objective = API_SLO)]
    #[instrument(skip(self))]
    pub async fn add_offsets_to_txn(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        group_id: &str,
    ) -> Result<()> {
        if group_id.is_empty() {
            return Err(GroupError::InvalidGroupId.into());
        }
        let tp = self.offsets.partition_for(group_id);
        self.register_partitions(transactional_id, producer_id, producer_epoch, vec![tp])
            .await
    }

    async fn register_partitions(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        partitions: Vec<TopicPartition>,
    ) -> Result<()> {
        let loaded = self.route(transactional_id).await?;
        let handle = Self::existing(&loaded, transactional_id, producer_id)?;
        let mut md = self.settle(&loaded, &handle).await?;
        check_producer(&md, producer_id, producer_epoch)?;

        let added: BTreeSet<TopicPartition> = partitions
            .into_iter()
            .filter(|tp| !md.partitions.contains(tp))
            .collect();
        if md.state == TxnState::Ongoing && added.is_empty() {
            return Ok(());
        }

        let now = now_ms();
        let mut next = md.clone();
        if next.state == TxnState::Empty {
            next.state = TxnState::Ongoing;
            next.txn_start_ms = now;
            next.abort_reason = None;
            next.last_outcome = None;
        }
        next.partitions.extend(added);
        next.last_update_ms = now;
        self.persist(&loaded, &next).await?;
        *md = next;
        Ok(())
    }

    /// Stages consumer offsets inside the producer's ongoing transaction.
    ///
    /// The committing member is validated against the group first; a fenced or
    /// evicted member cannot commit.
    #[autometrics(objective = API_SLO)]
    #[instrument(skip(self, request), fields(transactional_id = %request.transactional_id, group_id = %request.group_id))]
    pub async fn txn_offset_commit(
        &self,
        request: TxnOffsetCommitRequest,
    ) -> Result<()> {
        let loaded = self.route(&request.transactional_id).await?;
        let handle = Self::existing(&loaded, &request.transactional_id, request.producer_id)?;
        let mut md = self.settle(&loaded, &handle).await?;
        check_producer(&md, request.producer_id, request.producer_epoch)?;
        if md.state != TxnState::Ongoing {
            return Err(invalid_state(&md, "TxnOffsetCommit"));
        }

        self.groups
            .validate_member(
                &request.group_id,
                &request.member_id,
                request.generation_id,
                request.group_instance_id.as_deref(),
            )
            .await?;

        let tp = self.offsets.partition_for(&request.group_id);
        if !md.partitions.contains(&tp) {
            let mut next = md.clone();
            next.partitions.insert(tp);
            next.last_update_ms = now_ms();
            self.persist(&loaded, &next).await?;
            *md = next;
        }

        let producer = md.id_and_epoch();
        task_with_timeout_and_exponential_backoff(
            "stage_offsets",
            || {
                self.offsets
                    .stage_offsets(producer, &request.group_id, request.offsets.clone())
            },
            self.retry.log_append,
        )
        .await
    }

    /// Commits or aborts the producer's transaction.
    ///
    /// Returns once every participant holds its marker and the outcome is
    /// logged. A retry after completion with the same outcome succeeds.
    #[autometrics(objective = API_SLO)]
    #[instrument(skip(self))]
    pub async fn end_txn(
        &self,
        transactional_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        commit: bool,
    ) -> Result<()> {
        let outcome = TxnOutcome::from_commit(commit);
        let loaded = self.route(transactional_id).await?;
        let handle = Self::existing(&loaded, transactional_id, producer_id)?;
        let mut md = handle.lock().await;
        check_producer(&md, producer_id, producer_epoch)?;

        let state = md.state;
        let snapshot = match state {
            TxnState::Empty if md.last_outcome == Some(outcome) => {
                debug!("{} already completed with {}", transactional_id, outcome.as_str());
                return Ok(());
            }
            TxnState::Ongoing => {
                let reason = (outcome == TxnOutcome::Abort).then_some(AbortReason::ClientRequest);
                self.prepare(&loaded, &mut md, outcome, reason).await?
            }
            _ if state.is_prepare() && state.outcome() == Some(outcome) => {
                if md.completing {
                    return Err(TxnError::ConcurrentTransactions(transactional_id.to_string()).into());
                }
                md.completing = true;
                md.clone()
            }
            _ => return Err(invalid_state(&md, "EndTxn")),
        };
        drop(md);
        self.complete(&loaded, &handle, snapshot).await?;
        Ok(())
    }

    /// Aborts every ongoing transaction that outlived its timeout and
    /// re-drives stuck completions. Returns the number of aborted transactions.
    pub async fn abort_expired_transactions(
        &self,
        now: u64,
    ) -> Result<usize> {
        let mut aborted = 0;
        for shard in &self.shards {
            let Some(loaded) = shard.current(self.node_id) else {
                continue;
            };
            for handle in loaded.handles() {
                let mut md = handle.lock().await;
                if md.completing {
                    continue;
                }
                let snapshot = if md.is_expired(now) {
                    info!(
                        "transaction of {} timed out after {}ms",
                        md.transactional_id, md.timeout_ms
                    );
                    match self
                        .prepare(&loaded, &mut md, TxnOutcome::Abort, Some(AbortReason::Timeout))
                        .await
                    {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("timeout abort of {} failed: {:?}", md.transactional_id, e);
                            continue;
                        }
                    }
                } else if md.state.is_prepare() {
                    md.completing = true;
                    md.clone()
                } else {
                    continue;
                };
                let expired = snapshot.abort_reason == Some(AbortReason::Timeout);
                drop(md);
                match self.complete(&loaded, &handle, snapshot).await {
                    Ok(_) if expired => aborted += 1,
                    Ok(_) => {}
                    Err(e) => warn!("completion failed, will retry: {:?}", e),
                }
            }
        }
        Ok(aborted)
    }

    /// Read-only view of a transactional id's state
    pub async fn describe_transaction(
        &self,
        transactional_id: &str,
    ) -> Result<Option<TransactionMetadata>> {
        let loaded = self.route(transactional_id).await?;
        let Some(handle) = loaded.get(transactional_id) else {
            return Ok(None);
        };
        let md = handle.lock().await;
        Ok(md.is_registered().then(|| md.clone()))
    }

    /// Loads a shard this node now leads and finishes its prepared
    /// transactions, or drops a shard it lost
    pub async fn on_leadership_change(
        &self,
        shard_id: u32,
        leadership: LeadershipState,
    ) -> Result<()> {
        let Some(shard) = self.shards.get(shard_id as usize) else {
            return Ok(());
        };
        if !leadership.is_leader(self.node_id) {
            shard.unload();
            return Ok(());
        }
        let loaded = shard.loaded(self.node_id).await?;
        let redriven = self.redrive_prepared(&loaded).await;
        if redriven > 0 {
            info!(shard = shard_id, term = loaded.term, "re-drove {} prepared transactions", redriven);
        }
        Ok(())
    }

    /// Completes every `Prepare*` transaction with no completion running
    pub async fn redrive_prepared(
        &self,
        loaded: &Arc<LoadedShard>,
    ) -> usize {
        let mut redriven = 0;
        for handle in loaded.handles() {
            let mut md = handle.lock().await;
            if !md.state.is_prepare() || md.completing {
                continue;
            }
            md.completing = true;
            let snapshot = md.clone();
            drop(md);
            match self.complete(loaded, &handle, snapshot).await {
                Ok(_) => redriven += 1,
                Err(e) => warn!("re-drive failed, will retry: {:?}", e),
            }
        }
        redriven
    }

    /// Locks the transaction once no completion is pending, finishing a stuck
    /// `Prepare*` first
    async fn settle<'a>(
        &self,
        loaded: &Arc<LoadedShard>,
        handle: &'a TxnHandle,
    ) -> Result<MutexGuard<'a, TransactionMetadata>> {
        loop {
            let mut md = handle.lock().await;
            if !md.state.is_prepare() {
                return Ok(md);
            }
            if md.completing {
                return Err(TxnError::ConcurrentTransactions(md.transactional_id.clone()).into());
            }
            md.completing = true;
            let snapshot = md.clone();
            drop(md);
            self.complete(loaded, handle, snapshot).await?;
        }
    }

    /// Logs the intent to complete `md` with `outcome` and marks the
    /// completion as running. Returns the prepared snapshot.
    ///
    /// Aborts not requested by the producer bump its epoch so the old
    /// instance is fenced by the markers.
    pub(super) async fn prepare(
        &self,
        loaded: &LoadedShard,
        md: &mut TransactionMetadata,
        outcome: TxnOutcome,
        reason: Option<AbortReason>,
    ) -> Result<TransactionMetadata> {
        let mut next = md.clone();
        let fencing = matches!(reason, Some(AbortReason::Timeout) | Some(AbortReason::ProducerReinit));
        if fencing {
            let mut session = next.session();
            if session.epoch_exhausted() {
                warn!(
                    "epoch of producer {} exhausted, aborting without fencing",
                    next.producer_id
                );
            } else {
                session.bump_epoch();
                next.producer_epoch = session.producer_epoch;
            }
        }
        next.state = TxnState::prepare(outcome);
        next.abort_reason = reason;
        next.last_update_ms = now_ms();
        self.persist(loaded, &next).await?;
        next.completing = true;
        *md = next.clone();
        Ok(next)
    }

    /// Appends `next` to the shard log under the shard's term
    pub(super) async fn persist(
        &self,
        loaded: &LoadedShard,
        next: &TransactionMetadata,
    ) -> Result<()> {
        let shard = &self.shards[self.shard_for(&next.transactional_id) as usize];
        let mut record = TxnLogRecord::from_metadata(next);
        if !self.versions.is_active(Feature::AbortReasonMetadata) {
            record.abort_reason = None;
        }
        let payload = self.versions.encode(&record)?;
        let term = loaded.term;

        let result = task_with_timeout_and_exponential_backoff(
            "append_txn_record",
            || shard.log().append(Some(term), payload.clone()),
            self.retry.log_append,
        )
        .await;

        result.map(|_| ()).map_err(|e| {
            let leadership = shard.log().leadership();
            if leadership.term != term || !leadership.is_leader(self.node_id) {
                shard.unload();
                Error::from(TxnError::NotCoordinator {
                    shard: shard.id(),
                    node_id: self.node_id,
                    leader: leadership.leader,
                })
            } else {
                e
            }
        })
    }
}

fn check_producer(
    md: &TransactionMetadata,
    producer_id: ProducerId,
    producer_epoch: ProducerEpoch,
) -> Result<()> {
    if !md.is_registered() || md.producer_id != producer_id {
        FENCED_REQUESTS_TOTAL.with_label_values(&["producer_id_mapping"]).inc();
        return Err(TxnError::InvalidProducerIdMapping {
            transactional_id: md.transactional_id.clone(),
            current: md.producer_id,
            received: producer_id,
        }
        .into());
    }
    if md.producer_epoch != producer_epoch {
        FENCED_REQUESTS_TOTAL.with_label_values(&["producer_epoch"]).inc();
        return Err(TxnError::ProducerFenced {
            transactional_id: md.transactional_id.clone(),
            producer_id,
            current_epoch: md.producer_epoch,
            received_epoch: producer_epoch,
        }
        .into());
    }
    Ok(())
}

fn invalid_state(
    md: &TransactionMetadata,
    operation: &'static str,
) -> Error {
    TxnError::InvalidTxnState {
        transactional_id: md.transactional_id.clone(),
        state: md.state,
        operation,
    }
    .into()
}
