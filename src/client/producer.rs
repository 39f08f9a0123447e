use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use super::transport::call;
use super::CoordinatorTransport;
use crate::AddOffsetsToTxnRequest;
use crate::AddPartitionsToTxnRequest;
use crate::BackoffPolicy;
use crate::ClientError;
use crate::ConsumerGroupMetadata;
use crate::CoordinatorRequest;
use crate::CoordinatorResponse;
use crate::DataRecord;
use crate::EndTxnRequest;
use crate::InitProducerIdRequest;
use crate::LogicalVersion;
use crate::OffsetEntry;
use crate::PartitionManager;
use crate::ProduceBatch;
use crate::ProducerIdAndEpoch;
use crate::Result;
use crate::TopicPartition;
use crate::TxnOffsetCommitRequest;

/// Producer writing to several partitions inside coordinator-managed transactions.
///
/// The first write to a partition within a transaction registers it with the
/// coordinator before the data is appended.
pub struct TransactionalProducer {
    transactional_id: String,
    transaction_timeout_ms: Option<u64>,
    client_version: Option<LogicalVersion>,
    transport: Arc<dyn CoordinatorTransport>,
    partitions: Arc<PartitionManager>,
    retry: BackoffPolicy,

    session: Option<ProducerIdAndEpoch>,
    in_transaction: bool,
    registered: HashSet<TopicPartition>,
    offsets_registered: HashSet<String>,
}

impl TransactionalProducer {
    pub fn new(
        transactional_id: impl Into<String>,
        transport: Arc<dyn CoordinatorTransport>,
        partitions: Arc<PartitionManager>,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            transactional_id: transactional_id.into(),
            transaction_timeout_ms: None,
            client_version: None,
            transport,
            partitions,
            retry,
            session: None,
            in_transaction: false,
            registered: HashSet::new(),
            offsets_registered: HashSet::new(),
        }
    }

    pub fn transaction_timeout_ms(
        mut self,
        timeout_ms: u64,
    ) -> Self {
        self.transaction_timeout_ms = Some(timeout_ms);
        self
    }

    /// Logical version this client speaks; `None` accepts whatever the cluster runs
    pub fn client_version(
        mut self,
        version: LogicalVersion,
    ) -> Self {
        self.client_version = Some(version);
        self
    }

    pub fn transactional_id(&self) -> &str {
        &self.transactional_id
    }

    pub fn session(&self) -> Option<ProducerIdAndEpoch> {
        self.session
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Obtains a producer id and epoch, fencing any previous instance
    pub async fn init_transactions(&mut self) -> Result<ProducerIdAndEpoch> {
        let request = CoordinatorRequest::InitProducerId(InitProducerIdRequest {
            transactional_id: self.transactional_id.clone(),
            transaction_timeout_ms: self.transaction_timeout_ms,
            client_version: self.client_version,
        });
        let session = match call(self.transport.as_ref(), request, self.retry).await? {
            CoordinatorResponse::InitProducerId {
                producer_id,
                producer_epoch,
                ..
            } => ProducerIdAndEpoch::new(producer_id, producer_epoch),
            other => {
                warn!("unexpected response to InitProducerId: {:?}", other);
                return Err(ClientError::NotInitialized.into());
            }
        };
        debug!(
            "{} initialized as producer {} epoch {}",
            self.transactional_id, session.producer_id, session.producer_epoch
        );
        self.session = Some(session);
        self.reset_transaction();
        Ok(session)
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.current_session()?;
        if self.in_transaction {
            return Err(ClientError::TransactionInProgress.into());
        }
        self.in_transaction = true;
        Ok(())
    }

    /// Writes one record. Returns the offset of the batch.
    pub async fn send(
        &mut self,
        tp: &TopicPartition,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<u64> {
        self.send_batch(tp, vec![DataRecord::new(key, value)]).await
    }

    /// Writes `records` as one batch of the ongoing transaction
    pub async fn send_batch(
        &mut self,
        tp: &TopicPartition,
        records: Vec<DataRecord>,
    ) -> Result<u64> {
        let session = self.active_session()?;
        if !self.registered.contains(tp) {
            let request = CoordinatorRequest::AddPartitionsToTxn(AddPartitionsToTxnRequest {
                transactional_id: self.transactional_id.clone(),
                producer_id: session.producer_id,
                producer_epoch: session.producer_epoch,
                partitions: vec![tp.clone()],
                client_version: self.client_version,
            });
            call(self.transport.as_ref(), request, self.retry).await?;
            self.registered.insert(tp.clone());
        }

        self.partitions
            .produce(
                tp,
                ProduceBatch {
                    producer_id: session.producer_id,
                    producer_epoch: session.producer_epoch,
                    transactional: true,
                    records,
                },
            )
            .await
    }

    /// Commits consumer offsets as part of the ongoing transaction.
    ///
    /// The offsets become visible to the group only if the transaction commits.
    pub async fn send_offsets_to_transaction(
        &mut self,
        offsets: Vec<OffsetEntry>,
        group: &ConsumerGroupMetadata,
    ) -> Result<()> {
        let session = self.active_session()?;
        if !self.offsets_registered.contains(&group.group_id) {
            let request = CoordinatorRequest::AddOffsetsToTxn(AddOffsetsToTxnRequest {
                transactional_id: self.transactional_id.clone(),
                producer_id: session.producer_id,
                producer_epoch: session.producer_epoch,
                group_id: group.group_id.clone(),
                client_version: self.client_version,
            });
            call(self.transport.as_ref(), request, self.retry).await?;
            self.offsets_registered.insert(group.group_id.clone());
        }

        let request = CoordinatorRequest::TxnOffsetCommit(TxnOffsetCommitRequest {
            transactional_id: self.transactional_id.clone(),
            group_id: group.group_id.clone(),
            producer_id: session.producer_id,
            producer_epoch: session.producer_epoch,
            member_id: group.member_id.clone(),
            generation_id: group.generation_id,
            group_instance_id: group.group_instance_id.clone(),
            offsets,
            client_version: self.client_version,
        });
        call(self.transport.as_ref(), request, self.retry).await?;
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        self.end_transaction(true).await
    }

    pub async fn abort_transaction(&mut self) -> Result<()> {
        self.end_transaction(false).await
    }

    async fn end_transaction(
        &mut self,
        commit: bool,
    ) -> Result<()> {
        let session = self.active_session()?;
        let request = CoordinatorRequest::EndTxn(EndTxnRequest {
            transactional_id: self.transactional_id.clone(),
            producer_id: session.producer_id,
            producer_epoch: session.producer_epoch,
            commit,
            client_version: self.client_version,
        });
        let result = call(self.transport.as_ref(), request, self.retry).await;
        if let Err(e) = &result {
            if e.code().is_fencing() {
                warn!("{} was fenced: {}", self.transactional_id, e);
                self.session = None;
            }
            if e.is_retriable() {
                return result.map(|_| ());
            }
        }
        self.reset_transaction();
        result.map(|_| ())
    }

    fn reset_transaction(&mut self) {
        self.in_transaction = false;
        self.registered.clear();
        self.offsets_registered.clear();
    }

    fn current_session(&self) -> Result<ProducerIdAndEpoch> {
        self.session.ok_or_else(|| ClientError::NotInitialized.into())
    }

    fn active_session(&self) -> Result<ProducerIdAndEpoch> {
        let session = self.current_session()?;
        if !self.in_transaction {
            return Err(ClientError::NoTransaction.into());
        }
        Ok(session)
    }
}
