use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::error;
use tracing::info;

use super::decode_versioned;
use super::encode_versioned;
use super::peek_version;
use crate::ErrorCode;
use crate::Feature;
use crate::LogicalVersion;
use crate::NodeId;
use crate::ReplicatedLog;
use crate::Result;
use crate::VersionError;
use crate::VersionedRecord;
use crate::ACTIVE_LOGICAL_VERSION;
use crate::REPLAY_BATCH_SIZE;

/// Snapshot of the versions advertised by cluster members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionView {
    pub members: BTreeMap<NodeId, LogicalVersion>,
    pub active: LogicalVersion,
}

impl VersionView {
    fn from_members(members: BTreeMap<NodeId, LogicalVersion>) -> Self {
        let active = members.values().copied().min().unwrap_or(LogicalVersion::MIN_SUPPORTED);
        Self { members, active }
    }
}

/// Sits between the RPC surface and the state machine.
///
/// Chooses the on-disk format for new records, decodes persisted ones and
/// degrades error codes that older clients or nodes do not understand.
pub struct VersionCompatibilityLayer {
    node_id: NodeId,
    local_version: LogicalVersion,
    view: ArcSwap<VersionView>,
}

impl std::fmt::Debug for VersionCompatibilityLayer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("VersionCompatibilityLayer")
            .field("node_id", &self.node_id)
            .field("local_version", &self.local_version)
            .field("active", &self.active_version())
            .finish()
    }
}

impl VersionCompatibilityLayer {
    pub fn new(
        node_id: NodeId,
        local_version: LogicalVersion,
    ) -> Self {
        let mut members = BTreeMap::new();
        members.insert(node_id, local_version);
        let layer = Self {
            node_id,
            local_version,
            view: ArcSwap::from_pointee(VersionView::from_members(members)),
        };
        layer.publish();
        layer
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn local_version(&self) -> LogicalVersion {
        self.local_version
    }

    /// Records the version `node_id` runs and re-evaluates the active version
    pub fn advertise(
        &self,
        node_id: NodeId,
        version: LogicalVersion,
    ) {
        let version = if node_id == self.node_id { self.local_version } else { version };
        self.update(|members| {
            members.insert(node_id, version);
        });
    }

    /// Drops a member that left the cluster
    pub fn remove_node(
        &self,
        node_id: NodeId,
    ) {
        if node_id == self.node_id {
            return;
        }
        self.update(|members| {
            members.remove(&node_id);
        });
    }

    fn update(
        &self,
        f: impl Fn(&mut BTreeMap<NodeId, LogicalVersion>),
    ) {
        let before = self.active_version();
        self.view.rcu(|view| {
            let mut members = view.members.clone();
            f(&mut members);
            Arc::new(VersionView::from_members(members))
        });
        let after = self.active_version();
        if before != after {
            info!(node_id = self.node_id, "active logical version {} -> {}", before, after);
        }
        self.publish();
    }

    fn publish(&self) {
        ACTIVE_LOGICAL_VERSION
            .with_label_values(&[&self.node_id.to_string()])
            .set(self.active_version().0 as i64);
    }

    pub fn view(&self) -> Arc<VersionView> {
        self.view.load_full()
    }

    /// Minimum version over all known members
    pub fn active_version(&self) -> LogicalVersion {
        self.view.load().active
    }

    /// Version a response to `client_version` must be expressed in
    pub fn effective_version(
        &self,
        client_version: Option<LogicalVersion>,
    ) -> LogicalVersion {
        let active = self.active_version();
        match client_version {
            Some(v) => v.min(active),
            None => active,
        }
    }

    pub fn is_active(
        &self,
        feature: Feature,
    ) -> bool {
        feature.enabled_at(self.active_version())
    }

    /// Encodes in the active version's layout
    pub fn encode<R: VersionedRecord>(
        &self,
        record: &R,
    ) -> Result<Vec<u8>> {
        encode_versioned(record, self.active_version())
    }

    /// Decodes any version this binary understands. Records are never rewritten.
    pub fn decode<R: VersionedRecord>(
        &self,
        bytes: &[u8],
    ) -> Result<R> {
        decode_versioned(bytes, self.local_version).map(|(_, r)| r)
    }

    /// Fails when `log` holds a record written in a version newer than this
    /// binary understands.
    ///
    /// Records are never rewritten, so a node leading such a log could not
    /// serve it after a downgrade.
    pub async fn check_log_readable(
        &self,
        log: &dyn ReplicatedLog,
    ) -> Result<()> {
        let mut from = 0;
        loop {
            let entries = log.read(from, REPLAY_BATCH_SIZE).await?;
            let Some(last) = entries.last() else {
                return Ok(());
            };
            from = last.offset + 1;
            for entry in &entries {
                let version = peek_version(&entry.payload)?;
                if version > self.local_version {
                    error!(
                        "{} holds records at {}, this node runs {}",
                        log.name(),
                        version,
                        self.local_version
                    );
                    return Err(VersionError::DowngradeRefused {
                        log: log.name(),
                        persisted: version.0,
                        local: self.local_version.0,
                    }
                    .into());
                }
            }
        }
    }

    /// Maps error codes introduced after `client_version` onto their predecessors
    pub fn adapt_error(
        &self,
        code: ErrorCode,
        client_version: Option<LogicalVersion>,
    ) -> ErrorCode {
        let effective = self.effective_version(client_version);
        match code {
            ErrorCode::ProducerFenced if !Feature::ProducerFencedErrorCode.enabled_at(effective) => {
                ErrorCode::InvalidProducerEpoch
            }
            ErrorCode::FencedInstanceId if !Feature::FencedInstanceErrorCode.enabled_at(effective) => {
                ErrorCode::UnknownMemberId
            }
            other => other,
        }
    }
}
