//! Rolling-upgrade compatibility.
//!
//! Nodes advertise the logical version of their binary. Records are written in
//! the format of the cluster's active version (the minimum over all members),
//! so a node that is downgraded again can still read everything written while
//! it was away. Readers accept any version up to their own.

mod codec;
mod layer;

#[cfg(test)]
mod codec_test;
#[cfg(test)]
mod layer_test;

pub use codec::*;
pub use layer::*;

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalVersion(pub u16);

impl LogicalVersion {
    /// Legacy format: no abort reason, no last-update time, no coordinator epoch
    pub const V5: LogicalVersion = LogicalVersion(5);
    pub const V6: LogicalVersion = LogicalVersion(6);

    pub const MIN_SUPPORTED: LogicalVersion = Self::V5;
    pub const CURRENT: LogicalVersion = Self::V6;

    pub fn is_supported(self) -> bool {
        (Self::MIN_SUPPORTED..=Self::CURRENT).contains(&self)
    }
}

impl fmt::Display for LogicalVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Behaviour switched on only once every member supports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Coordinator records carry the abort reason and last-update time
    AbortReasonMetadata,
    /// Control markers carry the coordinator epoch
    MarkerCoordinatorEpoch,
    /// PRODUCER_FENCED is returned instead of INVALID_PRODUCER_EPOCH
    ProducerFencedErrorCode,
    /// FENCED_INSTANCE_ID is returned instead of UNKNOWN_MEMBER_ID
    FencedInstanceErrorCode,
}

impl Feature {
    pub fn min_version(self) -> LogicalVersion {
        match self {
            Feature::AbortReasonMetadata
            | Feature::MarkerCoordinatorEpoch
            | Feature::ProducerFencedErrorCode
            | Feature::FencedInstanceErrorCode => LogicalVersion::V6,
        }
    }

    pub fn enabled_at(
        self,
        version: LogicalVersion,
    ) -> bool {
        version >= self.min_version()
    }
}
