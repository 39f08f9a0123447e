//! d-txn: a transaction coordinator built on a replicated log.
//!
//! The crate makes a write spanning several partitions, plus a consumer-group
//! offset commit, appear atomic to read-committed consumers. It fences zombie
//! producers by epoch, fences stale group members by generation and static
//! instance id, resumes half-finished commits after coordinator failover and
//! keeps its persisted formats readable across a mixed-version rolling upgrade.

mod api;
mod client;
mod config;
mod constants;
mod errors;
mod group;
mod metrics;
mod node;
mod offsets;
mod partition;
mod producer;
mod storage;
mod txn;
pub mod utils;
mod version;

pub use api::*;
pub use client::*;
pub use config::*;
pub use constants::*;
pub use errors::*;
pub use group::*;
pub use metrics::*;
pub use node::*;
pub use offsets::*;
pub use partition::*;
pub use producer::*;
pub use storage::*;
pub use txn::*;
pub use version::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
