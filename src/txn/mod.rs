//! Transaction coordinator.
//!
//! Transactional ids are spread over shards, each persisted to its own
//! `__transaction_state-<n>` log and served by that log's leader. A
//! transaction completes in two phases: the intent (`Prepare*`) is logged,
//! markers are written to every participant, then `Complete*` is logged.

mod completion;
mod coordinator;
mod metadata;
mod record;
mod shard;


pub use coordinator::*;
pub use metadata::*;
pub use record::*;
pub use shard::*;
