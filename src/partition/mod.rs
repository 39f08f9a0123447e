//! Data partitions stored as replicated logs.
//!
//! Each log entry is either a produced batch or a control marker. Offsets
//! address entries, so a consumer position always lands on a batch boundary.

mod entry;
mod manager;
mod partition_log;


pub use entry::*;
pub use manager::*;
pub use partition_log::*;
