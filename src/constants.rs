/// Node identifier inside the cluster
pub type NodeId = u32;

pub type ProducerId = i64;

pub type ProducerEpoch = i32;

/// Sentinel for "no producer id assigned yet"
pub const NO_PRODUCER_ID: ProducerId = -1;

pub const NO_PRODUCER_EPOCH: ProducerEpoch = -1;

/// Epochs travel as int16 on the client wire. A session whose next epoch would
/// reach this value is rotated onto a fresh producer id.
pub const MAX_PRODUCER_EPOCH: ProducerEpoch = i16::MAX as ProducerEpoch;

/// Generation used by offset commits that are not managed by a group member
pub const NO_GENERATION: i32 = -1;

// Internal logs
pub const TRANSACTION_STATE_TOPIC: &str = "__transaction_state";
pub const CONSUMER_OFFSETS_TOPIC: &str = "__consumer_offsets";
pub const PRODUCER_ID_BLOCK_LOG: &str = "__producer_id_blocks";

/// Entries fetched per read while replaying a log
pub const REPLAY_BATCH_SIZE: usize = 1024;
