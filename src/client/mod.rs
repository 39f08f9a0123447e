//! In-process clients of the coordinator.
//!
//! - [`TransactionalProducer`] - transactional writes with offset commits
//! - [`GroupConsumer`] - group membership and read-committed polling
//! - [`CoordinatorTransport`] - how requests reach a coordinator
//!
//! # Basic Usage
//! ```rust,ignore
//! let transport = Arc::new(RoutingTransport::new(vec![node.service()]));
//! let mut producer = TransactionalProducer::new("copier-1", transport, node.partitions().clone(), retry);
//! producer.init_transactions().await?;
//! producer.begin_transaction()?;
//! producer.send(&TopicPartition::new("b", 0), "k", "v").await?;
//! producer.commit_transaction().await?;
//! ```

mod consumer;
mod producer;
mod transport;

#[cfg(test)]
mod consumer_test;
#[cfg(test)]
mod producer_test;
#[cfg(test)]
mod transport_test;

pub use consumer::*;
pub use producer::*;
pub use transport::*;
