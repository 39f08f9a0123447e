use serde::Deserialize;
use serde::Serialize;

use crate::ProducerEpoch;
use crate::ProducerId;
use crate::MAX_PRODUCER_EPOCH;

/// The producer identity registered for a transactional id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSession {
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
}

/// Producer id and epoch as carried by every transactional request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerIdAndEpoch {
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
}

impl ProducerIdAndEpoch {
    pub fn new(
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
    ) -> Self {
        Self {
            producer_id,
            producer_epoch,
        }
    }
}

impl ProducerSession {
    pub fn new(
        transactional_id: impl Into<String>,
        producer_id: ProducerId,
    ) -> Self {
        Self {
            transactional_id: transactional_id.into(),
            producer_id,
            producer_epoch: 0,
        }
    }

    pub fn id_and_epoch(&self) -> ProducerIdAndEpoch {
        ProducerIdAndEpoch::new(self.producer_id, self.producer_epoch)
    }

    /// One more bump would hit the wire limit
    pub fn epoch_exhausted(&self) -> bool {
        self.producer_epoch + 1 >= MAX_PRODUCER_EPOCH
    }

    pub fn bump_epoch(&mut self) {
        self.producer_epoch += 1;
    }

    /// Moves the session onto a fresh producer id at epoch 0
    pub fn rotate(
        &mut self,
        fresh_id: ProducerId,
    ) {
        self.producer_id = fresh_id;
        self.producer_epoch = 0;
    }

    /// Advances to the next epoch, rotating onto `fresh_id` once the epoch space
    /// is used up. `fresh_id` is only consumed on rotation.
    pub fn bump(
        &mut self,
        fresh_id: impl FnOnce() -> ProducerId,
    ) {
        if self.epoch_exhausted() {
            self.rotate(fresh_id());
        } else {
            self.bump_epoch();
        }
    }
}
