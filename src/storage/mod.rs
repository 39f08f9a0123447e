mod factory;
mod mem_log;
mod replicated_log;
mod sled_log;

#[cfg(test)]
mod mem_log_test;
#[cfg(test)]
mod sled_log_test;

use std::path::Path;

#[doc(hidden)]
pub use factory::*;
#[doc(hidden)]
pub use mem_log::*;
#[doc(hidden)]
pub use replicated_log::*;
#[doc(hidden)]
pub use sled_log::*;
use tracing::debug;
use tracing::warn;

use crate::Result;
use crate::StorageError;

/// Opens the sled database holding every replicated log of this node
pub fn init_sled_log_db(sled_db_root_path: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    debug!("init_sled_log_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref().join("replicated_logs");

    sled::Config::default()
        .path(&path)
        .cache_capacity(64 * 1024 * 1024)
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            StorageError::DbError(e.to_string()).into()
        })
}
