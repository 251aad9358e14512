//! Live stream segment buffer
//!
//! Capture devices upload short video segments; the buffer keeps only the
//! most recent retention window per session and serves the retained segments
//! back concatenated as a pseudo-live stream. A background sweeper evicts
//! sessions that stopped uploading.

mod buffer;
mod store;
mod sweep;

pub use buffer::{ActiveStream, RetentionPolicy, SegmentBuffer, StreamSnapshot, SweepReport};
pub use store::{
    DiskSegmentStore, MemorySegmentStore, SegmentPayload, SegmentStore, SpooledSegment,
};
pub use sweep::spawn_sweeper;

use crate::config::{StorageKind, StreamingConfig};
use anyhow::Result;
use std::sync::Arc;

/// Build the segment store selected in configuration
pub fn store_from_config(config: &StreamingConfig) -> Result<Arc<dyn SegmentStore>> {
    let store: Arc<dyn SegmentStore> = match config.storage {
        StorageKind::Memory => Arc::new(MemorySegmentStore),
        StorageKind::Disk => Arc::new(DiskSegmentStore::new(config.spool_dir.clone())?),
    };
    Ok(store)
}
