use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to one stored segment's bytes
///
/// Clones share the same underlying storage. Spooled files are removed when
/// the last handle is dropped, so a reader holding a snapshot keeps its
/// segments readable even if the buffer has pruned them meanwhile.
#[derive(Debug, Clone)]
pub enum SegmentPayload {
    Memory(Bytes),
    Disk(Arc<SpooledSegment>),
}

impl SegmentPayload {
    pub fn len(&self) -> usize {
        match self {
            SegmentPayload::Memory(bytes) => bytes.len(),
            SegmentPayload::Disk(file) => file.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn read(&self) -> io::Result<Bytes> {
        match self {
            SegmentPayload::Memory(bytes) => Ok(bytes.clone()),
            SegmentPayload::Disk(file) => tokio::fs::read(&file.path).await.map(Bytes::from),
        }
    }
}

/// A segment written to the spool directory
#[derive(Debug)]
pub struct SpooledSegment {
    path: PathBuf,
    len: usize,
}

impl SpooledSegment {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledSegment {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted segment {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete segment {:?}: {}", self.path, e),
        }
    }
}

/// Where segment bytes are kept while retained
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Store one segment for `session_id` under `name`
    async fn put(&self, session_id: &str, name: &str, data: Bytes) -> Result<SegmentPayload>;

    /// Remove any per-session storage left after all segments were dropped
    async fn purge(&self, session_id: &str) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Keeps segment bytes in memory
#[derive(Debug, Default)]
pub struct MemorySegmentStore;

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn put(&self, _session_id: &str, _name: &str, data: Bytes) -> Result<SegmentPayload> {
        Ok(SegmentPayload::Memory(data))
    }

    async fn purge(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Spools segments to `<root>/<session_id>/<name>`
#[derive(Debug)]
pub struct DiskSegmentStore {
    root: PathBuf,
}

impl DiskSegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create spool directory {:?}", root))?;

        info!("Segment spool directory: {:?}", root);

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        let safe = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            bail!("Session id {:?} is not usable as a directory name", session_id);
        }
        Ok(self.root.join(session_id))
    }
}

#[async_trait]
impl SegmentStore for DiskSegmentStore {
    async fn put(&self, session_id: &str, name: &str, data: Bytes) -> Result<SegmentPayload> {
        let dir = self.session_dir(session_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {:?}", dir))?;

        let path = dir.join(name);
        tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("Failed to write segment {:?}", path))?;

        Ok(SegmentPayload::Disk(Arc::new(SpooledSegment {
            path,
            len: data.len(),
        })))
    }

    async fn purge(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", dir)),
        }
    }

    fn name(&self) -> &str {
        "disk"
    }
}
