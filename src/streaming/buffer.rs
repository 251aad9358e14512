use super::store::{SegmentPayload, SegmentStore};
use crate::config::StreamingConfig;
use crate::error::{MonitorError, Result};
use crate::session::SessionReleaser;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Time windows and limits applied by the buffer
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub retention: Duration,
    pub inactivity: Duration,
    pub active_window: Duration,
    pub max_segment_bytes: usize,
}

impl From<&StreamingConfig> for RetentionPolicy {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            retention: Duration::seconds(config.retention_secs as i64),
            inactivity: Duration::seconds(config.inactivity_secs as i64),
            active_window: Duration::seconds(config.active_window_secs as i64),
            max_segment_bytes: config.max_segment_bytes,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

#[derive(Debug, Clone)]
struct Segment {
    arrived_at: DateTime<Utc>,
    payload: SegmentPayload,
}

/// Per-session bookkeeping
#[derive(Debug)]
struct SegmentTrack {
    segments: VecDeque<Segment>,
    last_update: DateTime<Utc>,

    /// Set once the track has been removed from the map; writers holding a
    /// stale reference must look the session up again
    evicted: bool,
}

impl SegmentTrack {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            segments: VecDeque::new(),
            last_update: now,
            evicted: false,
        }
    }

    /// Insert keeping arrival order
    fn insert(&mut self, segment: Segment) {
        let at = self
            .segments
            .partition_point(|existing| existing.arrived_at <= segment.arrived_at);
        self.segments.insert(at, segment);
    }

    /// Remove segments that arrived before `cutoff`
    fn prune(&mut self, cutoff: DateTime<Utc>) -> Vec<Segment> {
        let keep_from = self
            .segments
            .partition_point(|segment| segment.arrived_at < cutoff);
        self.segments.drain(..keep_from).collect()
    }
}

/// A session that uploaded recently
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStream {
    pub session_id: String,
    pub last_update: DateTime<Utc>,
}

/// Point-in-time copy of a session's retained segments
pub struct StreamSnapshot {
    segments: Vec<SegmentPayload>,
}

impl StreamSnapshot {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn content_length(&self) -> usize {
        self.segments.iter().map(SegmentPayload::len).sum()
    }

    /// Lazily read the segments one after another
    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        stream::iter(self.segments)
            .then(|payload| async move { payload.read().await })
            .boxed()
    }

    /// Read everything into one buffer
    pub async fn collect(self) -> io::Result<Bytes> {
        let mut out = Vec::with_capacity(self.content_length());
        let mut chunks = self.into_stream();
        while let Some(chunk) = chunks.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(out))
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub evicted_sessions: Vec<String>,
    pub dropped_segments: usize,
}

/// Rolling per-session window of uploaded video segments
pub struct SegmentBuffer {
    tracks: DashMap<String, Arc<Mutex<SegmentTrack>>>,
    store: Arc<dyn SegmentStore>,
    policy: RetentionPolicy,
    next_sequence: AtomicU64,

    /// Evicted sessions whose storage could not be purged yet, typically
    /// because a reader still held spooled segments
    unpurged: DashSet<String>,
}

impl SegmentBuffer {
    pub fn new(store: Arc<dyn SegmentStore>, policy: RetentionPolicy) -> Self {
        info!(
            "Segment buffer ready (store={}, retention={}s, inactivity={}s)",
            store.name(),
            policy.retention.num_seconds(),
            policy.inactivity.num_seconds()
        );

        Self {
            tracks: DashMap::new(),
            store,
            policy,
            next_sequence: AtomicU64::new(0),
            unpurged: DashSet::new(),
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Append a segment and prune those older than the retention window
    ///
    /// Returns the number of segments retained for the session afterwards.
    pub async fn push_segment(
        &self,
        session_id: &str,
        data: Bytes,
        arrived_at: DateTime<Utc>,
    ) -> Result<usize> {
        if data.len() > self.policy.max_segment_bytes {
            return Err(MonitorError::PayloadTooLarge {
                limit: self.policy.max_segment_bytes,
            });
        }
        if data.is_empty() {
            return Err(MonitorError::InvalidArgument("Segment is empty".to_string()));
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}.webm", arrived_at.timestamp_millis(), sequence);
        let size = data.len();

        // Storage I/O happens before any lock is taken
        let payload = self.store.put(session_id, &name, data).await?;
        let cutoff = arrived_at - self.policy.retention;

        let (retained, pruned) = loop {
            let track = Arc::clone(
                self.tracks
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(SegmentTrack::new(arrived_at))))
                    .value(),
            );

            let mut track = track.lock();
            if track.evicted {
                continue;
            }

            track.insert(Segment {
                arrived_at,
                payload,
            });
            track.last_update = track.last_update.max(arrived_at);
            let pruned = track.prune(cutoff);
            break (track.segments.len(), pruned);
        };

        debug!(
            "Session {}: stored segment {} ({} bytes), {} retained, {} pruned",
            session_id,
            name,
            size,
            retained,
            pruned.len()
        );

        // Dropping pruned payloads may delete spooled files
        drop(pruned);

        Ok(retained)
    }

    /// Snapshot of the retained segments as of now
    pub fn latest_stream(&self, session_id: &str) -> Result<StreamSnapshot> {
        self.latest_stream_at(session_id, Utc::now())
    }

    /// Snapshot of the segments retained at `now`, in arrival order
    pub fn latest_stream_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<StreamSnapshot> {
        let cutoff = now - self.policy.retention;

        let segments: Vec<SegmentPayload> = self
            .track(session_id)
            .map(|track| {
                let track = track.lock();
                let retained: Vec<SegmentPayload> = track
                    .segments
                    .iter()
                    .filter(|segment| segment.arrived_at >= cutoff && segment.arrived_at <= now)
                    .map(|segment| segment.payload.clone())
                    .collect();
                retained
            })
            .unwrap_or_default();

        if segments.is_empty() {
            return Err(MonitorError::NotFound(format!(
                "No active stream found for session {}",
                session_id
            )));
        }

        Ok(StreamSnapshot { segments })
    }

    pub fn list_active_streams(&self) -> Vec<ActiveStream> {
        self.list_active_streams_at(Utc::now())
    }

    /// Sessions whose latest segment arrived within the active window before `now`
    pub fn list_active_streams_at(&self, now: DateTime<Utc>) -> Vec<ActiveStream> {
        let since = now - self.policy.active_window;

        let mut active: Vec<ActiveStream> = self
            .snapshot_tracks()
            .into_iter()
            .filter_map(|(session_id, track)| {
                let track = track.lock();
                if track.evicted || track.segments.is_empty() || track.last_update < since {
                    return None;
                }
                Some(ActiveStream {
                    session_id,
                    last_update: track.last_update,
                })
            })
            .collect();

        active.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        active
    }

    /// Evict every session without an upload during the inactivity window before `now`
    ///
    /// Staleness is re-checked under the session lock at removal time, so a
    /// session that received a segment after the scan is kept.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - self.policy.inactivity;
        self.retry_purges().await;

        let candidates: Vec<String> = self
            .snapshot_tracks()
            .into_iter()
            .filter(|(_, track)| track.lock().last_update < cutoff)
            .map(|(session_id, _)| session_id)
            .collect();

        let mut report = SweepReport::default();

        for session_id in candidates {
            let removed = self.tracks.remove_if(&session_id, |_, track| {
                let mut track = track.lock();
                let stale = track.last_update < cutoff;
                if stale {
                    track.evicted = true;
                }
                stale
            });

            let Some((_, track)) = removed else {
                debug!("Session {} became active during sweep, keeping it", session_id);
                continue;
            };

            let segments = std::mem::take(&mut track.lock().segments);
            report.dropped_segments += segments.len();
            drop(segments);

            if let Err(e) = self.purge_storage(&session_id).await {
                warn!("Sweep failed to purge storage for session {}: {:#}", session_id, e);
            }

            report.evicted_sessions.push(session_id);
        }

        if !report.evicted_sessions.is_empty() {
            info!(
                "Sweep evicted {} session(s), {} segment(s)",
                report.evicted_sessions.len(),
                report.dropped_segments
            );
        }

        report
    }

    /// Purge a session's storage, remembering it for the next sweep on failure
    async fn purge_storage(&self, session_id: &str) -> anyhow::Result<()> {
        match self.store.purge(session_id).await {
            Ok(()) => {
                self.unpurged.remove(session_id);
                Ok(())
            }
            Err(e) => {
                self.unpurged.insert(session_id.to_string());
                Err(e)
            }
        }
    }

    async fn retry_purges(&self) {
        let pending: Vec<String> = self.unpurged.iter().map(|id| id.key().clone()).collect();

        for session_id in pending {
            // A tracked session is purged again when it is evicted or released
            if self.tracks.contains_key(&session_id) {
                self.unpurged.remove(&session_id);
                continue;
            }

            match self.store.purge(&session_id).await {
                Ok(()) => {
                    self.unpurged.remove(&session_id);
                    debug!("Purged leftover storage for session {}", session_id);
                }
                Err(e) => debug!("Storage for session {} still in use: {:#}", session_id, e),
            }
        }
    }

    pub fn is_tracked(&self, session_id: &str) -> bool {
        self.tracks.contains_key(session_id)
    }

    pub fn tracked_sessions(&self) -> usize {
        self.tracks.len()
    }

    fn track(&self, session_id: &str) -> Option<Arc<Mutex<SegmentTrack>>> {
        self.tracks
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Copy the map's entries so no shard lock is held while sessions are inspected
    fn snapshot_tracks(&self) -> Vec<(String, Arc<Mutex<SegmentTrack>>)> {
        self.tracks
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

#[async_trait]
impl SessionReleaser for SegmentBuffer {
    async fn release(&self, session_id: &str) -> anyhow::Result<()> {
        let Some((_, track)) = self.tracks.remove(session_id) else {
            return Ok(());
        };

        let segments = {
            let mut track = track.lock();
            track.evicted = true;
            std::mem::take(&mut track.segments)
        };
        info!(
            "Released {} segment(s) for ended session {}",
            segments.len(),
            session_id
        );
        drop(segments);

        self.purge_storage(session_id).await
    }

    fn name(&self) -> &str {
        "segment buffer"
    }
}
