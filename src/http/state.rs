use crate::auth::{Authenticator, StaticTokenAuthenticator};
use crate::config::Config;
use crate::session::{SessionRegistry, SessionReleaser};
use crate::signaling::SignalingRelay;
use crate::streaming::{store_from_config, RetentionPolicy, SegmentBuffer, SegmentStore};
use crate::violation::ViolationAggregator;
use anyhow::Result;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Sessions, counters and peer handles
    pub registry: Arc<SessionRegistry>,

    pub aggregator: Arc<ViolationAggregator>,

    /// Signaling channels (session_id → channel)
    pub relay: Arc<SignalingRelay>,

    /// Retained video segments (session_id → segments)
    pub buffer: Arc<SegmentBuffer>,

    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Build state from configuration: segment store per `[streaming]`, tokens per `[auth]`
    pub fn new(config: Config) -> Result<Self> {
        let store = store_from_config(&config.streaming)?;
        let authenticator = Arc::new(StaticTokenAuthenticator::new(&config.auth.tokens));
        Ok(Self::with_parts(config, store, authenticator))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn SegmentStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let relay = Arc::new(SignalingRelay::new());
        let buffer = Arc::new(SegmentBuffer::new(
            store,
            RetentionPolicy::from(&config.streaming),
        ));

        // Ending a session releases its channel and its segments
        let releasers: Vec<Arc<dyn SessionReleaser>> = vec![relay.clone(), buffer.clone()];
        let registry = Arc::new(SessionRegistry::with_releasers(releasers));

        let aggregator = Arc::new(ViolationAggregator::new(
            Arc::clone(&registry),
            config.violations.history_limit,
        ));

        Self {
            config: Arc::new(config),
            registry,
            aggregator,
            relay,
            buffer,
            authenticator,
        }
    }
}
