pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod signaling;
pub mod streaming;
pub mod violation;

pub use auth::{Actor, Authenticator, Role, StaticTokenAuthenticator};
pub use config::Config;
pub use error::{MonitorError, Result};
pub use http::{create_router, AppState};
pub use session::{MonitoringSession, SessionRegistry, SessionReleaser, SessionStatus};
pub use signaling::{SignalingMessage, SignalingRelay};
pub use streaming::{spawn_sweeper, SegmentBuffer};
pub use violation::{ViolationAggregator, ViolationReport, ViolationStats, ViolationType};
