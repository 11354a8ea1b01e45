//! Sidebar bridge: the cross-context layer between the sidebar frame, the host
//! page and the extension's privileged process.
//!
//! Responsibilities:
//! - holding the signed-in session and persisting it across frame reloads
//! - routing each API call either straight to the backend or through the
//!   privileged process, depending on what the current context can reach
//! - turning fire-and-forget runtime messaging into request/reply calls
//! - reacting to scrape results and autofill progress posted by the host page

pub mod account;
pub mod api;
pub mod config;
pub mod publisher;
pub mod scrape;
pub mod session;
pub mod status;
pub mod transport;

use thiserror::Error;

pub use api::{ApiClient, ApplicationStatus, Credentials, ProfileSeed, SignupForm};
pub use config::BridgeConfig;
pub use publisher::{fill_profile, HostPublisher};
pub use scrape::{ScrapeCoordinator, ScrapeLock, ScrapeOutcome};
pub use session::{Session, SessionStore, UserRef};
pub use status::{StatusRelay, StatusValue};
pub use transport::{ApiCall, ApiReply, Transport, TransportSelector};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Proto(#[from] bridge_proto::ProtoError),
    #[error(transparent)]
    Bus(#[from] frame_bus::BusError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
