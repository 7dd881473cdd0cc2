//! Error taxonomy shared by the channel, store and controller layers.

use crate::model::AffordanceRef;
use std::time::Duration;
use thiserror::Error;

/// Input rejected at the boundary before it reaches the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please input chunk coordinates in the format: `chunkX chunkZ` (e.g., `10 12`)")]
    Coordinates,
    #[error(
        "Name must be 1-20 characters, only letters, numbers, underscores, or hyphens. No spaces or special characters allowed."
    )]
    Name,
    #[error("Unknown dimension `{0}` (expected overworld, nether or end)")]
    Dimension(String),
    #[error("Affordance must be written as `<channel_id>:<message_id>`, got `{0}`")]
    Affordance(String),
}

/// Failure talking to the remote server. The remote state is indeterminate
/// whenever one of these is returned.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("command rejected before sending: {0}")]
    InvalidCommand(String),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no reply from remote server within {0:?}")]
    Timeout(Duration),
    #[error("remote server rejected the RCON password")]
    AuthRejected,
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed RCON packet: {0}")]
    Protocol(String),
}

/// Durable session state could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("session store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The UI boundary could not create or reach an affordance.
#[derive(Debug, Clone, Error)]
#[error("affordance host error: {0}")]
pub struct HostError(pub String);

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("a replay named `{0}` is already recording")]
    AlreadyRecording(String),
    #[error("no replay session is bound to affordance {0}")]
    UnknownAffordance(AffordanceRef),
    #[error("replay `{0}` is not recording")]
    NotRecording(String),
    #[error("replay `{0}` has no artifact yet; stop it before downloading")]
    ArtifactPending(String),
    #[error("remote command failed, remote state is unknown: {0}")]
    Channel(#[from] ChannelError),
    #[error("session {affordance} changed in memory but was not persisted: {source}")]
    Store {
        affordance: AffordanceRef,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Host(#[from] HostError),
}
