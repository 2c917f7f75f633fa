//! Error taxonomy shared across the capture engine, controller and reconciler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A second `start()` while a capture is open. Rejected outright, never queued.
    #[error("capture already in progress")]
    AlreadyCapturing,

    /// `stop()` with no open capture. An error at the boundary, not a fault.
    #[error("no capture in progress")]
    NotCapturing,

    #[error("input listener crashed: {0}")]
    ListenerCrashed(String),

    #[error("failed to encode audio clip: {0}")]
    EncodeFailure(String),

    #[error("transcription backend error: {0}")]
    BackendFailure(String),

    #[error("failed to propagate {group} settings: {reason}")]
    ConfigPropagationFailure { group: &'static str, reason: String },

    /// An async completion superseded by a newer attempt. Never surfaced to the user.
    #[error("superseded by a newer request")]
    StaleRequest,

    #[error("settings store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;
