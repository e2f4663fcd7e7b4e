//! Error handling for Crescendo
//!
//! Faults on the real-time processing path never panic; they surface as
//! error values consumed by the control interface or logged.

use thiserror::Error;

/// Result type alias for Crescendo operations
pub type Result<T> = std::result::Result<T, CrescendoError>;

/// Main error type for Crescendo operations
#[derive(Error, Debug)]
pub enum CrescendoError {
    // Buffering Errors
    #[error("Frame queue overrun: dropped {dropped_samples} oldest samples")]
    BufferOverrun { dropped_samples: usize },

    // Parameter Errors
    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    // Configuration Errors (fatal at initialization only)
    #[error("Configuration conflict: {reason}")]
    ConfigurationConflict { reason: String },

    #[error("Unknown effect: {name}")]
    UnknownEffect { name: String },

    // Audio Errors
    #[error("Invalid audio: {reason}")]
    InvalidAudio { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrescendoError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            CrescendoError::BufferOverrun { .. } => "BUFFER_OVERRUN",
            CrescendoError::InvalidParameter { .. } => "INVALID_PARAMETER",
            CrescendoError::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            CrescendoError::ConfigurationConflict { .. } => "CONFIGURATION_CONFLICT",
            CrescendoError::UnknownEffect { .. } => "UNKNOWN_EFFECT",
            CrescendoError::InvalidAudio { .. } => "INVALID_AUDIO",
            CrescendoError::Io(_) => "IO_ERROR",
            CrescendoError::Wav(_) => "WAV_ERROR",
            CrescendoError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the engine in a usable state: an overrun
    /// drops the oldest data and keeps running, a rejected parameter update
    /// leaves the prior snapshot in effect.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CrescendoError::BufferOverrun { .. } => true,
            CrescendoError::InvalidParameter { .. } => true,
            CrescendoError::UnknownParameter { .. } => true,
            _ => false,
        }
    }
}
