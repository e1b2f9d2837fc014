//! Error types for sbc-core

use border_stir_core::StirError;
use thiserror::Error;

/// Result type alias for border pipeline operations
pub type Result<T> = std::result::Result<T, BorderError>;

/// Errors surfaced by the border pipeline and its subsystems.
///
/// Admission, policy and validation outcomes are not errors; they come back
/// as synthetic responses from [`crate::BorderPipeline::process_message`].
#[derive(Error, Debug)]
pub enum BorderError {
    /// Invalid configuration detected at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// STIR/SHAKEN failure
    #[error("STIR error: {0}")]
    Stir(#[from] StirError),

    /// Dialed number is not in the emergency table
    #[error("Not an emergency number: {0}")]
    NotEmergency(String),

    /// None of the location headers are present
    #[error("No location information found")]
    NoLocation,

    /// A method handler failed
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}
