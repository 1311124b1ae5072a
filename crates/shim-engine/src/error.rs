//! Error types for the reference engine
//!
//! Script-level failures are engine exceptions (`Err(RawHandle)`); this type
//! covers the host-level ones: configuration and thread setup.

/// Result type for engine setup
pub type EngineSetupResult<T> = Result<T, EngineError>;

/// Host-level engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An option value could not be parsed
    #[error("Invalid value {value:?} for {name}")]
    InvalidOption {
        /// Option (environment variable) name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// A worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
