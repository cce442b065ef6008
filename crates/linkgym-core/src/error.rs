//! Error types for the linkgym core crate.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum LinkGymError {
    /// Startup configuration is missing, malformed, or inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// A threshold lookup missed even after a full table rebuild.
    ///
    /// The capability set and the threshold table are permanently out of
    /// sync. This is a programming error, not a runtime condition to
    /// recover from.
    #[error("no threshold for mode {mode} nss {nss} width {width_mhz} MHz after rebuild")]
    ThresholdDesync {
        /// Mode name that the catalog claims but the table cannot price
        mode: String,
        /// Spatial stream count of the failed lookup
        nss: u8,
        /// Channel width of the failed lookup
        width_mhz: u16,
    },

    /// The mode catalog is empty for the negotiated capabilities
    #[error("empty mode catalog for the negotiated capabilities")]
    EmptyCatalog,

    /// A mode index is outside the range its modulation class allows
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for linkgym operations
pub type Result<T> = std::result::Result<T, LinkGymError>;
