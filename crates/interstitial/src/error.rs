//! Error types for Interstitial

use thiserror::Error;

/// Main error type for Interstitial operations
#[derive(Error, Debug)]
pub enum InterstitialError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Proxy/HTTP errors
    #[error("Proxy error: {0}")]
    Proxy(String),
}

/// Result type alias for Interstitial operations
pub type Result<T> = std::result::Result<T, InterstitialError>;
