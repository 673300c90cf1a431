//! Error types for abex.
//!
//! Uses `thiserror` for structured error types.
//!
//! Note the split between this module and [`crate::core::http::CallOutcome`]:
//! `AbexError` covers the crate's fallible surface (configuration, client
//! construction, I/O, CLI input), while per-attempt outcomes of outbound
//! calls are a separate closed enum that the dispatcher consumes internally
//! and never surfaces to callers.

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Network issues (client construction, connectivity).
    Network,
    /// Provider-specific issues (unusable credentials, endpoint problems).
    Provider,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration error",
            Self::Network => "Network error",
            Self::Provider => "Provider error",
            Self::Internal => "Internal error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Main error type for abex operations.
#[derive(Error, Debug)]
pub enum AbexError {
    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Configuration file not found at expected path.
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    /// No API credentials configured.
    #[error("no API credentials configured")]
    NoCredentials,

    /// No endpoint/model configurations in the catalog.
    #[error("empty endpoint/model catalog")]
    EmptyCatalog,

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// All credentials in the pool are disabled.
    #[error("all credentials in the pool are disabled")]
    PoolExhausted,

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Generic wrapper (Category: Internal)
    // ==========================================================================
    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AbexError {
    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::NoCredentials
            | Self::EmptyCatalog => ErrorCategory::Configuration,

            Self::ClientBuild(_) | Self::Network(_) => ErrorCategory::Network,

            Self::PoolExhausted => ErrorCategory::Provider,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns whether the error is potentially recoverable by retrying.
    ///
    /// Pool exhaustion heals itself once a disable window elapses; network
    /// errors are transient. Configuration errors are not retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::PoolExhausted)
    }
}

/// Result type alias for abex operations.
pub type Result<T> = std::result::Result<T, AbexError>;

// =============================================================================
// Tests
// =============================================================================
