//! Custom error types for the application.
//!
//! This module defines the primary error type, `TomoError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to classify the failures a measurement run can hit.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from the `figment` crate, typically related to
//!   file parsing or format issues in the configuration file.
//! - **`Configuration`**: Semantic errors in the configuration, such as a
//!   missing screenshot template or a stage list that is not exactly four
//!   entries long. These are caught during the validation step, before any
//!   hardware motion.
//! - **`Table`**: A malformed row in the motion table, reported with the
//!   offending line number and raw content.
//! - **`Io`**: Wraps standard `std::io::Error`.
//! - **`Motion`**: A stage failed to settle or rejected a command. Fatal for
//!   the whole run, since stage position is no longer trustworthy.
//! - **`Processing`**: Errors during the post-processing pass over saved CSVs.
//! - **`FeatureNotEnabled`**: Raised when a hardware or screen backend was not
//!   compiled in. Tells the user which feature flag to enable.
//!
//! Acquisition failures (a template not located, a save dialog that never
//! appeared) are deliberately *not* part of this enum: they are recoverable at
//! the run level and live in [`crate::acquisition::AcquisitionFailure`]. Only
//! configuration and motion errors propagate to a non-zero process exit.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, TomoError>;

/// Application-level error taxonomy.
#[derive(Error, Debug)]
pub enum TomoError {
    /// Configuration file could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A non-ignorable motion-table row that could not be parsed.
    #[error("Malformed motion table row at line {line}: '{content}'")]
    Table {
        /// 1-based line number in the table file.
        line: usize,
        /// The raw offending line, trimmed.
        content: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage failed to settle or rejected a command. Fatal for the run.
    #[error("Motion fault: {0}")]
    Motion(String),

    /// Post-processing error.
    #[error("Data processing error: {0}")]
    Processing(String),

    /// A backend was requested that is not compiled into this binary.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(&'static str),
}
