//! Error handling for the updater
//!
//! Every pipeline step reports failures through [`AbuError`]. Each variant maps
//! to a stable, machine readable code (see [`AbuError::code`]) so that the host
//! UI can react to a failure without parsing messages. The CLI wraps errors in
//! [`ErrorContext`] to attach a suggestion before printing them.
//!
//! # Error Categories
//!
//! - **Transport**: [`AbuError::HttpError`], [`AbuError::NetworkError`], [`AbuError::Cancelled`]
//! - **Trust**: [`AbuError::VerificationFailed`], [`AbuError::PayloadMalformed`]
//! - **Layout**: [`AbuError::PathTraversal`], [`AbuError::ManifestValidationFailed`]
//! - **Orchestration**: [`AbuError::ParamsInvalid`], [`AbuError::SingleFlightRejected`]
//! - **Environment**: [`AbuError::IoError`], [`AbuError::PlatformUnsupported`],
//!   [`AbuError::ConfigError`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use abu_cli::core::{AbuError, user_friendly_error};
//!
//! let error = AbuError::VerificationFailed {
//!     reason: "digest mismatch".to_string(),
//! };
//! assert_eq!(error.code(), "VERIFICATION_FAILED");
//!
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Result alias used by the library modules.
pub type Result<T> = std::result::Result<T, AbuError>;

/// The error type for every updater operation.
#[derive(Error, Debug)]
pub enum AbuError {
    /// Server answered with a non-success status
    #[error("HTTP request to {url} failed with status {code}")]
    HttpError {
        /// HTTP status code
        code: u16,
        /// Requested URL
        url: String,
    },

    /// Connection, TLS or body transfer failure
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// What was being attempted
        operation: String,
        /// Underlying transport message
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A digest or signature did not check out
    #[error("Verification failed: {reason}")]
    VerificationFailed {
        /// Which check failed
        reason: String,
    },

    /// The trusted payload had an unexpected shape
    #[error("Trusted payload is malformed: {reason}")]
    PayloadMalformed {
        /// What was wrong with the payload
        reason: String,
    },

    /// An archive entry or manifest key points outside its root
    #[error("Path escapes the destination directory: {entry}")]
    PathTraversal {
        /// Offending entry name
        entry: String,
    },

    /// A declared bundle file is missing or does not match its digest
    #[error("Manifest validation failed for '{path}': {reason}")]
    ManifestValidationFailed {
        /// Bundle-relative path
        path: String,
        /// Why validation failed
        reason: String,
    },

    /// Caller supplied missing or invalid parameters
    #[error("Invalid parameters: {reason}")]
    ParamsInvalid {
        /// Which parameter and why
        reason: String,
    },

    /// A second transfer was requested while one is in flight
    #[error("A {class} download is already in progress")]
    SingleFlightRejected {
        /// Artifact class name
        class: String,
    },

    /// Operation cannot run on this platform or archive format
    #[error("Operation not supported: {operation}")]
    PlatformUnsupported {
        /// What is unsupported
        operation: String,
    },

    /// Download was cancelled by the caller
    #[error("Download was cancelled")]
    Cancelled,

    /// Configuration file problems
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message
        message: String,
    },
}

impl AbuError {
    /// Stable identifier surfaced to the host UI.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::HttpError {
                ..
            } => "HTTP_ERROR",
            Self::NetworkError {
                ..
            } => "NETWORK_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::VerificationFailed {
                ..
            } => "VERIFICATION_FAILED",
            Self::PayloadMalformed {
                ..
            } => "PAYLOAD_MALFORMED",
            Self::PathTraversal {
                ..
            } => "PATH_TRAVERSAL",
            Self::ManifestValidationFailed {
                ..
            } => "MANIFEST_VALIDATION_FAILED",
            Self::ParamsInvalid {
                ..
            } => "PARAMS_INVALID",
            Self::SingleFlightRejected {
                ..
            } => "SINGLE_FLIGHT_REJECTED",
            Self::PlatformUnsupported {
                ..
            } => "PLATFORM_UNSUPPORTED",
            Self::Cancelled => "CANCELLED",
            Self::ConfigError {
                ..
            } => "CONFIG_ERROR",
        }
    }

    pub(crate) fn params(reason: impl Into<String>) -> Self {
        Self::ParamsInvalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn verification(reason: impl Into<String>) -> Self {
        Self::VerificationFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::PayloadMalformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn manifest(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestValidationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl Clone for AbuError {
    fn clone(&self) -> Self {
        match self {
            Self::HttpError {
                code,
                url,
            } => Self::HttpError {
                code: *code,
                url: url.clone(),
            },
            Self::NetworkError {
                operation,
                reason,
            } => Self::NetworkError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::VerificationFailed {
                reason,
            } => Self::VerificationFailed {
                reason: reason.clone(),
            },
            Self::PayloadMalformed {
                reason,
            } => Self::PayloadMalformed {
                reason: reason.clone(),
            },
            Self::PathTraversal {
                entry,
            } => Self::PathTraversal {
                entry: entry.clone(),
            },
            Self::ManifestValidationFailed {
                path,
                reason,
            } => Self::ManifestValidationFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ParamsInvalid {
                reason,
            } => Self::ParamsInvalid {
                reason: reason.clone(),
            },
            Self::SingleFlightRejected {
                class,
            } => Self::SingleFlightRejected {
                class: class.clone(),
            },
            Self::PlatformUnsupported {
                operation,
            } => Self::PlatformUnsupported {
                operation: operation.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
        }
    }
}

// Persisted state is JSON; a parse failure of our own files is an IO-level problem.
impl From<serde_json::Error> for AbuError {
    fn from(error: serde_json::Error) -> Self {
        Self::IoError(error.into())
    }
}

impl From<reqwest::Error> for AbuError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::HttpError {
                code: status.as_u16(),
                url: error.url().map(ToString::to_string).unwrap_or_default(),
            };
        }
        let operation = if error.is_connect() {
            "connect"
        } else if error.is_timeout() {
            "request timeout"
        } else if error.is_body() || error.is_decode() {
            "body transfer"
        } else {
            "request"
        };
        Self::NetworkError {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for AbuError {
    fn from(error: zip::result::ZipError) -> Self {
        use zip::result::ZipError;
        match error {
            ZipError::Io(e) => Self::IoError(e),
            ZipError::UnsupportedArchive(what) => Self::PlatformUnsupported {
                operation: format!("archive feature: {what}"),
            },
            other => Self::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}

impl From<toml::de::Error> for AbuError {
    fn from(error: toml::de::Error) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// When displayed, errors show:
/// 1. **Error**: the stable code and message in red
/// 2. **Details**: additional context in yellow (optional)
/// 3. **Suggestion**: what to do next in green (optional)
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: AbuError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: AbuError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{} [{}]: {}", "error".red().bold(), self.error.code(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error.code(), self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-facing [`ErrorContext`].
///
/// Updater errors anywhere in the `anyhow` chain get tailored suggestions; IO
/// errors are wrapped; anything else keeps its message and cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(abu_error) = error.chain().find_map(|e| e.downcast_ref::<AbuError>()) {
        let ctx = create_error_context(abu_error.clone());
        if error.downcast_ref::<AbuError>().is_none() {
            return ctx.with_details(error.to_string());
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let kind = io_error.kind();
        let ctx = ErrorContext::new(AbuError::IoError(std::io::Error::new(
            kind,
            io_error.to_string(),
        )));
        return match kind {
            std::io::ErrorKind::PermissionDenied => ctx
                .with_suggestion("Check ownership and permissions of the data directory"),
            std::io::ErrorKind::NotFound => {
                ctx.with_suggestion("Check that the file or directory exists and the path is correct")
            }
            _ => ctx,
        };
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(AbuError::IoError(std::io::Error::other(message)))
}

fn create_error_context(error: AbuError) -> ErrorContext {
    match &error {
        AbuError::HttpError {
            code,
            ..
        } if *code == 404 => ErrorContext::new(error)
            .with_suggestion("The release artifact was not found; check the download URL"),
        AbuError::HttpError {
            ..
        }
        | AbuError::NetworkError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and retry the update"),
        AbuError::VerificationFailed {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("The downloaded artifact was discarded; retry the download")
            .with_details("Digest or signature checks failed, so the file is not trusted"),
        AbuError::PayloadMalformed {
            ..
        } => ErrorContext::new(error)
            .with_details("The signature was valid but its payload is not in the expected format"),
        AbuError::PathTraversal {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run 'abu clear' to remove the untrusted extraction directory")
            .with_details("The archive contains entries that would be written outside the bundle"),
        AbuError::ManifestValidationFailed {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run 'abu clear' and download the bundle again")
            .with_details("The extracted bundle does not match its signed manifest"),
        AbuError::ParamsInvalid {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the update-check document for missing fields"),
        AbuError::SingleFlightRejected {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Wait for the running download to finish or cancel it"),
        AbuError::ConfigError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the syntax of your abu config file"),
        _ => ErrorContext::new(error),
    }
}
