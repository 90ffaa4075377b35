//! Error types.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::handler::{ExitStatus, Stage};

/// A boxed error, as returned by section providers and display hooks.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A required directory could not be created.
#[derive(Error, Debug)]
#[error(
    "Unable to create {what} directory. Does this software have read/write permissions for {}?",
    .path.display()
)]
pub struct ConfigurationError {
    /// Which directory, e.g. `log` or `working`.
    pub what: &'static str,
    /// The directory that could not be created.
    pub path: PathBuf,
    /// The underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Errors while opening, rotating or writing the log file.
#[derive(Error, Debug)]
pub enum LogError {
    /// The log directory could not be created.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The previous log could not be archived.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// The rendered report could not be written to disk.
#[derive(Error, Debug)]
#[error("failed to write crash report to {}", .path.display())]
pub struct PersistError {
    /// The file (or directory) that could not be written.
    pub path: PathBuf,
    /// The underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Returned by the crash handler when normal reporting was abandoned.
///
/// In production the process has been asked to terminate with `status` by the
/// time this value exists.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("crash handling failed while {stage}; terminating with {status}")]
pub struct HandlerError {
    /// The stage that failed.
    pub stage: Stage,
    /// The exit status passed to the terminator.
    pub status: ExitStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_mentions_permissions() {
        let error = ConfigurationError {
            what: "log",
            path: PathBuf::from("/nowhere/logs"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(
            error.to_string(),
            "Unable to create log directory. Does this software have read/write permissions for /nowhere/logs?"
        );
        assert!(core::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_handler_error_display() {
        let error = HandlerError {
            stage: Stage::Display,
            status: ExitStatus::DisplayFailure,
        };
        assert_eq!(
            error.to_string(),
            "crash handling failed while displaying the report; terminating with exit status -4"
        );
    }
}
