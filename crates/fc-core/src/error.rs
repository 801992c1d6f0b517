//! Unified error type for frameconv.
//!
//! Library crates funnel their failures into [`Error`]. Most of these never
//! reach the host directly: the supervisor and sequencer turn them into
//! terminal outcomes and events, so the variants mainly carry enough context
//! for logging and for the failure text shown to the user.

use std::time::Duration;

/// Unified error type covering all failure modes in frameconv.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be parsed or is unusable.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool could not be started.
    #[error("Launch error [{tool}]: {message}")]
    Launch {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool (ffmpeg, ffprobe) ran but reported an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool exceeded its time bound.
    #[error("Timeout [{tool}]: no result after {after:?}")]
    Timeout {
        /// Name of the tool that timed out.
        tool: String,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// Media probing produced no usable metadata.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Launch`].
    pub fn launch(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Launch {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Timeout`].
    pub fn timeout(tool: impl Into<String>, after: Duration) -> Self {
        Error::Timeout {
            tool: tool.into(),
            after,
        }
    }

    /// Whether this error came from a time bound rather than a tool failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::Validation("no input files".into());
        assert_eq!(err.to_string(), "Validation error: no input files");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn launch_display() {
        let err = Error::launch("ffmpeg", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Launch error [ffmpeg]: No such file or directory"
        );
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffprobe", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffprobe]: exit code 1");
    }

    #[test]
    fn timeout_display_and_predicate() {
        let err = Error::timeout("ffprobe", Duration::from_secs(30));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timeout [ffprobe]: no result after 30s");
        assert!(!Error::Probe("x".into()).is_timeout());
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
