//! Turn raw encoder diagnostics into messages a user can act on.

use std::fmt;

/// Maximum characters of raw text included for unrecognized failures.
const EXCERPT_CHARS: usize = 200;

/// Broad cause of a failed conversion, inferred from diagnostic text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    FileNotFound,
    PermissionDenied,
    InvalidData,
    MissingCodec,
    DiskFull,
    OutOfMemory,
    OpenOutputFailed,
    Timeout,
    Unknown,
}

impl FailureKind {
    /// Headline and suggestion for this kind of failure.
    fn advice(self) -> (&'static str, &'static str) {
        match self {
            Self::FileNotFound => (
                "File not found.",
                "The input file may have been moved or deleted during conversion.",
            ),
            Self::PermissionDenied => (
                "Permission denied.",
                "The file may be locked by another program or you lack permission to access it.",
            ),
            Self::InvalidData => (
                "Invalid or corrupted video file.",
                "The file may be damaged or in an unsupported format.",
            ),
            Self::MissingCodec => (
                "Required video codec not available.",
                "Your ffmpeg build may be missing required encoders.",
            ),
            Self::DiskFull => ("Not enough disk space.", "Free up some disk space and try again."),
            Self::OutOfMemory => ("Out of memory.", "Close some applications and try again."),
            Self::OpenOutputFailed => (
                "Cannot create output file.",
                "Check that the output directory is writable and has enough space.",
            ),
            Self::Timeout => (
                "Conversion timed out.",
                "The file may be too large or complex to convert.",
            ),
            Self::Unknown => (
                "Video conversion failed.",
                "The file may be corrupted or in an incompatible format, or there may be a system issue.",
            ),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FileNotFound => "file_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidData => "invalid_data",
            Self::MissingCodec => "missing_codec",
            Self::DiskFull => "disk_full",
            Self::OutOfMemory => "out_of_memory",
            Self::OpenOutputFailed => "open_output_failed",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify diagnostic text. Checks run in priority order; first match wins.
pub fn classify(diagnostic: &str) -> FailureKind {
    let lower = diagnostic.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("no such file or directory") {
        FailureKind::FileNotFound
    } else if has("permission denied") {
        FailureKind::PermissionDenied
    } else if has("invalid data") || has("invalid argument") {
        FailureKind::InvalidData
    } else if has("codec not found") || has("unknown encoder") {
        FailureKind::MissingCodec
    } else if has("disk full") || has("no space left") {
        FailureKind::DiskFull
    } else if has("out of memory") || has("cannot allocate memory") {
        FailureKind::OutOfMemory
    } else if has("could not open") && has("output") {
        FailureKind::OpenOutputFailed
    } else if has("timeout") || has("timed out") {
        FailureKind::Timeout
    } else {
        FailureKind::Unknown
    }
}

/// Human-readable explanation of a failure.
///
/// Unrecognized text gets a generic message with the first 200 characters of
/// the raw diagnostic attached.
pub fn describe_failure(diagnostic: &str) -> String {
    let kind = classify(diagnostic);
    let (headline, hint) = kind.advice();
    if kind != FailureKind::Unknown {
        return format!("{headline}\n\n{hint}");
    }

    let excerpt: String = diagnostic.trim().chars().take(EXCERPT_CHARS).collect();
    format!("{headline}\n\n{hint}\n\nTechnical details: {excerpt}")
}
