//! # fc-av
//!
//! External tool supervision for the frameconv batch converter.
//!
//! This crate provides:
//!
//! - **Command execution** ([`ToolCommand`]) -- one-shot tool runs with a
//!   time bound, used for probing and availability checks.
//! - **Tool discovery** ([`ToolRegistry`]) -- locate ffmpeg and ffprobe and
//!   detect hardware encoders.
//! - **Progress parsing** ([`progress::parse_line`]) -- decode ffmpeg's
//!   `-progress` key=value stream one line at a time.
//! - **Process supervision** ([`EncoderProcess`]) -- run one encode with
//!   stderr draining, cancellation and exit-code interpretation.
//! - **Metadata analysis** ([`FfprobeAnalyzer`]) -- duration, resolution and
//!   codecs for an input file.
//! - **Helpers** -- output size estimation, encoder argument construction,
//!   collision-free output naming, and failure text classification.

pub mod command;
pub mod diagnostics;
pub mod encode;
pub mod estimate;
pub mod naming;
pub mod probe;
pub mod progress;
pub mod supervisor;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use diagnostics::{classify, describe_failure, FailureKind};
pub use encode::EncoderArgs;
pub use estimate::{estimate_output_bytes, estimate_output_mb};
pub use naming::resolve_output_path;
pub use probe::FfprobeAnalyzer;
pub use supervisor::{EncodeOutcome, EncoderProcess, SupervisorState};
pub use tools::{ToolInfo, ToolRegistry};
