//! fc-core: shared types, IDs, errors, configuration, and the event system.
//!
//! This crate is the foundational dependency for the other fc-* crates. It
//! carries the job and batch model, the progress model that turns parsed
//! encoder output into snapshots, video metadata, application configuration,
//! and the event sink through which a batch reports to its host.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod media;
pub mod progress;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use job::{BatchState, ConversionJob, JobStatus};
pub use media::{AudioStream, VideoMetadata, VideoStream};
pub use progress::{ProgressField, ProgressSnapshot, ProgressTracker};
