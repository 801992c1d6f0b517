//! # fc-batch
//!
//! Runs a list of input files through ffmpeg one at a time.
//!
//! [`BatchSequencer`] probes each input, supervises its encoder and reports
//! through an [`fc_core::events::EventSink`]. A failed file does not stop the
//! batch; cancellation does. [`BatchHandle`] drives a batch running on its own
//! task.

pub mod sequencer;

pub use sequencer::{BatchHandle, BatchSequencer, JobContext};
