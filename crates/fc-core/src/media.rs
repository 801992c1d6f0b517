//! Video metadata and the human-readable formatting used to present it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata for one input file, gathered once before it is converted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub path: PathBuf,
    /// Container duration in seconds (0.0 when the probe did not report one).
    pub duration_secs: f64,
    /// Overall bit rate in bits per second.
    pub bit_rate: u64,
    pub format_name: String,
    /// First video stream in the file.
    pub video: VideoStream,
    /// First audio stream, `None` for silent files.
    pub audio: Option<AudioStream>,
    pub input_size_bytes: u64,
    pub estimated_output_size_bytes: u64,
}

impl VideoMetadata {
    /// Duration if the probe reported a usable one.
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration_secs > 0.0).then_some(self.duration_secs)
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.video.width, self.video.height)
    }

    /// Audio codec name, or `"none"` for files without audio.
    pub fn audio_codec(&self) -> &str {
        self.audio.as_ref().map_or("none", |a| a.codec.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second; 0.0 when unknown.
    pub frame_rate: f64,
    pub pixel_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Label a vertical resolution the way users talk about it.
pub fn resolution_label(height: u32) -> String {
    match height {
        h if h >= 2160 => "4K".to_string(),
        h if h >= 1440 => "1440p".to_string(),
        h if h >= 1080 => "1080p".to_string(),
        h if h >= 720 => "720p".to_string(),
        h if h >= 480 => "480p".to_string(),
        h => format!("{h}p"),
    }
}

/// `HH:MM:SS`, always with hours.
pub fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// `MM:SS` for short media, `HH:MM:SS` once there is an hour.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let hours = total / 3600;
    if hours > 0 {
        format_clock(secs)
    } else {
        format!("{:02}:{:02}", (total % 3600) / 60, total % 60)
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}
