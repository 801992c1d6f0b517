//! ffprobe-based metadata analysis.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON into [`VideoMetadata`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use fc_core::config::ToolsConfig;
use fc_core::{AudioStream, Error, VideoMetadata, VideoStream};
use serde::Deserialize;

use crate::command::ToolCommand;
use crate::estimate::estimate_output_bytes;

/// Metadata analyzer backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeAnalyzer {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeAnalyzer {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    /// Use the configured ffprobe path, or `ffprobe` from `PATH`.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let path = tools
            .ffprobe_path
            .clone()
            .or_else(|| which::which("ffprobe").ok())
            .unwrap_or_else(|| PathBuf::from("ffprobe"));
        Self::new(path, tools.probe_timeout())
    }

    /// Analyze `path`, returning `None` on any failure.
    ///
    /// The reason is logged; use [`Self::try_analyze`] to get it instead.
    pub async fn analyze(&self, path: &Path) -> Option<VideoMetadata> {
        match self.try_analyze(path).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Metadata analysis failed: {e}");
                None
            }
        }
    }

    pub async fn try_analyze(&self, path: &Path) -> fc_core::Result<VideoMetadata> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.timeout(self.timeout);

        let output = cmd.execute().await?;

        let input_size_bytes = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::debug!(path = %path.display(), "Could not stat input: {e}");
                0
            }
        };

        let meta = parse_probe_output(path, &output.stdout, input_size_bytes)?;
        tracing::debug!(
            path = %path.display(),
            duration = meta.duration_secs,
            resolution = %meta.resolution(),
            "Probed input"
        );
        Ok(meta)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Map raw ffprobe JSON to metadata. The first video and first audio stream win.
fn parse_probe_output(
    path: &Path,
    json: &str,
    input_size_bytes: u64,
) -> fc_core::Result<VideoMetadata> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let duration_secs = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let bit_rate = output
        .format
        .bit_rate
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let mut video = None;
    let mut audio = None;

    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") if video.is_none() => {
                video = Some(VideoStream {
                    codec: stream.codec_name.unwrap_or_else(|| "unknown".into()),
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    frame_rate: stream
                        .r_frame_rate
                        .as_deref()
                        .map_or(0.0, parse_frame_rate),
                    pixel_format: stream.pix_fmt.unwrap_or_else(|| "unknown".into()),
                });
            }
            Some("audio") if audio.is_none() => {
                audio = Some(AudioStream {
                    codec: stream.codec_name.unwrap_or_else(|| "unknown".into()),
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                    channels: stream.channels.unwrap_or(0),
                });
            }
            _ => {}
        }
    }

    let video = video
        .ok_or_else(|| Error::Probe(format!("no video stream in {}", path.display())))?;

    let mut meta = VideoMetadata {
        path: path.to_path_buf(),
        duration_secs,
        bit_rate,
        format_name: output.format.format_name.unwrap_or_else(|| "unknown".into()),
        video,
        audio,
        input_size_bytes,
        estimated_output_size_bytes: 0,
    };
    meta.estimated_output_size_bytes = estimate_output_bytes(&meta);
    Ok(meta)
}

/// Parse `"num/den"` or a bare number. Zero denominators and garbage give 0.0.
fn parse_frame_rate(rate: &str) -> f64 {
    let parsed = match rate.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(num), Ok(den)) if den != 0.0 => Some(num / den),
            _ => None,
        },
        None => rate.trim().parse::<f64>().ok(),
    };
    parsed.filter(|r| r.is_finite() && *r >= 0.0).unwrap_or(0.0)
}
