//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and is passed
//! explicitly to whatever needs it; there is no process-wide settings object.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub conversion: ConversionConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("parse error: {e}")))
    }

    /// Load configuration from `path`, or return defaults when no path is
    /// given. A path that cannot be read or parsed is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("No config file given; using defaults");
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("parse error in {}: {e}", path.display())))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(crf) = self.conversion.custom_crf {
            if crf > 51 {
                warnings.push(format!(
                    "conversion.custom_crf {crf} is outside 0..=51 and will be ignored"
                ));
            }
        }

        if self.conversion.use_gpu && self.conversion.hw_accel == Some(HwAccel::None) {
            warnings.push("conversion.use_gpu is set but hw_accel is \"none\"".into());
        }

        if self.conversion.preset == QualityPreset::GpuFast && !self.conversion.use_gpu {
            warnings.push(
                "conversion.preset gpu_fast uses an NVENC preset name but use_gpu is off".into(),
            );
        }

        if self.output.extension.trim_start_matches('.').is_empty() {
            warnings.push("output.extension is empty".into());
        }

        if self.tools.probe_timeout_secs == 0 {
            warnings.push("tools.probe_timeout_secs is 0; every probe will time out".into());
        }

        if self.tools.check_timeout_secs == 0 {
            warnings.push("tools.check_timeout_secs is 0; tool checks will time out".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths and time bounds for the external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Bound on a single metadata probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Bound on one-shot availability checks (`-version`, `-encoders`).
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    30
}
fn default_check_timeout() -> u64 {
    5
}

impl ToolsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: default_probe_timeout(),
            check_timeout_secs: default_check_timeout(),
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub preset: QualityPreset,
    /// Overrides the preset's quality value (CRF, CQ or QP depending on backend).
    pub custom_crf: Option<u32>,
    /// Overrides the preset's encoder speed preset name.
    pub custom_preset: Option<String>,
    /// Hardware backend. `None` means detect on first use.
    pub hw_accel: Option<HwAccel>,
    /// Use the hardware backend when one is available.
    pub use_gpu: bool,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Time given to the encoder to exit after SIGTERM before it is killed.
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_secs: u64,
}

fn default_audio_codec() -> String {
    "aac".into()
}
fn default_audio_bitrate() -> String {
    "320k".into()
}
fn default_terminate_grace() -> u64 {
    3
}

impl ConversionConfig {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    /// Quality value after applying a valid custom override.
    pub fn effective_crf(&self) -> u32 {
        match self.custom_crf {
            Some(crf) if crf <= 51 => crf,
            _ => self.preset.settings().crf,
        }
    }

    /// Encoder speed preset after applying a custom override.
    pub fn effective_speed_preset(&self) -> String {
        self.custom_preset
            .clone()
            .unwrap_or_else(|| self.preset.settings().speed_preset.to_string())
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            preset: QualityPreset::default(),
            custom_crf: None,
            custom_preset: None,
            hw_accel: None,
            use_gpu: false,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            terminate_grace_secs: default_terminate_grace(),
        }
    }
}

/// Where converted files go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Output container extension, with or without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "mov".into()
}

impl OutputConfig {
    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./converted"),
            extension: default_extension(),
        }
    }
}

// ---------------------------------------------------------------------------
// Presets and hardware backends
// ---------------------------------------------------------------------------

/// Named quality presets tuned for editing-friendly output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Fast,
    Balanced,
    #[default]
    High,
    GpuFast,
}

/// The encoder parameters a preset stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetSettings {
    pub label: &'static str,
    pub speed_preset: &'static str,
    pub crf: u32,
    pub tune: Option<&'static str>,
    /// Keyframe interval in frames.
    pub gop: Option<u32>,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 4] = [Self::Fast, Self::Balanced, Self::High, Self::GpuFast];

    pub fn settings(self) -> PresetSettings {
        match self {
            Self::Fast => PresetSettings {
                label: "Fast",
                speed_preset: "faster",
                crf: 23,
                tune: Some("fastdecode"),
                gop: Some(1),
            },
            Self::Balanced => PresetSettings {
                label: "Balanced",
                speed_preset: "medium",
                crf: 20,
                tune: Some("fastdecode"),
                gop: Some(1),
            },
            Self::High => PresetSettings {
                label: "High Quality",
                speed_preset: "slow",
                crf: 17,
                tune: Some("fastdecode"),
                gop: Some(1),
            },
            Self::GpuFast => PresetSettings {
                label: "GPU Accelerated - Fast",
                speed_preset: "p4",
                crf: 23,
                tune: None,
                gop: None,
            },
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::High => write!(f, "high"),
            Self::GpuFast => write!(f, "gpu_fast"),
        }
    }
}

impl FromStr for QualityPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "high" => Ok(Self::High),
            "gpu_fast" | "gpu-fast" => Ok(Self::GpuFast),
            other => Err(Error::Validation(format!(
                "unknown preset '{other}' (valid: fast, balanced, high, gpu_fast)"
            ))),
        }
    }
}

/// Hardware encoding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    None,
    Nvenc,
    Vaapi,
}

impl HwAccel {
    /// The ffmpeg H.264 encoder for this backend.
    pub fn encoder(self) -> &'static str {
        match self {
            Self::None => "libx264",
            Self::Nvenc => "h264_nvenc",
            Self::Vaapi => "h264_vaapi",
        }
    }
}

impl fmt::Display for HwAccel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Nvenc => write!(f, "nvenc"),
            Self::Vaapi => write!(f, "vaapi"),
        }
    }
}
