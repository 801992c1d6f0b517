//! External tool detection.
//!
//! The [`ToolRegistry`] resolves ffmpeg and ffprobe once, from configured
//! paths or `PATH`, and answers availability and hardware encoder queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fc_core::config::{HwAccel, ToolsConfig};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Tools the converter depends on.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    /// Found and answered `-version`.
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Resolve each known tool.
    ///
    /// A configured path is used when it exists; otherwise the tool is looked
    /// up on `PATH` with [`which::which`]. Tools that are not found are left
    /// out of the registry.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let configured = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                "ffprobe" => config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match configured {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {name} path {} does not exist; searching PATH",
                        p.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!("Found {name} at {}", path.display());
                    tools.insert(name.to_string(), path);
                }
                None => tracing::debug!("{name} not found"),
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, skipping discovery.
    #[cfg(test)]
    fn with_paths(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        let tools = HashMap::from([
            ("ffmpeg".to_string(), ffmpeg),
            ("ffprobe".to_string(), ffprobe),
        ]);
        Self { tools }
    }

    /// Path for `name`, or [`fc_core::Error::Tool`] if it was not found.
    pub fn require(&self, name: &str) -> fc_core::Result<&Path> {
        self.tools
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| fc_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?")))
    }

    /// Run `-version` on every known tool, each bounded by `timeout`.
    pub async fn check_all(&self, timeout: Duration) -> Vec<ToolInfo> {
        let mut infos = Vec::with_capacity(KNOWN_TOOLS.len());
        for &name in KNOWN_TOOLS {
            let info = match self.tools.get(name) {
                Some(path) => {
                    let version = detect_version(path, timeout).await;
                    ToolInfo {
                        name: name.to_string(),
                        available: version.is_some(),
                        version,
                        path: Some(path.clone()),
                    }
                }
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            };
            infos.push(info);
        }
        infos
    }

    /// Ask ffmpeg which H.264 hardware encoders it was built with.
    ///
    /// NVENC is preferred over VAAPI. Any failure reports [`HwAccel::None`].
    pub async fn detect_hw_accel(&self, timeout: Duration) -> HwAccel {
        let Ok(ffmpeg) = self.require("ffmpeg") else {
            return HwAccel::None;
        };

        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(["-hide_banner", "-encoders"]).timeout(timeout);

        match cmd.execute().await {
            Ok(output) => {
                let detected = hw_accel_from_encoders(&output.stdout);
                tracing::info!("Hardware acceleration: {detected}");
                detected
            }
            Err(e) => {
                tracing::warn!("Hardware encoder detection failed: {e}");
                HwAccel::None
            }
        }
    }
}

fn hw_accel_from_encoders(listing: &str) -> HwAccel {
    if listing.contains("h264_nvenc") {
        HwAccel::Nvenc
    } else if listing.contains("h264_vaapi") {
        HwAccel::Vaapi
    } else {
        HwAccel::None
    }
}

/// First line of `<tool> -version`, or `None` if the tool did not answer.
async fn detect_version(path: &Path, timeout: Duration) -> Option<String> {
    let mut cmd = ToolCommand::new(path.to_path_buf());
    cmd.arg("-version").timeout(timeout);

    match cmd.execute().await {
        Ok(output) => output.stdout.lines().next().map(|s| s.trim().to_string()),
        Err(e) => {
            tracing::warn!("{} -version failed: {e}", path.display());
            None
        }
    }
}
