//! ffmpeg argument construction for one conversion.
//!
//! Output is H.264 in an editing-friendly container: intra-only GOPs and
//! `fastdecode` tuning on the software path, yuv420p, AAC audio and the
//! moov atom up front.

use std::path::Path;

use fc_core::config::{ConversionConfig, HwAccel};

/// Resolved encoder settings for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderArgs {
    pub backend: HwAccel,
    pub speed_preset: String,
    /// CRF for libx264, CQ for NVENC, QP for VAAPI.
    pub quality: u32,
    pub tune: Option<&'static str>,
    pub gop: Option<u32>,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl EncoderArgs {
    /// Resolve settings from the config. `backend` is the hardware backend
    /// that was detected or configured; it is only used when `use_gpu` is set.
    pub fn from_config(config: &ConversionConfig, backend: HwAccel) -> Self {
        let preset = config.preset.settings();
        let backend = if config.use_gpu { backend } else { HwAccel::None };
        Self {
            backend,
            speed_preset: config.effective_speed_preset(),
            quality: config.effective_crf(),
            tune: preset.tune,
            gop: preset.gop,
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
        }
    }

    /// Full argument vector (without the program name).
    pub fn to_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-c:v".into(),
            self.backend.encoder().into(),
            "-preset".into(),
            self.speed_preset.clone(),
        ];

        match self.backend {
            HwAccel::None => {
                args.extend(["-crf".to_string(), self.quality.to_string()]);
                if let Some(tune) = self.tune {
                    args.extend(["-tune".to_string(), tune.to_string()]);
                }
                if let Some(gop) = self.gop {
                    args.extend(["-g".to_string(), gop.to_string()]);
                }
                args.extend(["-pix_fmt", "yuv420p"].map(String::from));
            }
            HwAccel::Nvenc => {
                args.extend(["-cq".to_string(), self.quality.to_string()]);
                args.extend(["-rc", "vbr"].map(String::from));
            }
            HwAccel::Vaapi => {
                args.extend(["-qp".to_string(), self.quality.to_string()]);
            }
        }

        args.extend([
            "-c:a".into(),
            self.audio_codec.clone(),
            "-b:a".into(),
            self.audio_bitrate.clone(),
            "-movflags".into(),
            "+faststart".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }

    /// Shorthand for `from_config(..).to_args(..)`.
    pub fn build(
        config: &ConversionConfig,
        backend: HwAccel,
        input: &Path,
        output: &Path,
    ) -> Vec<String> {
        Self::from_config(config, backend).to_args(input, output)
    }
}
