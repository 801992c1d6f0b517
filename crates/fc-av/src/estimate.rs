//! Rough output size prediction, shown to the user before converting.
//!
//! Assumes a target bit rate by pixel count plus fixed-rate audio, with a
//! small allowance for container overhead. Display only.

use fc_core::VideoMetadata;

const AUDIO_KBPS: f64 = 320.0;
const OVERHEAD: f64 = 1.05;

/// Target video bit rate in kbps for a frame size.
fn video_kbps(width: u32, height: u32) -> f64 {
    let pixels = u64::from(width) * u64::from(height);
    if pixels <= 1280 * 720 {
        3000.0
    } else if pixels <= 1920 * 1080 {
        6000.0
    } else if pixels <= 2560 * 1440 {
        12000.0
    } else {
        20000.0
    }
}

/// Estimated output size in MiB.
///
/// Falls back to the input size plus overhead when the duration or frame
/// size is unknown.
pub fn estimate_output_mb(
    duration_secs: f64,
    width: u32,
    height: u32,
    input_size_bytes: u64,
) -> f64 {
    if duration_secs.is_nan() || duration_secs <= 0.0 || width == 0 || height == 0 {
        let input_mb = input_size_bytes as f64 / (1024.0 * 1024.0);
        return input_mb * OVERHEAD;
    }

    let total_kbps = video_kbps(width, height) + AUDIO_KBPS;
    let megabytes = total_kbps * duration_secs / 8.0 / 1024.0;
    megabytes * OVERHEAD
}

/// [`estimate_output_mb`] for probed metadata, in bytes.
pub fn estimate_output_bytes(meta: &VideoMetadata) -> u64 {
    let mb = estimate_output_mb(
        meta.duration_secs,
        meta.video.width,
        meta.video.height,
        meta.input_size_bytes,
    );
    (mb * 1024.0 * 1024.0).round() as u64
}
