//! Decoder for ffmpeg's `-progress` output.
//!
//! With `-progress pipe:1` ffmpeg writes blocks of `key=value` lines to
//! stdout, each block ending in `progress=continue` or `progress=end`. Only a
//! few keys matter here; everything else is skipped so newer ffmpeg builds
//! that add keys keep working. The parser is stateless: merging fields across
//! lines is the job of [`fc_core::ProgressTracker`].

use fc_core::ProgressField;

/// Decode one line. `duration_secs` is the input duration, if known.
///
/// Returns `None` for blank lines, lines without `=`, unknown keys, `N/A`
/// values and malformed numbers. Malformed numbers are logged, never fatal.
pub fn parse_line(line: &str, duration_secs: Option<f64>) -> Option<ProgressField> {
    let (key, value) = line.trim().split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if value.eq_ignore_ascii_case("N/A") {
        tracing::trace!(key, "progress value not available");
        return None;
    }

    match key {
        // ffmpeg's out_time_ms is in microseconds, same as out_time_us.
        "out_time_ms" | "out_time_us" => parse_out_time(key, value, duration_secs),
        "speed" => parse_speed(value),
        "bitrate" => parse_bitrate(value),
        _ => None,
    }
}

fn parse_out_time(key: &str, value: &str, duration_secs: Option<f64>) -> Option<ProgressField> {
    let micros = match value.parse::<i64>() {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Bad {key} value {value:?}: {e}");
            return None;
        }
    };

    // Early blocks can report a small negative time before the first packet.
    let elapsed_secs = micros.max(0) as f64 / 1_000_000.0;
    let percent = duration_secs
        .filter(|d| *d > 0.0)
        .map(|d| (elapsed_secs / d * 100.0).min(100.0));

    Some(ProgressField::OutTime {
        elapsed_secs,
        percent,
    })
}

fn parse_speed(value: &str) -> Option<ProgressField> {
    let number = value.strip_suffix('x').unwrap_or(value).trim();
    match number.parse::<f64>() {
        Ok(speed) if speed.is_finite() => Some(ProgressField::Speed(speed)),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Bad speed value {value:?}: {e}");
            None
        }
    }
}

fn parse_bitrate(value: &str) -> Option<ProgressField> {
    let number = value.strip_suffix("kbits/s").unwrap_or(value).trim();
    match number.parse::<f64>() {
        Ok(kbps) if kbps.is_finite() => {
            let mbps = kbps / 1000.0;
            tracing::trace!("bitrate {mbps:.1} Mbps");
            Some(ProgressField::Bitrate { mbps })
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Bad bitrate value {value:?}: {e}");
            None
        }
    }
}
