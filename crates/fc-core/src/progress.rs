//! Progress model for a running encode.
//!
//! The encoder reports one `key=value` pair per line, so each parsed line
//! carries at most one [`ProgressField`]. A [`ProgressTracker`] owned by the
//! consumer folds those fields into complete [`ProgressSnapshot`]s, keeping
//! the last known value of every field that the current line did not carry.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single field update decoded from one progress line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ProgressField {
    /// Encoded media time so far. `percent` is present only when the input
    /// duration was known.
    OutTime {
        elapsed_secs: f64,
        percent: Option<f64>,
    },
    /// Encode speed as a multiple of real time.
    Speed(f64),
    /// Output bitrate in megabits per second.
    Bitrate { mbps: f64 },
}

/// Normalized progress at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Media time encoded so far, in seconds.
    pub elapsed_secs: f64,
    /// Completion in `0.0..=100.0`, if the duration is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Estimated wall-clock seconds until the encode finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
}

/// Sticky merge of progress fields for one job.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    started: Instant,
    current: ProgressSnapshot,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Tracker whose ETA clock starts at `started`.
    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            current: ProgressSnapshot::default(),
        }
    }

    /// The latest merged snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.current
    }

    /// Merge `field` and return the resulting snapshot.
    pub fn apply(&mut self, field: ProgressField) -> ProgressSnapshot {
        self.apply_at(field, Instant::now())
    }

    /// Like [`apply`](Self::apply) with an explicit clock reading.
    pub fn apply_at(&mut self, field: ProgressField, now: Instant) -> ProgressSnapshot {
        match field {
            ProgressField::OutTime {
                elapsed_secs,
                percent,
            } => {
                self.current.elapsed_secs = elapsed_secs;
                // Recomputed on every time update; a line without a known
                // duration clears it rather than leaving a stale value.
                self.current.percent = percent;
                self.current.eta_secs = percent.and_then(|pct| {
                    let wall = now.saturating_duration_since(self.started).as_secs_f64();
                    estimate_remaining(wall, pct)
                });
            }
            ProgressField::Speed(speed) => self.current.speed = Some(speed),
            ProgressField::Bitrate { mbps } => self.current.throughput_mbps = Some(mbps),
        }
        self.current
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Remaining wall-clock seconds given time spent so far and percent done.
fn estimate_remaining(wall_elapsed: f64, percent: f64) -> Option<f64> {
    if percent <= 0.0 {
        return None;
    }
    let total = wall_elapsed * 100.0 / percent;
    Some((total - wall_elapsed).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fields_are_sticky() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(ProgressField::Bitrate { mbps: 4.2 });
        tracker.apply(ProgressField::Speed(1.5));
        let snap = tracker.apply(ProgressField::OutTime {
            elapsed_secs: 3.0,
            percent: Some(30.0),
        });
        assert_eq!(snap.throughput_mbps, Some(4.2));
        assert_eq!(snap.speed, Some(1.5));
        assert_eq!(snap.elapsed_secs, 3.0);
        assert_eq!(snap.percent, Some(30.0));

        let snap = tracker.apply(ProgressField::Speed(2.0));
        assert_eq!(snap.elapsed_secs, 3.0);
        assert_eq!(snap.percent, Some(30.0));
        assert_eq!(snap.throughput_mbps, Some(4.2));
        assert_eq!(snap.speed, Some(2.0));
    }

    #[test]
    fn percent_follows_latest_time_update() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(ProgressField::OutTime {
            elapsed_secs: 1.0,
            percent: Some(10.0),
        });
        let snap = tracker.apply(ProgressField::OutTime {
            elapsed_secs: 2.0,
            percent: None,
        });
        assert_eq!(snap.elapsed_secs, 2.0);
        assert_eq!(snap.percent, None);
        assert_eq!(snap.eta_secs, None);
    }

    #[test]
    fn eta_from_wall_clock() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(start);
        let snap = tracker.apply_at(
            ProgressField::OutTime {
                elapsed_secs: 5.0,
                percent: Some(25.0),
            },
            start + Duration::from_secs(10),
        );
        // 10s for 25% means 40s total, 30s left.
        let eta = snap.eta_secs.unwrap();
        assert!((eta - 30.0).abs() < 1e-6, "eta was {eta}");
    }

    #[test]
    fn no_eta_at_zero_percent() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::starting_at(start);
        let snap = tracker.apply_at(
            ProgressField::OutTime {
                elapsed_secs: 0.0,
                percent: Some(0.0),
            },
            start + Duration::from_secs(3),
        );
        assert_eq!(snap.eta_secs, None);
    }

    #[test]
    fn snapshot_skips_unknown_fields_in_json() {
        let snap = ProgressSnapshot {
            elapsed_secs: 1.5,
            ..Default::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"{"elapsed_secs":1.5}"#);
    }
}
