//! End-to-end batch runs against stand-in `ffmpeg` and `ffprobe` scripts.
//!
//! The scripts are written fresh for every test; `#[serial]` keeps one test
//! from forking while another still has a script open for writing.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fc_batch::BatchSequencer;
use fc_core::config::{Config, ConversionConfig, OutputConfig, ToolsConfig};
use fc_core::events::{BatchEvent, EventSink};
use parking_lot::Mutex;
use serial_test::serial;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PROBE_10S: &str = r#"#!/bin/sh
cat <<'JSON'
{"format": {"duration": "10.000000", "format_name": "mov,mp4", "bit_rate": "4000000"},
 "streams": [{"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
              "r_frame_rate": "25/1", "pix_fmt": "yuv420p"}]}
JSON
"#;

const PROBE_HANGS: &str = "#!/bin/sh\nexec sleep 30\n";

/// Emits half the input's progress, touches the output (last argument), exits 0.
/// Inputs with `bad` in their name fail instead.
const ENCODE_OK: &str = r#"#!/bin/sh
case "$*" in
  */bad.mp4*) echo "Invalid data found when processing input" >&2; exit 1 ;;
esac
echo frame=12
echo out_time_ms=5000000
echo speed=2.0x
echo progress=continue
for last; do :; done
: > "$last"
echo progress=end
exit 0
"#;

const ENCODE_FAILS: &str = r#"#!/bin/sh
echo "Conversion failed!" >&2
exit 1
"#;

/// Records `-encoders` queries next to itself and lists no hardware encoder.
const ENCODE_LISTS_ENCODERS: &str = r#"#!/bin/sh
if [ "$2" = "-encoders" ]; then
  echo listed >> "$(dirname "$0")/encoders_listed"
  echo " V..... libx264              libx264 H.264"
  exit 0
fi
for last; do :; done
: > "$last"
exit 0
"#;

const ENCODE_HANGS: &str = r#"#!/bin/sh
echo out_time_ms=1000000
echo progress=continue
exec sleep 30
"#;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn inputs(&self, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = self.dir.path().join(name);
                std::fs::write(&path, b"not really video").unwrap();
                path
            })
            .collect()
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn config(&self, ffmpeg: &str, ffprobe: &str) -> Arc<Config> {
        Arc::new(Config {
            tools: ToolsConfig {
                ffmpeg_path: Some(self.script("ffmpeg", ffmpeg)),
                ffprobe_path: Some(self.script("ffprobe", ffprobe)),
                probe_timeout_secs: 1,
                check_timeout_secs: 1,
            },
            conversion: ConversionConfig {
                terminate_grace_secs: 1,
                ..Default::default()
            },
            output: OutputConfig {
                directory: self.out_dir(),
                ..Default::default()
            },
        })
    }
}

/// Records events and optionally cancels as soon as a given job finishes.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<BatchEvent>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl Recorder {
    fn cancelling_after(index: usize, token: CancellationToken) -> Self {
        Self {
            events: Mutex::default(),
            cancel_after: Some((index, token)),
        }
    }

    fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: BatchEvent) {
        if let (BatchEvent::Finished { index, .. }, Some((target, token))) =
            (&event, &self.cancel_after)
        {
            if index == target {
                token.cancel();
            }
        }
        self.events.lock().push(event);
    }
}

fn outcomes(events: &[BatchEvent]) -> Vec<&BatchEvent> {
    events
        .iter()
        .filter(|e| !matches!(e, BatchEvent::Progress { .. }))
        .collect()
}

fn progress_of(events: &[BatchEvent], job: usize) -> Vec<fc_core::ProgressSnapshot> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { index, snapshot } if *index == job => Some(*snapshot),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn single_file_reports_half_way_then_finishes() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_OK, PROBE_10S));
    let inputs = fx.inputs(&["clip.mp4"]);
    let recorder = Recorder::default();

    let state = sequencer.run(inputs, &recorder, &CancellationToken::new()).await;

    let events = recorder.events();
    let progress = progress_of(&events, 0);
    assert!(
        progress.iter().any(|s| s.percent == Some(50.0) && s.elapsed_secs == 5.0),
        "{progress:?}"
    );
    // Speed arrives after the time field and keeps the percentage.
    assert!(progress.iter().any(|s| s.speed == Some(2.0) && s.percent == Some(50.0)));

    let expected_output = fx.out_dir().join("clip.mov");
    assert_eq!(
        outcomes(&events)[1..],
        [
            &BatchEvent::Finished {
                index: 0,
                total: 1,
                output: expected_output.clone()
            },
            &BatchEvent::AllFinished
        ]
    );
    assert!(expected_output.exists());
    assert_eq!(state.completed_count, 1);
    assert!(!state.cancelled);
}

#[tokio::test]
#[serial]
async fn cancel_between_jobs_stops_the_queue() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_OK, PROBE_10S));
    let inputs = fx.inputs(&["one.mp4", "two.mp4", "three.mp4"]);
    let cancel = CancellationToken::new();
    let recorder = Recorder::cancelling_after(0, cancel.clone());

    let state = sequencer.run(inputs, &recorder, &cancel).await;

    let events = recorder.events();
    let finished: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::Finished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    assert!(matches!(finished[0], BatchEvent::Finished { index: 0, .. }));

    let cancelled = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::BatchCancelled))
        .count();
    assert_eq!(cancelled, 1);
    assert_eq!(events.last(), Some(&BatchEvent::BatchCancelled));

    assert!(!events
        .iter()
        .any(|e| matches!(e, BatchEvent::Started { index, .. } if *index > 0)));
    assert!(!events.contains(&BatchEvent::AllFinished));
    assert!(state.cancelled);
    assert_eq!(state.completed_count, 1);
}

#[tokio::test]
#[serial]
async fn encoder_exit_code_is_reported() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_FAILS, PROBE_10S));
    let inputs = fx.inputs(&["broken.mp4"]);
    let recorder = Recorder::default();

    let state = sequencer.run(inputs.clone(), &recorder, &CancellationToken::new()).await;

    let events = recorder.events();
    let failed = events
        .iter()
        .find_map(|e| match e {
            BatchEvent::Failed { index, input, error, .. } => Some((*index, input.clone(), error.clone())),
            _ => None,
        })
        .expect("failed event");
    assert_eq!(failed.0, 0);
    assert_eq!(failed.1, inputs[0]);
    assert!(failed.2.contains("exit code 1"), "{}", failed.2);
    assert!(failed.2.contains("Conversion failed!"), "{}", failed.2);
    assert!(!events.iter().any(|e| matches!(e, BatchEvent::Finished { .. })));
    assert_eq!(events.last(), Some(&BatchEvent::AllFinished));
    assert_eq!(state.failed_count, 1);
}

#[tokio::test]
#[serial]
async fn probe_timeout_still_converts_without_percent() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_OK, PROBE_HANGS));
    let inputs = fx.inputs(&["slow_probe.mp4"]);
    let recorder = Recorder::default();

    let state = sequencer.run(inputs, &recorder, &CancellationToken::new()).await;

    let events = recorder.events();
    let progress = progress_of(&events, 0);
    assert!(!progress.is_empty());
    assert!(progress.iter().all(|s| s.percent.is_none() && s.eta_secs.is_none()));
    assert!(progress.iter().any(|s| s.elapsed_secs == 5.0));
    assert!(events.iter().any(|e| matches!(e, BatchEvent::Finished { index: 0, .. })));
    assert_eq!(state.completed_count, 1);
}

// ---------------------------------------------------------------------------
// Beyond the basic scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
#[serial]
async fn failure_does_not_stop_the_batch() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_OK, PROBE_10S));
    let inputs = fx.inputs(&["a.mp4", "bad.mp4", "c.mp4"]);
    let recorder = Recorder::default();

    let state = sequencer.run(inputs, &recorder, &CancellationToken::new()).await;

    let events = recorder.events();
    let kinds: Vec<&str> = outcomes(&events)
        .into_iter()
        .map(|e| match e {
            BatchEvent::Started { .. } => "started",
            BatchEvent::Finished { .. } => "finished",
            BatchEvent::Failed { .. } => "failed",
            BatchEvent::AllFinished => "all_finished",
            BatchEvent::BatchCancelled => "cancelled",
            BatchEvent::Progress { .. } => unreachable!(),
        })
        .collect();
    assert_eq!(
        kinds,
        [
            "started",
            "finished",
            "started",
            "failed",
            "started",
            "finished",
            "all_finished"
        ]
    );
    assert_eq!(state.completed_count, 2);
    assert_eq!(state.failed_count, 1);
}

#[tokio::test]
#[serial]
async fn existing_output_gets_numbered_name() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.out_dir()).unwrap();
    std::fs::write(fx.out_dir().join("clip.mov"), b"older").unwrap();

    let sequencer = BatchSequencer::new(fx.config(ENCODE_OK, PROBE_10S));
    let inputs = fx.inputs(&["clip.mp4"]);
    let recorder = Recorder::default();
    sequencer.run(inputs, &recorder, &CancellationToken::new()).await;

    let output = recorder.events().into_iter().find_map(|e| match e {
        BatchEvent::Finished { output, .. } => Some(output),
        _ => None,
    });
    assert_eq!(output.as_deref(), Some(fx.out_dir().join("clip_1.mov").as_path()));
    assert_eq!(std::fs::read(fx.out_dir().join("clip.mov")).unwrap(), b"older");
}

#[tokio::test]
#[serial]
async fn cancel_while_encoding_reaps_the_encoder() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_HANGS, PROBE_10S));
    let inputs = fx.inputs(&["long.mp4", "next.mp4"]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = sequencer.spawn(inputs, Arc::new(tx));

    // Wait until the encoder is producing progress.
    let mut seen = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("progress before timeout")
    {
        let is_progress = matches!(event, BatchEvent::Progress { .. });
        seen.push(event);
        if is_progress {
            break;
        }
    }

    let started = Instant::now();
    let state = handle.cancel().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(state.cancelled);

    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.last(), Some(&BatchEvent::BatchCancelled));
    let cancelled = seen
        .iter()
        .filter(|e| matches!(e, BatchEvent::BatchCancelled))
        .count();
    assert_eq!(cancelled, 1);
    assert!(!seen
        .iter()
        .any(|e| matches!(e, BatchEvent::Finished { .. } | BatchEvent::Failed { .. })));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, BatchEvent::Started { index: 1, .. })));
}

#[tokio::test]
#[serial]
async fn missing_input_file_fails_cleanly() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(fx.config(ENCODE_FAILS, PROBE_10S));
    let recorder = Recorder::default();
    let missing = fx.dir.path().join("gone.mp4");

    sequencer
        .run(vec![missing.clone()], &recorder, &CancellationToken::new())
        .await;

    let events = recorder.events();
    assert!(events.iter().any(
        |e| matches!(e, BatchEvent::Failed { input, .. } if input.as_path() == Path::new(&missing))
    ));
}

fn gpu_config(fx: &Fixture) -> Arc<Config> {
    let mut config = Arc::unwrap_or_clone(fx.config(ENCODE_LISTS_ENCODERS, PROBE_10S));
    config.conversion.use_gpu = true;
    config.conversion.hw_accel = None;
    Arc::new(config)
}

#[tokio::test]
#[serial]
async fn cancelled_batch_skips_encoder_detection() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(gpu_config(&fx));
    let inputs = fx.inputs(&["a.mp4", "b.mp4"]);
    let recorder = Recorder::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let state = sequencer.run(inputs, &recorder, &cancel).await;

    assert!(state.cancelled);
    assert_eq!(recorder.events(), [BatchEvent::BatchCancelled]);
    assert!(!fx.dir.path().join("encoders_listed").exists());
}

#[tokio::test]
#[serial]
async fn gpu_batch_detects_encoder_once() {
    let fx = Fixture::new();
    let sequencer = BatchSequencer::new(gpu_config(&fx));
    let inputs = fx.inputs(&["a.mp4", "b.mp4"]);
    let recorder = Recorder::default();

    let state = sequencer.run(inputs, &recorder, &CancellationToken::new()).await;

    assert_eq!(state.completed_count, 2);
    let listed = std::fs::read_to_string(fx.dir.path().join("encoders_listed")).unwrap();
    assert_eq!(listed.lines().count(), 1);
    assert_eq!(recorder.events().last(), Some(&BatchEvent::AllFinished));
}
