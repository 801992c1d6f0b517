//! Serial batch conversion.
//!
//! Jobs run strictly one after another. Each job gets its own
//! [`ProgressTracker`], so progress never leaks between files, and its own
//! [`JobContext`], which stamps every event with the job's index and paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fc_av::{resolve_output_path, EncodeOutcome, EncoderArgs, EncoderProcess, FfprobeAnalyzer, ToolRegistry};
use fc_core::config::{Config, HwAccel};
use fc_core::events::{BatchEvent, EventSink};
use fc_core::{BatchState, ConversionJob, JobStatus, ProgressSnapshot, ProgressTracker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// JobContext
// ---------------------------------------------------------------------------

/// Identity of one job, carried by value into every event it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub index: usize,
    pub total: usize,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
}

impl JobContext {
    pub fn new(index: usize, total: usize, input: PathBuf) -> Self {
        Self {
            index,
            total,
            input,
            output: None,
        }
    }

    pub fn started(&self) -> BatchEvent {
        BatchEvent::Started {
            index: self.index,
            total: self.total,
            input: self.input.clone(),
        }
    }

    pub fn progress(&self, snapshot: ProgressSnapshot) -> BatchEvent {
        BatchEvent::Progress {
            index: self.index,
            snapshot,
        }
    }

    /// `Finished` event; falls back to the input path if no output was resolved.
    pub fn finished(&self) -> BatchEvent {
        BatchEvent::Finished {
            index: self.index,
            total: self.total,
            output: self.output.clone().unwrap_or_else(|| self.input.clone()),
        }
    }

    pub fn failed(&self, error: impl Into<String>) -> BatchEvent {
        BatchEvent::Failed {
            index: self.index,
            total: self.total,
            input: self.input.clone(),
            error: error.into(),
        }
    }
}

/// How a single job ended.
#[derive(Debug)]
enum JobResult {
    Finished,
    Failed(String),
    Cancelled,
}

// ---------------------------------------------------------------------------
// BatchSequencer
// ---------------------------------------------------------------------------

/// Converts a list of files in order, reporting through an [`EventSink`].
#[derive(Debug, Clone)]
pub struct BatchSequencer {
    config: Arc<Config>,
    tools: ToolRegistry,
    ffmpeg: PathBuf,
    analyzer: FfprobeAnalyzer,
}

impl BatchSequencer {
    pub fn new(config: Arc<Config>) -> Self {
        let tools = ToolRegistry::discover(&config.tools);

        let ffmpeg = tools
            .require("ffmpeg")
            .map(Path::to_path_buf)
            .unwrap_or_else(|e| {
                tracing::warn!("{e}");
                PathBuf::from("ffmpeg")
            });
        let ffprobe = tools
            .require("ffprobe")
            .map(Path::to_path_buf)
            .unwrap_or_else(|e| {
                tracing::warn!("{e}");
                PathBuf::from("ffprobe")
            });
        let analyzer = FfprobeAnalyzer::new(ffprobe, config.tools.probe_timeout());

        Self {
            config,
            tools,
            ffmpeg,
            analyzer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert `inputs` in order and return the final batch state.
    ///
    /// Emits `Started` then exactly one of `Finished`/`Failed` per job that
    /// ran, and ends with either `AllFinished` or a single `BatchCancelled`.
    /// Cancellation is checked before each job starts and again after its
    /// encoder returns; a job interrupted mid-encode gets no outcome event.
    pub async fn run<S>(&self, inputs: Vec<PathBuf>, sink: &S, cancel: &CancellationToken) -> BatchState
    where
        S: EventSink + ?Sized,
    {
        let total = inputs.len();
        let mut state = BatchState::new(total);
        let mut jobs: Vec<ConversionJob> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| ConversionJob::new(index, input))
            .collect();

        tracing::info!(batch = %state.batch_id.short(), total, "Batch started");
        let mut backend = None;

        for i in 0..jobs.len() {
            // Resolved on the first job that actually starts.
            if backend.is_none() && !cancel.is_cancelled() {
                backend = Some(self.resolve_backend().await);
            }
            if cancel.is_cancelled() {
                return self.cancel_batch(state, &mut jobs[i..], sink);
            }
            let backend = backend.unwrap_or(HwAccel::None);

            let job = &mut jobs[i];
            let mut ctx = JobContext::new(job.index, total, job.input_path.clone());
            state.current_job_index = Some(job.index);
            job.transition(JobStatus::Running);
            sink.emit(ctx.started());
            tracing::info!(
                job = job.index,
                input = %job.input_path.display(),
                "Converting {}/{}",
                job.index + 1,
                total
            );

            let result = self.run_job(&mut ctx, backend, sink, cancel).await;
            job.output_path = ctx.output.clone();

            if cancel.is_cancelled() {
                return self.cancel_batch(state, &mut jobs[i..], sink);
            }

            match result {
                JobResult::Finished => {
                    job.transition(JobStatus::Completed);
                    state.completed_count += 1;
                    tracing::info!(job = job.index, output = ?ctx.output, "Conversion finished");
                    sink.emit(ctx.finished());
                }
                JobResult::Failed(error) => {
                    job.transition(JobStatus::Failed);
                    state.failed_count += 1;
                    tracing::error!(job = job.index, "Conversion failed: {error}");
                    sink.emit(ctx.failed(error));
                }
                JobResult::Cancelled => {
                    // The encoder was cancelled but the token no longer says so.
                    return self.cancel_batch(state, &mut jobs[i..], sink);
                }
            }
        }

        state.current_job_index = None;
        tracing::info!(
            batch = %state.batch_id.short(),
            completed = state.completed_count,
            failed = state.failed_count,
            "Batch finished"
        );
        sink.emit(BatchEvent::AllFinished);
        state
    }

    /// Run the batch on its own task.
    pub fn spawn(self, inputs: Vec<PathBuf>, sink: Arc<dyn EventSink>) -> BatchHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(inputs, sink.as_ref(), &token).await });
        BatchHandle { cancel, task }
    }

    /// Mark `unfinished` jobs cancelled and emit the single `BatchCancelled`.
    fn cancel_batch<S>(&self, mut state: BatchState, unfinished: &mut [ConversionJob], sink: &S) -> BatchState
    where
        S: EventSink + ?Sized,
    {
        for job in unfinished.iter_mut().filter(|j| !j.status().is_terminal()) {
            job.transition(JobStatus::Cancelled);
        }
        state.cancelled = true;
        state.current_job_index = None;
        tracing::info!(
            batch = %state.batch_id.short(),
            processed = state.processed(),
            "Batch cancelled"
        );
        sink.emit(BatchEvent::BatchCancelled);
        state
    }

    async fn resolve_backend(&self) -> HwAccel {
        let conversion = &self.config.conversion;
        if !conversion.use_gpu {
            return HwAccel::None;
        }
        match conversion.hw_accel {
            Some(backend) => backend,
            None => self.tools.detect_hw_accel(self.config.tools.check_timeout()).await,
        }
    }

    async fn run_job<S>(
        &self,
        ctx: &mut JobContext,
        backend: HwAccel,
        sink: &S,
        cancel: &CancellationToken,
    ) -> JobResult
    where
        S: EventSink + ?Sized,
    {
        let dir = &self.config.output.directory;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            return JobResult::Failed(format!(
                "cannot create output directory {}: {e}",
                dir.display()
            ));
        }

        let output = match resolve_output_path(&ctx.input, dir, self.config.output.extension()) {
            Ok(path) => path,
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        ctx.output = Some(output.clone());

        let duration = match self.analyzer.analyze(&ctx.input).await {
            Some(meta) => meta.known_duration(),
            None => None,
        };
        if duration.is_none() {
            tracing::warn!(job = ctx.index, "Input duration unknown; progress will have no percentage");
        }

        let args = EncoderArgs::build(&self.config.conversion, backend, &ctx.input, &output);
        let mut process = EncoderProcess::new(self.ffmpeg.clone(), args)
            .duration(duration)
            .terminate_grace(self.config.conversion.terminate_grace());

        let mut tracker = ProgressTracker::new();
        let job: &JobContext = ctx;
        let outcome = process
            .run(
                |field| {
                    let snapshot = tracker.apply(field);
                    sink.emit(job.progress(snapshot));
                },
                None,
                Some(cancel),
            )
            .await;

        match outcome {
            EncodeOutcome::Success => JobResult::Finished,
            EncodeOutcome::Cancelled => JobResult::Cancelled,
            failure @ EncodeOutcome::Failure { .. } => {
                JobResult::Failed(failure.error_text().unwrap_or_default())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BatchHandle
// ---------------------------------------------------------------------------

/// Control over a batch started with [`BatchSequencer::spawn`].
#[derive(Debug)]
pub struct BatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<BatchState>,
}

impl BatchHandle {
    /// Token observed by the batch; cancelling it is equivalent to [`Self::cancel`]
    /// without waiting.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request cancellation and wait until the running encoder has been reaped.
    pub async fn cancel(self) -> fc_core::Result<BatchState> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the batch to end on its own.
    pub async fn wait(self) -> fc_core::Result<BatchState> {
        self.task
            .await
            .map_err(|e| fc_core::Error::Internal(format!("batch task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_stamps_events() {
        let mut ctx = JobContext::new(1, 3, PathBuf::from("/in/b.mp4"));
        assert_eq!(
            ctx.started(),
            BatchEvent::Started {
                index: 1,
                total: 3,
                input: PathBuf::from("/in/b.mp4")
            }
        );
        ctx.output = Some(PathBuf::from("/out/b.mov"));
        assert_eq!(
            ctx.finished(),
            BatchEvent::Finished {
                index: 1,
                total: 3,
                output: PathBuf::from("/out/b.mov")
            }
        );
        match ctx.failed("exit code 1") {
            BatchEvent::Failed { index, error, .. } => {
                assert_eq!(index, 1);
                assert_eq!(error, "exit code 1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_finishes_immediately() {
        let sequencer = BatchSequencer::new(Arc::new(Config::default()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let state = sequencer.run(Vec::new(), &tx, &CancellationToken::new()).await;
        assert_eq!(state.total_jobs, 0);
        assert!(!state.cancelled);
        assert_eq!(rx.try_recv().unwrap(), BatchEvent::AllFinished);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_before_start_emits_only_batch_cancelled() {
        let sequencer = BatchSequencer::new(Arc::new(Config::default()));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let inputs = vec![PathBuf::from("/in/a.mp4"), PathBuf::from("/in/b.mp4")];
        let state = sequencer.run(inputs, &tx, &cancel).await;
        assert!(state.cancelled);
        assert_eq!(state.processed(), 0);
        assert_eq!(rx.try_recv().unwrap(), BatchEvent::BatchCancelled);
        assert!(rx.try_recv().is_err());
    }
}
