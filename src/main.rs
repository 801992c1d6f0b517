mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use fc_av::{describe_failure, FfprobeAnalyzer, ToolRegistry};
use fc_batch::BatchSequencer;
use fc_core::config::{Config, QualityPreset};
use fc_core::events::BatchEvent;
use fc_core::media::{format_clock, format_duration, format_file_size, resolution_label};
use fc_core::ProgressSnapshot;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "frameconv=debug,fc_batch=debug,fc_av=debug,fc_core=debug".to_string()
        } else {
            "frameconv=info,fc_batch=warn,fc_av=warn,fc_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            files,
            output_dir,
            preset,
            crf,
            gpu,
            json,
        } => {
            let mut config = Config::load_or_default(cli.config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            if let Some(preset) = preset {
                config.conversion.preset = preset.parse::<QualityPreset>()?;
            }
            if crf.is_some() {
                config.conversion.custom_crf = crf;
            }
            if gpu {
                config.conversion.use_gpu = true;
            }
            for warning in config.validate() {
                tracing::warn!("{warning}");
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(files, config, json))
        }
        Commands::Probe { file, json } => {
            let config = Config::load_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, &config, json))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("frameconv {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn convert(files: Vec<PathBuf>, config: Config, json: bool) -> Result<()> {
    let total = files.len();
    tracing::info!(
        "Converting {total} file(s) to {} with preset {}",
        config.output.directory.display(),
        config.conversion.preset
    );

    let sequencer = BatchSequencer::new(Arc::new(config));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = sequencer.spawn(files, Arc::new(tx));

    let cancel = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    let mut reporter = Reporter::new(json);
    while let Some(event) = rx.recv().await {
        reporter.report(&event)?;
    }
    ctrl_c.abort();

    let state = handle.wait().await?;
    if state.cancelled {
        anyhow::bail!(
            "Batch cancelled after {} of {} file(s)",
            state.processed(),
            state.total_jobs
        );
    }
    if state.failed_count > 0 {
        anyhow::bail!(
            "{} of {} conversion(s) failed",
            state.failed_count,
            state.total_jobs
        );
    }
    if !json {
        println!("All {} conversion(s) completed", state.completed_count);
    }
    Ok(())
}

/// Console rendering of batch events.
struct Reporter {
    json: bool,
    progress_shown: bool,
}

impl Reporter {
    fn new(json: bool) -> Self {
        Self {
            json,
            progress_shown: false,
        }
    }

    fn report(&mut self, event: &BatchEvent) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }

        if !matches!(event, BatchEvent::Progress { .. }) {
            self.end_progress_line();
        }

        match event {
            BatchEvent::Started {
                index,
                total,
                input,
            } => println!("[{}/{}] {}", index + 1, total, input.display()),
            BatchEvent::Progress { snapshot, .. } => {
                let mut err = std::io::stderr();
                write!(err, "\r  {}\x1b[K", progress_line(snapshot))?;
                err.flush()?;
                self.progress_shown = true;
            }
            BatchEvent::Finished { output, .. } => println!("  done: {}", output.display()),
            BatchEvent::Failed { error, .. } => {
                tracing::debug!("Raw failure: {error}");
                println!("  failed: {}", describe_failure(error).replace('\n', "\n  "));
            }
            BatchEvent::BatchCancelled => println!("Batch cancelled"),
            BatchEvent::AllFinished => {}
        }
        Ok(())
    }

    fn end_progress_line(&mut self) {
        if self.progress_shown {
            eprintln!();
            self.progress_shown = false;
        }
    }
}

fn progress_line(snapshot: &ProgressSnapshot) -> String {
    let mut line = match snapshot.percent {
        Some(pct) => format!("{pct:5.1}%  {}", format_clock(snapshot.elapsed_secs)),
        None => format_clock(snapshot.elapsed_secs),
    };
    if let Some(speed) = snapshot.speed {
        line.push_str(&format!("  {speed:.2}x"));
    }
    if let Some(mbps) = snapshot.throughput_mbps {
        line.push_str(&format!("  {mbps:.1} Mbps"));
    }
    if let Some(eta) = snapshot.eta_secs {
        line.push_str(&format!("  ETA {}", format_clock(eta)));
    }
    line
}

async fn probe_file(file: &Path, config: &Config, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let analyzer = FfprobeAnalyzer::from_config(&config.tools);
    let meta = analyzer
        .try_analyze(file)
        .await
        .with_context(|| format!("probing {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    println!("File: {}", meta.path.display());
    println!("Format: {}", meta.format_name);
    println!("Duration: {}", format_duration(meta.duration_secs));
    println!("Size: {}", format_file_size(meta.input_size_bytes));
    if meta.bit_rate > 0 {
        println!("Bit rate: {:.1} Mbps", meta.bit_rate as f64 / 1_000_000.0);
    }
    println!(
        "Video: {} {} ({}), {:.3} fps, {}",
        meta.video.codec,
        meta.resolution(),
        resolution_label(meta.video.height),
        meta.video.frame_rate,
        meta.video.pixel_format
    );
    match &meta.audio {
        Some(audio) => println!(
            "Audio: {} {} Hz, {}ch",
            audio.codec, audio.sample_rate, audio.channels
        ),
        None => println!("Audio: none"),
    }
    println!(
        "Estimated output: {}",
        format_file_size(meta.estimated_output_size_bytes)
    );

    Ok(())
}

async fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(&config.tools);
    let timeout = config.tools.check_timeout();
    let tools = registry.check_all(timeout).await;
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    if registry.require("ffmpeg").is_ok() {
        let hw = registry.detect_hw_accel(timeout).await;
        println!("\nHardware encoder: {hw} ({})", hw.encoder());
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg and ffprobe are required; install them or set their paths in the config")
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let preset = config.conversion.preset.settings();
    println!("  Preset: {} ({})", config.conversion.preset, preset.label);
    println!("  Quality: {}", config.conversion.effective_crf());
    println!("  Encoder preset: {}", config.conversion.effective_speed_preset());
    println!(
        "  GPU: {}",
        if config.conversion.use_gpu { "on" } else { "off" }
    );
    println!(
        "  Audio: {} @ {}",
        config.conversion.audio_codec, config.conversion.audio_bitrate
    );
    println!(
        "  Output: {}/*.{}",
        config.output.directory.display(),
        config.output.extension()
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
