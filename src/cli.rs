use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "frameconv")]
#[command(author, version, about = "Batch video converter driven by ffmpeg")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more files, one after another
    Convert {
        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory for converted files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Quality preset: fast, balanced, high, gpu_fast
        #[arg(short, long)]
        preset: Option<String>,

        /// Quality value overriding the preset (0-51)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=51))]
        crf: Option<u32>,

        /// Use a hardware encoder when one is available
        #[arg(long)]
        gpu: bool,

        /// Print events as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
