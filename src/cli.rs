use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "subembed")]
#[command(author, version, about = "Embed subtitle files into a video as soft-subtitle tracks")]
pub struct Cli {
    /// Path to config file
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
    /// Run one embedding session against local files
    Run {
        /// Video file
        #[arg(required = true)]
        video: PathBuf,

        /// Subtitle files, in the order the tracks should appear
        #[arg(required = true, num_args = 1..)]
        subtitles: Vec<PathBuf>,

        /// Directory the result is written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// User id the session runs under
        #[arg(long, default_value = "0")]
        user: i64,

        /// Deliver as a generic document instead of a playable video
        #[arg(long)]
        document: bool,
    },

    /// Probe a media file and display its streams
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the language detected for subtitle file names
    DetectLanguage {
        /// File names, numbered from 1 in the order given
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
