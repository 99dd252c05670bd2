mod cli;

use subembed::{
    collaborators::{DirectorySink, FileSource, LocalFile},
    config,
    session::{Collaborators, SessionManager, Submission},
    transfer::progress::describe,
    transfer::ProgressEvent,
};
use subembed_av::{sweep_orphans, FfmpegMuxer, FfprobeProber, ToolRegistry};
use subembed_core::events::{Event, SessionEvent, TransferDirection};
use subembed_core::UserId;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "subembed=trace,subembed_av=debug,subembed_core=debug,subembed_parser=debug".to_string()
        } else {
            "subembed=info,subembed_av=info,subembed_core=info,subembed_parser=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            video,
            subtitles,
            out,
            user,
            document,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_session(
                &video,
                &subtitles,
                out,
                UserId(user),
                document,
                cli.config.as_deref(),
            ))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::DetectLanguage { names } => {
            detect_languages(&names);
            Ok(())
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("subembed {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_session(
    video: &Path,
    subtitles: &[PathBuf],
    out: PathBuf,
    user_id: UserId,
    as_document: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if config.storage.sweep_on_start {
        match sweep_orphans(&config.storage.root) {
            Ok(count) if count > 0 => {
                tracing::info!("Removed {} orphaned session directories", count);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to sweep orphaned sessions: {}", e);
            }
        }
    }

    let tools = ToolRegistry::discover(&config.tools);
    let muxer = FfmpegMuxer::from_registry(&tools, &config.mux)
        .context("ffmpeg and ffprobe are required; run `subembed check-tools`")?;
    let sink = DirectorySink::new(&out);
    let manager = SessionManager::new(
        config,
        Collaborators::new(Arc::new(muxer), Arc::new(sink.clone())),
    );

    let mut events = manager.events().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let session = async {
        let source: Arc<dyn FileSource> = Arc::new(
            LocalFile::new(video).with_context(|| format!("Cannot read video: {:?}", video))?,
        );
        if as_document {
            match manager.submit_document(user_id, source).await? {
                Submission::Video(accepted) => println!(
                    "Video: {} ({}, {} subtitle stream(s) already present)",
                    accepted.file_name, accepted.container, accepted.stream_summary.subtitle_streams
                ),
                Submission::Subtitle(_) => anyhow::bail!("{:?} is not a video file", video),
            }
        } else {
            let accepted = manager.submit_video(user_id, source).await?;
            println!(
                "Video: {} ({}, {} subtitle stream(s) already present)",
                accepted.file_name, accepted.container, accepted.stream_summary.subtitle_streams
            );
        }

        for path in subtitles {
            let source: Arc<dyn FileSource> = Arc::new(
                LocalFile::new(path)
                    .with_context(|| format!("Cannot read subtitle: {:?}", path))?,
            );
            match manager.submit_subtitle(user_id, source).await {
                Ok(accepted) => println!(
                    "  [{}] {} -> {} ({}, {} cues)",
                    accepted.submission_index,
                    accepted.file_name,
                    accepted.language_code,
                    accepted.display_name,
                    accepted.cue_count
                ),
                Err(e) => eprintln!("  skipped {:?}: {}", path, e.user_message()),
            }
        }

        let report = manager.request_finish(user_id).await?;
        println!("\n{}", report.delivery.caption);
        println!("\nOutput: {}", sink.target(&report.delivery.file_name).display());
        Ok::<(), anyhow::Error>(())
    };

    let result = tokio::select! {
        result = session => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling session");
            manager.cancel(user_id).await?;
            Err(anyhow::anyhow!("Interrupted"))
        }
    };

    // Let the last events reach the printer.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    result
}

fn print_event(event: &Event) {
    match &event.payload {
        SessionEvent::TransferProgress {
            direction,
            file_name,
            bytes_transferred,
            bytes_total,
            elapsed_ms,
            ..
        } => {
            let progress = ProgressEvent {
                bytes_transferred: *bytes_transferred,
                bytes_total: *bytes_total,
                elapsed: Duration::from_millis(*elapsed_ms),
            };
            let verb = match direction {
                TransferDirection::Download => "Downloading",
                TransferDirection::Upload => "Uploading",
            };
            eprintln!("{} {}\n{}", verb, file_name, describe(&progress));
        }
        SessionEvent::MuxQueued { .. } => eprintln!("Waiting for a free processing slot..."),
        SessionEvent::MuxStarted { .. } => eprintln!("Embedding subtitles..."),
        SessionEvent::JobFailed { error, .. } => eprintln!("Processing failed: {}", error),
        _ => tracing::debug!(?event, "session event"),
    }
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?;
    let prober = FfprobeProber::new(ffprobe.path.clone());
    let summary = prober.probe(file, &CancellationToken::new()).await?;

    if json {
        let json_str = serde_json::to_string_pretty(&summary)?;
        println!("{}", json_str);
    } else {
        println!("File: {}", file.display());
        match summary.container {
            Some(container) => println!("Container: {}", container),
            None => println!("Container: unknown"),
        }
        println!("Video streams: {}", summary.video_streams);
        println!("Audio streams: {}", summary.audio_streams);
        println!("Attachments: {}", summary.attachment_streams);
        println!("Data streams: {}", summary.data_streams);
        println!("Chapters: {}", summary.chapters);

        println!("\nSubtitle Tracks: {}", summary.subtitle_streams);
        for (i, track) in summary.subtitles().enumerate() {
            print!("  [{}] {}", i, track.codec);
            if let Some(ref lang) = track.language {
                print!(" ({})", lang);
            }
            if let Some(ref title) = track.title {
                print!(" \"{}\"", title);
            }
            if track.default {
                print!(" [default]");
            }
            println!();
        }
    }

    Ok(())
}

fn detect_languages(names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        let detected = subembed_parser::detect_language(name, i as u32 + 1);
        println!("{} -> {} ({})", name, detected.code, detected.display_name);
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
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
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable subtitle embedding.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Storage root: {}", config.storage.root.display());
    println!("  Idle timeout: {}s", config.session.idle_timeout_secs);
    println!("  Max concurrent mux jobs: {}", config.mux.max_concurrent);
    println!("  Mux deadline: {}s", config.mux.deadline_secs);
    println!("  Transfer attempts: {}", config.transfer.max_attempts);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}
