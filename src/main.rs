use ascii_replay::audio::{AudioPlayer, FfmpegAudioExtractor, FfplayPlayer};
use ascii_replay::pipeline;
use ascii_replay::utils::format_duration;
use ascii_replay::{
    CancellationToken, Cli, FrameStore, PlaybackOutcome, PlaybackState, PlayerConfig, StreamSink,
    TerminalSink, VERSION,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cancel playback on q, Esc or Ctrl+C while the terminal is in raw mode
fn spawn_input_watcher(cancel: CancellationToken, done: CancellationToken) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !done.is_cancelled() && !cancel.is_cancelled() {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("Stopped watching keyboard input: {}", e);
                    return;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        debug!("Quit requested by user");
                        cancel.cancel();
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        debug!("Ctrl+C pressed, stopping playback");
                        cancel.cancel();
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(e) => {
                    debug!("Stopped watching keyboard input: {}", e);
                    return;
                }
            }
        }
    })
}

/// Cancel playback on SIGINT when the terminal is not in raw mode
fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping playback");
            cancel.cancel();
        }
    });
}

fn print_video_info(path: &Path) -> Result<()> {
    let info = pipeline::describe(path)
        .with_context(|| format!("Failed to read video information from {}", path.display()))?;

    println!("Video Information:");
    println!("  File: {}", path.display());
    println!("  Dimensions: {}x{}", info.width, info.height);
    println!("  Frame Rate: {:.2} FPS", info.frame_rate);
    println!("  Total Frames: {}", info.frame_count);
    println!("  Duration: {} ({:.2} seconds)", format_duration(info.duration), info.duration);
    Ok(())
}

async fn play(
    config: &PlayerConfig,
    store: &FrameStore,
    fps: f64,
    audio: Option<PathBuf>,
) -> Result<PlaybackOutcome> {
    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let audio = audio.map(|path| {
        let player: Box<dyn AudioPlayer> = Box::new(FfplayPlayer::default());
        (path, player)
    });

    let outcome = if atty::is(atty::Stream::Stdout) {
        let mut sink = TerminalSink::new()?;
        sink.init()?;
        let done = CancellationToken::new();
        let watcher = spawn_input_watcher(cancel.clone(), done.clone());

        let result = pipeline::replay(config, store, &mut sink, &cancel, fps, audio).await;

        done.cancel();
        if let Err(e) = watcher.await {
            debug!("Input watcher ended abnormally: {}", e);
        }
        sink.cleanup()?;
        result
    } else {
        debug!("Stdout is not a terminal, writing frames as plain text");
        let mut sink = StreamSink::new(std::io::stdout());
        pipeline::replay(config, store, &mut sink, &cancel, fps, audio).await
    };

    Ok(outcome?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG still takes precedence
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    info!("Starting ASCII Replay v{}", VERSION);

    let config = cli.resolve_config().context("Invalid configuration")?;

    if cli.info_only {
        if let Some(path) = cli.video_path() {
            print_video_info(&path)?;
        }
        return Ok(());
    }

    let store = match cli.video_path() {
        Some(video) => {
            info!("Processing: {}", video.display());
            let prepared = pipeline::prepare(&config, &video, &FfmpegAudioExtractor::default())
                .with_context(|| format!("Failed to process {}", video.display()))?;
            info!(
                "Prepared {} frames ({} skipped)",
                prepared.conversion.converted,
                prepared.extraction.frames_unreadable + prepared.conversion.skipped as u64
            );
            prepared.store
        }
        None => {
            info!("Using existing processed files in {}", config.workdir.display());
            FrameStore::open(&config.workdir)?
        }
    };

    if cli.no_play {
        info!("Frames ready in {}", store.root().display());
        return Ok(());
    }

    let (fps, audio) = pipeline::resolve_playback(&config, &store, cli.fps)?;
    let outcome = play(&config, &store, fps, audio).await?;

    match outcome.state {
        PlaybackState::Cancelled => info!("Playback stopped."),
        _ => info!("Playback complete!"),
    }
    info!(
        "Presented {} frames in {:.1}s",
        outcome.frames_presented,
        outcome.elapsed.as_secs_f64()
    );
    Ok(())
}
