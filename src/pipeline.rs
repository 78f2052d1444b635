//! Stage orchestration: prepare a workdir from a video, then replay it

use crate::audio::{AudioExtractor, AudioPlayer};
use crate::config::PlayerConfig;
use crate::converter::{ConversionReport, Quantizer};
use crate::decoder::{FrameSource, VideoDecoder, VideoInfo};
use crate::renderer::OutputSink;
use crate::sampler::{ExtractionReport, Sampler};
use crate::scheduler::{CancellationToken, PlaybackOutcome, Scheduler};
use crate::store::{FrameStore, PurgeTarget, SessionManifest};
use crate::{PlayerError, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// A workdir ready for playback
#[derive(Debug)]
pub struct PreparedSession {
    pub store: FrameStore,
    pub extraction: ExtractionReport,
    pub conversion: ConversionReport,
    pub audio: Option<PathBuf>,
    pub manifest: SessionManifest,
}

/// Read the properties of a video without extracting anything
pub fn describe(video: &Path) -> Result<VideoInfo> {
    Ok(VideoDecoder::open(video)?.info())
}

/// Replace the artifacts in the configured workdir with a fresh run over `video`
pub fn prepare(
    config: &PlayerConfig,
    video: &Path,
    extractor: &dyn AudioExtractor,
) -> Result<PreparedSession> {
    let mut source = VideoDecoder::open(video)?;
    prepare_from_source(config, &mut source, Some((video, extractor)))
}

/// Purge, extract, extract audio, quantize and write the session manifest
pub fn prepare_from_source<S: FrameSource + ?Sized>(
    config: &PlayerConfig,
    source: &mut S,
    audio: Option<(&Path, &dyn AudioExtractor)>,
) -> Result<PreparedSession> {
    config.validate()?;

    let store = FrameStore::open(&config.workdir)?;
    info!("Cleaning up old files...");
    store.purge(&PurgeTarget::ALL)?;
    std::fs::create_dir_all(store.root())?;
    let mut store = store.with_capacity(source.info().frame_count);

    info!("Step 1: Extracting frames from video...");
    let extraction = Sampler::new(config.stride)?.extract(source, &mut store)?;
    if extraction.frames_written == 0 {
        return Err(PlayerError::Decode(
            "Failed to extract any frames from the video".to_string(),
        ));
    }

    let audio = match audio {
        Some((video, extractor)) if config.audio => {
            info!("Step 2: Extracting audio from video...");
            extractor.extract(video, &store.audio_path())
        }
        _ => {
            debug!("Audio extraction disabled");
            None
        }
    };

    info!("Step 3: Converting frames to ASCII...");
    let quantizer = Quantizer::new(config.ramp.clone(), config.width)?;
    let conversion = quantizer.convert_store(&store)?;
    info!(
        "Conversion complete! ASCII frames saved in '{}'",
        store.dir(crate::ArtifactKind::Ascii).display()
    );

    let manifest = SessionManifest {
        frame_rate: extraction.effective_frame_rate,
        source_frame_rate: source.info().frame_rate,
        stride: config.stride,
        width: config.width,
        frames_written: extraction.frames_written,
        ramp: config.ramp.to_string(),
    };
    store.write_manifest(&manifest)?;

    Ok(PreparedSession {
        store,
        extraction,
        conversion,
        audio,
        manifest,
    })
}

/// Playback rate and audio track for replaying `store`
///
/// The rate comes from `fps_override`, then the session manifest, then the
/// configured fallback divided by the stride.
pub fn resolve_playback(
    config: &PlayerConfig,
    store: &FrameStore,
    fps_override: Option<f64>,
) -> Result<(f64, Option<PathBuf>)> {
    let fps = match fps_override {
        Some(fps) => fps,
        None => match store.read_manifest()? {
            Some(manifest) => manifest.frame_rate,
            None => {
                info!("No session manifest found, assuming {:.2} FPS", config.fallback_playback_fps());
                config.fallback_playback_fps()
            }
        },
    };

    let audio_path = store.audio_path();
    let audio = (config.audio && audio_path.is_file()).then_some(audio_path);
    Ok((fps, audio))
}

/// Play every ascii frame of `store` on `sink` until done or cancelled
pub async fn replay(
    config: &PlayerConfig,
    store: &FrameStore,
    sink: &mut dyn OutputSink,
    cancel: &CancellationToken,
    fps: f64,
    audio: Option<(PathBuf, Box<dyn AudioPlayer>)>,
) -> Result<PlaybackOutcome> {
    let mut scheduler = Scheduler::new(store, config.pacing);
    let track = match audio {
        Some((path, player)) => {
            scheduler = scheduler.with_audio_player(player);
            Some(path)
        }
        None => None,
    };

    let session = scheduler.start_session(fps, track)?;
    let outcome = scheduler.run(&session, sink, cancel).await?;

    if let Some(handle) = session.audio() {
        if !handle.is_finished() {
            debug!("Audio still playing; it stops when the process exits");
        }
    }
    Ok(outcome)
}
