use crate::audio::{AudioHandle, AudioPlayer};
use crate::config::Pacing;
use crate::converter::AsciiFrame;
use crate::renderer::{calculate_frame_delay, OutputSink};
use crate::store::{ArtifactKind, FrameStore};
use crate::{PlayerError, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Shared stop request, observed by the frame loop between frames
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a playback run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    /// Every frame was presented
    Stopped,
    /// Interrupted before the last frame
    Cancelled,
}

/// One playback run over the ascii artifacts of a store
#[derive(Debug)]
pub struct PlaybackSession {
    indices: Vec<u64>,
    target_frame_rate: f64,
    audio: Option<AudioHandle>,
}

impl PlaybackSession {
    pub fn frame_count(&self) -> usize {
        self.indices.len()
    }

    pub fn target_frame_rate(&self) -> f64 {
        self.target_frame_rate
    }

    /// The detached audio task, if one was started
    pub fn audio(&self) -> Option<&AudioHandle> {
        self.audio.as_ref()
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOutcome {
    pub state: PlaybackState,
    pub frames_presented: u64,
    pub elapsed: Duration,
}

/// Replays ascii frames at a target rate
pub struct Scheduler<'a> {
    store: &'a FrameStore,
    pacing: Pacing,
    audio_player: Option<Box<dyn AudioPlayer>>,
    state: PlaybackState,
}

impl<'a> Scheduler<'a> {
    pub fn new(store: &'a FrameStore, pacing: Pacing) -> Self {
        Self {
            store,
            pacing,
            audio_player: None,
            state: PlaybackState::Idle,
        }
    }

    /// Player used for the audio track passed to [`Scheduler::start_session`]
    pub fn with_audio_player(mut self, player: Box<dyn AudioPlayer>) -> Self {
        self.audio_player = Some(player);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Move from `Idle` to `Playing`
    ///
    /// Fails with `EmptySession` when the store holds no ascii frames. The
    /// audio track, when present, is started here and nowhere else; it must
    /// be called from within a tokio runtime in that case.
    pub fn start_session(
        &mut self,
        target_frame_rate: f64,
        audio: Option<PathBuf>,
    ) -> Result<PlaybackSession> {
        if self.state != PlaybackState::Idle {
            return Err(PlayerError::InvalidConfig(
                "Playback session already started".to_string(),
            ));
        }
        if !(target_frame_rate.is_finite() && target_frame_rate > 0.0) {
            return Err(PlayerError::InvalidConfig(format!(
                "Frame rate must be greater than 0 (got {})",
                target_frame_rate
            )));
        }

        let indices = self.store.list(ArtifactKind::Ascii)?;
        if indices.is_empty() {
            return Err(PlayerError::EmptySession {
                dir: self.store.dir(ArtifactKind::Ascii),
            });
        }

        let audio = match (audio, &self.audio_player) {
            (Some(path), Some(player)) if path.is_file() => {
                debug!("Starting audio track {}", path.display());
                Some(player.start(&path))
            }
            (Some(path), Some(_)) => {
                warn!("Audio file {} not found, playing without sound", path.display());
                None
            }
            (Some(_), None) => {
                warn!("No audio player configured, playing without sound");
                None
            }
            (None, _) => None,
        };

        info!("Playing {} frames at {:.2} FPS", indices.len(), target_frame_rate);
        self.state = PlaybackState::Playing;

        Ok(PlaybackSession {
            indices,
            target_frame_rate,
            audio,
        })
    }

    /// Present every frame of `session` on `sink`, pacing to the target rate
    ///
    /// Cancellation is checked before each frame, never during a write. The
    /// state stays `Playing` until the loop ends; a failed load or write
    /// returns the error and leaves it there.
    pub async fn run(
        &mut self,
        session: &PlaybackSession,
        sink: &mut dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        if self.state != PlaybackState::Playing {
            return Err(PlayerError::InvalidConfig(
                "Playback session not started".to_string(),
            ));
        }

        let interval = calculate_frame_delay(session.target_frame_rate);
        let session_start = Instant::now();
        let mut frames_presented = 0u64;
        let mut finished = PlaybackState::Stopped;

        for (position, &index) in session.indices.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Playback stopped after {} frames", frames_presented);
                finished = PlaybackState::Cancelled;
                break;
            }

            let frame_start = Instant::now();
            let frame: AsciiFrame = self.store.get(index)?;
            sink.present(&frame)?;
            frames_presented += 1;

            let delay = match self.pacing {
                Pacing::PerFrame => interval.saturating_sub(frame_start.elapsed()),
                Pacing::Anchored => {
                    let deadline = session_start + interval.mul_f64((position + 1) as f64);
                    deadline.saturating_duration_since(Instant::now())
                }
            };
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }

        self.state = finished;
        let elapsed = session_start.elapsed();
        debug!(
            "Presented {} frames in {:.2}s ({:?})",
            frames_presented,
            elapsed.as_secs_f64(),
            self.state
        );

        Ok(PlaybackOutcome {
            state: self.state,
            frames_presented,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::{tempdir, TempDir};

    fn store_with_frames(indices: &[u64]) -> (TempDir, FrameStore) {
        let dir = tempdir().unwrap();
        let store = FrameStore::open(dir.path()).unwrap();
        for &index in indices {
            store
                .put(index, &AsciiFrame::from_text(&format!("{}\n", index)))
                .unwrap();
        }
        (dir, store)
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<String>,
        cancel_after: Option<(usize, CancellationToken)>,
        first_frame_cost: Option<Duration>,
    }

    impl OutputSink for RecordingSink {
        fn present(&mut self, frame: &AsciiFrame) -> Result<()> {
            if self.frames.is_empty() {
                if let Some(cost) = self.first_frame_cost {
                    std::thread::sleep(cost);
                }
            }
            self.frames.push(frame.to_text());
            if let Some((after, token)) = &self.cancel_after {
                if self.frames.len() == *after {
                    token.cancel();
                }
            }
            Ok(())
        }
    }

    struct FailingSink {
        fail_at: usize,
        presented: usize,
    }

    impl OutputSink for FailingSink {
        fn present(&mut self, _frame: &AsciiFrame) -> Result<()> {
            if self.presented == self.fail_at {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into());
            }
            self.presented += 1;
            Ok(())
        }
    }

    struct CountingPlayer {
        starts: Arc<AtomicUsize>,
    }

    impl AudioPlayer for CountingPlayer {
        fn start(&self, _audio: &std::path::Path) -> AudioHandle {
            self.starts.fetch_add(1, Ordering::SeqCst);
            AudioHandle::new(tokio::spawn(async {}))
        }
    }

    #[test]
    fn test_empty_store_fails() {
        let (_dir, store) = store_with_frames(&[]);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);

        let result = scheduler.start_session(30.0, None);
        assert!(matches!(result, Err(PlayerError::EmptySession { .. })));
        assert_eq!(scheduler.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_invalid_frame_rate() {
        let (_dir, store) = store_with_frames(&[0]);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        assert!(scheduler.start_session(0.0, None).is_err());
        assert!(scheduler.start_session(f64::NAN, None).is_err());
    }

    #[tokio::test]
    async fn test_plays_every_frame_in_order() {
        let (_dir, store) = store_with_frames(&[10, 0, 2]);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        let session = scheduler.start_session(500.0, None).unwrap();
        assert_eq!(scheduler.state(), PlaybackState::Playing);

        let mut sink = RecordingSink::default();
        let outcome = scheduler
            .run(&session, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, PlaybackState::Stopped);
        assert_eq!(outcome.frames_presented, 3);
        assert_eq!(sink.frames, vec!["0\n", "2\n", "10\n"]);
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_cancellation_between_frames() {
        let indices: Vec<u64> = (0..10).collect();
        let (_dir, store) = store_with_frames(&indices);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        let session = scheduler.start_session(500.0, None).unwrap();

        let token = CancellationToken::new();
        let mut sink = RecordingSink {
            cancel_after: Some((3, token.clone())),
            ..Default::default()
        };
        let outcome = scheduler.run(&session, &mut sink, &token).await.unwrap();

        assert_eq!(outcome.state, PlaybackState::Cancelled);
        assert_eq!(outcome.frames_presented, 3);
        assert_eq!(sink.frames.len(), 3);
    }

    #[tokio::test]
    async fn test_session_cannot_start_twice() {
        let (_dir, store) = store_with_frames(&[0]);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        scheduler.start_session(30.0, None).unwrap();
        assert!(scheduler.start_session(30.0, None).is_err());
    }

    #[tokio::test]
    async fn test_audio_starts_exactly_once() {
        let (dir, store) = store_with_frames(&[0, 1, 2]);
        let audio = dir.path().join("audio.mp3");
        std::fs::write(&audio, b"mp3").unwrap();

        let starts = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame).with_audio_player(Box::new(
            CountingPlayer {
                starts: Arc::clone(&starts),
            },
        ));
        let session = scheduler.start_session(500.0, Some(audio)).unwrap();
        assert!(session.audio().is_some());

        let mut sink = RecordingSink::default();
        scheduler
            .run(&session, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_audio_plays_silently() {
        let (dir, store) = store_with_frames(&[0]);
        let starts = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame).with_audio_player(Box::new(
            CountingPlayer {
                starts: Arc::clone(&starts),
            },
        ));

        let session = scheduler
            .start_session(30.0, Some(dir.path().join("audio.mp3")))
            .unwrap();
        assert!(session.audio().is_none());
        assert_eq!(starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_per_frame_pacing_holds_interval() {
        let indices: Vec<u64> = (0..5).collect();
        let (_dir, store) = store_with_frames(&indices);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        let session = scheduler.start_session(50.0, None).unwrap();

        let mut sink = RecordingSink::default();
        let outcome = scheduler
            .run(&session, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.elapsed >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_anchored_pacing_recovers_overrun() {
        let indices: Vec<u64> = (0..5).collect();
        let (_dir, store) = store_with_frames(&indices);

        let mut elapsed = Vec::new();
        for pacing in [Pacing::PerFrame, Pacing::Anchored] {
            let mut scheduler = Scheduler::new(&store, pacing);
            let session = scheduler.start_session(50.0, None).unwrap();
            let mut sink = RecordingSink {
                first_frame_cost: Some(Duration::from_millis(60)),
                ..Default::default()
            };
            let outcome = scheduler
                .run(&session, &mut sink, &CancellationToken::new())
                .await
                .unwrap();
            elapsed.push(outcome.elapsed);
        }

        // Per-frame pacing carries the 40ms overrun, anchored pacing absorbs it
        assert!(elapsed[0] >= Duration::from_millis(140));
        assert!(elapsed[1] < elapsed[0]);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_finish_session() {
        let indices: Vec<u64> = (0..5).collect();
        let (_dir, store) = store_with_frames(&indices);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        let session = scheduler.start_session(500.0, None).unwrap();

        let mut sink = FailingSink {
            fail_at: 2,
            presented: 0,
        };
        let result = scheduler.run(&session, &mut sink, &CancellationToken::new()).await;

        assert!(matches!(result, Err(PlayerError::Io(_))));
        assert_eq!(sink.presented, 2);
        assert_eq!(scheduler.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_cancelled_state_is_recorded() {
        let (_dir, store) = store_with_frames(&[0, 1]);
        let mut scheduler = Scheduler::new(&store, Pacing::PerFrame);
        let session = scheduler.start_session(500.0, None).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let outcome = scheduler
            .run(&session, &mut RecordingSink::default(), &token)
            .await
            .unwrap();

        assert_eq!(outcome.state, PlaybackState::Cancelled);
        assert_eq!(outcome.frames_presented, 0);
        assert_eq!(scheduler.state(), PlaybackState::Cancelled);
    }
}
