use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio::task::JoinHandle;

/// Pulls the audio track out of a video file
///
/// Failure is never fatal: implementations log a warning and return `None`,
/// and playback continues without sound.
pub trait AudioExtractor {
    fn extract(&self, video: &Path, output: &Path) -> Option<PathBuf>;
}

/// Starts playback of an audio file as a detached task
pub trait AudioPlayer: Send + Sync {
    fn start(&self, audio: &Path) -> AudioHandle;
}

/// Handle to a detached audio task
///
/// The task is never paused, resynchronized or joined; it ends on its own or
/// when the runtime shuts down at process exit.
#[derive(Debug)]
pub struct AudioHandle {
    task: JoinHandle<()>,
}

impl AudioHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Extracts audio to MP3 with the `ffmpeg` command line tool
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    program: String,
}

impl Default for FfmpegAudioExtractor {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegAudioExtractor {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioExtractor for FfmpegAudioExtractor {
    fn extract(&self, video: &Path, output: &Path) -> Option<PathBuf> {
        info!("Extracting audio from video...");

        let result = Command::new(&self.program)
            .args(["-loglevel", "error", "-y", "-i"])
            .arg(video)
            .args(["-vn", "-acodec", "libmp3lame"])
            .arg(output)
            .stdin(Stdio::null())
            .output();

        match result {
            Ok(out) if out.status.success() => {
                info!("Audio extracted successfully: {}", output.display());
                Some(output.to_path_buf())
            }
            Ok(out) => {
                debug!("{} stderr: {}", self.program, String::from_utf8_lossy(&out.stderr));
                warn!("Could not extract audio, the video will play without sound");
                None
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "{} not found. Install ffmpeg to enable audio playback; the video will play without sound",
                    self.program
                );
                None
            }
            Err(e) => {
                warn!("Error extracting audio: {}; the video will play without sound", e);
                None
            }
        }
    }
}

/// Plays audio with `ffplay`, without a window
#[derive(Debug, Clone)]
pub struct FfplayPlayer {
    program: String,
}

impl Default for FfplayPlayer {
    fn default() -> Self {
        Self {
            program: "ffplay".to_string(),
        }
    }
}

impl AudioPlayer for FfplayPlayer {
    fn start(&self, audio: &Path) -> AudioHandle {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(["-nodisp", "-autoexit", "-loglevel", "quiet"])
            .arg(audio)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let program = self.program.clone();
        let task = tokio::spawn(async move {
            match command.status().await {
                Ok(status) if status.success() => debug!("Audio playback finished"),
                Ok(status) => warn!("{} exited with {}", program, status),
                Err(e) => warn!("Could not start audio playback with {}: {}", program, e),
            }
        });

        AudioHandle::new(task)
    }
}
