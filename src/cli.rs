use crate::config::{GlyphRamp, Pacing, PlayerConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Video file to convert; when omitted the frames already in the workdir are replayed
    pub file_path: Option<String>,

    /// ASCII width in characters
    #[arg(short, long)]
    pub width: Option<u32>,

    /// Keep every Nth frame of the video
    #[arg(short, long)]
    pub stride: Option<u32>,

    /// Playback frame rate (overrides the rate recorded for the session)
    #[arg(short, long)]
    pub fps: Option<f64>,

    /// Directory for frames/, ascii_frames/ and audio.mp3
    #[arg(short = 'C', long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Glyph ramp, densest glyph first
    #[arg(long)]
    pub ramp: Option<String>,

    /// Play without extracting or playing audio
    #[arg(long)]
    pub no_audio: bool,

    /// Schedule frames against the session start instead of each frame's own start
    #[arg(long)]
    pub anchored: bool,

    /// Prepare the frames without playing them
    #[arg(long)]
    pub no_play: bool,

    /// Show video information only (don't convert or play)
    #[arg(long)]
    pub info_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = self.video_path() {
            if !path.exists() {
                return Err(format!("Video file does not exist: {}", path.display()));
            }
        } else if self.info_only || self.no_play {
            return Err("A video file is required with --info-only and --no-play".to_string());
        }

        if self.width == Some(0) {
            return Err("Width must be greater than 0".to_string());
        }

        if self.stride == Some(0) {
            return Err("Stride must be greater than 0".to_string());
        }

        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err("FPS must be greater than 0".to_string());
            }
        }

        if let Some(ref ramp) = self.ramp {
            GlyphRamp::new(ramp).map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    /// The video path with surrounding quotes removed
    pub fn video_path(&self) -> Option<PathBuf> {
        self.file_path
            .as_deref()
            .map(normalize_path_input)
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Configuration file (if any) with the command line flags applied on top
    pub fn resolve_config(&self) -> crate::Result<PlayerConfig> {
        let mut config = match self.config {
            Some(ref path) => PlayerConfig::from_file(path)?,
            None => PlayerConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(stride) = self.stride {
            config.stride = stride;
        }
        if let Some(ref workdir) = self.workdir {
            config.workdir = workdir.clone();
        }
        if let Some(ref ramp) = self.ramp {
            config.ramp = GlyphRamp::new(ramp)?;
        }
        if self.no_audio {
            config.audio = false;
        }
        if self.anchored {
            config.pacing = Pacing::Anchored;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Trim a pasted path and strip one pair of matching surrounding quotes
pub fn normalize_path_input(input: &str) -> PathBuf {
    let trimmed = input.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|&q| {
            trimmed
                .strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })
        .unwrap_or(trimmed);
    PathBuf::from(unquoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("ascii-replay").chain(args.iter().copied()))
    }

    #[test]
    fn test_normalize_path_input() {
        assert_eq!(normalize_path_input("  movie.mp4 "), PathBuf::from("movie.mp4"));
        assert_eq!(normalize_path_input("\"my movie.mp4\""), PathBuf::from("my movie.mp4"));
        assert_eq!(normalize_path_input("'clip.mkv'"), PathBuf::from("clip.mkv"));
        assert_eq!(normalize_path_input("\"half.mp4'"), PathBuf::from("\"half.mp4'"));
    }

    #[test]
    fn test_defaults_resolve_to_default_config() {
        let cli = parse(&[]);
        assert!(cli.validate().is_ok());
        assert_eq!(cli.resolve_config().unwrap(), PlayerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&["-w", "60", "-s", "3", "-C", "out", "--no-audio", "--anchored", "--ramp", "#+. "]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.width, 60);
        assert_eq!(config.stride, 3);
        assert_eq!(config.workdir, PathBuf::from("out"));
        assert!(!config.audio);
        assert_eq!(config.pacing, Pacing::Anchored);
        assert_eq!(config.ramp.to_string(), "#+. ");
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse(&["-w", "0"]).validate().is_err());
        assert!(parse(&["-s", "0"]).validate().is_err());
        assert!(parse(&["-f", "0"]).validate().is_err());
        assert!(parse(&["--ramp", ""]).validate().is_err());
        assert!(parse(&["--info-only"]).validate().is_err());
        assert!(parse(&["nonexistent.mp4"]).validate().is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"width": 40, "stride": 2}"#).unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "-w", "90"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.width, 90);
        assert_eq!(config.stride, 2);
    }
}
