//! ASCII Replay - converts video files into ASCII art frames and replays them
//! in the terminal
//!
//! The pipeline runs in strictly ordered stages: the [`Sampler`] pulls frames
//! from a decoder into the [`FrameStore`], the [`Quantizer`] turns every stored
//! frame into a fixed-width [`AsciiFrame`], and the [`Scheduler`] replays the
//! ascii frames at a target frame rate, optionally next to a detached audio
//! task.

pub mod audio;
pub mod cli;
pub mod config;
pub mod converter;
pub mod decoder;
pub mod pipeline;
pub mod renderer;
pub mod sampler;
pub mod scheduler;
pub mod store;

use std::path::PathBuf;

pub use audio::{AudioExtractor, AudioHandle, AudioPlayer, FfmpegAudioExtractor, FfplayPlayer};
pub use cli::Cli;
pub use config::{GlyphRamp, Pacing, PlayerConfig};
pub use converter::{AsciiFrame, ConversionReport, Quantizer};
pub use decoder::{FrameSource, RawFrame, VideoDecoder, VideoInfo};
pub use renderer::{calculate_frame_delay, OutputSink, StreamSink, TerminalSink};
pub use sampler::{ExtractionReport, RawFrameSink, Sampler};
pub use scheduler::{CancellationToken, PlaybackOutcome, PlaybackSession, PlaybackState, Scheduler};
pub use store::{ArtifactKind, FrameStore, PurgeTarget, SessionManifest};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Default glyph ramp, densest glyph first
pub const DEFAULT_GLYPH_RAMP: &str = "@%#*+=-:. ";

/// Target width in characters when none is configured
pub const DEFAULT_WIDTH: u32 = 100;

/// Vertical correction for glyph cells being taller than wide
pub const CELL_ASPECT_CORRECTION: f64 = 0.55;

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Could not open video source '{path}': {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Invalid frame: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("No {kind} artifact at index {index}")]
    NotFound { kind: store::ArtifactKind, index: u64 },

    #[error("No ASCII frames found in {}", .dir.display())]
    EmptySession { dir: PathBuf },

    #[error("Video decoding error: {0}")]
    Decode(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl PlayerError {
    /// Whether the error only affects a single frame and the stage may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::Decode(_) | PlayerError::InvalidFrame { .. } | PlayerError::Image(_)
        )
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Height over width, the ratio the grid height is derived from
    pub fn calculate_aspect_ratio(width: u32, height: u32) -> f64 {
        height as f64 / width as f64
    }

    /// Number of decimal digits needed to print `value`
    pub fn decimal_digits(value: u64) -> usize {
        let mut digits = 1;
        let mut rest = value / 10;
        while rest > 0 {
            digits += 1;
            rest /= 10;
        }
        digits
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        calculate_frame_delay, utils::*, ArtifactKind, AsciiFrame, CancellationToken,
        ExtractionReport, FrameSource, FrameStore, GlyphRamp, Pacing, PlaybackOutcome,
        PlaybackState, PlayerConfig, PlayerError, PurgeTarget, Quantizer, RawFrame, Result,
        Sampler, Scheduler, SessionManifest,
    };
}
