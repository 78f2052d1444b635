use crate::{PlayerError, Result, DEFAULT_GLYPH_RAMP, DEFAULT_WIDTH};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Ordered glyphs used for luminance buckets, darkest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlyphRamp {
    glyphs: Vec<char>,
}

impl GlyphRamp {
    /// Build a ramp from its glyphs, densest first
    pub fn new(glyphs: &str) -> Result<Self> {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.is_empty() {
            return Err(PlayerError::InvalidConfig("Glyph ramp must not be empty".to_string()));
        }
        if let Some(c) = glyphs.iter().find(|c| c.is_control()) {
            return Err(PlayerError::InvalidConfig(format!(
                "Glyph ramp must not contain control characters (found {:?})",
                c
            )));
        }
        Ok(Self { glyphs })
    }

    /// Number of glyphs in the ramp, never zero
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Glyph for bucket `index`, clamped to the last glyph
    pub fn glyph(&self, index: usize) -> char {
        self.glyphs[index.min(self.glyphs.len() - 1)]
    }

    pub fn densest(&self) -> char {
        self.glyphs[0]
    }

    pub fn sparsest(&self) -> char {
        self.glyphs[self.glyphs.len() - 1]
    }

    pub fn contains(&self, c: char) -> bool {
        self.glyphs.contains(&c)
    }

    /// Map a luminance value onto a bucket: `floor(p / 255 * (R - 1))`
    pub fn index_for(&self, luminance: u8) -> usize {
        let last = self.glyphs.len() - 1;
        (luminance as usize * last / 255).min(last)
    }
}

impl Default for GlyphRamp {
    fn default() -> Self {
        Self {
            glyphs: DEFAULT_GLYPH_RAMP.chars().collect(),
        }
    }
}

impl fmt::Display for GlyphRamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.glyphs {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for GlyphRamp {
    type Error = PlayerError;

    fn try_from(value: String) -> Result<Self> {
        GlyphRamp::new(&value)
    }
}

impl From<GlyphRamp> for String {
    fn from(ramp: GlyphRamp) -> Self {
        ramp.to_string()
    }
}

/// How the scheduler computes the sleep between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// Each frame sleeps `T - elapsed` measured from its own start; overruns
    /// are never recovered
    #[default]
    PerFrame,
    /// Frame `i` is due at `start + i * T`
    Anchored,
}

/// Pipeline configuration, resolved before anything runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Glyphs used for quantization
    pub ramp: GlyphRamp,
    /// Target grid width in characters
    pub width: u32,
    /// Keep every Nth source frame
    pub stride: u32,
    /// Playback rate when no session manifest is available
    pub fallback_fps: f64,
    /// Directory holding `frames/`, `ascii_frames/` and `audio.mp3`
    pub workdir: PathBuf,
    /// Extract and play the audio track
    pub audio: bool,
    pub pacing: Pacing,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ramp: GlyphRamp::default(),
            width: DEFAULT_WIDTH,
            stride: 1,
            fallback_fps: 30.0,
            workdir: PathBuf::from("."),
            audio: true,
            pacing: Pacing::PerFrame,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: PlayerConfig = serde_json::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(PlayerError::InvalidConfig("Width must be at least 1".to_string()));
        }
        if self.stride == 0 {
            return Err(PlayerError::InvalidConfig("Stride must be at least 1".to_string()));
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(PlayerError::InvalidConfig(
                "Fallback FPS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Frame rate used when replaying a store that carries no manifest
    pub fn fallback_playback_fps(&self) -> f64 {
        self.fallback_fps / self.stride as f64
    }
}
