use crate::converter::AsciiFrame;
use crate::decoder::RawFrame;
use crate::utils::decimal_digits;
use crate::{PlayerError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding raw frames
pub const FRAMES_DIR: &str = "frames";
/// Directory holding quantized frames
pub const ASCII_DIR: &str = "ascii_frames";
/// Extracted audio track
pub const AUDIO_FILE: &str = "audio.mp3";
/// Properties of the last prepared session
pub const MANIFEST_FILE: &str = "session.json";
/// Minimum number of digits in an artifact index
pub const MIN_INDEX_WIDTH: usize = 6;

const FILE_PREFIX: &str = "frame_";

/// The two kinds of indexed artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Raw,
    Ascii,
}

impl ArtifactKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Raw => FRAMES_DIR,
            ArtifactKind::Ascii => ASCII_DIR,
        }
    }

    /// Accepted extensions; the first one is used for writing
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Raw => &["png", "jpg", "jpeg"],
            ArtifactKind::Ascii => &["txt"],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Raw => write!(f, "raw"),
            ArtifactKind::Ascii => write!(f, "ascii"),
        }
    }
}

/// A payload that can be persisted in a [`FrameStore`]
pub trait Artifact: Sized {
    const KIND: ArtifactKind;

    fn write_to(&self, path: &Path) -> Result<()>;

    fn read_from(path: &Path) -> Result<Self>;
}

impl Artifact for RawFrame {
    const KIND: ArtifactKind = ArtifactKind::Raw;

    fn write_to(&self, path: &Path) -> Result<()> {
        if !self.is_valid() {
            return Err(PlayerError::InvalidFrame {
                width: self.width,
                height: self.height,
            });
        }
        let len = self.width as usize * self.height as usize * 3;
        image::save_buffer(path, &self.data[..len], self.width, self.height, image::ColorType::Rgb8)?;
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self> {
        let rgb = image::open(path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(RawFrame::new(width, height, rgb.into_raw()))
    }
}

impl Artifact for AsciiFrame {
    const KIND: ArtifactKind = ArtifactKind::Ascii;

    fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(AsciiFrame::from_text(&text))
    }
}

/// Artifacts removable with [`FrameStore::purge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeTarget {
    RawFrames,
    AsciiFrames,
    Audio,
    Manifest,
}

impl PurgeTarget {
    pub const ALL: [PurgeTarget; 4] = [
        PurgeTarget::RawFrames,
        PurgeTarget::AsciiFrames,
        PurgeTarget::Audio,
        PurgeTarget::Manifest,
    ];
}

/// What a replay needs to know about a prepared session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    /// Playback rate: source rate divided by stride
    pub frame_rate: f64,
    pub source_frame_rate: f64,
    pub stride: u32,
    pub width: u32,
    pub frames_written: u64,
    pub ramp: String,
}

/// Indexed on-disk storage of raw and quantized frames
///
/// Artifacts live at `<root>/frames/frame_<index>.png` and
/// `<root>/ascii_frames/frame_<index>.txt`, with the index zero-padded so a
/// lexical sort of the names matches numeric order.
#[derive(Debug, Clone)]
pub struct FrameStore {
    root: PathBuf,
    index_width: usize,
}

impl FrameStore {
    /// Open a store rooted at `root`, reusing the index width of any artifacts on disk
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            root: root.into(),
            index_width: MIN_INDEX_WIDTH,
        };
        if let Some(width) = store.detect_index_width()? {
            debug!("Detected artifact index width {} in {}", width, store.root.display());
            store.index_width = width;
        }
        Ok(store)
    }

    /// Widen the index so up to `max_expected_frames` artifacts keep lexical order
    pub fn with_capacity(mut self, max_expected_frames: u64) -> Self {
        self.index_width = MIN_INDEX_WIDTH.max(decimal_digits(max_expected_frames));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_width(&self) -> usize {
        self.index_width
    }

    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn audio_path(&self) -> PathBuf {
        self.root.join(AUDIO_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// File name of the artifact at `index`, without extension
    pub fn file_stem(&self, index: u64) -> String {
        format!("{}{:0width$}", FILE_PREFIX, index, width = self.index_width)
    }

    fn path_for(&self, kind: ArtifactKind, index: u64, extension: &str) -> PathBuf {
        self.dir(kind)
            .join(format!("{}.{}", self.file_stem(index), extension))
    }

    /// Persist `artifact` at `index`, replacing what was there
    pub fn put<A: Artifact>(&self, index: u64, artifact: &A) -> Result<()> {
        let kind = A::KIND;
        fs::create_dir_all(self.dir(kind))?;
        let path = self.path_for(kind, index, kind.extensions()[0]);
        artifact.write_to(&path)?;
        debug!("Stored {} artifact {}", kind, path.display());
        Ok(())
    }

    /// Load the artifact at `index`
    pub fn get<A: Artifact>(&self, index: u64) -> Result<A> {
        let kind = A::KIND;
        let path = kind
            .extensions()
            .iter()
            .map(|ext| self.path_for(kind, index, ext))
            .find(|path| path.is_file())
            .ok_or(PlayerError::NotFound { kind, index })?;
        A::read_from(&path)
    }

    /// Indices of stored artifacts in strictly increasing numeric order
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<u64>> {
        let mut indices: Vec<u64> = self
            .artifact_names(kind)?
            .iter()
            .filter_map(|name| parse_index(name, kind).map(|(index, _)| index))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }

    /// Whether at least one artifact of `kind` exists
    pub fn has_artifacts(&self, kind: ArtifactKind) -> Result<bool> {
        Ok(!self.list(kind)?.is_empty())
    }

    /// Delete the given artifacts; missing ones are ignored
    pub fn purge(&self, targets: &[PurgeTarget]) -> Result<()> {
        for target in targets {
            match target {
                PurgeTarget::RawFrames => remove_dir(&self.dir(ArtifactKind::Raw))?,
                PurgeTarget::AsciiFrames => remove_dir(&self.dir(ArtifactKind::Ascii))?,
                PurgeTarget::Audio => remove_file(&self.audio_path())?,
                PurgeTarget::Manifest => remove_file(&self.manifest_path())?,
            }
        }
        Ok(())
    }

    pub fn write_manifest(&self, manifest: &SessionManifest) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(self.manifest_path(), json)?;
        Ok(())
    }

    /// Read the session manifest, `None` when no session was prepared here
    pub fn read_manifest(&self) -> Result<Option<SessionManifest>> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn artifact_names(&self, kind: ArtifactKind) -> Result<Vec<String>> {
        let dir = self.dir(kind);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn detect_index_width(&self) -> Result<Option<usize>> {
        let mut width: Option<usize> = None;
        for kind in [ArtifactKind::Raw, ArtifactKind::Ascii] {
            for name in self.artifact_names(kind)? {
                if let Some((_, digits)) = parse_index(&name, kind) {
                    width = Some(width.map_or(digits, |w| w.min(digits)));
                }
            }
        }
        Ok(width)
    }
}

/// Parse `frame_<digits>.<ext>` into the index and its digit count
fn parse_index(name: &str, kind: ArtifactKind) -> Option<(u64, usize)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if !kind
        .extensions()
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
    {
        return None;
    }
    let digits = stem.strip_prefix(FILE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, digits.len()))
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
        info!("Deleted: {}", path.display());
    }
    Ok(())
}

fn remove_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
        info!("Deleted: {}", path.display());
    }
    Ok(())
}
