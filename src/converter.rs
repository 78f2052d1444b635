use crate::config::GlyphRamp;
use crate::decoder::RawFrame;
use crate::store::{ArtifactKind, FrameStore};
use crate::{PlayerError, Result, CELL_ASPECT_CORRECTION};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use log::{debug, info, warn};

/// A quantized frame: `height` rows of `width` glyphs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiFrame {
    /// Glyphs in row-major order
    pub characters: Vec<char>,
    /// Frame width in characters
    pub width: u32,
    /// Frame height in characters
    pub height: u32,
}

impl AsciiFrame {
    /// Iterate over the rows of the grid
    pub fn rows(&self) -> impl Iterator<Item = &[char]> {
        self.characters.chunks(self.width.max(1) as usize)
    }

    /// Render as text, every row terminated by a newline
    pub fn to_text(&self) -> String {
        let mut text =
            String::with_capacity((self.width as usize + 1) * self.height as usize);
        for row in self.rows() {
            text.extend(row.iter());
            text.push('\n');
        }
        text
    }

    /// Parse text written by [`AsciiFrame::to_text`]
    ///
    /// Short rows are padded with spaces so the grid stays rectangular.
    pub fn from_text(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

        let mut characters = Vec::with_capacity(width * lines.len());
        for line in &lines {
            let mut count = 0;
            for c in line.chars() {
                characters.push(c);
                count += 1;
            }
            characters.extend(std::iter::repeat(' ').take(width - count));
        }

        Self {
            characters,
            width: width as u32,
            height: lines.len() as u32,
        }
    }
}

/// Turns raw color frames into fixed-width glyph grids
#[derive(Debug, Clone)]
pub struct Quantizer {
    ramp: GlyphRamp,
    width: u32,
}

/// Outcome of converting every raw artifact in a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub converted: usize,
    pub skipped: usize,
}

impl Quantizer {
    /// Create a quantizer producing grids `width` glyphs wide
    pub fn new(ramp: GlyphRamp, width: u32) -> Result<Self> {
        if width == 0 {
            return Err(PlayerError::InvalidConfig("Width must be at least 1".to_string()));
        }
        Ok(Self { ramp, width })
    }

    /// Grid size for a source of `src_width x src_height` pixels
    ///
    /// The height is `floor(aspect * width * 0.55)` with `aspect = h / w`,
    /// never less than one row.
    pub fn grid_dimensions(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let aspect_ratio = crate::utils::calculate_aspect_ratio(src_width, src_height);
        let height = (aspect_ratio * self.width as f64 * CELL_ASPECT_CORRECTION).floor() as u32;
        (self.width, height.max(1))
    }

    /// Quantize one frame
    pub fn quantize(&self, frame: &RawFrame) -> Result<AsciiFrame> {
        if !frame.is_valid() {
            return Err(PlayerError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        let (width, height) = self.grid_dimensions(frame.width, frame.height);
        debug!(
            "Quantizing {}x{} frame to {}x{} grid",
            frame.width, frame.height, width, height
        );

        let gray = GrayImage::from_fn(frame.width, frame.height, |x, y| {
            let i = ((y * frame.width + x) * 3) as usize;
            Luma([calculate_luminance(frame.data[i], frame.data[i + 1], frame.data[i + 2])])
        });
        let resized = imageops::resize(&gray, width, height, FilterType::Triangle);

        let characters = resized
            .pixels()
            .map(|Luma([p])| self.ramp.glyph(self.ramp.index_for(*p)))
            .collect();

        Ok(AsciiFrame {
            characters,
            width,
            height,
        })
    }

    /// Quantize every raw artifact in `store` into an ascii artifact at the same index
    ///
    /// Raw artifacts that cannot be read are skipped with a warning.
    pub fn convert_store(&self, store: &FrameStore) -> Result<ConversionReport> {
        let indices = store.list(ArtifactKind::Raw)?;
        let total = indices.len();
        let mut report = ConversionReport::default();

        if total == 0 {
            warn!("No frames found in {}", store.dir(ArtifactKind::Raw).display());
            return Ok(report);
        }

        info!("Converting {} frames to ASCII...", total);

        for (i, index) in indices.into_iter().enumerate() {
            let raw: RawFrame = match store.get(index) {
                Ok(raw) => raw,
                Err(e) if e.is_recoverable() => {
                    warn!("Could not read frame {}: {}", index, e);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let ascii = match self.quantize(&raw) {
                Ok(ascii) => ascii,
                Err(e) if e.is_recoverable() => {
                    warn!("Could not quantize frame {}: {}", index, e);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            store.put(index, &ascii)?;
            report.converted += 1;

            if (i + 1) % 50 == 0 || i + 1 == total {
                info!("Converted {}/{} frames", i + 1, total);
            }
        }

        Ok(report)
    }
}

/// Luma using the ITU-R BT.601 weights, in 14-bit fixed point
pub fn calculate_luminance(r: u8, g: u8, b: u8) -> u8 {
    let weighted = 4899 * r as u32 + 9617 * g as u32 + 1868 * b as u32;
    ((weighted + 8192) >> 14).min(255) as u8
}
