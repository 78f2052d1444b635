use crate::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use log::{debug, info};
use std::path::Path;

/// Properties of an opened video source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Frames per second
    pub frame_rate: f64,
    /// Number of frames reported by the container (may be an estimate)
    pub frame_count: u64,
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// A decoded frame: row-major RGB24 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Raw RGB data, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { data, width, height }
    }

    /// A frame where every pixel has the same color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self { data, width, height }
    }

    /// Whether the frame has non-zero dimensions and a buffer that covers them
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= self.width as usize * self.height as usize * 3
    }
}

/// A decodable stream of frames
///
/// `next_frame` returns `Ok(None)` at end of stream. An `Err` means a single
/// frame could not be read; the caller may keep pulling.
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Video decoder that extracts frames from video files
pub struct VideoDecoder {
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    eof_sent: bool,
    info: VideoInfo,
}

impl VideoDecoder {
    /// Open a video file and prepare its best video stream for decoding
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| PlayerError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if let Err(e) = ffmpeg::init() {
            debug!("FFmpeg init error: {:?}", e);
        }

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path).map_err(|e| unavailable(e.to_string()))?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| unavailable("no video stream found".to_string()))?;
        let stream_index = stream.index();

        info!("Found video stream {} in file '{}'", stream_index, path.display());

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(format!("failed to create codec context: {}", e)))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| unavailable(format!("failed to create video decoder: {}", e)))?;

        let rate = stream.avg_frame_rate();
        let frame_rate = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            25.0
        };

        let duration = if stream.duration() != ffmpeg::ffi::AV_NOPTS_VALUE {
            let time_base = stream.time_base();
            stream.duration() as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
        } else if input_context.duration() > 0 {
            input_context.duration() as f64 / 1_000_000.0
        } else {
            0.0
        };

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            (duration * frame_rate).round() as u64
        };

        let info = VideoInfo {
            frame_rate,
            frame_count,
            duration,
            width: decoder.width(),
            height: decoder.height(),
        };

        debug!(
            "Video info: {}x{}, {:.2} FPS, {} frames, {:.2}s duration",
            info.width, info.height, info.frame_rate, info.frame_count, info.duration
        );

        Ok(Self {
            input_context,
            stream_index,
            decoder,
            scaler: None,
            eof_sent: false,
            info,
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let stream_index = self.stream_index;
        for (stream, packet) in self.input_context.packets() {
            if stream.index() == stream_index {
                return Some(packet);
            }
        }
        None
    }

    /// Convert a decoded frame to tightly packed RGB24
    fn convert_frame(&mut self, frame: &ffmpeg::frame::Video) -> Result<RawFrame> {
        let width = frame.width();
        let height = frame.height();
        if width == 0 || height == 0 {
            return Err(PlayerError::InvalidFrame { width, height });
        }

        if self.scaler.is_none() {
            self.scaler = Some(
                ffmpeg::software::scaling::Context::get(
                    frame.format(),
                    width,
                    height,
                    ffmpeg::format::Pixel::RGB24,
                    width,
                    height,
                    ffmpeg::software::scaling::Flags::BILINEAR,
                )
                .map_err(|e| PlayerError::Decode(format!("failed to create scaling context: {}", e)))?,
            );
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some(ref mut scaler) = self.scaler {
            scaler
                .run(frame, &mut rgb_frame)
                .map_err(|e| PlayerError::Decode(format!("failed to scale frame: {}", e)))?;
        }

        // Rows in the scaled frame are padded to `stride` bytes
        let row_bytes = width as usize * 3;
        let stride = rgb_frame.stride(0);
        let plane = rgb_frame.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in plane.chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }

        Ok(RawFrame::new(width, height, data))
    }
}

impl FrameSource for VideoDecoder {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert_frame(&decoded).map(Some),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::ffi::EAGAIN => {}
                Err(e) => {
                    return Err(PlayerError::Decode(format!("failed to receive frame: {}", e)));
                }
            }

            if self.eof_sent {
                return Ok(None);
            }

            match self.next_packet() {
                Some(packet) => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        return Err(PlayerError::Decode(format!("failed to send packet: {}", e)));
                    }
                }
                None => {
                    self.eof_sent = true;
                    self.decoder
                        .send_eof()
                        .map_err(|e| PlayerError::Decode(format!("failed to send EOF: {}", e)))?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_decoder_creation() {
        // Only runs where a sample video is checked out
        let test_video = PathBuf::from("tests/assets/sample.mp4");
        if test_video.exists() {
            let result = VideoDecoder::open(&test_video);
            assert!(result.is_ok(), "Failed to create decoder: {:?}", result.err());
        }
    }

    #[test]
    fn test_invalid_file() {
        let invalid_path = PathBuf::from("nonexistent.mp4");
        let result = VideoDecoder::open(&invalid_path);
        assert!(matches!(result, Err(PlayerError::SourceUnavailable { .. })));
    }

    #[test]
    fn test_filled_frame() {
        let frame = RawFrame::filled(4, 2, [10, 20, 30]);
        assert_eq!(frame.data.len(), 24);
        assert_eq!(&frame.data[..6], &[10, 20, 30, 10, 20, 30]);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_invalid_frames() {
        assert!(!RawFrame::filled(0, 3, [0, 0, 0]).is_valid());
        assert!(!RawFrame::new(2, 2, vec![0; 5]).is_valid());
    }
}
