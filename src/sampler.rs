use crate::decoder::{FrameSource, RawFrame};
use crate::store::FrameStore;
use crate::{PlayerError, Result};
use log::{debug, info, warn};

/// Kept frames between two progress reports
pub const PROGRESS_INTERVAL: u64 = 100;

/// Unreadable frames in a row after which extraction gives up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 64;

/// Destination for frames kept by the [`Sampler`]
pub trait RawFrameSink {
    fn write_frame(&mut self, index: u64, frame: &RawFrame) -> Result<()>;
}

impl RawFrameSink for FrameStore {
    fn write_frame(&mut self, index: u64, frame: &RawFrame) -> Result<()> {
        self.put(index, frame)
    }
}

/// Result of one extraction run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionReport {
    /// Source frame rate divided by the stride
    pub effective_frame_rate: f64,
    pub frames_written: u64,
    /// Frames pulled from the source, including skipped and unreadable ones
    pub frames_read: u64,
    pub frames_unreadable: u64,
}

/// Pulls frames from a source and keeps every `stride`-th one
pub struct Sampler {
    stride: u32,
    progress: Option<Box<dyn FnMut(u64)>>,
}

impl Sampler {
    pub fn new(stride: u32) -> Result<Self> {
        if stride == 0 {
            return Err(PlayerError::InvalidConfig("Stride must be at least 1".to_string()));
        }
        Ok(Self {
            stride,
            progress: None,
        })
    }

    /// Observe the kept-frame count every [`PROGRESS_INTERVAL`] frames
    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: FnMut(u64) + 'static,
    {
        self.progress = Some(Box::new(observer));
        self
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Write frame `i` of `source` to `sink` for every `i` divisible by the stride
    ///
    /// Unreadable frames still advance the index and are skipped with a
    /// warning. Sink failures abort the run.
    pub fn extract<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<ExtractionReport>
    where
        S: FrameSource + ?Sized,
        K: RawFrameSink + ?Sized,
    {
        let info = source.info();
        info!("Video Properties:");
        info!("  FPS: {:.2}", info.frame_rate);
        info!("  Total Frames: {}", info.frame_count);
        info!("  Duration: {:.2} seconds", info.duration);
        info!("  Extracting every {} frame(s)...", self.stride);

        let stride = self.stride as u64;
        let mut index: u64 = 0;
        let mut written: u64 = 0;
        let mut unreadable: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    Some(frame)
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Skipping unreadable frame {}: {}", index, e);
                    unreadable += 1;
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(PlayerError::Decode(format!(
                            "{} consecutive unreadable frames, last at index {}",
                            consecutive_failures, index
                        )));
                    }
                    None
                }
            };

            if let Some(frame) = frame {
                if index % stride == 0 {
                    sink.write_frame(index, &frame)?;
                    written += 1;

                    if written % PROGRESS_INTERVAL == 0 {
                        info!("Extracted {} frames...", written);
                        if let Some(ref mut observer) = self.progress {
                            observer(written);
                        }
                    }
                } else {
                    debug!("Frame {} skipped by stride", index);
                }
            }

            index += 1;
        }

        info!("Extraction complete!");
        info!("  Total frames processed: {}", index);
        info!("  Frames saved: {}", written);

        Ok(ExtractionReport {
            effective_frame_rate: info.frame_rate / self.stride as f64,
            frames_written: written,
            frames_read: index,
            frames_unreadable: unreadable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::VideoInfo;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    struct ScriptedSource {
        total: u64,
        next: u64,
        unreadable: HashSet<u64>,
    }

    impl ScriptedSource {
        fn new(total: u64) -> Self {
            Self {
                total,
                next: 0,
                unreadable: HashSet::new(),
            }
        }

        fn failing_at(mut self, indices: &[u64]) -> Self {
            self.unreadable.extend(indices.iter().copied());
            self
        }
    }

    impl FrameSource for ScriptedSource {
        fn info(&self) -> VideoInfo {
            VideoInfo {
                frame_rate: 30.0,
                frame_count: self.total,
                duration: self.total as f64 / 30.0,
                width: 2,
                height: 2,
            }
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            if self.next >= self.total {
                return Ok(None);
            }
            let index = self.next;
            self.next += 1;
            if self.unreadable.contains(&index) {
                return Err(PlayerError::Decode(format!("corrupt packet {}", index)));
            }
            let shade = (index % 256) as u8;
            Ok(Some(RawFrame::filled(2, 2, [shade, shade, shade])))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        indices: Vec<u64>,
    }

    impl RawFrameSink for RecordingSink {
        fn write_frame(&mut self, index: u64, _frame: &RawFrame) -> Result<()> {
            self.indices.push(index);
            Ok(())
        }
    }

    #[test]
    fn test_stride_one_keeps_every_frame() {
        let mut sink = RecordingSink::default();
        let report = Sampler::new(1)
            .unwrap()
            .extract(&mut ScriptedSource::new(5), &mut sink)
            .unwrap();

        assert_eq!(sink.indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.frames_written, 5);
        assert_eq!(report.effective_frame_rate, 30.0);
    }

    #[test]
    fn test_stride_keeps_multiples() {
        for (total, stride) in [(10u64, 3u32), (9, 3), (7, 2), (1, 4), (0, 5)] {
            let mut sink = RecordingSink::default();
            let report = Sampler::new(stride)
                .unwrap()
                .extract(&mut ScriptedSource::new(total), &mut sink)
                .unwrap();

            let expected: Vec<u64> = (0..total).step_by(stride as usize).collect();
            assert_eq!(sink.indices, expected);
            assert_eq!(report.frames_written, total.div_ceil(stride as u64));
            assert_eq!(report.frames_read, total);
        }
    }

    #[test]
    fn test_effective_frame_rate_divides_by_stride() {
        let mut sink = RecordingSink::default();
        let report = Sampler::new(3)
            .unwrap()
            .extract(&mut ScriptedSource::new(6), &mut sink)
            .unwrap();
        assert_eq!(report.effective_frame_rate, 10.0);
    }

    #[test]
    fn test_unreadable_frame_is_skipped() {
        let mut sink = RecordingSink::default();
        let mut source = ScriptedSource::new(10).failing_at(&[5]);
        let report = Sampler::new(1).unwrap().extract(&mut source, &mut sink).unwrap();

        assert_eq!(report.frames_written, 9);
        assert_eq!(report.frames_unreadable, 1);
        assert_eq!(sink.indices, vec![0, 1, 2, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn test_wedged_source_aborts() {
        let failing: Vec<u64> = (2..200).collect();
        let mut source = ScriptedSource::new(300).failing_at(&failing);
        let mut sink = RecordingSink::default();
        let result = Sampler::new(1).unwrap().extract(&mut source, &mut sink);

        assert!(matches!(result, Err(PlayerError::Decode(_))));
        assert_eq!(sink.indices, vec![0, 1]);
    }

    #[test]
    fn test_progress_every_hundred_kept_frames() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let observer = Rc::clone(&seen);
        let mut sampler = Sampler::new(2)
            .unwrap()
            .with_progress(move |count| observer.borrow_mut().push(count));

        let mut sink = RecordingSink::default();
        sampler.extract(&mut ScriptedSource::new(450), &mut sink).unwrap();

        assert_eq!(*seen.borrow(), vec![100, 200]);
    }

    #[test]
    fn test_zero_stride_is_rejected() {
        assert!(Sampler::new(0).is_err());
    }

    #[test]
    fn test_extract_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FrameStore::open(dir.path()).unwrap();
        Sampler::new(2)
            .unwrap()
            .extract(&mut ScriptedSource::new(5), &mut store)
            .unwrap();

        assert_eq!(store.list(crate::ArtifactKind::Raw).unwrap(), vec![0, 2, 4]);
        let frame: RawFrame = store.get(4).unwrap();
        assert_eq!(frame, RawFrame::filled(2, 2, [4, 4, 4]));
    }
}
