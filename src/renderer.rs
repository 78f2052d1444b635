use crate::converter::AsciiFrame;
use crate::Result;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use log::debug;
use std::io::{stdout, Stdout, Write};
use std::time::{Duration, Instant};

/// Where the scheduler presents frames
///
/// Each call replaces the whole screen: clear, then write the full frame.
pub trait OutputSink {
    fn present(&mut self, frame: &AsciiFrame) -> Result<()>;
}

/// Full-screen terminal output through crossterm
pub struct TerminalSink {
    stdout: Stdout,
    raw_mode: bool,
    terminal_width: u16,
    terminal_height: u16,
}

impl TerminalSink {
    /// Create a new terminal sink
    pub fn new() -> Result<Self> {
        let (terminal_width, terminal_height) = crossterm::terminal::size()?;

        Ok(Self {
            stdout: stdout(),
            raw_mode: false,
            terminal_width,
            terminal_height,
        })
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> Result<()> {
        self.update_dimensions()?;
        enable_raw_mode()?;
        self.raw_mode = true;
        execute!(self.stdout, Hide, Clear(ClearType::All))?;
        debug!("Terminal initialized for rendering");
        Ok(())
    }

    /// Restore terminal to normal state
    pub fn cleanup(&mut self) -> Result<()> {
        if !self.raw_mode {
            return Ok(());
        }
        execute!(self.stdout, Show, Clear(ClearType::All), MoveTo(0, 0))?;
        disable_raw_mode()?;
        self.raw_mode = false;
        debug!("Terminal restored to normal state");
        Ok(())
    }

    /// Update terminal dimensions
    pub fn update_dimensions(&mut self) -> Result<(u16, u16)> {
        let (width, height) = crossterm::terminal::size()?;
        self.terminal_width = width;
        self.terminal_height = height;
        debug!("Terminal dimensions updated: {}x{}", width, height);
        Ok((width, height))
    }
}

impl OutputSink for TerminalSink {
    fn present(&mut self, frame: &AsciiFrame) -> Result<()> {
        let start_time = Instant::now();
        let frame_width = frame.width.min(u16::MAX as u32) as u16;
        let frame_height = frame.height.min(u16::MAX as u32) as u16;

        // Center the frame; oversized frames start at the top left
        let offset_x = self.terminal_width.saturating_sub(frame_width) / 2;
        let offset_y = self.terminal_height.saturating_sub(frame_height) / 2;

        queue!(self.stdout, Clear(ClearType::All))?;

        // Raw mode does not return the carriage on '\n', so rows are placed explicitly
        for (y, row) in frame.rows().enumerate() {
            let line: String = row.iter().collect();
            queue!(
                self.stdout,
                MoveTo(offset_x, offset_y.saturating_add(y as u16)),
                Print(line)
            )?;
        }
        self.stdout.flush()?;

        debug!(
            "Frame rendered in {}ms ({}x{} at offset {},{})",
            start_time.elapsed().as_millis(),
            frame.width,
            frame.height,
            offset_x,
            offset_y
        );
        Ok(())
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        // Ensure terminal is restored on drop
        let _ = self.cleanup();
    }
}

/// Plain output: an ANSI clear-and-home sequence followed by the frame text
pub struct StreamSink<W: Write> {
    writer: W,
    frames_presented: u64,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_presented: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for StreamSink<W> {
    fn present(&mut self, frame: &AsciiFrame) -> Result<()> {
        write!(self.writer, "\x1b[2J\x1b[H{}", frame.to_text())?;
        self.writer.flush()?;
        self.frames_presented += 1;
        Ok(())
    }
}

/// Interval between frames at `target_fps`
pub fn calculate_frame_delay(target_fps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / target_fps)
}
