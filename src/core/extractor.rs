//! The per-stream extraction loop, shared by all three stream kinds.
//!
//! One loop shape, two strategies: depth and infrared frames pass through
//! unchanged into MAT matrices, color frames get the YUY2 conversion and a
//! JPEG encode. Frames are strictly sequential; a frame is fully copied,
//! converted and written before the next event is requested.

use anyhow::{Context, Result};
use image::ImageEncoder;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::container::CaptureContainer;
use crate::convert::yuy2;
use crate::core::frame_buffer;
use crate::core::progress::{self, ProgressEvent, ProgressSender};
use crate::output::mat_writer;
use crate::shared::constants;
use crate::utils::file_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Depth,
    Infrared,
    Color,
}

impl StreamKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            constants::TAG_DEPTH => Some(Self::Depth),
            constants::TAG_INFRARED => Some(Self::Infrared),
            constants::TAG_COLOR => Some(Self::Color),
            _ => None,
        }
    }

    /// Label shown while this kind is extracting.
    pub fn phase_label(self) -> &'static str {
        match self {
            Self::Depth => "Depth",
            Self::Infrared => "IR",
            Self::Color => "Color",
        }
    }

    /// Suffix of the TimeStamp_*/Absolute_Time_* index files.
    pub fn series_label(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Infrared => "IR",
            Self::Color => "color",
        }
    }
}

/// Turns one event payload into one artifact file, reusing its buffers
/// across frames.
pub trait FrameSink {
    fn consume(&mut self, payload: &[u8], index: usize, dir: &Path) -> Result<()>;
}

/// Depth/IR frames: copy the u16 samples and serialize them as a matrix.
pub struct MatrixSink {
    file_prefix: &'static str,
    var_prefix: &'static str,
    rows: usize,
    cols: usize,
    frame: Vec<u16>,
}

impl MatrixSink {
    pub fn new(
        file_prefix: &'static str,
        var_prefix: &'static str,
        rows: usize,
        cols: usize,
    ) -> Self {
        Self {
            file_prefix,
            var_prefix,
            rows,
            cols,
            frame: vec![0; rows * cols],
        }
    }

    pub fn depth() -> Self {
        Self::new("DepthFrame", "Dep", constants::DEPTH_HEIGHT, constants::DEPTH_WIDTH)
    }

    pub fn infrared() -> Self {
        Self::new("IRFrame", "IR", constants::DEPTH_HEIGHT, constants::DEPTH_WIDTH)
    }
}

impl FrameSink for MatrixSink {
    fn consume(&mut self, payload: &[u8], index: usize, dir: &Path) -> Result<()> {
        let count = self.frame.len();
        frame_buffer::copy_words(payload, &mut self.frame, 0, count)
            .with_context(|| format!("Frame {} of '{}'", index, self.file_prefix))?;

        let name = format!("{}{:04}", self.var_prefix, index);
        let path = dir.join(format!("{}{:04}.mat", self.file_prefix, index));
        mat_writer::write_mat(&name, &path, &self.frame, self.rows, self.cols)
    }
}

/// Color frames: copy the packed YUY2 bytes, convert to BGRA, encode JPEG.
pub struct JpegSink {
    width: usize,
    height: usize,
    packed: Vec<u8>,
    bgra: Vec<u8>,
    rgb: Vec<u8>,
}

impl JpegSink {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            packed: vec![0; width * height * 2],
            bgra: vec![0; width * height * 4],
            rgb: vec![0; width * height * 3],
        }
    }

    pub fn color() -> Self {
        Self::new(constants::COLOR_WIDTH, constants::COLOR_HEIGHT)
    }
}

impl FrameSink for JpegSink {
    fn consume(&mut self, payload: &[u8], index: usize, dir: &Path) -> Result<()> {
        let count = self.packed.len();
        frame_buffer::copy_bytes(payload, &mut self.packed, 0, count)
            .with_context(|| format!("Color frame {}", index))?;

        yuy2::convert_frame_into(&self.packed, &mut self.bgra)?;

        // The JPEG encoder wants RGB; alpha is opaque anyway
        for (rgb, bgra) in self.rgb.chunks_exact_mut(3).zip(self.bgra.chunks_exact(4)) {
            rgb[0] = bgra[2];
            rgb[1] = bgra[1];
            rgb[2] = bgra[0];
        }

        let mut encoded = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new(Cursor::new(&mut encoded));
        encoder
            .write_image(
                &self.rgb,
                self.width as u32,
                self.height as u32,
                image::ExtendedColorType::Rgb8,
            )
            .with_context(|| format!("Failed to encode color frame {}", index))?;

        let path = dir.join(format!("ColorFrame{:04}.jpg", index));
        file_utils::write_atomic(&path, &encoded)
    }
}

pub struct ExtractOptions<'a> {
    pub out_dir: &'a Path,
    pub cancel: &'a AtomicBool,
    pub progress: &'a ProgressSender,
    pub throttle: Option<Duration>,
}

pub struct StreamResult {
    /// Relative offset of each extracted frame, index-aligned with the
    /// artifact files. Shorter than the event count only when cancelled.
    pub timing: Vec<u16>,
    pub completed: bool,
}

/// Runs the per-frame loop for one stream: progress tick, scoped event
/// read, sink write, timing slot. The event's borrow of the container
/// scratch buffer ends before the next event is requested.
pub fn extract_stream(
    container: &mut CaptureContainer,
    stream_index: usize,
    event_count: usize,
    phase: &'static str,
    sink: &mut dyn FrameSink,
    opts: &ExtractOptions,
) -> Result<StreamResult> {
    let mut timing = Vec::with_capacity(event_count);

    for i in 0..event_count {
        if opts.cancel.load(Ordering::SeqCst) {
            return Ok(StreamResult {
                timing,
                completed: false,
            });
        }

        progress::send(
            opts.progress,
            ProgressEvent::Update {
                percent: (i as f32 / event_count as f32 * 100.0) as u8,
                phase,
            },
        );

        if let Some(pause) = opts.throttle {
            std::thread::sleep(pause);
        }

        let event = container.read_event(stream_index, i)?;
        sink.consume(event.data, i, opts.out_dir)?;
        timing.push(event.relative_ms);
    }

    Ok(StreamResult {
        timing,
        completed: true,
    })
}
