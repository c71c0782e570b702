//! Orchestration of one extraction run.
//!
//! Opens the capture container, visits its declared streams in order,
//! dispatches each supported and enabled kind to the extractor, then
//! writes the timestamp indexes for every kind that produced a full
//! series. The whole run executes on one background worker thread; the
//! caller only consumes progress events.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::RunConfig;
use crate::container::CaptureContainer;
use crate::core::extractor::{self, ExtractOptions, FrameSink, JpegSink, MatrixSink, StreamKind};
use crate::core::progress::{self, ProgressEvent, ProgressReceiver, ProgressSender};
use crate::output::timestamps;
use crate::utils::{file_utils, logger};

#[derive(Debug)]
pub struct RunSummary {
    pub frames: usize,
    pub cancelled: bool,
}

fn build_sink(kind: StreamKind) -> Box<dyn FrameSink> {
    match kind {
        StreamKind::Depth => Box::new(MatrixSink::depth()),
        StreamKind::Infrared => Box::new(MatrixSink::infrared()),
        StreamKind::Color => Box::new(JpegSink::color()),
    }
}

pub fn run(
    input: &Path,
    config: &RunConfig,
    cancel: &AtomicBool,
    progress_tx: &ProgressSender,
) -> Result<RunSummary> {
    file_utils::ensure_dir(&config.output_dir)?;

    let mut container = CaptureContainer::open(input)
        .with_context(|| format!("Cannot read capture source {:?}", input))?;
    let base_time = container.creation_time();
    logger::info(&format!(
        "Opened {:?}, capture created {}",
        input, base_time
    ));

    let opts = ExtractOptions {
        out_dir: &config.output_dir,
        cancel,
        progress: progress_tx,
        throttle: config.throttle_ms.map(Duration::from_millis),
    };

    // One timing slot per kind, filled only by streams that ran to
    // completion so the series length always equals the event count
    let mut depth_timing: Option<Vec<u16>> = None;
    let mut color_timing: Option<Vec<u16>> = None;
    let mut ir_timing: Option<Vec<u16>> = None;

    let mut total_frames = 0;
    let mut cancelled = false;

    let streams = container.streams();
    for (index, stream) in streams.iter().enumerate() {
        let Some(kind) = StreamKind::from_tag(&stream.tag) else {
            logger::debug(&format!("Skipping unrecognized stream '{}'", stream.tag));
            continue;
        };
        if !config.enabled(kind) {
            continue;
        }

        logger::info(&format!(
            "Extracting {} frames from '{}'",
            stream.event_count, stream.tag
        ));
        let mut sink = build_sink(kind);
        let result = extractor::extract_stream(
            &mut container,
            index,
            stream.event_count as usize,
            kind.phase_label(),
            sink.as_mut(),
            &opts,
        )
        .with_context(|| format!("Extraction of '{}' failed", stream.tag))?;

        total_frames += result.timing.len();
        if !result.completed {
            logger::info(&format!(
                "Run cancelled during '{}' after {} frames",
                stream.tag,
                result.timing.len()
            ));
            cancelled = true;
            break;
        }

        let slot = match kind {
            StreamKind::Depth => &mut depth_timing,
            StreamKind::Infrared => &mut ir_timing,
            StreamKind::Color => &mut color_timing,
        };
        *slot = Some(result.timing);
    }

    if total_frames > 0 {
        progress::send(
            progress_tx,
            ProgressEvent::Update {
                percent: 100,
                phase: "TimeStamp",
            },
        );

        let series = [
            (StreamKind::Depth, &depth_timing),
            (StreamKind::Color, &color_timing),
            (StreamKind::Infrared, &ir_timing),
        ];
        for (kind, timing) in series {
            if let Some(timing) = timing {
                let label = kind.series_label();
                timestamps::write_relative_series(&config.output_dir, label, timing)?;
                timestamps::write_absolute_log(&config.output_dir, label, base_time, timing)?;
            }
        }
    }

    Ok(RunSummary {
        frames: total_frames,
        cancelled,
    })
}

/// Spawns the run on a worker thread. The returned receiver yields
/// progress updates and exactly one terminal event; it closes when the
/// worker is done.
pub fn run_in_background(
    input: PathBuf,
    config: RunConfig,
    cancel: Arc<AtomicBool>,
) -> (ProgressReceiver, thread::JoinHandle<()>) {
    let (tx, rx) = progress::channel();

    let handle = thread::spawn(move || {
        match run(&input, &config, &cancel, &tx) {
            Ok(summary) if summary.cancelled => progress::send(
                &tx,
                ProgressEvent::Cancelled {
                    frames: summary.frames,
                },
            ),
            Ok(summary) => progress::send(
                &tx,
                ProgressEvent::Completed {
                    frames: summary.frames,
                },
            ),
            Err(e) => {
                logger::error(&format!("Extraction failed: {:#}", e));
                progress::send(
                    &tx,
                    ProgressEvent::Failed {
                        message: format!("{:#}", e),
                    },
                );
            }
        }
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::shared::constants;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::Ordering;

    const MI_UINT16: u32 = 4;

    /// Minimal walker over the single miMATRIX element our writer emits,
    /// returning the u16 values of its real part.
    fn read_mat_u16(path: &Path) -> Vec<u16> {
        let bytes = std::fs::read(path).unwrap();
        let mut off = 136; // past the 128-byte header and the outer tag
        loop {
            let data_type = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            let byte_len =
                u32::from_le_bytes(bytes[off + 4..off + 8].try_into().unwrap()) as usize;
            if data_type == MI_UINT16 {
                return bytes[off + 8..off + 8 + byte_len]
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
            }
            off += 8 + byte_len.div_ceil(8) * 8;
            assert!(off < bytes.len(), "no real part in {:?}", path);
        }
    }

    fn depth_payload(fill: u16) -> Vec<u8> {
        let mut payload = Vec::with_capacity(constants::DEPTH_WIDTH * constants::DEPTH_HEIGHT * 2);
        for _ in 0..constants::DEPTH_WIDTH * constants::DEPTH_HEIGHT {
            payload.extend_from_slice(&fill.to_le_bytes());
        }
        payload
    }

    fn scratch_dirs(name: &str) -> (PathBuf, PathBuf) {
        let root = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&root);
        let out = root.join("out");
        std::fs::create_dir_all(&root).unwrap();
        (root, out)
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn test_depth_only_end_to_end() {
        let (root, out) = scratch_dirs("xef2mat_test_pipeline_depth");
        let capture = root.join("capture.xefc");

        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        for (i, offset) in [0u16, 33, 66].into_iter().enumerate() {
            writer.push_event("depth", offset, &depth_payload(i as u16 + 1));
        }
        // A color stream is present but must stay untouched
        writer.push_event("color", 0, &[128u8; 16]);
        writer.write_to(&capture).unwrap();

        let config = RunConfig {
            depth: true,
            output_dir: out.clone(),
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let (tx, rx) = progress::channel();

        let summary = run(&capture, &config, &cancel, &tx).unwrap();
        drop(tx);
        assert_eq!(summary.frames, 3);
        assert!(!summary.cancelled);

        assert_eq!(
            file_names(&out),
            vec![
                "Absolute_Time_depth.txt",
                "DepthFrame0000.mat",
                "DepthFrame0001.mat",
                "DepthFrame0002.mat",
                "TimeStamp_depth.mat",
            ]
        );

        // Frame artifacts hold the per-frame fill values
        assert_eq!(read_mat_u16(&out.join("DepthFrame0000.mat"))[0], 1);
        assert_eq!(read_mat_u16(&out.join("DepthFrame0002.mat"))[0], 3);
        assert_eq!(
            read_mat_u16(&out.join("DepthFrame0001.mat")).len(),
            constants::DEPTH_WIDTH * constants::DEPTH_HEIGHT
        );

        assert_eq!(read_mat_u16(&out.join("TimeStamp_depth.mat")), vec![0, 33, 66]);

        let text = std::fs::read_to_string(out.join("Absolute_Time_depth.txt")).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec!["20010100000000", "20010100000033", "20010100000066"]
        );

        // Progress: one tick per depth frame, then the finalize tick
        let events: Vec<ProgressEvent> = rx.iter().collect();
        let ticks: Vec<(u8, &str)> = events
            .iter()
            .map(|e| match e {
                ProgressEvent::Update { percent, phase } => (*percent, *phase),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(
            ticks,
            vec![(0, "Depth"), (33, "Depth"), (66, "Depth"), (100, "TimeStamp")]
        );

        // Rerun into the same directory: byte-identical matrices
        let before = std::fs::read(out.join("DepthFrame0000.mat")).unwrap();
        let (tx, _rx) = progress::channel();
        run(&capture, &config, &cancel, &tx).unwrap();
        assert_eq!(std::fs::read(out.join("DepthFrame0000.mat")).unwrap(), before);
    }

    #[test]
    fn test_disabled_kinds_produce_nothing() {
        let (root, out) = scratch_dirs("xef2mat_test_pipeline_disabled");
        let capture = root.join("capture.xefc");

        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        writer.push_event("depth", 0, &depth_payload(9));
        writer.write_to(&capture).unwrap();

        let config = RunConfig {
            output_dir: out.clone(),
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let (tx, _rx) = progress::channel();

        let summary = run(&capture, &config, &cancel, &tx).unwrap();
        assert_eq!(summary.frames, 0);
        assert!(file_names(&out).is_empty());
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let (root, out) = scratch_dirs("xef2mat_test_pipeline_cancel");
        let capture = root.join("capture.xefc");

        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        writer.push_event("depth", 0, &depth_payload(1));
        writer.push_event("depth", 33, &depth_payload(2));
        writer.write_to(&capture).unwrap();

        let config = RunConfig {
            depth: true,
            output_dir: out.clone(),
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::SeqCst);
        let (tx, _rx) = progress::channel();

        let summary = run(&capture, &config, &cancel, &tx).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);
        assert!(file_names(&out).is_empty());
    }

    #[test]
    fn test_undersized_payload_rejects_run() {
        let (root, out) = scratch_dirs("xef2mat_test_pipeline_short");
        let capture = root.join("capture.xefc");

        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        writer.push_event("infrared", 0, &[0u8; 64]);
        writer.write_to(&capture).unwrap();

        let config = RunConfig {
            infrared: true,
            output_dir: out.clone(),
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let (tx, _rx) = progress::channel();

        let err = run(&capture, &config, &cancel, &tx).unwrap_err();
        assert!(format!("{:#}", err).contains("payload"));
        assert!(file_names(&out).is_empty());
    }

    #[test]
    fn test_color_mid_gray_end_to_end() {
        let (root, out) = scratch_dirs("xef2mat_test_pipeline_color");
        let capture = root.join("capture.xefc");

        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        let payload = vec![128u8; constants::COLOR_WIDTH * constants::COLOR_HEIGHT * 2];
        writer.push_event("color", 12, &payload);
        writer.write_to(&capture).unwrap();

        let config = RunConfig {
            color: true,
            output_dir: out.clone(),
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let (tx, _rx) = progress::channel();

        let summary = run(&capture, &config, &cancel, &tx).unwrap();
        assert_eq!(summary.frames, 1);

        assert_eq!(
            file_names(&out),
            vec![
                "Absolute_Time_color.txt",
                "ColorFrame0000.jpg",
                "TimeStamp_color.mat",
            ]
        );
        assert_eq!(read_mat_u16(&out.join("TimeStamp_color.mat")), vec![12]);

        let img = image::open(out.join("ColorFrame0000.jpg")).unwrap().to_rgb8();
        assert_eq!(
            img.dimensions(),
            (constants::COLOR_WIDTH as u32, constants::COLOR_HEIGHT as u32)
        );
        // Y=U=V=128 decodes to the formula's near-gray, JPEG keeps it close
        let px = img.get_pixel(960, 540);
        for channel in 0..3 {
            assert!((px[channel] as i32 - 130).abs() <= 3);
        }
    }
}
