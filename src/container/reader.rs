//! Read side of the capture container format.
//!
//! A capture file holds one or more named event streams recorded from a
//! sensor. Layout (all little-endian):
//!
//!   header:  magic "XEFC" | version u16 | stream_count u16 | creation_ms i64
//!   streams: per stream: tag_len u16 | tag | flags u8 | event_count u32
//!            | index_off u64
//!   index:   per event: data_off u64 | data_len u32 | relative_ms u16
//!            | reserved u16
//!   payload: raw event bytes at each data_off

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::shared::constants;

const SEEKABLE_FLAG: u8 = 0x01;

#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub tag: String,
    pub seekable: bool,
    pub event_count: u32,
}

/// One frame's raw payload, borrowed from the container's scratch buffer.
/// The borrow ends before the next event can be read (`read_event` takes
/// `&mut self`), so a stale frame can never alias the next one.
pub struct FrameEvent<'a> {
    pub data: &'a [u8],
    pub relative_ms: u16,
}

#[derive(Debug)]
struct EventRecord {
    data_off: u64,
    data_len: u32,
    relative_ms: u16,
}

#[derive(Debug)]
struct StreamEntry {
    tag: String,
    seekable: bool,
    index: Vec<EventRecord>,
}

#[derive(Debug)]
pub struct CaptureContainer {
    file: File,
    creation: DateTime<Utc>,
    streams: Vec<StreamEntry>,
    scratch: Vec<u8>,
}

fn read_u16(file: &mut File) -> Result<u16> {
    let mut buf = [0u8; 2];
    file.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(file: &mut File) -> Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(file: &mut File) -> Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(file: &mut File) -> Result<i64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

impl CaptureContainer {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open capture file: {:?}", path))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .with_context(|| format!("Capture file too short: {:?}", path))?;
        if &magic != constants::CONTAINER_MAGIC {
            bail!("Not a capture container (bad magic): {:?}", path);
        }

        let version = read_u16(&mut file)?;
        if version != constants::CONTAINER_VERSION {
            bail!(
                "Unsupported capture container version {} (expected {})",
                version,
                constants::CONTAINER_VERSION
            );
        }

        let stream_count = read_u16(&mut file)?;
        let creation_ms = read_i64(&mut file)?;
        let creation = Utc
            .timestamp_millis_opt(creation_ms)
            .single()
            .with_context(|| format!("Capture creation time out of range: {}", creation_ms))?;

        // Stream table, then each stream's event index
        let mut table = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let tag_len = read_u16(&mut file)? as usize;
            let mut tag_bytes = vec![0u8; tag_len];
            file.read_exact(&mut tag_bytes)?;
            let tag = String::from_utf8(tag_bytes).context("Stream tag is not UTF-8")?;

            let mut flags = [0u8; 1];
            file.read_exact(&mut flags)?;
            let event_count = read_u32(&mut file)?;
            let index_off = read_u64(&mut file)?;
            table.push((tag, flags[0], event_count, index_off));
        }

        let mut streams = Vec::with_capacity(table.len());
        for (tag, flags, event_count, index_off) in table {
            file.seek(SeekFrom::Start(index_off))
                .with_context(|| format!("Failed to seek to index of stream '{}'", tag))?;
            let mut index = Vec::with_capacity(event_count as usize);
            for _ in 0..event_count {
                let data_off = read_u64(&mut file)?;
                let data_len = read_u32(&mut file)?;
                let relative_ms = read_u16(&mut file)?;
                let _reserved = read_u16(&mut file)?;
                index.push(EventRecord {
                    data_off,
                    data_len,
                    relative_ms,
                });
            }
            streams.push(StreamEntry {
                tag,
                seekable: flags & SEEKABLE_FLAG != 0,
                index,
            });
        }

        Ok(Self {
            file,
            creation,
            streams,
            scratch: Vec::new(),
        })
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation
    }

    /// Snapshot of the declared streams, in container order.
    pub fn streams(&self) -> Vec<StreamDescriptor> {
        self.streams
            .iter()
            .map(|s| StreamDescriptor {
                tag: s.tag.clone(),
                seekable: s.seekable,
                event_count: s.index.len() as u32,
            })
            .collect()
    }

    /// Reads event `event_index` of stream `stream_index` into the scratch
    /// buffer and returns a handle borrowing it.
    pub fn read_event(&mut self, stream_index: usize, event_index: usize) -> Result<FrameEvent<'_>> {
        let stream = self
            .streams
            .get(stream_index)
            .with_context(|| format!("No stream at index {}", stream_index))?;
        let record = stream.index.get(event_index).with_context(|| {
            format!(
                "Stream '{}' has no event {} (count {})",
                stream.tag,
                event_index,
                stream.index.len()
            )
        })?;

        self.scratch.resize(record.data_len as usize, 0);
        self.file.seek(SeekFrom::Start(record.data_off))?;
        self.file.read_exact(&mut self.scratch).with_context(|| {
            format!("Failed to read event {} of stream '{}'", event_index, stream.tag)
        })?;

        Ok(FrameEvent {
            data: &self.scratch,
            relative_ms: record.relative_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use std::io::Write;

    #[test]
    fn test_open_and_read_events() {
        let dir = std::env::temp_dir().join("xef2mat_test_container_reader");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("capture.xefc");

        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        writer.push_event("depth", 0, &[1, 0, 2, 0]);
        writer.push_event("depth", 33, &[3, 0, 4, 0]);
        writer.push_event("color", 5, &[9; 8]);
        writer.write_to(&path).unwrap();

        let mut container = CaptureContainer::open(&path).unwrap();
        assert_eq!(container.creation_time(), base);

        let streams = container.streams();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].tag, "depth");
        assert_eq!(streams[0].event_count, 2);
        assert!(streams[0].seekable);
        assert_eq!(streams[1].tag, "color");
        assert_eq!(streams[1].event_count, 1);

        let event = container.read_event(0, 1).unwrap();
        assert_eq!(event.relative_ms, 33);
        assert_eq!(event.data, &[3, 0, 4, 0]);

        let event = container.read_event(1, 0).unwrap();
        assert_eq!(event.relative_ms, 5);
        assert_eq!(event.data, &[9; 8]);

        assert!(container.read_event(0, 2).is_err());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let dir = std::env::temp_dir().join("xef2mat_test_container_magic");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_a_capture.bin");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"JUNKJUNKJUNKJUNKJUNK").unwrap();
        drop(file);

        let err = CaptureContainer::open(&path).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }
}
