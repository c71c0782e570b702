//! Write side of the capture container format, used by the `pack` command
//! and by tests to synthesize fixtures. Streams appear in the output in
//! the order their first event was pushed.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::shared::constants;
use crate::utils::file_utils;

const SEEKABLE_FLAG: u8 = 0x01;

struct PendingStream {
    tag: String,
    // (relative offset ms, payload)
    events: Vec<(u16, Vec<u8>)>,
}

pub struct ContainerWriter {
    creation: DateTime<Utc>,
    streams: Vec<PendingStream>,
}

impl ContainerWriter {
    pub fn new(creation: DateTime<Utc>) -> Self {
        Self {
            creation,
            streams: Vec::new(),
        }
    }

    pub fn push_event(&mut self, tag: &str, relative_ms: u16, data: &[u8]) {
        let pos = match self.streams.iter().position(|s| s.tag == tag) {
            Some(p) => p,
            None => {
                self.streams.push(PendingStream {
                    tag: tag.to_string(),
                    events: Vec::new(),
                });
                self.streams.len() - 1
            }
        };
        self.streams[pos].events.push((relative_ms, data.to_vec()));
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        // Header: magic + version + stream_count + creation_ms
        let header_len = 4 + 2 + 2 + 8;
        // Per stream table entry: tag_len + tag + flags + event_count + index_off
        let table_len: usize = self.streams.iter().map(|s| 2 + s.tag.len() + 1 + 4 + 8).sum();
        let index_entry_len = 8 + 4 + 2 + 2;

        // Lay out: header | table | all indexes | all payloads
        let mut index_off = (header_len + table_len) as u64;
        let mut data_off = index_off
            + self
                .streams
                .iter()
                .map(|s| (s.events.len() * index_entry_len) as u64)
                .sum::<u64>();

        let mut out = Vec::new();
        out.extend_from_slice(constants::CONTAINER_MAGIC);
        out.extend_from_slice(&constants::CONTAINER_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.streams.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.creation.timestamp_millis().to_le_bytes());

        for stream in &self.streams {
            out.extend_from_slice(&(stream.tag.len() as u16).to_le_bytes());
            out.extend_from_slice(stream.tag.as_bytes());
            out.push(SEEKABLE_FLAG);
            out.extend_from_slice(&(stream.events.len() as u32).to_le_bytes());
            out.extend_from_slice(&index_off.to_le_bytes());
            index_off += (stream.events.len() * index_entry_len) as u64;
        }

        for stream in &self.streams {
            for (relative_ms, data) in &stream.events {
                out.extend_from_slice(&data_off.to_le_bytes());
                out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                out.extend_from_slice(&relative_ms.to_le_bytes());
                out.extend_from_slice(&0u16.to_le_bytes());
                data_off += data.len() as u64;
            }
        }

        for stream in &self.streams {
            for (_, data) in &stream.events {
                out.extend_from_slice(data);
            }
        }

        file_utils::write_atomic(path, &out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_layout_offsets_are_consistent() {
        let base = Utc.with_ymd_and_hms(2021, 6, 15, 12, 30, 0).unwrap();
        let mut writer = ContainerWriter::new(base);
        writer.push_event("infrared", 0, &[0xAA; 16]);
        writer.push_event("infrared", 40, &[0xBB; 16]);

        let dir = std::env::temp_dir().join("xef2mat_test_container_writer");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("capture.xefc");
        writer.write_to(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], constants::CONTAINER_MAGIC);

        // header 16, table entry 2 + 8 + 1 + 4 + 8 = 23, index 2*16 = 32,
        // payloads 2*16 = 32
        assert_eq!(bytes.len(), 16 + 23 + 32 + 32);

        // First index entry points just past the index block
        let data_off = u64::from_le_bytes(bytes[39..47].try_into().unwrap());
        assert_eq!(data_off, 39 + 32);
        assert_eq!(&bytes[data_off as usize..data_off as usize + 16], &[0xAA; 16]);
    }
}
