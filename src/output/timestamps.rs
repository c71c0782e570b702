//! End-of-run timestamp index files.
//!
//! Every stream kind that produced frames gets two companions: the raw
//! relative offsets as an N x 1 matrix, and a text log of absolute
//! timestamps (capture creation time plus each offset) with one
//! fixed-layout line per frame, in frame order.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

use crate::output::mat_writer;
use crate::shared::constants;
use crate::utils::file_utils;

pub fn format_absolute(base: DateTime<Utc>, offset_ms: u16) -> String {
    (base + Duration::milliseconds(offset_ms as i64))
        .format(constants::ABSOLUTE_TIME_FORMAT)
        .to_string()
}

/// `TimeStamp_{label}.mat`, variable "Time", shape N x 1.
pub fn write_relative_series(dir: &Path, label: &str, timing: &[u16]) -> Result<()> {
    let path = dir.join(format!("TimeStamp_{}.mat", label));
    mat_writer::write_mat("Time", &path, timing, timing.len(), 1)
}

/// `Absolute_Time_{label}.txt`, one formatted line per frame.
pub fn write_absolute_log(
    dir: &Path,
    label: &str,
    base: DateTime<Utc>,
    timing: &[u16],
) -> Result<()> {
    let mut text = String::with_capacity(timing.len() * 16);
    for offset in timing {
        text.push_str(&format_absolute(base, *offset));
        text.push('\n');
    }

    let path = dir.join(format!("Absolute_Time_{}.txt", label));
    file_utils::write_atomic(&path, text.as_bytes())
}
