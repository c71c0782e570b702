//! Level 5 MAT-file serialization for u16 matrices.
//!
//! One file holds one named miMATRIX element of class mxUINT16. The
//! 128-byte text header is deterministic, so writing the same data twice
//! produces byte-identical files. Subelements are padded to 8-byte
//! boundaries as the format requires; sizes in tags exclude the padding.

use anyhow::{bail, Result};
use std::path::Path;

use crate::utils::file_utils;

const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_MATRIX: u32 = 14;

const MX_UINT16_CLASS: u32 = 11;

const HEADER_TEXT: &str = "MATLAB 5.0 MAT-file, created by xef2mat";

fn push_tag(out: &mut Vec<u8>, data_type: u32, byte_len: u32) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&byte_len.to_le_bytes());
}

fn pad_to_8(out: &mut Vec<u8>) {
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

/// Serializes `data` as a `rows` x `cols` matrix named `name`. The element
/// order on disk is exactly the order of `data`; dimensions are recorded
/// as [rows, cols].
pub fn write_mat(name: &str, path: &Path, data: &[u16], rows: usize, cols: usize) -> Result<()> {
    if data.len() != rows * cols {
        bail!(
            "Matrix '{}' has {} elements, expected {}x{} = {}",
            name,
            data.len(),
            rows,
            cols,
            rows * cols
        );
    }
    if name.is_empty() {
        bail!("Matrix name must be non-empty");
    }

    // miMATRIX body: array flags, dimensions, name, real part
    let mut body = Vec::with_capacity(64 + data.len() * 2);

    push_tag(&mut body, MI_UINT32, 8);
    body.extend_from_slice(&MX_UINT16_CLASS.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());

    push_tag(&mut body, MI_INT32, 8);
    body.extend_from_slice(&(rows as i32).to_le_bytes());
    body.extend_from_slice(&(cols as i32).to_le_bytes());

    push_tag(&mut body, MI_INT8, name.len() as u32);
    body.extend_from_slice(name.as_bytes());
    pad_to_8(&mut body);

    push_tag(&mut body, MI_UINT16, (data.len() * 2) as u32);
    for value in data {
        body.extend_from_slice(&value.to_le_bytes());
    }
    pad_to_8(&mut body);

    // 128-byte header: 116 bytes text, 8 bytes subsystem offset,
    // version 0x0100, endian indicator "MI" (0x4D49 little-endian)
    let mut out = Vec::with_capacity(128 + 8 + body.len());
    out.extend_from_slice(HEADER_TEXT.as_bytes());
    out.resize(116, b' ');
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(&0x4D49u16.to_le_bytes());

    push_tag(&mut out, MI_MATRIX, body.len() as u32);
    out.extend_from_slice(&body);

    file_utils::write_atomic(path, &out)
}
