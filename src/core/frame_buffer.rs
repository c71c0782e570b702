//! Bounds-checked copies from a borrowed event payload into the reusable
//! per-stream-kind buffers. All-or-nothing: a short source or destination
//! fails before a single element is written.

use anyhow::{bail, Result};

/// Copies `count` u16 samples from little-endian packed `src` bytes into
/// `dst` starting at `start`.
pub fn copy_words(src: &[u8], dst: &mut [u16], start: usize, count: usize) -> Result<()> {
    if src.len() < count * 2 {
        bail!(
            "Event payload holds {} bytes, {} samples need {}",
            src.len(),
            count,
            count * 2
        );
    }
    if dst.len() < start + count {
        bail!(
            "Destination holds {} samples, copy needs {}",
            dst.len(),
            start + count
        );
    }

    for (slot, pair) in dst[start..start + count]
        .iter_mut()
        .zip(src.chunks_exact(2))
    {
        *slot = u16::from_le_bytes([pair[0], pair[1]]);
    }
    Ok(())
}

/// Copies `count` bytes from `src` into `dst` starting at `start`.
pub fn copy_bytes(src: &[u8], dst: &mut [u8], start: usize, count: usize) -> Result<()> {
    if src.len() < count {
        bail!("Event payload holds {} bytes, copy needs {}", src.len(), count);
    }
    if dst.len() < start + count {
        bail!(
            "Destination holds {} bytes, copy needs {}",
            dst.len(),
            start + count
        );
    }

    dst[start..start + count].copy_from_slice(&src[..count]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_words_decodes_little_endian() {
        let src = [0x34, 0x12, 0xFF, 0x00, 0x00, 0x80];
        let mut dst = [0u16; 4];
        copy_words(&src, &mut dst, 1, 3).unwrap();
        assert_eq!(dst, [0, 0x1234, 0x00FF, 0x8000]);
    }

    #[test]
    fn test_copy_words_short_source_writes_nothing() {
        let src = [0x01, 0x02, 0x03];
        let mut dst = [7u16; 4];
        assert!(copy_words(&src, &mut dst, 0, 2).is_err());
        assert_eq!(dst, [7, 7, 7, 7]);
    }

    #[test]
    fn test_copy_bytes_respects_start_and_count() {
        let src = [1u8, 2, 3, 4, 5];
        let mut dst = [0u8; 6];
        copy_bytes(&src, &mut dst, 2, 4).unwrap();
        assert_eq!(dst, [0, 0, 1, 2, 3, 4]);

        assert!(copy_bytes(&src, &mut dst, 3, 4).is_err());
        assert!(copy_bytes(&src, &mut dst, 0, 6).is_err());
    }
}
