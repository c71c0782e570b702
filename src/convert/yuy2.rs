//! Fixed-point YUY2 4:2:2 to 32-bit BGRA conversion (BT.601 coefficients).
//!
//! Each packed 4-byte group Y0,U,Y1,V carries two horizontally adjacent
//! pixels sharing one chroma pair. All arithmetic is integer with a
//! truncating right shift, so the output is bit-exact across platforms.

use anyhow::{bail, Result};
use rayon::prelude::*;

#[inline]
fn clip8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Converts one Y0,U,Y1,V group into two B,G,R,A pixels (alpha opaque).
#[inline]
pub fn convert_group(y0: u8, u: u8, y1: u8, v: u8) -> [u8; 8] {
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let mut out = [0u8; 8];
    for (half, y) in [y0, y1].into_iter().enumerate() {
        let c = y as i32 - 16;
        let r = clip8((298 * c + 409 * e + 128) >> 8);
        let g = clip8((298 * c - 100 * d - 208 * e + 128) >> 8);
        let b = clip8((298 * c + 516 * d + 128) >> 8);

        out[half * 4] = b;
        out[half * 4 + 1] = g;
        out[half * 4 + 2] = r;
        out[half * 4 + 3] = 0xFF;
    }
    out
}

/// Converts a whole packed frame into `bgra`. `packed` holds width*height*2
/// bytes, `bgra` width*height*4; both must line up on group boundaries.
/// Work is chunked across threads, frame ordering is the caller's concern.
pub fn convert_frame_into(packed: &[u8], bgra: &mut [u8]) -> Result<()> {
    if packed.len() % 4 != 0 {
        bail!("Packed frame length {} is not a multiple of 4", packed.len());
    }
    if bgra.len() != packed.len() * 2 {
        bail!(
            "BGRA buffer length {} does not match packed length {} (expected {})",
            bgra.len(),
            packed.len(),
            packed.len() * 2
        );
    }

    let groups = packed.len() / 4;
    let chunk_groups = if groups > 10_000 {
        2048
    } else {
        (groups / rayon::current_num_threads().max(1)).max(1)
    };

    bgra.par_chunks_mut(chunk_groups * 8)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            let base = chunk_idx * chunk_groups;
            for (g, px) in out_chunk.chunks_exact_mut(8).enumerate() {
                let src = (base + g) * 4;
                let converted = convert_group(
                    packed[src],
                    packed[src + 1],
                    packed[src + 2],
                    packed[src + 3],
                );
                px.copy_from_slice(&converted);
            }
        });

    Ok(())
}
