//! Block-parallel wrapper around the multi-predictor coder.
//!
//! The image is cut into 192x192 tiles which are coded independently on
//! the rayon pool and stitched back in row-major tile order. Gap removal
//! stays per-tile, so the global-gap slot in the header is always empty
//! (one or the other, never both).
//!
//! Layout: `uvarint(0) ‖ { uvarint(tileBytes) tile }*`. Tiles are framed
//! because the per-tile streams are not self-delimiting.

use rayon::prelude::*;

use crate::predict::{compress_block, decompress_block, put_uvarint, read_uvarint};
use crate::{CodecError, Result};

const TILE_SIZE: usize = 192;

#[derive(Clone, Copy)]
struct Tile {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

fn tiles(width: usize, height: usize) -> Vec<Tile> {
    let mut out = Vec::new();
    let mut y = 0;
    while y < height {
        let th = TILE_SIZE.min(height - y);
        let mut x = 0;
        while x < width {
            let tw = TILE_SIZE.min(width - x);
            out.push(Tile {
                x,
                y,
                width: tw,
                height: th,
            });
            x += TILE_SIZE;
        }
        y += TILE_SIZE;
    }
    out
}

/// Compress an image as independently coded tiles.
pub fn tiled_compress(samples: &[u16], width: usize, height: usize) -> Result<Vec<u8>> {
    if samples.len() != width * height {
        return Err(CodecError::Config("sample count does not match dimensions"));
    }
    let layout = tiles(width, height);
    let blocks: Vec<Result<Vec<u8>>> = layout
        .par_iter()
        .map(|t| compress_block(&samples[t.y * width + t.x..], t.width, t.height, width, true))
        .collect();

    let mut out = Vec::new();
    put_uvarint(&mut out, 0); // no global gap bitmap
    for block in blocks {
        let block = block?;
        put_uvarint(&mut out, block.len() as u64);
        out.extend_from_slice(&block);
    }
    log::debug!(
        "tiled compress: {} tiles, {} -> {} bytes",
        layout.len(),
        samples.len() * 2,
        out.len()
    );
    Ok(out)
}

/// Inverse of [`tiled_compress`].
pub fn tiled_decompress(bytes: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
    let mut pos = 0usize;
    let global_gap = read_uvarint(bytes, &mut pos)? as usize;
    if global_gap != 0 {
        // This encoder never writes a global bitmap.
        return Err(CodecError::CorruptStream("unexpected global gap bitmap"));
    }

    let layout = tiles(width, height);
    let mut slices = Vec::with_capacity(layout.len());
    for _ in &layout {
        let len = read_uvarint(bytes, &mut pos)? as usize;
        if len > bytes.len() - pos {
            return Err(CodecError::CorruptStream("tile past input"));
        }
        slices.push(&bytes[pos..pos + len]);
        pos += len;
    }
    if pos != bytes.len() {
        return Err(CodecError::CorruptStream("trailing bytes after tiles"));
    }

    let decoded: Vec<Result<Vec<u16>>> = layout
        .par_iter()
        .zip(slices)
        .map(|(t, slice)| decompress_block(slice, t.width, t.height))
        .collect();

    let mut out = vec![0u16; width * height];
    for (t, block) in layout.iter().zip(decoded) {
        let block = block?;
        for row in 0..t.height {
            let dst = (t.y + row) * width + t.x;
            out[dst..dst + t.width].copy_from_slice(&block[row * t.width..(row + 1) * t.width]);
        }
    }
    Ok(out)
}
