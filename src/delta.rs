//! 2-D delta transform with overflow escape.
//!
//! Each pixel is predicted from its decoded neighbors (left on the first
//! row, up in the first column, their unrounded mean elsewhere) and the
//! residual is emitted as a symbol of the same depth as the input. Two
//! residual encodings exist:
//!
//! * centered: `T + diff`, with `T = (1 << (D-1)) - 1`;
//! * zig-zag: `zigzag(diff)`.
//!
//! Residuals with `|diff| >= T` escape: the ESC word `(1 << D) - 1` is
//! emitted followed by the raw sample. `2T < ESC`, so an in-range residual
//! can never collide with the escape word. The first output word is always
//! MAX so the decoder can recover the depth.
//!
//! The `*_rle_*` forms fuse the transform with the run-length stage: delta
//! symbols stream straight into [`RleEncoder`] and back out of
//! [`RleDecoder`] without an intermediate buffer. The RLE container's MAX
//! is the delta ESC word, the largest symbol the transform can emit.

use crate::rle::{RleDecoder, RleEncoder, SliceSource, SymbolSource};
use crate::zigzag::{unzigzag, zigzag};
use crate::{pixel_depth, CodecError, Result};

/// Centered-delta zero point for a given depth.
#[inline]
pub(crate) fn delta_threshold(depth: u8) -> u16 {
    debug_assert!((1..=16).contains(&depth));
    ((1u32 << (depth - 1)) - 1) as u16
}

/// Overflow-escape word for a given depth.
#[inline]
pub(crate) fn overflow_escape(depth: u8) -> u16 {
    ((1u32 << depth) - 1) as u16
}

/// Unrounded mean predictor over already-known neighbors.
#[inline]
fn predict(data: &[u16], index: usize, x: usize, y: usize, width: usize) -> i32 {
    let mut pred = 0i32;
    let mut div = 0;
    if x > 0 {
        pred = i32::from(data[index - 1]);
        div += 1;
    }
    if y > 0 {
        pred += i32::from(data[index - width]);
        div += 1;
    }
    if div == 2 {
        pred >>= 1;
    }
    pred
}

/// Centered-delta forward transform.
pub fn delta_compress(input: &[u16], width: usize, height: usize, max_value: u16) -> Vec<u16> {
    let mut out = Vec::with_capacity(width * height + 1);
    out.push(max_value);
    if max_value == 0 {
        // Degenerate all-zero image; the header word carries everything.
        return out;
    }
    let depth = pixel_depth(max_value);
    let threshold = delta_threshold(depth);
    let escape = overflow_escape(depth);

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let val = input[index];
            let diff = i32::from(val) - predict(input, index, x, y, width);
            if diff.unsigned_abs() >= u32::from(threshold) {
                out.push(escape);
                out.push(val);
            } else {
                out.push((i32::from(threshold) + diff) as u16);
            }
        }
    }
    out
}

/// Centered-delta inverse transform.
pub fn delta_decompress(input: &[u16], width: usize, height: usize) -> Result<Vec<u16>> {
    let mut src = SliceSource::new(input);
    let max_value = src.next_symbol()?;
    decode_centered(&mut src, max_value, width, height)
}

/// Zig-zag-delta forward transform (2-D predictor).
pub fn delta_zz_compress(input: &[u16], width: usize, height: usize, max_value: u16) -> Vec<u16> {
    let mut out = Vec::with_capacity(width * height + 1);
    out.push(max_value);
    if max_value == 0 {
        return out;
    }
    let depth = pixel_depth(max_value);
    let threshold = delta_threshold(depth);
    let escape = overflow_escape(depth);

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let val = input[index];
            let diff = i32::from(val) - predict(input, index, x, y, width);
            if diff.unsigned_abs() >= u32::from(threshold) {
                out.push(escape);
                out.push(val);
            } else {
                out.push(zigzag(diff as i16));
            }
        }
    }
    out
}

/// Zig-zag-delta inverse transform.
pub fn delta_zz_decompress(input: &[u16], width: usize, height: usize) -> Result<Vec<u16>> {
    let mut src = SliceSource::new(input);
    let max_value = src.next_symbol()?;
    decode_zigzag(&mut src, max_value, width, height)
}

/// Fused delta -> RLE forward transform. The RLE container is sized for
/// the delta alphabet (its MAX is the ESC word) and the image MAX rides as
/// the first encoded symbol.
pub fn delta_rle_compress(
    input: &[u16],
    width: usize,
    height: usize,
    max_value: u16,
) -> Vec<u16> {
    let depth = pixel_depth(max_value.max(1));
    let escape = overflow_escape(depth);
    let threshold = delta_threshold(depth);
    let mut rle = RleEncoder::new(width, height, escape);
    rle.encode(max_value);
    if max_value == 0 {
        return rle.finish();
    }

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let val = input[index];
            let diff = i32::from(val) - predict(input, index, x, y, width);
            if diff.unsigned_abs() >= u32::from(threshold) {
                rle.encode(escape);
                rle.encode(val);
            } else {
                rle.encode((i32::from(threshold) + diff) as u16);
            }
        }
    }
    rle.finish()
}

/// Inverse of [`delta_rle_compress`], pulling RLE words from `src`.
pub fn delta_rle_decompress<S: SymbolSource>(
    src: S,
    width: usize,
    height: usize,
) -> Result<Vec<u16>> {
    let mut rle = RleDecoder::new(src)?;
    let max_value = rle.decode_next()?;
    decode_centered(&mut RleSymbols(&mut rle), max_value, width, height)
}

/// Fused zig-zag delta -> RLE forward transform.
pub fn delta_zz_rle_compress(
    input: &[u16],
    width: usize,
    height: usize,
    max_value: u16,
) -> Vec<u16> {
    let depth = pixel_depth(max_value.max(1));
    let escape = overflow_escape(depth);
    let threshold = delta_threshold(depth);
    let mut rle = RleEncoder::new(width, height, escape);
    rle.encode(max_value);
    if max_value == 0 {
        return rle.finish();
    }

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let val = input[index];
            let diff = i32::from(val) - predict(input, index, x, y, width);
            if diff.unsigned_abs() >= u32::from(threshold) {
                rle.encode(escape);
                rle.encode(val);
            } else {
                rle.encode(zigzag(diff as i16));
            }
        }
    }
    rle.finish()
}

/// Inverse of [`delta_zz_rle_compress`].
pub fn delta_zz_rle_decompress<S: SymbolSource>(
    src: S,
    width: usize,
    height: usize,
) -> Result<Vec<u16>> {
    let mut rle = RleDecoder::new(src)?;
    let max_value = rle.decode_next()?;
    decode_zigzag(&mut RleSymbols(&mut rle), max_value, width, height)
}

/// Adapter so the shared decode loops can pull from an [`RleDecoder`].
struct RleSymbols<'a, S>(&'a mut RleDecoder<S>);

impl<S: SymbolSource> SymbolSource for RleSymbols<'_, S> {
    #[inline]
    fn next_symbol(&mut self) -> Result<u16> {
        self.0.decode_next()
    }
}

fn decode_centered<S: SymbolSource>(
    src: &mut S,
    max_value: u16,
    width: usize,
    height: usize,
) -> Result<Vec<u16>> {
    if max_value == 0 {
        return Ok(vec![0; width * height]);
    }
    let depth = pixel_depth(max_value);
    let threshold = delta_threshold(depth);
    let escape = overflow_escape(depth);
    let mut out = vec![0u16; width * height];

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let val = src.next_symbol()?;
            out[index] = if val == escape {
                src.next_symbol()?
            } else {
                let diff = i32::from(val) - i32::from(threshold);
                let pixel = predict(&out, index, x, y, width) + diff;
                if !(0..=i32::from(max_value)).contains(&pixel) {
                    return Err(CodecError::CorruptStream("delta outside sample range"));
                }
                pixel as u16
            };
        }
    }
    Ok(out)
}

fn decode_zigzag<S: SymbolSource>(
    src: &mut S,
    max_value: u16,
    width: usize,
    height: usize,
) -> Result<Vec<u16>> {
    if max_value == 0 {
        return Ok(vec![0; width * height]);
    }
    let depth = pixel_depth(max_value);
    let escape = overflow_escape(depth);
    let mut out = vec![0u16; width * height];

    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let val = src.next_symbol()?;
            out[index] = if val == escape {
                src.next_symbol()?
            } else {
                let diff = i32::from(unzigzag(val));
                let pixel = predict(&out, index, x, y, width) + diff;
                if !(0..=i32::from(max_value)).contains(&pixel) {
                    return Err(CodecError::CorruptStream("delta outside sample range"));
                }
                pixel as u16
            };
        }
    }
    Ok(out)
}
