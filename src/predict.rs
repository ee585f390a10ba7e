//! Multi-predictor coder.
//!
//! Six spatial predictors compete for each region of the image. A global
//! winner is elected up front on a subsampled grid; during the scan the
//! coder re-evaluates every 32 pixels over a 64-pixel lookahead and emits
//! an explicit switch code when a different predictor is clearly cheaper
//! (hysteresis keeps it from flapping). Residuals are zig-zag mapped,
//! folded into runs, and coded as a single stream of delta codes (0..=34),
//! run codes (35..=52) and predictor-switch codes (53..=58), which is
//! entropy-coded by FSE in bounded blocks. Extra-bit payloads for the
//! delta and run codes ride a separate MSB-first bit stream.
//!
//! When the value histogram of the image is sparse, a gap-remap front end
//! compacts the alphabet first: a used-value bitmap is FSE-coded into the
//! stream and the samples are renumbered densely, which also enables the
//! wraparound zig-zag over the compacted domain.
//!
//! Stream layout: `uvarint(codeBytes) ‖ code blocks ‖ uvarint(bitmapBytes)
//! ‖ bitmap ‖ extra bits`. Each code block is `varint(n)` followed by `n`
//! FSE bytes, or `varint(0) varint(-len) value` for a run fallback, or
//! `varint(0) varint(len) raw…` when FSE declined.

use crate::bitio::{MsbReader, MsbWriter};
use crate::fse::{fse_compress, fse_decompress, FseScratch};
use crate::zigzag::{unzigzag_wrap, zigzag_wrap};
use crate::{CodecError, Result};

const PRED_NONE: u8 = 0;
const PRED_LEFT: u8 = 1;
const PRED_UP: u8 = 2;
const PRED_UP_LEFT: u8 = 3;
const PRED_UP_LEFT2: u8 = 4;
const PRED_MEDIAN: u8 = 5;
const PRED_COUNT: u8 = 6;

/// Code 35 stands for a run of exactly 256.
const RLE_256_CODE: u8 = 35;
const RLE_OFFSET: usize = 36;
/// First predictor-switch code; the FSE alphabet ends at 53 + 5.
const PRED_SWITCH_BASE: u16 = 53;

/// Runs at least this long always code as a run.
const MIN_RLE_VALS: u16 = 3;
/// Shorter runs still code as a run once their literal cost passes this.
const RLE_MAX_BITS: u32 = 32;

/// Codes are gathered into FSE blocks of at most this many symbols.
const FSE_SIZE_LIMIT: usize = (1 << 17) - 2;

/// Dynamic re-election cadence and its lookahead window.
const CHECK_EVERY: usize = 32;
const PREDICT_AHEAD: usize = 64;

/// Margin between two block-size checks (switch + run flush + literal).
const CODES_SLACK: usize = 64;

/// upLeft2 only commits to one neighbor when the deltas differ by more
/// than this.
const PRED2_MIN_DELTA: u16 = 32;

/// Extra-bit widths per code.
const LL_BITS_TABLE: [u8; 53] = [
    0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, //
    1, 1, 1, 1, 2, 2, 3, 3, //
    4, 6, 7, 8, 9, 10, 11, 12, //
    13, 14, 15, //
    // Run codes:
    0, // 256
    0, 0, 0, 0, 0, 0, 0, 0, // 1 -> 8
    1, 1, 2, 3, 3, 4, 4, 6, 7, // 9 -> 256
];

/// Baselines per code (residual value or run length).
const LL_OFFSETS_TABLE: [u16; 53] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, //
    16, 18, 20, 22, 24, 28, 32, 40, //
    48, 64, 128, 256, 512, 1024, 2048, 4096, //
    8192, 16384, 32768, //
    // Run codes:
    256, //
    1, 2, 3, 4, 5, 6, 7, 8, //
    9, 11, 13, 17, 25, 33, 49, 65, 129,
];

/// Residual -> code for values below 64.
const LL_CODE_TABLE: [u8; 64] = [
    0, 1, 2, 3, 4, 5, 6, 7, //
    8, 9, 10, 11, 12, 13, 14, 15, //
    16, 16, 17, 17, 18, 18, 19, 19, //
    20, 20, 20, 20, 21, 21, 21, 21, //
    22, 22, 22, 22, 22, 22, 22, 22, //
    23, 23, 23, 23, 23, 23, 23, 23, //
    24, 24, 24, 24, 24, 24, 24, 24, //
    24, 24, 24, 24, 24, 24, 24, 24,
];

/// Run length -> code for lengths 1..=64 (index is length - 1).
const RLE_TABLE: [u8; 64] = build_rle_table();

const fn build_rle_table() -> [u8; 64] {
    let mut table = [0u8; 64];
    let mut i = 0;
    while i < 64 {
        let repeats = (i + 1) as u16;
        let mut j = 0;
        while j < 53 - RLE_OFFSET {
            let top = LL_OFFSETS_TABLE[RLE_OFFSET + j] + ((1u16 << LL_BITS_TABLE[RLE_OFFSET + j]) - 1);
            if top >= repeats {
                table[i] = (RLE_OFFSET + j) as u8;
                break;
            }
            j += 1;
        }
        i += 1;
    }
    table
}

#[inline]
fn high_bit(v: u16) -> u16 {
    15 - v.leading_zeros() as u16
}

/// Code and extra-bit width for a residual value.
#[inline]
fn delta_code(delta: u16) -> (u8, u8) {
    const LL_DELTA_CODE: u16 = 19;
    let code = if (delta as usize) < LL_CODE_TABLE.len() {
        LL_CODE_TABLE[(delta & 63) as usize]
    } else {
        (high_bit(delta) + LL_DELTA_CODE) as u8
    };
    (code, LL_BITS_TABLE[code as usize])
}

/// Code and extra-bit width for a run length (must be <= 256).
#[inline]
fn rle_code(repeats: u16) -> (u8, u8) {
    debug_assert!((1..=256).contains(&repeats));
    if repeats == 256 {
        return (RLE_256_CODE, 0);
    }
    const RLE_DELTA_CODE: u16 = 45;
    let r = repeats - 1;
    let code = if (r as usize) < RLE_TABLE.len() {
        RLE_TABLE[r as usize]
    } else {
        (high_bit(r) + RLE_DELTA_CODE) as u8
    };
    (code, LL_BITS_TABLE[code as usize])
}

/// Extra bits a residual would cost; the estimators rank predictors by it.
#[inline]
fn delta_bits(delta: u16) -> i64 {
    i64::from(delta_code(delta).1)
}

/// Residual of `data[idx]` under a predictor. All residuals except
/// `PRED_NONE`'s are zig-zag mapped (with wraparound once the alphabet is
/// compacted).
#[inline]
fn residual(pred: u8, data: &[u16], idx: usize, stride: usize, modulus: u16) -> u16 {
    let zz = |d: u16| zigzag_wrap(d as i16, modulus);
    let v = data[idx];
    match pred {
        PRED_NONE => v,
        PRED_LEFT => zz(v.wrapping_sub(data[idx - 1])),
        PRED_UP => zz(v.wrapping_sub(data[idx - stride])),
        PRED_UP_LEFT => {
            let p = ((u32::from(data[idx - stride]) + u32::from(data[idx - 1]) + 1) / 2) as u16;
            zz(v.wrapping_sub(p))
        }
        PRED_UP_LEFT2 => {
            let left = data[idx - 1];
            let up = data[idx - stride];
            let ul = data[idx - stride - 1];
            let left_delta = zz(ul.wrapping_sub(left));
            let up_delta = zz(ul.wrapping_sub(up));
            if left_delta > up_delta {
                if left_delta - up_delta > PRED2_MIN_DELTA {
                    return zz(v.wrapping_sub(left));
                }
            } else if up_delta - left_delta > PRED2_MIN_DELTA {
                return zz(v.wrapping_sub(up));
            }
            let p = ((u32::from(up) + u32::from(left) + 1) / 2) as u16;
            zz(v.wrapping_sub(p))
        }
        PRED_MEDIAN => {
            let a = data[idx - 1];
            let b = data[idx - stride];
            let c = a.wrapping_add(b).wrapping_sub(data[idx - stride - 1]);
            let mut p = c;
            if (a > b) != (a > c) {
                p = a;
            } else if (b < a) != (b < c) {
                p = b;
            }
            if modulus > 1 {
                // The gradient estimate can wrap outside the compacted
                // domain; the wraparound map needs |residual| < modulus.
                p = p.min(modulus - 1);
            }
            zz(v.wrapping_sub(p))
        }
        _ => unreachable!("predictor id out of range"),
    }
}

/// Invert [`residual`]: reconstruct the pixel at `idx` from already
/// decoded neighbors. Fails when a corrupt stream selects a predictor
/// whose neighbors do not exist.
#[inline]
fn reconstruct(
    pred: u8,
    out: &[u16],
    idx: usize,
    x: usize,
    y: usize,
    stride: usize,
    val: u16,
    modulus: u16,
) -> Result<u16> {
    let un = |p: u16| unzigzag_wrap(val, p, modulus);
    let zz = |d: u16| zigzag_wrap(d as i16, modulus);
    match pred {
        PRED_NONE => Ok(val),
        PRED_LEFT if x > 0 => Ok(un(out[idx - 1])),
        PRED_UP if y > 0 => Ok(un(out[idx - stride])),
        PRED_UP_LEFT if x > 0 && y > 0 => {
            let p = ((u32::from(out[idx - stride]) + u32::from(out[idx - 1]) + 1) / 2) as u16;
            Ok(un(p))
        }
        PRED_UP_LEFT2 if x > 0 && y > 0 => {
            let left = out[idx - 1];
            let up = out[idx - stride];
            let ul = out[idx - stride - 1];
            let left_delta = zz(ul.wrapping_sub(left));
            let up_delta = zz(ul.wrapping_sub(up));
            if left_delta > up_delta {
                if left_delta - up_delta > PRED2_MIN_DELTA {
                    return Ok(un(left));
                }
            } else if up_delta - left_delta > PRED2_MIN_DELTA {
                return Ok(un(up));
            }
            let p = ((u32::from(up) + u32::from(left) + 1) / 2) as u16;
            Ok(un(p))
        }
        PRED_MEDIAN if x > 0 && y > 0 => {
            let a = out[idx - 1];
            let b = out[idx - stride];
            let c = a.wrapping_add(b).wrapping_sub(out[idx - stride - 1]);
            let mut p = c;
            if (a > b) != (a > c) {
                p = a;
            } else if (b < a) != (b < c) {
                p = b;
            }
            if modulus > 1 {
                p = p.min(modulus - 1);
            }
            Ok(un(p))
        }
        _ => Err(CodecError::CorruptStream("predictor without neighbors")),
    }
}

// --- varints (LEB128; the signed form zig-zags first) ---

pub(crate) fn put_uvarint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn put_varint(out: &mut Vec<u8>, v: i64) {
    let mut u = (v as u64) << 1;
    if v < 0 {
        u = !u;
    }
    put_uvarint(out, u);
}

pub(crate) fn read_uvarint(b: &[u8], pos: &mut usize) -> Result<u64> {
    let mut v = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *b
            .get(*pos)
            .ok_or(CodecError::CorruptStream("varint truncated"))?;
        *pos += 1;
        if shift == 63 && byte > 1 {
            return Err(CodecError::CorruptStream("varint overflow"));
        }
        v |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(v);
        }
        shift += 7;
        if shift > 63 {
            return Err(CodecError::CorruptStream("varint overflow"));
        }
    }
}

fn read_varint(b: &[u8], pos: &mut usize) -> Result<i64> {
    let u = read_uvarint(b, pos)?;
    let v = (u >> 1) as i64;
    Ok(if u & 1 != 0 { !v } else { v })
}

/// Flush a pending residual run into the code stream: as a run code when
/// long or expensive enough, as repeated literals otherwise.
fn flush_run(codes: &mut Vec<u16>, extra: &mut MsbWriter, rle_val: u16, rle_len: &mut u16) {
    if *rle_len == 0 {
        return;
    }
    let (dc, d_bits) = delta_code(rle_val);
    if *rle_len >= MIN_RLE_VALS || u32::from(d_bits) * u32::from(*rle_len) > RLE_MAX_BITS {
        let (rc, r_bits) = rle_code(*rle_len);
        codes.push(u16::from(rc));
        if r_bits > 0 {
            extra.add_bits16(*rle_len - LL_OFFSETS_TABLE[rc as usize], r_bits);
        }
    } else {
        for _ in 0..*rle_len {
            codes.push(u16::from(dc));
            if d_bits > 0 {
                extra.add_bits16(rle_val - LL_OFFSETS_TABLE[dc as usize], d_bits);
            }
        }
    }
    *rle_len = 0;
}

/// FSE-code the gathered block and append its framing to `dst`.
fn add_codes(codes: &mut Vec<u16>, dst: &mut Vec<u8>, scratch: &mut FseScratch) -> Result<()> {
    if codes.is_empty() {
        return Ok(());
    }
    match fse_compress(codes, scratch) {
        Ok(compressed) => {
            put_varint(dst, compressed.len() as i64);
            dst.extend_from_slice(&compressed);
        }
        Err(CodecError::UseRle) => {
            put_varint(dst, 0);
            put_varint(dst, -(codes.len() as i64));
            dst.push(codes[0] as u8);
        }
        Err(CodecError::Incompressible) => {
            put_varint(dst, 0);
            put_varint(dst, codes.len() as i64);
            dst.extend(codes.iter().map(|&c| c as u8));
        }
        Err(e) => return Err(e),
    }
    codes.clear();
    Ok(())
}

/// Deterministic predictor resets the decoder replays at each position.
#[inline]
fn positional_reset(pixel: usize, width: usize, curr: &mut u8, global_pred: u8) {
    let x = pixel % width;
    if x == 0 {
        *curr = if pixel < width { PRED_NONE } else { PRED_UP };
    } else if x == 1 {
        *curr = if pixel < width { PRED_LEFT } else { global_pred };
    }
}

/// Compress one block of `width` x `height` pixels starting at `input[0]`
/// with rows `stride` apart.
pub(crate) fn compress_block(
    input: &[u16],
    width: usize,
    height: usize,
    stride: usize,
    allow_gap: bool,
) -> Result<Vec<u8>> {
    let n = width * height;
    let mut extra = MsbWriter::with_capacity(n / 4);
    let mut fse_scratch = FseScratch::new();
    fse_scratch.max_symbol_value = PRED_SWITCH_BASE + u16::from(PRED_COUNT) - 1;
    fse_scratch.table_log = 12;

    // Gap remap: when the value histogram is sparse enough, renumber the
    // samples densely and ship the used-value bitmap.
    let mut owned = Vec::new();
    let mut bitmap_compressed = Vec::new();
    let mut modulus = 0u16;
    let mut gap_applied = false;
    if allow_gap && n > 256 {
        let mut bitmap = vec![0u16; 1 << 16];
        let mut max = 0u16;
        for y in 0..height {
            for &v in &input[y * stride..y * stride + width] {
                bitmap[v as usize] = 1;
                max = max.max(v);
            }
        }
        let val_len = max as usize + 1;
        let gaps = bitmap[..val_len].iter().filter(|&&f| f == 0).count();
        if max > 4 && gaps * 8 > max as usize {
            match fse_compress(&bitmap[..val_len], &mut fse_scratch) {
                Ok(compressed) => {
                    let mut in_to_out = vec![0u16; val_len];
                    let mut next = 0u16;
                    for (i, &f) in bitmap[..val_len].iter().enumerate() {
                        if f == 1 {
                            in_to_out[i] = next;
                            next += 1;
                        }
                    }
                    let used = (val_len - gaps) as u32;
                    modulus = if used <= 32768 { used as u16 } else { 0 };
                    owned = Vec::with_capacity(n);
                    for y in 0..height {
                        owned.extend(
                            input[y * stride..y * stride + width]
                                .iter()
                                .map(|&v| in_to_out[v as usize]),
                        );
                    }
                    bitmap_compressed = compressed;
                    gap_applied = true;
                    log::debug!(
                        "gap remap: {} of {} values used, bitmap {} bytes",
                        used,
                        val_len,
                        bitmap_compressed.len()
                    );
                }
                // Not worth a bitmap; keep the raw alphabet.
                Err(CodecError::Incompressible) | Err(CodecError::UseRle) => {}
                Err(e) => return Err(e),
            }
        }
    }
    extra.add_bits32(u32::from(gap_applied), 1);
    let (data, stride) = if gap_applied {
        (owned.as_slice(), width)
    } else {
        (input, stride)
    };

    let mut codes: Vec<u16> = Vec::new();
    let mut fse_compressed: Vec<u8> = Vec::new();

    // Elect the global predictor on a subsampled grid. upLeft is the
    // default and gets a small bonus; a switch code is only spent when
    // another predictor wins.
    let mut global_pred = PRED_UP_LEFT;
    {
        let mut costs = [0i64; PRED_COUNT as usize];
        let mut y = 1;
        while y < height {
            let row = y * stride;
            let mut x = 1;
            while x < width {
                for (p, cost) in costs.iter_mut().enumerate() {
                    *cost += delta_bits(residual(p as u8, data, row + x, stride, modulus));
                }
                x += 2;
            }
            y += 2;
        }
        let mut best = costs[PRED_UP_LEFT as usize] - (costs[PRED_UP_LEFT as usize] >> 6);
        for p in [PRED_NONE, PRED_UP, PRED_LEFT, PRED_MEDIAN, PRED_UP_LEFT2] {
            if costs[p as usize] < best {
                global_pred = p;
                best = costs[p as usize];
            }
        }
        if global_pred != PRED_UP_LEFT {
            codes.push(PRED_SWITCH_BASE + u16::from(global_pred));
        }
        log::debug!("global predictor {}", global_pred);
    }

    let mut rle_val = 0u16;
    let mut rle_len = 0u16;
    let mut curr = PRED_NONE;
    for y in 0..height {
        if y > 0 {
            curr = PRED_UP;
        }
        for x in 0..width {
            if x == 1 {
                curr = if y == 0 { PRED_LEFT } else { global_pred };
            }
            let index = y * stride + x;

            // Periodic re-election over a lookahead window, biased toward
            // keeping the current predictor.
            if y >= 1 && x % CHECK_EVERY == 1 && width - x > PREDICT_AHEAD - 1 {
                let mut costs = [0i64; PRED_COUNT as usize];
                for i in 0..PREDICT_AHEAD {
                    for (p, cost) in costs.iter_mut().enumerate() {
                        *cost += delta_bits(residual(p as u8, data, index + i, stride, modulus));
                    }
                }
                costs[curr as usize] =
                    costs[curr as usize] * 15 / 16 - (PREDICT_AHEAD as i64 / 2);
                let was = curr;
                let mut best = costs[curr as usize];
                for p in [
                    PRED_UP_LEFT,
                    PRED_UP,
                    PRED_LEFT,
                    PRED_MEDIAN,
                    PRED_UP_LEFT2,
                    PRED_NONE,
                ] {
                    if costs[p as usize] < best {
                        curr = p;
                        best = costs[p as usize];
                    }
                }
                if was != curr {
                    // A run may not straddle a switch: the decoder applies
                    // codes in stream order.
                    flush_run(&mut codes, &mut extra, rle_val, &mut rle_len);
                    codes.push(PRED_SWITCH_BASE + u16::from(curr));
                }
            }

            if codes.len() >= FSE_SIZE_LIMIT {
                add_codes(&mut codes, &mut fse_compressed, &mut fse_scratch)?;
            }

            let val = residual(curr, data, index, stride, modulus);
            if val == rle_val {
                if rle_len == 256 {
                    codes.push(u16::from(RLE_256_CODE));
                    rle_len = 0;
                }
                rle_len += 1;
                continue;
            }
            flush_run(&mut codes, &mut extra, rle_val, &mut rle_len);
            rle_val = val;

            let (code, bits) = delta_code(val);
            codes.push(u16::from(code));
            if bits > 0 {
                extra.add_bits16(val - LL_OFFSETS_TABLE[code as usize], bits);
            }
        }
    }
    flush_run(&mut codes, &mut extra, rle_val, &mut rle_len);
    add_codes(&mut codes, &mut fse_compressed, &mut fse_scratch)?;

    extra.flush_align();
    let extra_bytes = extra.take();

    let mut dst =
        Vec::with_capacity(fse_compressed.len() + bitmap_compressed.len() + extra_bytes.len() + 16);
    put_uvarint(&mut dst, fse_compressed.len() as u64);
    dst.extend_from_slice(&fse_compressed);
    put_uvarint(&mut dst, bitmap_compressed.len() as u64);
    dst.extend_from_slice(&bitmap_compressed);
    dst.extend_from_slice(&extra_bytes);
    Ok(dst)
}

/// Decompress one block back into `width` x `height` samples.
pub(crate) fn decompress_block(bytes: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
    let n = width * height;
    let mut pos = 0usize;

    let fse_len = read_uvarint(bytes, &mut pos)? as usize;
    if fse_len > bytes.len() - pos {
        return Err(CodecError::CorruptStream("code section past input"));
    }
    let blocks = &bytes[pos..pos + fse_len];
    pos += fse_len;

    let bm_len = read_uvarint(bytes, &mut pos)? as usize;
    if bm_len > bytes.len() - pos {
        return Err(CodecError::CorruptStream("bitmap section past input"));
    }
    let bm_bytes = &bytes[pos..pos + bm_len];
    pos += bm_len;
    let extra_bytes = &bytes[pos..];

    // A pixel never takes more than one code, plus the periodic switches.
    let max_codes = n + n / CHECK_EVERY + CODES_SLACK;

    // Reassemble the code stream from the FSE blocks. The limit only
    // bounds hostile blocks; a well-formed block stops on its own when
    // its bitstream drains.
    let mut codes: Vec<u16> = Vec::new();
    let mut scratch = FseScratch::new();
    scratch.decompress_limit = FSE_SIZE_LIMIT + CODES_SLACK;
    let mut bpos = 0usize;
    while bpos < blocks.len() {
        let marker = read_varint(blocks, &mut bpos)?;
        if marker > 0 {
            let len = marker as usize;
            if len > blocks.len() - bpos {
                return Err(CodecError::CorruptStream("code block past section"));
            }
            let decoded = fse_decompress(&blocks[bpos..bpos + len], &mut scratch)?;
            bpos += len;
            codes.extend_from_slice(&decoded);
        } else if marker == 0 {
            let stored = read_varint(blocks, &mut bpos)?;
            if stored < 0 {
                let len = (-stored) as usize;
                if len > max_codes {
                    return Err(CodecError::CorruptStream("code run too long"));
                }
                let v = *blocks
                    .get(bpos)
                    .ok_or(CodecError::CorruptStream("code run value missing"))?;
                bpos += 1;
                codes.resize(codes.len() + len, u16::from(v));
            } else {
                let len = stored as usize;
                if len > blocks.len() - bpos {
                    return Err(CodecError::CorruptStream("raw codes past section"));
                }
                codes.extend(blocks[bpos..bpos + len].iter().map(|&b| u16::from(b)));
                bpos += len;
            }
        } else {
            return Err(CodecError::CorruptStream("negative code block length"));
        }
        if codes.len() > max_codes {
            return Err(CodecError::CorruptStream("code stream too long"));
        }
    }

    // Gap bitmap: dense value -> original value, and the wraparound
    // modulus the encoder used.
    let mut out_to_in: Vec<u16> = Vec::new();
    let mut modulus = 0u16;
    if bm_len > 0 {
        let mut s = FseScratch::new();
        // Cap, not count: the bitmap can cover at most the whole alphabet.
        s.decompress_limit = 1 << 16;
        let bits = fse_decompress(bm_bytes, &mut s)?;
        for (i, &b) in bits.iter().enumerate() {
            match b {
                0 => {}
                1 => out_to_in.push(i as u16),
                _ => return Err(CodecError::CorruptStream("bitmap symbol not a bit")),
            }
        }
        if out_to_in.is_empty() {
            return Err(CodecError::CorruptStream("bitmap marks no values"));
        }
        modulus = if out_to_in.len() <= 32768 {
            out_to_in.len() as u16
        } else {
            0
        };
    }

    let mut extra = MsbReader::new(extra_bytes)?;
    let gap_flag = extra.get_bits(1) == 1;
    if gap_flag != (bm_len > 0) {
        return Err(CodecError::CorruptStream("gap flag does not match bitmap"));
    }

    // Replay the scan.
    let mut out = vec![0u16; n];
    let mut curr = PRED_NONE;
    let mut global_pred = PRED_UP_LEFT;
    let mut rle_val = 0u16;
    let mut pixel = 0usize;
    let mut ci = 0usize;

    let emit = |out: &mut [u16],
                pixel: &mut usize,
                curr: &mut u8,
                global_pred: u8,
                val: u16|
     -> Result<()> {
        if *pixel >= n {
            return Err(CodecError::CorruptStream("run past end of image"));
        }
        let x = *pixel % width;
        let y = *pixel / width;
        let v = reconstruct(*curr, out, *pixel, x, y, width, val, modulus)?;
        out[*pixel] = v;
        *pixel += 1;
        if *pixel < n {
            positional_reset(*pixel, width, curr, global_pred);
        }
        Ok(())
    };

    while pixel < n {
        let code = *codes
            .get(ci)
            .ok_or(CodecError::CorruptStream("code stream exhausted"))?;
        ci += 1;
        if code >= PRED_SWITCH_BASE {
            let p = (code - PRED_SWITCH_BASE) as u8;
            if p >= PRED_COUNT {
                return Err(CodecError::CorruptStream("unknown predictor code"));
            }
            if pixel == 0 && ci <= 1 {
                global_pred = p;
            } else {
                curr = p;
            }
            continue;
        }
        let code = code as usize;
        let bits = LL_BITS_TABLE[code];
        let payload = extra.get_bits(bits) as u16;
        if code < RLE_OFFSET && code != RLE_256_CODE as usize {
            // Delta code: one pixel.
            let val = LL_OFFSETS_TABLE[code] + payload;
            rle_val = val;
            emit(&mut out, &mut pixel, &mut curr, global_pred, val)?;
        } else {
            // Run code: repeat the previous residual.
            let count = if code == RLE_256_CODE as usize {
                256
            } else {
                u32::from(LL_OFFSETS_TABLE[code]) + u32::from(payload)
            };
            for _ in 0..count {
                emit(&mut out, &mut pixel, &mut curr, global_pred, rle_val)?;
            }
        }
    }
    if ci != codes.len() {
        return Err(CodecError::CorruptStream("trailing codes after image"));
    }

    // Undo the gap remap.
    if gap_flag {
        for v in out.iter_mut() {
            *v = *out_to_in
                .get(*v as usize)
                .ok_or(CodecError::CorruptStream("sample outside value bitmap"))?;
        }
    }
    Ok(out)
}

/// Compress a whole image with the multi-predictor coder.
pub fn predictive_compress_image(
    input: &[u16],
    width: usize,
    height: usize,
) -> Result<Vec<u8>> {
    compress_block(input, width, height, width, true)
}

/// Inverse of [`predictive_compress_image`].
pub fn predictive_decompress_image(
    bytes: &[u8],
    width: usize,
    height: usize,
) -> Result<Vec<u16>> {
    decompress_block(bytes, width, height)
}
