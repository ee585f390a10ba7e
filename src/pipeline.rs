//! The four fixed compression pipelines.
//!
//! Each pipeline is a stateless pair of functions from
//! `(samples, width, height, max_value)` to bytes and back. No new formats
//! are introduced here; a pipeline's stream is exactly the byte stream of
//! its final entropy stage over the symbol stream of its transforms.
//!
//! The FSE pipelines surface [`CodecError::Incompressible`] and
//! [`CodecError::UseRle`] unchanged; both mean the caller should store the
//! input another way, not that anything failed.
//!
//! [`CodecError::Incompressible`]: crate::CodecError::Incompressible
//! [`CodecError::UseRle`]: crate::CodecError::UseRle

use crate::delta::{
    delta_rle_compress, delta_rle_decompress, delta_zz_rle_compress, delta_zz_rle_decompress,
};
use crate::fse::{fse_compress, fse_decompress, FseScratch};
use crate::huffman::{huff_compress, HuffDecoder};
use crate::predict;
use crate::rle::SliceSource;
use crate::{CodecError, Result};

fn validate(samples: &[u16], width: usize, height: usize, max_value: u16) -> Result<()> {
    if width
        .checked_mul(height)
        .map(|n| n != samples.len())
        .unwrap_or(true)
    {
        return Err(CodecError::Config("sample count does not match dimensions"));
    }
    if samples.len() > (2 << 30) - 1 {
        return Err(CodecError::Config("input too big, must be < 2 GiB"));
    }
    if samples.iter().any(|&v| v > max_value) {
        return Err(CodecError::Config("sample above declared maximum"));
    }
    Ok(())
}

/// Worst-case word count of the delta+RLE symbol stream for an image.
/// This is an over-estimate used purely to bound decoder allocations; the
/// FSE decoder stops on its own when the bitstream drains, so the limit is
/// never what terminates a well-formed decode.
fn rle_stream_limit(width: usize, height: usize) -> usize {
    3 * width * height + 64
}

/// Delta -> RLE -> canonical Huffman.
pub fn delta_rle_huff_compress(
    samples: &[u16],
    width: usize,
    height: usize,
    max_value: u16,
) -> Result<Vec<u8>> {
    validate(samples, width, height, max_value)?;
    let rle_stream = delta_rle_compress(samples, width, height, max_value);
    let out = huff_compress(&rle_stream)?;
    log::debug!(
        "delta-rle-huff: {} samples -> {} bytes",
        samples.len(),
        out.len()
    );
    Ok(out)
}

/// Inverse of [`delta_rle_huff_compress`]. The Huffman decoder streams
/// symbols straight into the RLE/delta reconstruction.
pub fn delta_rle_huff_decompress(bytes: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
    let decoder = HuffDecoder::new(bytes, rle_stream_limit(width, height))?;
    delta_rle_decompress(decoder, width, height)
}

/// Delta -> RLE -> FSE.
pub fn delta_rle_fse_compress(
    samples: &[u16],
    width: usize,
    height: usize,
    max_value: u16,
) -> Result<Vec<u8>> {
    validate(samples, width, height, max_value)?;
    let rle_stream = delta_rle_compress(samples, width, height, max_value);
    let out = fse_compress(&rle_stream, &mut FseScratch::new())?;
    log::debug!(
        "delta-rle-fse: {} samples -> {} bytes",
        samples.len(),
        out.len()
    );
    Ok(out)
}

/// Inverse of [`delta_rle_fse_compress`].
pub fn delta_rle_fse_decompress(bytes: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
    let mut scratch = FseScratch::new();
    scratch.decompress_limit = rle_stream_limit(width, height);
    let symbols = fse_decompress(bytes, &mut scratch)?;
    delta_rle_decompress(SliceSource::new(&symbols), width, height)
}

/// Delta-ZigZag -> RLE -> FSE.
pub fn delta_zz_rle_fse_compress(
    samples: &[u16],
    width: usize,
    height: usize,
    max_value: u16,
) -> Result<Vec<u8>> {
    validate(samples, width, height, max_value)?;
    let rle_stream = delta_zz_rle_compress(samples, width, height, max_value);
    let out = fse_compress(&rle_stream, &mut FseScratch::new())?;
    log::debug!(
        "delta-zz-rle-fse: {} samples -> {} bytes",
        samples.len(),
        out.len()
    );
    Ok(out)
}

/// Inverse of [`delta_zz_rle_fse_compress`].
pub fn delta_zz_rle_fse_decompress(bytes: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
    let mut scratch = FseScratch::new();
    scratch.decompress_limit = rle_stream_limit(width, height);
    let symbols = fse_decompress(bytes, &mut scratch)?;
    delta_zz_rle_decompress(SliceSource::new(&symbols), width, height)
}

/// Multi-predictor coder (FSE internally).
pub fn predictive_compress(
    samples: &[u16],
    width: usize,
    height: usize,
    max_value: u16,
) -> Result<Vec<u8>> {
    validate(samples, width, height, max_value)?;
    let out = predict::predictive_compress_image(samples, width, height)?;
    log::debug!(
        "predictive: {} samples -> {} bytes",
        samples.len(),
        out.len()
    );
    Ok(out)
}

/// Inverse of [`predictive_compress`].
pub fn predictive_decompress(bytes: &[u8], width: usize, height: usize) -> Result<Vec<u16>> {
    predict::predictive_decompress_image(bytes, width, height)
}
