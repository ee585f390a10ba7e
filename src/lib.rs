//! Lossless compression for 16-bit grayscale raster images.
//!
//! The crate consumes a `(samples, width, height, max_value)` tuple of
//! row-major 16-bit unsigned samples and produces a self-describing byte
//! stream from which the samples can be reconstructed bit-exactly. It never
//! touches files or containers; feeding it pixel data is the caller's job.
//!
//! Four fixed pipelines are exposed (see [`pipeline`]):
//!
//! * Delta -> RLE -> canonical Huffman
//! * Delta -> RLE -> FSE (tANS)
//! * Delta-ZigZag -> RLE -> FSE
//! * Multi-predictor coder (FSE internally)
//!
//! The building blocks (bit I/O, the transforms, both entropy coders) are
//! public so callers can compose their own stages, but the pipelines are
//! the supported wire formats.

use thiserror::Error;

/// Errors reported by the codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input is too short or its entropy too high; compression declined.
    /// Not fatal - the caller may store the data raw.
    #[error("input is not compressible")]
    Incompressible,

    /// Input is a single value repeated; the caller should store a trivial
    /// RLE header instead.
    #[error("input is a single value repeated")]
    UseRle,

    /// The decoder detected truncated input, an out-of-range code or a
    /// count overflowing the declared length.
    #[error("corrupt stream: {0}")]
    CorruptStream(&'static str),

    /// The caller passed impossible parameters.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// An internal invariant was violated. This indicates a bug in the
    /// encoder, not bad input.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub type Result<T> = std::result::Result<T, CodecError>;

pub mod bitio;
pub mod delta;
pub mod fse;
pub mod huffman;
pub mod pipeline;
pub mod predict;
pub mod rle;
pub mod tile;
pub mod zigzag;

pub use pipeline::{
    delta_rle_fse_compress, delta_rle_fse_decompress, delta_rle_huff_compress,
    delta_rle_huff_decompress, delta_zz_rle_fse_compress, delta_zz_rle_fse_decompress,
    predictive_compress, predictive_decompress,
};
pub use tile::{tiled_compress, tiled_decompress};

/// Bits needed to represent `max_value` (0 for 0, 16 for 65535).
#[inline]
pub(crate) fn pixel_depth(max_value: u16) -> u8 {
    (16 - max_value.leading_zeros()) as u8
}
