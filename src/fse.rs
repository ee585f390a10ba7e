//! Finite State Entropy (tANS) coder over a 16-bit alphabet.
//!
//! A single coding state walks a power-of-two state table; each symbol
//! emission costs a table lookup plus a handful of shifts, no divisions.
//! The normalized symbol distribution is serialized ahead of the payload
//! with the canonical variable-width tANS count framing, so the stream is
//! self-describing. The payload itself is written LSB-first and read back
//! in reverse (the encoder processes input from the last symbol to the
//! first).
//!
//! Table sizes run from 2^5 to 2^16 entries; the coder picks the smallest
//! size the input length and symbol spread justify. Inputs the table
//! machinery cannot beat are refused with [`CodecError::Incompressible`],
//! and a single repeated value is refused with [`CodecError::UseRle`] so
//! the caller can store a trivial run instead.
//!
//! [`CodecError::Incompressible`]: crate::CodecError::Incompressible
//! [`CodecError::UseRle`]: crate::CodecError::UseRle

pub mod compress;
pub mod decompress;

pub use compress::fse_compress;
pub use decompress::fse_decompress;

/// Memory usage formula: N -> 2^N bytes. 18 allows 64K-entry tables.
pub(crate) const MAX_MEMORY_USAGE: u8 = 18;
pub(crate) const DEFAULT_MEMORY_USAGE: u8 = 13;

pub(crate) const MAX_TABLE_LOG: u8 = MAX_MEMORY_USAGE - 2;
pub(crate) const DEFAULT_TABLE_LOG: u8 = DEFAULT_MEMORY_USAGE - 2;
pub(crate) const MIN_TABLE_LOG: u8 = 5;
pub(crate) const MAX_SYMBOL_VALUE: u16 = 65535;

/// State transform for one symbol of the compression table.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SymbolTransform {
    pub delta_find_state: i32,
    pub delta_nb_bits: u32,
}

/// One entry of the decoding table: the emitted symbol, the bits to pull
/// for the low part of the next state, and that state's base.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DecSymbol {
    pub new_state: u32,
    pub symbol: u16,
    pub nb_bits: u8,
}

/// Reusable workspace for compression and decompression.
///
/// All tables are owned here so repeated calls amortize their allocation.
/// A scratch is exclusively owned during a call; two concurrent operations
/// need two scratches.
pub struct FseScratch {
    pub(crate) count: Vec<u32>,
    pub(crate) norm: Vec<i32>,
    pub(crate) table_symbol: Vec<u16>,
    pub(crate) state_table: Vec<u32>,
    pub(crate) symbol_tt: Vec<SymbolTransform>,
    pub(crate) dec_table: Vec<DecSymbol>,
    pub(crate) symbol_len: u32,
    pub(crate) actual_table_log: u8,

    /// Largest symbol value accepted in the next block.
    pub max_symbol_value: u16,
    /// Requested table log for the next block; the coder may shrink it.
    pub table_log: u8,
    /// Decoding stops once this many symbols have been produced.
    pub decompress_limit: usize,
}

impl FseScratch {
    pub fn new() -> Self {
        Self {
            count: vec![0; MAX_SYMBOL_VALUE as usize + 1],
            norm: vec![0; MAX_SYMBOL_VALUE as usize + 1],
            table_symbol: Vec::new(),
            state_table: Vec::new(),
            symbol_tt: Vec::new(),
            dec_table: Vec::new(),
            symbol_len: 0,
            actual_table_log: 0,
            max_symbol_value: MAX_SYMBOL_VALUE,
            table_log: DEFAULT_TABLE_LOG,
            decompress_limit: (2 << 30) - 1,
        }
    }
}

impl Default for FseScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Interleave step used to spread symbol states across the table.
#[inline]
pub(crate) fn table_step(table_size: u32) -> u32 {
    (table_size >> 1) + (table_size >> 3) + 3
}

/// Index of the highest set bit (0 for input 0).
#[inline]
pub(crate) fn high_bits(v: u32) -> u32 {
    if v == 0 {
        0
    } else {
        31 - v.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecError;

    fn roundtrip(input: &[u16]) -> usize {
        let mut cs = FseScratch::new();
        let compressed = fse_compress(input, &mut cs).unwrap();
        // Decode with the default (generous) limit: termination comes from
        // bitstream exhaustion, not from knowing the count up front.
        let mut ds = FseScratch::new();
        let out = fse_decompress(&compressed, &mut ds).unwrap();
        assert_eq!(out, input);
        compressed.len()
    }

    #[test]
    fn test_roundtrip_skewed() {
        let input: Vec<u16> = (0..4000u32).map(|i| ((i * i) % 17) as u16).collect();
        let size = roundtrip(&input);
        assert!(size < input.len(), "no gain: {} bytes", size);
    }

    #[test]
    fn test_roundtrip_large_alphabet() {
        let input: Vec<u16> = (0..20000u32).map(|i| ((i * 31) % 3000) as u16).collect();
        roundtrip(&input);
    }

    #[test]
    fn test_roundtrip_two_symbols() {
        let input: Vec<u16> = (0..512).map(|i| u16::from(i % 5 == 0)).collect();
        let size = roundtrip(&input);
        assert!(size < 200);
    }

    #[test]
    fn test_roundtrip_large_values() {
        // Sparse high symbols exercise the zero-run coding in the count
        // header.
        let input: Vec<u16> = (0..3000u32)
            .map(|i| if i % 7 == 0 { 65000 } else { 12 })
            .collect();
        roundtrip(&input);
    }

    #[test]
    fn test_single_value_reports_use_rle() {
        let input = vec![9u16; 300];
        let mut s = FseScratch::new();
        assert_eq!(fse_compress(&input, &mut s), Err(CodecError::UseRle));
    }

    #[test]
    fn test_short_input_incompressible() {
        let mut s = FseScratch::new();
        assert_eq!(fse_compress(&[], &mut s), Err(CodecError::Incompressible));
        assert_eq!(fse_compress(&[1], &mut s), Err(CodecError::Incompressible));
        // Two distinct symbols, each present once.
        assert_eq!(
            fse_compress(&[1, 2], &mut s),
            Err(CodecError::Incompressible)
        );
    }

    #[test]
    fn test_uniform_random_incompressible() {
        // Every symbol at most once over a wide alphabet.
        let input: Vec<u16> = (0..4096u32).map(|i| (i * 13 + 7) as u16).collect();
        let mut s = FseScratch::new();
        assert_eq!(fse_compress(&input, &mut s), Err(CodecError::Incompressible));
    }

    #[test]
    fn test_scratch_reuse() {
        let mut s = FseScratch::new();
        let a: Vec<u16> = (0..1000u32).map(|i| (i % 11) as u16).collect();
        let b: Vec<u16> = (0..1500u32).map(|i| (i % 300) as u16).collect();
        let ca = fse_compress(&a, &mut s).unwrap();
        let cb = fse_compress(&b, &mut s).unwrap();
        let mut d = FseScratch::new();
        assert_eq!(fse_decompress(&ca, &mut d).unwrap(), a);
        assert_eq!(fse_decompress(&cb, &mut d).unwrap(), b);
    }

    #[test]
    fn test_table_log_override_respected() {
        let input: Vec<u16> = (0..4000u32).map(|i| (i % 40) as u16).collect();
        for log in [MIN_TABLE_LOG, 8, 12] {
            let mut cs = FseScratch::new();
            cs.table_log = log;
            let compressed = fse_compress(&input, &mut cs).unwrap();
            let mut ds = FseScratch::new();
            assert_eq!(fse_decompress(&compressed, &mut ds).unwrap(), input);
        }
    }

    #[test]
    fn test_table_log_out_of_range() {
        let input: Vec<u16> = (0..100).collect();
        let mut s = FseScratch::new();
        s.table_log = MAX_TABLE_LOG + 1;
        assert!(matches!(
            fse_compress(&input, &mut s),
            Err(CodecError::Config(_))
        ));
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let input: Vec<u16> = (0..2000u32).map(|i| (i % 9) as u16).collect();
        let mut s = FseScratch::new();
        let compressed = fse_compress(&input, &mut s).unwrap();
        let mut d = FseScratch::new();
        assert!(fse_decompress(&compressed[..2], &mut d).is_err());
    }

    #[test]
    fn test_decompress_limit_bounds_output() {
        let input: Vec<u16> = (0..2000u32).map(|i| (i % 9) as u16).collect();
        let mut s = FseScratch::new();
        let compressed = fse_compress(&input, &mut s).unwrap();
        let mut d = FseScratch::new();
        d.decompress_limit = 100;
        let out = fse_decompress(&compressed, &mut d).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn test_decompress_limit_above_count_stops_cleanly() {
        // The limit is a cap, not the symbol count: with plenty of
        // headroom the decoder must still stop exactly at the encoded
        // length when the bitstream drains.
        let input: Vec<u16> = (0..2000u32).map(|i| (i % 9) as u16).collect();
        let mut s = FseScratch::new();
        let compressed = fse_compress(&input, &mut s).unwrap();
        for limit in [input.len(), input.len() + 1, 10 * input.len()] {
            let mut d = FseScratch::new();
            d.decompress_limit = limit;
            let out = fse_decompress(&compressed, &mut d).unwrap();
            assert_eq!(out, input, "limit {}", limit);
        }
    }
}
