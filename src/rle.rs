//! Run-length coding over a 16-bit alphabet.
//!
//! The stream starts with the container's MAX value, from which both sides
//! derive the count split point MIDCOUNT. A count word `c` then means:
//!
//! * `1 <= c <= MIDCOUNT`: a run - one value word follows, repeated `c`
//!   times;
//! * `MIDCOUNT < c <= 2*MIDCOUNT`: a literal block - `c - MIDCOUNT` value
//!   words follow verbatim.
//!
//! The decoder pulls its words through [`SymbolSource`], so the same
//! inverse runs over a decoded slice (FSE pipelines) and over the streaming
//! Huffman decoder without materializing the symbol stream.

use crate::{pixel_depth, CodecError, Result};

/// One value word at a time, from whatever carries the RLE stream.
pub trait SymbolSource {
    fn next_symbol(&mut self) -> Result<u16>;
}

/// [`SymbolSource`] over an in-memory symbol slice.
pub struct SliceSource<'a> {
    data: &'a [u16],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u16]) -> Self {
        Self { data, pos: 0 }
    }
}

impl SymbolSource for SliceSource<'_> {
    #[inline]
    fn next_symbol(&mut self) -> Result<u16> {
        let v = self
            .data
            .get(self.pos)
            .copied()
            .ok_or(CodecError::CorruptStream("rle input exhausted"))?;
        self.pos += 1;
        Ok(v)
    }
}

/// Split point of the count alphabet for a container with this MAX.
///
/// The depth is clamped to 4 bits: below that the encoder's forced-flush
/// bound could emit zero-length counts. Both sides clamp the same stored
/// MAX, so the format stays self-describing.
#[inline]
pub fn mid_count(max_value: u16) -> u16 {
    let depth = pixel_depth(max_value).max(4);
    (1 << (depth - 1)) - 1
}

/// Streaming run-length encoder.
///
/// Buffers up to two symbols of look-behind; three equal symbols in a row
/// switch it into run mode, a differing symbol switches back and flushes.
pub struct RleEncoder {
    out: Vec<u16>,
    buf: Vec<u16>,
    mid_count: u16,
    same: bool,
}

impl RleEncoder {
    pub fn new(width: usize, height: usize, max_value: u16) -> Self {
        let mid = mid_count(max_value);
        let mut out = Vec::with_capacity(width * height);
        out.push(max_value);
        Self {
            out,
            buf: Vec::with_capacity(mid as usize + 1),
            mid_count: mid,
            same: false,
        }
    }

    pub fn encode(&mut self, symbol: u16) {
        let bc = self.buf.len();
        if bc < 2 {
            self.buf.push(symbol);
            return;
        }
        let prev2 = self.buf[bc - 2];
        let prev = self.buf[bc - 1];

        if prev2 == prev && prev == symbol {
            if !self.same && bc > 2 {
                // The symbols before the look-behind pair were literals.
                self.out.push(self.mid_count + (bc as u16 - 2));
                self.out.extend_from_slice(&self.buf[..bc - 2]);
                self.buf.drain(..bc - 2);
            }
            self.same = true;
        } else {
            if self.same && bc > 2 {
                // Run ended; emit it whole.
                self.out.push(bc as u16);
                self.out.push(self.buf[0]);
                self.buf.clear();
            }
            self.same = false;
        }

        // Force a flush before the count field can overflow.
        let bc = self.buf.len();
        if bc as u16 >= self.mid_count - 1 {
            if self.same {
                self.out.push(bc as u16 - 2);
                self.out.push(self.buf[0]);
            } else {
                self.out.push(self.mid_count + (bc as u16 - 2));
                self.out.extend_from_slice(&self.buf[..bc - 2]);
            }
            self.buf.drain(..bc - 2);
        }

        self.buf.push(symbol);
    }

    /// Flush the remainder and return the coded stream.
    pub fn finish(mut self) -> Vec<u16> {
        let bc = self.buf.len();
        if bc > 0 {
            if self.same {
                self.out.push(bc as u16);
                self.out.push(self.buf[0]);
            } else {
                self.out.push(self.mid_count + bc as u16);
                self.out.extend_from_slice(&self.buf);
            }
        }
        self.out
    }
}

/// Streaming run-length decoder, one value per [`RleDecoder::decode_next`].
pub struct RleDecoder<S> {
    src: S,
    mid_count: u16,
    count: u16,
    recurring: u16,
}

impl<S: SymbolSource> RleDecoder<S> {
    /// Read the MAX header word from `src` and set up the count split.
    pub fn new(mut src: S) -> Result<Self> {
        let max_value = src.next_symbol()?;
        Ok(Self {
            src,
            mid_count: mid_count(max_value),
            count: 0,
            recurring: 0,
        })
    }

    pub fn decode_next(&mut self) -> Result<u16> {
        if self.count == 0 || self.count == self.mid_count {
            let c = self.src.next_symbol()?;
            if c == 0 || c == self.mid_count || c > 2 * self.mid_count {
                return Err(CodecError::CorruptStream("invalid rle count"));
            }
            self.count = c;
            if c < self.mid_count {
                self.recurring = self.src.next_symbol()?;
            }
        }
        self.count -= 1;
        if self.count >= self.mid_count {
            self.src.next_symbol()
        } else {
            Ok(self.recurring)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode_all(input: &[u16], max_value: u16) -> Vec<u16> {
        let mut enc = RleEncoder::new(input.len(), 1, max_value);
        for &v in input {
            enc.encode(v);
        }
        enc.finish()
    }

    fn decode_n(stream: &[u16], n: usize) -> Result<Vec<u16>> {
        let mut dec = RleDecoder::new(SliceSource::new(stream))?;
        (0..n).map(|_| dec.decode_next()).collect()
    }

    #[test]
    fn test_known_stream_layout() {
        // Three runs-worth of data with literals in between, MAX 8000
        // (depth 13, MIDCOUNT 4095).
        let input = [256, 256, 256, 1025, 457, 457, 457, 8000, 1];
        let out = encode_all(&input, 8000);
        assert_eq!(
            out,
            vec![8000, 3, 256, 4096, 1025, 3, 457, 4097, 8000, 1]
        );
        assert_eq!(decode_n(&out, input.len()).unwrap(), input);
    }

    #[test]
    fn test_long_run_splits_at_midcount() {
        // MAX 255 -> depth 8 -> MIDCOUNT 127. A run of 1000 zeros must be
        // split into several count words, all within [1, 127].
        let input = vec![0u16; 1000];
        let out = encode_all(&input, 255);
        assert!(out.len() < 40, "run coding ineffective: {} words", out.len());
        for chunk in out[1..].chunks(2) {
            assert!(chunk[0] >= 1 && chunk[0] <= 127);
            assert_eq!(chunk[1], 0);
        }
        assert_eq!(decode_n(&out, input.len()).unwrap(), input);
    }

    #[test]
    fn test_all_literals() {
        let input: Vec<u16> = (0..500).collect();
        let out = encode_all(&input, 65535);
        assert_eq!(decode_n(&out, input.len()).unwrap(), input);
    }

    #[test]
    fn test_low_depth_container_uses_clamped_midcount() {
        // Container MAX 1 would give MIDCOUNT 0 without the clamp.
        assert_eq!(mid_count(0), 7);
        assert_eq!(mid_count(1), 7);
        assert_eq!(mid_count(15), 7);
        assert_eq!(mid_count(16), 15);

        let input = vec![1u16, 1, 1, 1, 0, 1, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];
        let out = encode_all(&input, 1);
        assert_eq!(decode_n(&out, input.len()).unwrap(), input);
    }

    #[test]
    fn test_empty_input_is_corrupt() {
        assert!(matches!(
            RleDecoder::new(SliceSource::new(&[])),
            Err(CodecError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let input = [7u16; 64];
        let mut out = encode_all(&input, 255);
        out.truncate(2); // count word without its value word
        assert!(decode_n(&out, input.len()).is_err());
    }

    #[test]
    fn test_invalid_count_is_corrupt() {
        // MIDCOUNT for MAX=255 is 127; a count of exactly 127 is never
        // emitted and must be rejected, as must counts above 254.
        assert!(decode_n(&[255, 127, 5], 5).is_err());
        assert!(decode_n(&[255, 255, 5], 5).is_err());
        assert!(decode_n(&[255, 0, 5], 5).is_err());
    }

    proptest! {
        #[test]
        fn prop_rle_roundtrip(input in prop::collection::vec(0u16..=255, 1..2000)) {
            let out = encode_all(&input, 255);
            prop_assert_eq!(decode_n(&out, input.len()).unwrap(), input);
        }

        #[test]
        fn prop_rle_roundtrip_runs(
            runs in prop::collection::vec((0u16..16, 1usize..300), 1..30)
        ) {
            let mut input = Vec::new();
            for (v, n) in runs {
                input.extend(std::iter::repeat(v).take(n));
            }
            let out = encode_all(&input, 255);
            prop_assert_eq!(decode_n(&out, input.len()).unwrap(), input);
        }
    }
}
