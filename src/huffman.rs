//! Canonical Huffman coder over a 16-bit alphabet.
//!
//! The alphabet is `0..(1 << D)` where D is derived from the largest input
//! value. The word `(1 << D) - 1` (ESC) is reserved: symbols that are
//! pruned out of the code table (or collide with ESC itself) are coded as
//! the ESC code followed by the raw D-bit value.
//!
//! Code lengths come from the Moffat-Katajainen in-place minimum-redundancy
//! algorithm and are capped at 14 by shrinking the symbols-of-interest list
//! until the longest code fits; everything trimmed off moves into ESC's
//! frequency. Codes are canonical, so the header only stores the symbol
//! list and its code lengths.
//!
//! The stream is MSB-first and self-describing; see [`huff_compress`] for
//! the header layout. After the payload the encoder appends
//! `maxCodeLen + D` zero bits so the decoder's lookahead window always has
//! real bytes behind it.

use crate::bitio::{MsbReader, MsbWriter};
use crate::rle::SymbolSource;
use crate::{pixel_depth, CodecError, Result};

/// Longest permitted canonical code.
const MAX_CODE_LENGTH: u8 = 14;

/// Symbol/frequency pair. After length assignment `freq` holds the code
/// length instead.
#[derive(Clone, Copy, Debug, Default)]
struct SymbolFreq {
    symbol: u16,
    freq: u32,
}

/// Entry of the encoder's full-alphabet lookup.
#[derive(Clone, Copy, Default)]
struct SymbolCode {
    code: u32,
    code_len: u8,
    escape: bool,
}

/// Entry of the decoder's flat code window lookup.
#[derive(Clone, Copy, Default)]
struct CodeToSymbol {
    symbol: u16,
    code_len: u8,
    escape: bool,
}

/// In-place minimum-redundancy code length assignment
/// (Moffat/Katajainen). Sorts `f` ascending by frequency; on return each
/// `freq` field holds that symbol's code length. Returns the longest.
fn assign_code_lengths(f: &mut [SymbolFreq]) -> u32 {
    f.sort_by_key(|s| s.freq);
    let count = f.len();
    if count == 0 {
        return 0;
    }
    if count == 1 {
        f[0].freq = 0;
        return 0;
    }

    // First pass: build the internal-node weights in place.
    f[0].freq += f[1].freq;
    let mut root = 0usize;
    let mut leaf = 2usize;
    for next in 1..count - 1 {
        if leaf >= count || f[root].freq < f[leaf].freq {
            f[next].freq = f[root].freq;
            f[root].freq = next as u32;
            root += 1;
        } else {
            f[next].freq = f[leaf].freq;
            leaf += 1;
        }
        if leaf >= count || (root < next && f[root].freq < f[leaf].freq) {
            f[next].freq += f[root].freq;
            f[root].freq = next as u32;
            root += 1;
        } else {
            f[next].freq += f[leaf].freq;
            leaf += 1;
        }
    }

    // Second pass, right to left: convert parent pointers to depths.
    f[count - 2].freq = 0;
    for next in (0..count - 2).rev() {
        f[next].freq = f[f[next].freq as usize].freq + 1;
    }

    // Third pass: assign leaf depths.
    let mut avbl = 1i64;
    let mut used = 0i64;
    let mut depth = 0u32;
    let mut root = count as i64 - 2;
    let mut next = count as i64 - 1;
    while avbl > 0 {
        while root >= 0 && f[root as usize].freq == depth {
            used += 1;
            root -= 1;
        }
        while avbl > used {
            f[next as usize].freq = depth;
            next -= 1;
            avbl -= 1;
        }
        avbl = 2 * used;
        depth += 1;
        used = 0;
    }

    f[0].freq
}

/// Count symbols per code length (index = length).
fn symbols_per_length(soi: &[SymbolFreq], max_code_len: u8) -> Vec<u32> {
    let mut per_len = vec![0u32; max_code_len as usize + 1];
    for s in soi {
        per_len[s.freq as usize] += 1;
    }
    per_len
}

/// First canonical code value for each length:
/// `start[len] = (start[prev] + count[prev]) << (len - prev)`.
fn symbol_starts(per_len: &[u32], max_code_len: u8) -> Vec<u32> {
    let mut starts = vec![0u32; max_code_len as usize + 1];
    let mut prev_len = 0u8;
    let mut prev_count = 0u32;
    for len in 1..=max_code_len {
        let count = per_len[len as usize];
        if count != 0 {
            if prev_len != 0 {
                starts[len as usize] =
                    (starts[prev_len as usize] + prev_count) << (len - prev_len);
            }
            prev_len = len;
            prev_count = count;
        }
    }
    starts
}

/// Assign each list entry its canonical code, in list order.
fn canonical_codes(soi: &[SymbolFreq], starts: &[u32]) -> Vec<u32> {
    let mut next = starts.to_vec();
    soi.iter()
        .map(|s| {
            let code = next[s.freq as usize];
            next[s.freq as usize] += 1;
            code
        })
        .collect()
}

/// Compress `input` into a self-describing Huffman stream.
///
/// Header layout (MSB-first): 32-bit uncompressed length, 16-bit MAX,
/// 8-bit maxCodeLen, 16-bit list length, then the symbol values (D bits
/// each) and their code lengths (`ceil(log2(maxCodeLen+1))` bits each),
/// followed by the payload and the zero tail.
pub fn huff_compress(input: &[u16]) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Err(CodecError::Incompressible);
    }
    if input.len() > u32::MAX as usize {
        return Err(CodecError::Config("input too long for 32-bit length"));
    }

    // Frequency collection; ESC is excluded and claimed later.
    let mut counts = vec![0u32; 1 << 16];
    let mut max_value = 0u16;
    for &v in input {
        counts[v as usize] += 1;
        max_value = max_value.max(v);
    }
    let depth = pixel_depth(max_value);
    let escape = (((1u32 << depth) - 1) & 0xFFFF) as u16;

    let mut soi: Vec<SymbolFreq> = (0..1u32 << depth)
        .filter(|&v| counts[v as usize] > 0 && v as u16 != escape)
        .map(|v| SymbolFreq {
            symbol: v as u16,
            freq: counts[v as usize],
        })
        .collect();
    soi.sort_by(|a, b| b.freq.cmp(&a.freq));

    // Shrink the list until the longest code fits. Trimmed symbols fall
    // through to ESC, so the probe includes ESC with the residual count it
    // would get at that cut. A prefix code capped at MAX_CODE_LENGTH can
    // never hold more than 1 << MAX_CODE_LENGTH leaves, so anything past
    // that bound is trimmed up front.
    let mut keep = soi.len().min((1usize << MAX_CODE_LENGTH) - 1);
    let mut kept: u64 = soi[..keep].iter().map(|s| u64::from(s.freq)).sum();
    loop {
        let mut probe = soi[..keep].to_vec();
        probe.push(SymbolFreq {
            symbol: escape,
            freq: (input.len() as u64 - kept) as u32,
        });
        if assign_code_lengths(&mut probe) <= u32::from(MAX_CODE_LENGTH) {
            break;
        }
        // Wide lists shed a slice at a time; small lists go one by one.
        let drop = (keep >> 5).max(1);
        for _ in 0..drop {
            keep -= 1;
            kept -= u64::from(soi[keep].freq);
        }
    }
    soi.truncate(keep);

    // ESC absorbs everything that is not covered by the kept symbols.
    soi.push(SymbolFreq {
        symbol: escape,
        freq: (input.len() as u64 - kept) as u32,
    });
    soi.sort_by(|a, b| b.freq.cmp(&a.freq));

    let max_code_len = assign_code_lengths(&mut soi) as u8;
    if max_code_len > MAX_CODE_LENGTH {
        return Err(CodecError::Internal("code length above cap after pruning"));
    }
    if depth + max_code_len > 32 {
        return Err(CodecError::Internal("code window exceeds 32 bits"));
    }

    let per_len = symbols_per_length(&soi, max_code_len);
    let starts = symbol_starts(&per_len, max_code_len);
    let codes = canonical_codes(&soi, &starts);

    let (esc_code, esc_len) = soi
        .iter()
        .position(|s| s.symbol == escape)
        .map(|i| (codes[i], soi[i].freq as u8))
        .ok_or(CodecError::Internal("escape symbol missing from list"))?;

    // Full-alphabet encode table: either a direct code or the escape.
    let mut all_symbols = vec![
        SymbolCode {
            code: esc_code,
            code_len: esc_len,
            escape: true,
        };
        1usize << depth
    ];
    for (i, s) in soi.iter().enumerate() {
        if s.symbol != escape {
            all_symbols[s.symbol as usize] = SymbolCode {
                code: codes[i],
                code_len: s.freq as u8,
                escape: false,
            };
        }
    }

    let mut bw = MsbWriter::with_capacity(input.len());
    bw.add_bits32(input.len() as u32, 32);
    bw.add_bits16(max_value, 16);
    bw.add_bits16(u16::from(max_code_len), 8);
    bw.add_bits16(soi.len() as u16, 16);
    for s in &soi {
        bw.add_bits16(s.symbol, depth);
    }
    let len_bits = 8 - max_code_len.leading_zeros() as u8;
    for s in &soi {
        bw.add_bits32(s.freq, len_bits);
    }

    for &v in input {
        let e = all_symbols[v as usize];
        bw.add_bits32(e.code, e.code_len);
        if e.escape {
            bw.add_bits32(u32::from(v), depth);
        }
    }
    // Zero tail keeps the decoder's window inside real bytes.
    bw.add_bits32(0, max_code_len + depth);
    bw.flush_align();
    Ok(bw.take())
}

/// Streaming decoder for [`huff_compress`] output.
///
/// [`HuffDecoder::new`] parses the header and builds the flat window
/// lookup; [`HuffDecoder::decode_next`] yields one symbol per call. The
/// decoder also acts as a [`SymbolSource`] so the RLE inverse can pull
/// from it directly.
pub struct HuffDecoder<'a> {
    br: MsbReader<'a>,
    declared_len: usize,
    produced: usize,
    depth: u8,
    max_code_len: u8,
    table: Vec<CodeToSymbol>,
    window: u32,
    window_mask: u32,
    code_mask: u32,
    depth_mask: u32,
    max_minus_escape_len: u8,
}

impl<'a> HuffDecoder<'a> {
    /// Parse the header. `max_symbols` caps the declared length so hostile
    /// streams cannot demand unbounded output.
    pub fn new(input: &'a [u8], max_symbols: usize) -> Result<Self> {
        let mut br = MsbReader::new(input)?;
        if input.len() < 9 {
            return Err(CodecError::CorruptStream("huffman header truncated"));
        }
        let declared_len = br.get_bits(32) as usize;
        if declared_len > max_symbols {
            return Err(CodecError::CorruptStream("declared length above limit"));
        }
        let max_value = br.get_bits(16) as u16;
        let depth = pixel_depth(max_value);
        let escape = (((1u32 << depth) - 1) & 0xFFFF) as u16;

        let max_code_len = br.get_bits(8) as u8;
        if max_code_len > MAX_CODE_LENGTH {
            return Err(CodecError::CorruptStream("max code length above cap"));
        }
        if depth + max_code_len > 32 {
            return Err(CodecError::CorruptStream("code window exceeds 32 bits"));
        }

        let num_soi = br.get_bits(16) as usize;
        if num_soi == 0 && declared_len != 0 {
            return Err(CodecError::CorruptStream("empty symbol table"));
        }
        let len_bits = 8 - max_code_len.leading_zeros() as u8;
        let header_bits = 72
            + num_soi as u64 * (u64::from(depth) + u64::from(len_bits));
        if header_bits > input.len() as u64 * 8 {
            return Err(CodecError::CorruptStream("huffman header truncated"));
        }

        let mut soi = vec![SymbolFreq::default(); num_soi];
        for s in soi.iter_mut() {
            s.symbol = br.get_bits(depth) as u16;
        }
        for s in soi.iter_mut() {
            s.freq = br.get_bits(len_bits);
            if s.freq > u32::from(max_code_len) || (s.freq == 0 && num_soi > 1) {
                return Err(CodecError::CorruptStream("invalid code length"));
            }
        }

        let per_len = symbols_per_length(&soi, max_code_len);
        let starts = symbol_starts(&per_len, max_code_len);
        let codes = canonical_codes(&soi, &starts);

        let table_size = 1usize << max_code_len;
        let mut table = vec![CodeToSymbol::default(); table_size];
        let mut max_minus_escape_len = 0u8;
        for (i, s) in soi.iter().enumerate() {
            let len = s.freq as u8;
            let span_log = max_code_len - len;
            let first = (codes[i] as u64) << span_log;
            let span = 1u64 << span_log;
            if first + span > table_size as u64 {
                return Err(CodecError::CorruptStream("code table overflow"));
            }
            let is_escape = s.symbol == escape;
            for slot in table[first as usize..(first + span) as usize].iter_mut() {
                *slot = CodeToSymbol {
                    symbol: s.symbol,
                    code_len: len,
                    escape: is_escape,
                };
            }
            if is_escape {
                max_minus_escape_len = span_log;
            }
        }

        let window_bits = max_code_len + depth;
        let mut d = Self {
            br,
            declared_len,
            produced: 0,
            depth,
            max_code_len,
            table,
            window: 0,
            window_mask: ((1u64 << window_bits) - 1) as u32,
            code_mask: ((1u64 << max_code_len) - 1) as u32,
            depth_mask: ((1u64 << depth) - 1) as u32,
            max_minus_escape_len,
        };
        d.window = d.br.get_bits(window_bits);
        Ok(d)
    }

    /// Number of symbols the stream declares.
    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    /// Decode one symbol and slide the window.
    #[inline]
    pub fn decode_next(&mut self) -> u16 {
        let idx = (self.window >> self.depth) & self.code_mask;
        let e = self.table[idx as usize];
        let (symbol, used) = if e.escape {
            let raw = (self.window >> self.max_minus_escape_len) & self.depth_mask;
            (raw as u16, e.code_len + self.depth)
        } else {
            (e.symbol, e.code_len)
        };
        self.window = ((self.window << used) & self.window_mask) | self.br.get_bits(used);
        symbol
    }

    /// Decode the whole declared stream.
    pub fn decode_all(mut self) -> Result<Vec<u16>> {
        let mut out = Vec::with_capacity(self.declared_len);
        for _ in 0..self.declared_len {
            out.push(self.decode_next());
        }
        Ok(out)
    }
}

impl SymbolSource for HuffDecoder<'_> {
    #[inline]
    fn next_symbol(&mut self) -> Result<u16> {
        if self.produced >= self.declared_len {
            return Err(CodecError::CorruptStream("huffman stream exhausted"));
        }
        self.produced += 1;
        Ok(self.decode_next())
    }
}

/// One-call decompression with an output cap.
pub fn huff_decompress(input: &[u8], max_symbols: usize) -> Result<Vec<u16>> {
    HuffDecoder::new(input, max_symbols)?.decode_all()
}
