#![forbid(unsafe_code)]

use std::{convert::TryFrom, iter::repeat, marker::PhantomData, sync::OnceLock};

use log::trace;

use crate::bit_reader::BitReader;
use crate::error::{DataError, InflateError};

////////////////////////////////////////////////////////////////////////////////

pub const MAX_BITS: usize = 15;
pub const MAX_SYMBOLS: usize = 288;

const MAX_LITLEN_CODES: usize = 286;
const MAX_DISTANCE_CODES: usize = 30;

pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
pub const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
pub const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

////////////////////////////////////////////////////////////////////////////////

pub fn decode_litlen_distance_trees(
    bit_reader: &mut BitReader,
) -> Result<(HuffmanCoding<LitLenToken>, HuffmanCoding<DistanceToken>), InflateError> {
    let hlit = bit_reader.read_bits(5)?.bits() as usize + 257;
    let hdist = bit_reader.read_bits(5)?.bits() as usize + 1;
    let hclen = bit_reader.read_bits(4)?.bits() as usize + 4;
    if hlit > MAX_LITLEN_CODES || hdist > MAX_DISTANCE_CODES {
        return Err(DataError::TooManyCodes.into());
    }
    trace!("dynamic header: hlit={} hdist={} hclen={}", hlit, hdist, hclen);

    let mut tree_code_lengths = [0u8; 19];
    for &symbol in CODE_LENGTH_ORDER.iter().take(hclen) {
        tree_code_lengths[symbol] = bit_reader.read_bits(3)?.bits() as u8;
    }
    let tree_coding = HuffmanCoding::<TreeCodeToken>::from_lengths(&tree_code_lengths)?;

    let total = hlit + hdist;
    let mut lengths: Vec<u8> = Vec::with_capacity(total);
    while lengths.len() < total {
        match tree_coding.read_symbol(bit_reader)? {
            TreeCodeToken::Length(len) => lengths.push(len),
            TreeCodeToken::CopyPrev => {
                let prev = *lengths.last().ok_or(DataError::RepeatWithoutPrevious)?;
                let count = 3 + bit_reader.read_bits(2)?.bits() as usize;
                lengths.extend(repeat(prev).take(count));
            }
            TreeCodeToken::RepeatZero { base, extra_bits } => {
                let count = base as usize + bit_reader.read_bits(extra_bits)?.bits() as usize;
                lengths.extend(repeat(0).take(count));
            }
        }
    }
    if lengths.len() > total {
        return Err(DataError::CodeLengthsOverflow.into());
    }
    if lengths[256] == 0 {
        return Err(DataError::MissingEndOfBlock.into());
    }

    Ok((
        HuffmanCoding::from_lengths(&lengths[..hlit])?,
        HuffmanCoding::from_lengths(&lengths[hlit..])?,
    ))
}

/// Fixed literal/length and distance codings of RFC 1951 §3.2.6, built once.
pub fn fixed_trees() -> &'static (HuffmanCoding<LitLenToken>, HuffmanCoding<DistanceToken>) {
    static FIXED: OnceLock<(HuffmanCoding<LitLenToken>, HuffmanCoding<DistanceToken>)> =
        OnceLock::new();
    FIXED.get_or_init(|| {
        let litlen_lengths: Vec<u8> = repeat(8)
            .take(144)
            .chain(repeat(9).take(112))
            .chain(repeat(7).take(24))
            .chain(repeat(8).take(8))
            .collect();
        let distance_lengths = [5u8; MAX_DISTANCE_CODES];
        (
            HuffmanCoding::from_lengths(&litlen_lengths)
                .expect("fixed literal/length lengths form a complete code"),
            HuffmanCoding::from_lengths(&distance_lengths)
                .expect("fixed distance lengths are not over-subscribed"),
        )
    })
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeCodeToken {
    Length(u8),
    CopyPrev,
    RepeatZero { base: u16, extra_bits: u8 },
}

impl TryFrom<HuffmanCodeWord> for TreeCodeToken {
    type Error = DataError;

    fn try_from(value: HuffmanCodeWord) -> Result<Self, Self::Error> {
        Ok(match value.0 {
            len @ 0..=15 => TreeCodeToken::Length(len as u8),
            16 => TreeCodeToken::CopyPrev,
            17 => TreeCodeToken::RepeatZero {
                base: 3,
                extra_bits: 3,
            },
            18 => TreeCodeToken::RepeatZero {
                base: 11,
                extra_bits: 7,
            },
            // The code length alphabet has 19 symbols, so nothing else decodes.
            _ => return Err(DataError::InvalidHuffmanCode),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LitLenToken {
    Literal(u8),
    EndOfBlock,
    Length { base: u16, extra_bits: u8 },
}

impl TryFrom<HuffmanCodeWord> for LitLenToken {
    type Error = DataError;

    fn try_from(value: HuffmanCodeWord) -> Result<Self, Self::Error> {
        Ok(match value.0 {
            byte @ 0..=255 => LitLenToken::Literal(byte as u8),
            256 => LitLenToken::EndOfBlock,
            symbol @ 257..=285 => {
                let index = (symbol - 257) as usize;
                LitLenToken::Length {
                    base: LENGTH_BASE[index],
                    extra_bits: LENGTH_EXTRA[index],
                }
            }
            symbol => return Err(DataError::InvalidLengthSymbol(symbol)),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceToken {
    pub base: u16,
    pub extra_bits: u8,
}

impl TryFrom<HuffmanCodeWord> for DistanceToken {
    type Error = DataError;

    fn try_from(value: HuffmanCodeWord) -> Result<Self, Self::Error> {
        let index = value.0 as usize;
        if index >= MAX_DISTANCE_CODES {
            return Err(DataError::InvalidDistanceSymbol(value.0));
        }
        Ok(DistanceToken {
            base: DISTANCE_BASE[index],
            extra_bits: DISTANCE_EXTRA[index],
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HuffmanCodeWord(pub u16);

/// Canonical Huffman decoding table: the number of codes of every length and
/// the symbols sorted by (length, symbol index).
#[derive(Clone)]
pub struct HuffmanCoding<T> {
    counts: [u16; MAX_BITS + 1],
    symbols: [u16; MAX_SYMBOLS],
    phantom: PhantomData<T>,
}

impl<T> HuffmanCoding<T>
where
    T: TryFrom<HuffmanCodeWord, Error = DataError>,
{
    pub fn from_lengths(code_lengths: &[u8]) -> Result<Self, DataError> {
        debug_assert!(code_lengths.len() <= MAX_SYMBOLS);

        let mut counts = [0u16; MAX_BITS + 1];
        for &len in code_lengths {
            if len as usize > MAX_BITS {
                return Err(DataError::InvalidCodeLengths);
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(DataError::InvalidCodeLengths);
            }
        }

        let mut offsets = [0u16; MAX_BITS + 1];
        for len in 1..MAX_BITS {
            offsets[len + 1] = offsets[len] + counts[len];
        }

        // Walking symbols in index order gives lower indices the lower codes
        // within each length.
        let mut symbols = [0u16; MAX_SYMBOLS];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        Ok(Self {
            counts,
            symbols,
            phantom: PhantomData,
        })
    }

    pub fn read_symbol(&self, bit_reader: &mut BitReader) -> Result<T, InflateError> {
        let word = self.read_code_word(bit_reader)?;
        Ok(T::try_from(word)?)
    }

    /// Reads one code bit by bit, most significant code bit first.
    pub fn read_code_word(&self, bit_reader: &mut BitReader) -> Result<HuffmanCodeWord, InflateError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_BITS {
            code |= bit_reader.read_bit()? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(HuffmanCodeWord(self.symbols[(index + code - first) as usize]));
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(DataError::InvalidHuffmanCode.into())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::Source;
    use crate::compress::BitWriter;
    use anyhow::Result;

    /// Canonical codes per RFC 1951 §3.2.2.
    fn canonical_codes(lengths: &[u8]) -> Vec<u16> {
        let mut bl_count = [0u16; MAX_BITS + 1];
        for &len in lengths {
            bl_count[len as usize] += 1;
        }
        bl_count[0] = 0;
        let mut next_code = [0u16; MAX_BITS + 1];
        let mut code = 0u16;
        for bits in 1..=MAX_BITS {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }
        lengths
            .iter()
            .map(|&len| {
                if len == 0 {
                    return 0;
                }
                let code = next_code[len as usize];
                next_code[len as usize] += 1;
                code
            })
            .collect()
    }

    fn encode_all(lengths: &[u8]) -> Result<Vec<u8>> {
        let codes = canonical_codes(lengths);
        let mut writer = BitWriter::new(Vec::new());
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                writer.write_code(codes[symbol], len)?;
            }
        }
        Ok(writer.finish()?)
    }

    fn check_every_symbol_decodes_to_itself(lengths: &[u8]) -> Result<()> {
        let coding = HuffmanCoding::<LitLenToken>::from_lengths(lengths)?;
        let stream = encode_all(lengths)?;
        let mut reader = BitReader::new(Source::resident(&stream));
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                assert_eq!(coding.read_code_word(&mut reader)?, HuffmanCodeWord(symbol as u16));
            }
        }
        Ok(())
    }

    #[test]
    fn rfc_example() -> Result<()> {
        // ABCDEFGH with lengths (3, 3, 3, 3, 3, 2, 4, 4).
        let lengths = [3, 3, 3, 3, 3, 2, 4, 4];
        assert_eq!(
            canonical_codes(&lengths),
            vec![0b010, 0b011, 0b100, 0b101, 0b110, 0b00, 0b1110, 0b1111]
        );
        check_every_symbol_decodes_to_itself(&lengths)
    }

    #[test]
    fn complete_codes_round_trip() -> Result<()> {
        let fixed: Vec<u8> = repeat(8)
            .take(144)
            .chain(repeat(9).take(112))
            .chain(repeat(7).take(24))
            .chain(repeat(8).take(8))
            .collect();
        check_every_symbol_decodes_to_itself(&fixed)?;
        check_every_symbol_decodes_to_itself(&[1, 1])?;
        check_every_symbol_decodes_to_itself(&[0, 2, 0, 2, 2, 3, 3])?;
        check_every_symbol_decodes_to_itself(&[
            1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 15,
        ])?;
        check_every_symbol_decodes_to_itself(&[5u8; 32])
    }

    #[test]
    fn ties_go_to_lower_index() -> Result<()> {
        // Symbols 1 and 3 share length 2; symbol 1 gets the smaller code "10".
        let coding = HuffmanCoding::<LitLenToken>::from_lengths(&[1, 2, 0, 2])?;
        let data: &[u8] = &[0b0000_0001];
        let mut reader = BitReader::new(Source::resident(data));
        assert_eq!(coding.read_code_word(&mut reader)?, HuffmanCodeWord(1));
        Ok(())
    }

    #[test]
    fn over_subscribed() {
        assert_eq!(
            HuffmanCoding::<LitLenToken>::from_lengths(&[1, 1, 1]).err(),
            Some(DataError::InvalidCodeLengths)
        );
        assert_eq!(
            HuffmanCoding::<LitLenToken>::from_lengths(&[16, 1]).err(),
            Some(DataError::InvalidCodeLengths)
        );
    }

    #[test]
    fn incomplete_code_rejects_unused_pattern() -> Result<()> {
        let coding = HuffmanCoding::<DistanceToken>::from_lengths(&[1])?;
        let data: &[u8] = &[0b0000_0000, 0xff, 0xff];
        let mut reader = BitReader::new(Source::resident(data));
        assert_eq!(
            coding.read_symbol(&mut reader)?,
            DistanceToken {
                base: 1,
                extra_bits: 0
            }
        );
        let mut reader = BitReader::new(Source::resident(&data[1..]));
        assert!(matches!(
            coding.read_symbol(&mut reader),
            Err(InflateError::Data(DataError::InvalidHuffmanCode))
        ));
        Ok(())
    }

    /// Starts a dynamic block header: HLIT and HDIST fields, then the
    /// code-length code lengths in transmission order.
    fn dynamic_header(hlit: u32, hdist: u32, order_lengths: &[u32]) -> Result<BitWriter<Vec<u8>>> {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(hlit, 5)?;
        writer.write_bits(hdist, 5)?;
        writer.write_bits(order_lengths.len() as u32 - 4, 4)?;
        for &len in order_lengths {
            writer.write_bits(len, 3)?;
        }
        Ok(writer)
    }

    fn header_error(writer: BitWriter<Vec<u8>>) -> Result<Option<DataError>> {
        let data = writer.finish()?;
        let mut reader = BitReader::new(Source::resident(&data));
        Ok(match decode_litlen_distance_trees(&mut reader) {
            Ok(_) => None,
            Err(InflateError::Data(err)) => Some(err),
            Err(err) => return Err(err.into()),
        })
    }

    /// Code-length alphabet where only symbols 1 (code `0`) and 18 (code `1`)
    /// are used.
    fn zeros_and_ones_header() -> Result<BitWriter<Vec<u8>>> {
        let mut order_lengths = [0; 18];
        order_lengths[2] = 1;
        order_lengths[17] = 1;
        dynamic_header(0, 0, &order_lengths)
    }

    #[test]
    fn too_many_codes() -> Result<()> {
        assert_eq!(
            header_error(dynamic_header(30, 0, &[0; 4])?)?,
            Some(DataError::TooManyCodes)
        );
        assert_eq!(
            header_error(dynamic_header(0, 30, &[0; 4])?)?,
            Some(DataError::TooManyCodes)
        );
        Ok(())
    }

    #[test]
    fn repeat_before_any_length() -> Result<()> {
        // Symbols 16 and 0 get one-bit codes; 16 is "1".
        let mut writer = dynamic_header(0, 0, &[1, 0, 0, 1])?;
        writer.write_code(1, 1)?;
        writer.write_bits(0, 2)?;
        assert_eq!(header_error(writer)?, Some(DataError::RepeatWithoutPrevious));
        Ok(())
    }

    #[test]
    fn zero_run_past_alphabets() -> Result<()> {
        // 138 + 138 zeros overrun the 257 + 1 declared lengths.
        let mut writer = zeros_and_ones_header()?;
        for _ in 0..2 {
            writer.write_code(1, 1)?;
            writer.write_bits(127, 7)?;
        }
        assert_eq!(header_error(writer)?, Some(DataError::CodeLengthsOverflow));
        Ok(())
    }

    #[test]
    fn end_of_block_without_code() -> Result<()> {
        // 257 zero literal/length lengths, then one distance code of length 1.
        let mut writer = zeros_and_ones_header()?;
        writer.write_code(1, 1)?;
        writer.write_bits(127, 7)?;
        writer.write_code(1, 1)?;
        writer.write_bits(108, 7)?;
        writer.write_code(0, 1)?;
        assert_eq!(header_error(writer)?, Some(DataError::MissingEndOfBlock));
        Ok(())
    }

    #[test]
    fn minimal_dynamic_header() -> Result<()> {
        // 256 zeros, end-of-block and the single distance code at length 1.
        let mut writer = zeros_and_ones_header()?;
        writer.write_code(1, 1)?;
        writer.write_bits(127, 7)?;
        writer.write_code(1, 1)?;
        writer.write_bits(107, 7)?;
        writer.write_code(0, 1)?;
        writer.write_code(0, 1)?;
        assert_eq!(header_error(writer)?, None);
        Ok(())
    }

    #[test]
    fn tokens() {
        assert_eq!(
            LitLenToken::try_from(HuffmanCodeWord(97)),
            Ok(LitLenToken::Literal(b'a'))
        );
        assert_eq!(
            LitLenToken::try_from(HuffmanCodeWord(256)),
            Ok(LitLenToken::EndOfBlock)
        );
        assert_eq!(
            LitLenToken::try_from(HuffmanCodeWord(265)),
            Ok(LitLenToken::Length {
                base: 11,
                extra_bits: 1
            })
        );
        assert_eq!(
            LitLenToken::try_from(HuffmanCodeWord(285)),
            Ok(LitLenToken::Length {
                base: 258,
                extra_bits: 0
            })
        );
        assert_eq!(
            LitLenToken::try_from(HuffmanCodeWord(286)),
            Err(DataError::InvalidLengthSymbol(286))
        );
        assert_eq!(
            DistanceToken::try_from(HuffmanCodeWord(29)),
            Ok(DistanceToken {
                base: 24577,
                extra_bits: 13
            })
        );
        assert_eq!(
            DistanceToken::try_from(HuffmanCodeWord(30)),
            Err(DataError::InvalidDistanceSymbol(30))
        );
        assert_eq!(
            TreeCodeToken::try_from(HuffmanCodeWord(18)),
            Ok(TreeCodeToken::RepeatZero {
                base: 11,
                extra_bits: 7
            })
        );
    }

    #[test]
    fn fixed_trees_decode_literals() -> Result<()> {
        // "abc" followed by end-of-block, as produced by any deflate encoder.
        let data: &[u8] = &[0x4b, 0x4c, 0x4a, 0x06, 0x00];
        let mut reader = BitReader::new(Source::resident(data));
        assert_eq!(reader.read_bits(3)?.bits(), 0b011);
        let (litlen, _) = fixed_trees();
        assert_eq!(litlen.read_symbol(&mut reader)?, LitLenToken::Literal(b'a'));
        assert_eq!(litlen.read_symbol(&mut reader)?, LitLenToken::Literal(b'b'));
        assert_eq!(litlen.read_symbol(&mut reader)?, LitLenToken::Literal(b'c'));
        assert_eq!(litlen.read_symbol(&mut reader)?, LitLenToken::EndOfBlock);
        Ok(())
    }
}
