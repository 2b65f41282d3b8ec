#![forbid(unsafe_code)]

use std::io::{self, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use log::debug;

use crate::checksum::{Checksum, ChecksumKind};
use crate::gzip::{self, MemberFooter};
use crate::huffman_coding::{DISTANCE_BASE, DISTANCE_EXTRA, LENGTH_BASE, LENGTH_EXTRA};
use crate::zlib::{self, CompressionLevel};
use crate::Format;

////////////////////////////////////////////////////////////////////////////////

const WINDOW_SIZE: usize = 32768;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 258;
const MAX_CHAIN: usize = 64;
const HASH_BITS: u32 = 15;

const MAX_STORED_BLOCK: usize = 0xffff;
const END_OF_BLOCK: u16 = 256;

////////////////////////////////////////////////////////////////////////////////

/// LSB-first bit writer, the mirror image of `BitReader`.
pub struct BitWriter<W: Write> {
    inner: W,
    tag: u64,
    bit_count: u8,
}

impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            tag: 0,
            bit_count: 0,
        }
    }

    pub fn write_bits(&mut self, value: u32, len: u8) -> io::Result<()> {
        debug_assert!(len <= 32);
        let mask = (1u64 << len) - 1;
        self.tag |= (value as u64 & mask) << self.bit_count;
        self.bit_count += len;
        while self.bit_count >= 8 {
            self.inner.write_u8(self.tag as u8)?;
            self.tag >>= 8;
            self.bit_count -= 8;
        }
        Ok(())
    }

    /// Huffman codes are packed starting from their most significant bit.
    pub fn write_code(&mut self, code: u16, len: u8) -> io::Result<()> {
        debug_assert!((1..=15).contains(&len));
        let reversed = code.reverse_bits() >> (16 - len);
        self.write_bits(reversed as u32, len)
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align(&mut self) -> io::Result<()> {
        if self.bit_count > 0 {
            self.write_bits(0, 8 - self.bit_count)?;
        }
        Ok(())
    }

    /// Underlying writer; only byte-aligned writes may go through it.
    pub fn get_mut(&mut self) -> &mut W {
        debug_assert_eq!(self.bit_count, 0);
        &mut self.inner
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.align()?;
        Ok(self.inner)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Match { length: u16, distance: u16 },
}

fn hash3(data: &[u8], pos: usize) -> usize {
    let value = u32::from(data[pos]) << 16 | u32::from(data[pos + 1]) << 8 | u32::from(data[pos + 2]);
    (value.wrapping_mul(0x9e37_79b1) >> (32 - HASH_BITS)) as usize
}

/// Hash chains over three-byte prefixes. Positions are stored shifted by one
/// so that zero marks an empty slot.
struct Matcher {
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl Matcher {
    fn new() -> Self {
        Self {
            head: vec![0; 1 << HASH_BITS],
            prev: vec![0; WINDOW_SIZE],
        }
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let hash = hash3(data, pos);
        self.prev[pos & WINDOW_MASK] = self.head[hash];
        self.head[hash] = pos as u32 + 1;
    }

    fn longest_match(&self, data: &[u8], pos: usize) -> Option<(usize, usize)> {
        if pos + MIN_MATCH > data.len() {
            return None;
        }
        let max_len = MAX_MATCH.min(data.len() - pos);
        let target = &data[pos..pos + max_len];

        let mut best = (0, 0);
        let mut candidate = self.head[hash3(data, pos)];
        for _ in 0..MAX_CHAIN {
            if candidate == 0 {
                break;
            }
            let start = candidate as usize - 1;
            let distance = pos - start;
            if distance > WINDOW_SIZE {
                break;
            }
            let len = data[start..]
                .iter()
                .zip(target)
                .take_while(|(a, b)| a == b)
                .count();
            if len > best.0 {
                best = (len, distance);
                if len == max_len {
                    break;
                }
            }
            candidate = self.prev[start & WINDOW_MASK];
        }
        (best.0 >= MIN_MATCH).then_some(best)
    }
}

/// Greedy LZ77 parse with a 32 KiB window.
pub fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut matcher = Matcher::new();
    let mut tokens = Vec::with_capacity(data.len() / 2);
    let mut pos = 0;
    while pos < data.len() {
        match matcher.longest_match(data, pos) {
            Some((length, distance)) => {
                tokens.push(Token::Match {
                    length: length as u16,
                    distance: distance as u16,
                });
                for p in pos..pos + length {
                    matcher.insert(data, p);
                }
                pos += length;
            }
            None => {
                tokens.push(Token::Literal(data[pos]));
                matcher.insert(data, pos);
                pos += 1;
            }
        }
    }
    tokens
}

////////////////////////////////////////////////////////////////////////////////

/// Symbol, extra bit count and extra bits value of a match length.
pub fn length_symbol(length: u16) -> (u16, u8, u16) {
    debug_assert!((MIN_MATCH as u16..=MAX_MATCH as u16).contains(&length));
    let index = LENGTH_BASE
        .iter()
        .rposition(|&base| base <= length)
        .unwrap_or(0);
    (
        257 + index as u16,
        LENGTH_EXTRA[index],
        length - LENGTH_BASE[index],
    )
}

/// Symbol, extra bit count and extra bits value of a match distance.
pub fn distance_symbol(distance: u16) -> (u16, u8, u16) {
    debug_assert!(distance >= 1);
    let index = DISTANCE_BASE
        .iter()
        .rposition(|&base| base <= distance)
        .unwrap_or(0);
    (
        index as u16,
        DISTANCE_EXTRA[index],
        distance - DISTANCE_BASE[index],
    )
}

/// Code and length of a literal/length symbol in the fixed coding.
fn fixed_litlen_code(symbol: u16) -> (u16, u8) {
    match symbol {
        0..=143 => (0x30 + symbol, 8),
        144..=255 => (0x190 + symbol - 144, 9),
        256..=279 => (symbol - 256, 7),
        _ => (0xc0 + symbol - 280, 8),
    }
}

fn fixed_token_bits(token: Token) -> usize {
    match token {
        Token::Literal(byte) => fixed_litlen_code(byte.into()).1 as usize,
        Token::Match { length, distance } => {
            let (symbol, length_extra, _) = length_symbol(length);
            let (_, distance_extra, _) = distance_symbol(distance);
            (fixed_litlen_code(symbol).1 + length_extra + 5 + distance_extra) as usize
        }
    }
}

pub fn write_fixed_token<W: Write>(writer: &mut BitWriter<W>, token: Token) -> io::Result<()> {
    match token {
        Token::Literal(byte) => {
            let (code, len) = fixed_litlen_code(byte.into());
            writer.write_code(code, len)
        }
        Token::Match { length, distance } => {
            let (symbol, extra_len, extra) = length_symbol(length);
            let (code, len) = fixed_litlen_code(symbol);
            writer.write_code(code, len)?;
            writer.write_bits(extra.into(), extra_len)?;

            let (symbol, extra_len, extra) = distance_symbol(distance);
            writer.write_code(symbol, 5)?;
            writer.write_bits(extra.into(), extra_len)
        }
    }
}

pub fn write_end_of_block<W: Write>(writer: &mut BitWriter<W>) -> io::Result<()> {
    let (code, len) = fixed_litlen_code(END_OF_BLOCK);
    writer.write_code(code, len)
}

fn write_fixed_block<W: Write>(writer: &mut BitWriter<W>, tokens: &[Token]) -> io::Result<()> {
    writer.write_bits(1, 1)?;
    writer.write_bits(1, 2)?;
    for &token in tokens {
        write_fixed_token(writer, token)?;
    }
    write_end_of_block(writer)
}

fn write_stored_blocks<W: Write>(writer: &mut BitWriter<W>, data: &[u8]) -> io::Result<()> {
    let mut chunks = data.chunks(MAX_STORED_BLOCK).peekable();
    while let Some(chunk) = chunks.next() {
        let is_final = chunks.peek().is_none();
        writer.write_bits(is_final as u32, 1)?;
        writer.write_bits(0, 2)?;
        writer.align()?;
        let inner = writer.get_mut();
        inner.write_u16::<LittleEndian>(chunk.len() as u16)?;
        inner.write_u16::<LittleEndian>(!(chunk.len() as u16))?;
        inner.write_all(chunk)?;
    }
    Ok(())
}

fn stored_size(len: usize) -> usize {
    len + 5 * ((len + MAX_STORED_BLOCK - 1) / MAX_STORED_BLOCK).max(1)
}

/// Raw deflate stream: a single fixed-Huffman block, or stored blocks when
/// those come out smaller.
pub fn deflate_to<W: Write>(data: &[u8], writer: W) -> io::Result<W> {
    let tokens = tokenize(data);
    let fixed_bits = 3 + tokens.iter().map(|&t| fixed_token_bits(t)).sum::<usize>() + 7;
    let fixed_size = (fixed_bits + 7) / 8;

    let mut writer = BitWriter::new(writer);
    if !data.is_empty() && stored_size(data.len()) < fixed_size {
        debug!("{} input bytes go to stored blocks", data.len());
        write_stored_blocks(&mut writer, data)?;
    } else {
        debug!(
            "{} input bytes make {} tokens, {} bytes with fixed codes",
            data.len(),
            tokens.len(),
            fixed_size
        );
        write_fixed_block(&mut writer, &tokens)?;
    }
    writer.finish()
}

pub fn compress_to<W: Write>(data: &[u8], format: Format, mut writer: W) -> io::Result<W> {
    match format {
        Format::Raw => deflate_to(data, writer),
        Format::Zlib => {
            zlib::write_header(&mut writer, CompressionLevel::Fastest)?;
            let mut writer = deflate_to(data, writer)?;
            let mut checksum = Checksum::new(ChecksumKind::Adler32);
            checksum.update(data);
            writer.write_u32::<BigEndian>(checksum.value())?;
            Ok(writer)
        }
        Format::Gzip => {
            gzip::write_header(&mut writer)?;
            let mut writer = deflate_to(data, writer)?;
            let mut checksum = Checksum::new(ChecksumKind::Crc32);
            checksum.update(data);
            gzip::write_footer(
                &mut writer,
                MemberFooter {
                    data_crc32: checksum.value(),
                    data_size: data.len() as u32,
                },
            )?;
            Ok(writer)
        }
    }
}

pub fn compress(data: &[u8], format: Format) -> io::Result<Vec<u8>> {
    compress_to(data, format, Vec::new())
}

////////////////////////////////////////////////////////////////////////////////
