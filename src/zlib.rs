#![forbid(unsafe_code)]

use std::io::Write;

use byteorder::BigEndian;
use log::debug;

use crate::bit_reader::BitReader;
use crate::error::InflateError;

////////////////////////////////////////////////////////////////////////////////

const CM_DEFLATE: u8 = 8;
const MAX_CINFO: u8 = 7;
const FDICT: u8 = 0b0010_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Fastest,
    Fast,
    Default,
    Maximum,
}

impl From<u8> for CompressionLevel {
    fn from(flevel: u8) -> Self {
        match flevel & 0b11 {
            0 => CompressionLevel::Fastest,
            1 => CompressionLevel::Fast,
            2 => CompressionLevel::Default,
            _ => CompressionLevel::Maximum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZlibHeader {
    /// LZ77 window the encoder used; a ring dictionary this large suffices.
    pub window_size: usize,
    pub level: CompressionLevel,
    pub dictionary_id: Option<u32>,
}

fn check_bits(cmf: u8, flg: u8) -> bool {
    (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

pub fn read_header(reader: &mut BitReader) -> Result<ZlibHeader, InflateError> {
    let cmf = reader.read_u8()?;
    let flg = reader.read_u8()?;
    if !check_bits(cmf, flg) {
        return Err(InflateError::BadHeader("zlib header check bits mismatch"));
    }
    if cmf & 0x0f != CM_DEFLATE {
        return Err(InflateError::BadHeader("unsupported compression method"));
    }
    let cinfo = cmf >> 4;
    if cinfo > MAX_CINFO {
        return Err(InflateError::BadHeader("window size too large"));
    }
    let dictionary_id = if flg & FDICT != 0 {
        Some(reader.read_u32::<BigEndian>()?)
    } else {
        None
    };
    let header = ZlibHeader {
        window_size: 1 << (cinfo + 8),
        level: CompressionLevel::from(flg >> 6),
        dictionary_id,
    };
    debug!("zlib header: {:?}", header);
    Ok(header)
}

pub fn read_trailer(reader: &mut BitReader) -> Result<u32, InflateError> {
    reader.read_u32::<BigEndian>()
}

/// Header for a 32 KiB window, no preset dictionary and the given level hint.
pub fn write_header<W: Write>(writer: &mut W, level: CompressionLevel) -> std::io::Result<()> {
    let cmf = (MAX_CINFO << 4) | CM_DEFLATE;
    let flevel = match level {
        CompressionLevel::Fastest => 0,
        CompressionLevel::Fast => 1,
        CompressionLevel::Default => 2,
        CompressionLevel::Maximum => 3,
    };
    let mut flg = flevel << 6;
    flg |= (31 - ((u16::from(cmf) << 8 | u16::from(flg)) % 31) as u8) % 31;
    writer.write_all(&[cmf, flg])
}

////////////////////////////////////////////////////////////////////////////////
