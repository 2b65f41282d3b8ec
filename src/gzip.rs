#![forbid(unsafe_code)]

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;

use crate::bit_reader::BitReader;
use crate::checksum::{crc32, CRC32_INIT};
use crate::error::InflateError;

////////////////////////////////////////////////////////////////////////////////

const ID1: u8 = 0x1f;
const ID2: u8 = 0x8b;

const CM_DEFLATE: u8 = 8;

const FTEXT_OFFSET: u8 = 0;
const FHCRC_OFFSET: u8 = 1;
const FEXTRA_OFFSET: u8 = 2;
const FNAME_OFFSET: u8 = 3;
const FCOMMENT_OFFSET: u8 = 4;
const RESERVED_MASK: u8 = 0b1110_0000;

/// Extra flags value for "fastest algorithm".
const XFL_FASTEST: u8 = 4;
const OS_UNIX: u8 = 3;

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct MemberHeader {
    pub compression_method: CompressionMethod,
    pub flags: MemberFlags,
    pub modification_time: u32,
    pub extra: Option<Vec<u8>>,
    pub name: Option<Vec<u8>>,
    pub comment: Option<Vec<u8>>,
    pub extra_flags: u8,
    pub os: u8,
}

impl MemberHeader {
    pub fn crc16(&self) -> u16 {
        let mut crc = CRC32_INIT;
        crc = crc32(&[ID1, ID2, self.compression_method.into(), self.flags().0], crc);
        crc = crc32(&self.modification_time.to_le_bytes(), crc);
        crc = crc32(&[self.extra_flags, self.os], crc);

        if let Some(extra) = &self.extra {
            crc = crc32(&(extra.len() as u16).to_le_bytes(), crc);
            crc = crc32(extra, crc);
        }

        for field in [&self.name, &self.comment].into_iter().flatten() {
            crc = crc32(field, crc);
            crc = crc32(&[0], crc);
        }

        (!crc & 0xffff) as u16
    }

    pub fn flags(&self) -> MemberFlags {
        self.flags
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Ord, PartialOrd, Eq)]
pub enum CompressionMethod {
    Deflate,
    Unknown(u8),
}

impl From<u8> for CompressionMethod {
    fn from(value: u8) -> Self {
        match value {
            CM_DEFLATE => Self::Deflate,
            x => Self::Unknown(x),
        }
    }
}

impl From<CompressionMethod> for u8 {
    fn from(method: CompressionMethod) -> u8 {
        match method {
            CompressionMethod::Deflate => CM_DEFLATE,
            CompressionMethod::Unknown(x) => x,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFlags(pub u8);

impl MemberFlags {
    fn bit(&self, n: u8) -> bool {
        (self.0 >> n) & 1 != 0
    }

    pub fn is_text(&self) -> bool {
        self.bit(FTEXT_OFFSET)
    }

    pub fn has_crc(&self) -> bool {
        self.bit(FHCRC_OFFSET)
    }

    pub fn has_extra(&self) -> bool {
        self.bit(FEXTRA_OFFSET)
    }

    pub fn has_name(&self) -> bool {
        self.bit(FNAME_OFFSET)
    }

    pub fn has_comment(&self) -> bool {
        self.bit(FCOMMENT_OFFSET)
    }

    pub fn has_reserved(&self) -> bool {
        self.0 & RESERVED_MASK != 0
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFooter {
    pub data_crc32: u32,
    pub data_size: u32,
}

////////////////////////////////////////////////////////////////////////////////

pub fn read_header(reader: &mut BitReader) -> Result<MemberHeader, InflateError> {
    let id1 = reader.read_u8()?;
    let id2 = reader.read_u8()?;
    if id1 != ID1 || id2 != ID2 {
        return Err(InflateError::BadHeader("wrong gzip magic"));
    }
    let compression_method = CompressionMethod::from(reader.read_u8()?);
    if compression_method != CompressionMethod::Deflate {
        return Err(InflateError::BadHeader("unsupported compression method"));
    }
    let flags = MemberFlags(reader.read_u8()?);
    if flags.has_reserved() {
        return Err(InflateError::BadHeader("reserved flag bits set"));
    }
    let modification_time = reader.read_u32::<LittleEndian>()?;
    let extra_flags = reader.read_u8()?;
    let os = reader.read_u8()?;

    let extra = if flags.has_extra() {
        let len = reader.read_u16::<LittleEndian>()?;
        let mut extra = vec![0u8; len as usize];
        reader.read_exact(&mut extra)?;
        Some(extra)
    } else {
        None
    };

    let name = if flags.has_name() {
        Some(reader.read_zero_terminated()?)
    } else {
        None
    };

    let comment = if flags.has_comment() {
        Some(reader.read_zero_terminated()?)
    } else {
        None
    };

    let header = MemberHeader {
        compression_method,
        flags,
        modification_time,
        extra,
        name,
        comment,
        extra_flags,
        os,
    };

    if header.flags.has_crc() {
        let crc = reader.read_u16::<LittleEndian>()?;
        if header.crc16() != crc {
            return Err(InflateError::BadHeader("header crc16 check failed"));
        }
    }

    debug!(
        "gzip header: mtime={} os={} name={:?}",
        header.modification_time,
        header.os,
        header.name.as_deref().map(String::from_utf8_lossy)
    );
    Ok(header)
}

pub fn read_footer(reader: &mut BitReader) -> Result<MemberFooter, InflateError> {
    let data_crc32 = reader.read_u32::<LittleEndian>()?;
    let data_size = reader.read_u32::<LittleEndian>()?;
    Ok(MemberFooter {
        data_crc32,
        data_size,
    })
}

/// Minimal header: no optional fields, zero modification time.
pub fn write_header<W: Write>(writer: &mut W) -> std::io::Result<()> {
    writer.write_all(&[ID1, ID2, CM_DEFLATE, 0])?;
    writer.write_u32::<LittleEndian>(0)?;
    writer.write_all(&[XFL_FASTEST, OS_UNIX])
}

pub fn write_footer<W: Write>(writer: &mut W, footer: MemberFooter) -> std::io::Result<()> {
    writer.write_u32::<LittleEndian>(footer.data_crc32)?;
    writer.write_u32::<LittleEndian>(footer.data_size)
}

////////////////////////////////////////////////////////////////////////////////
