#![forbid(unsafe_code)]

use std::io::{Read, Write};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use log::info;

mod bit_reader;
mod checksum;
mod compress;
mod deflate;
mod error;
mod gzip;
mod huffman_coding;
mod tracking_writer;
mod zlib;

pub use crate::bit_reader::Source;
pub use crate::checksum::{adler32, crc32, ChecksumKind, ADLER32_INIT, CRC32_INIT};
pub use crate::compress::{compress, compress_to};
pub use crate::deflate::{DecoderOptions, DeflateReader, Status};
pub use crate::error::{DataError, InflateError};
pub use crate::gzip::{CompressionMethod, MemberFlags, MemberHeader};
pub use crate::tracking_writer::{Destination, HISTORY_SIZE};
pub use crate::zlib::{CompressionLevel, ZlibHeader};

////////////////////////////////////////////////////////////////////////////////

/// Framing around a raw deflate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Raw,
    Zlib,
    Gzip,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "raw" | "deflate" => Format::Raw,
            "zlib" => Format::Zlib,
            "gzip" | "gz" => Format::Gzip,
            _ => bail!("unknown format {:?}, expected raw, zlib or gzip", s),
        })
    }
}

/// Step size used when nothing forces a smaller one.
const STEP_SIZE: usize = 32 * 1024;

/// Decompresses the whole of `input` into `output`, returning the number of
/// bytes written. Back-references are served from a 32 KiB ring dictionary.
pub fn decompress<R: Read, W: Write>(input: R, output: W, format: Format) -> Result<u64> {
    let mut reader = DeflateReader::new(
        Source::reader(input),
        Destination::writer(output),
        DecoderOptions::new(),
    );
    match format {
        Format::Raw => {}
        Format::Zlib => {
            reader.parse_zlib_header().context("reading zlib header")?;
        }
        Format::Gzip => {
            let header = reader.parse_gzip_header().context("reading gzip header")?;
            if let Some(name) = &header.name {
                info!("original name: {}", String::from_utf8_lossy(name));
            }
        }
    }
    while let Status::More(_) = reader
        .decode_step(STEP_SIZE)
        .with_context(|| format!("decoding after {} bytes", reader.total_out()))?
    {}
    Ok(reader.total_out())
}
