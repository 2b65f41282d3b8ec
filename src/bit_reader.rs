#![forbid(unsafe_code)]

use std::io::{self, Read};

use byteorder::{ByteOrder, ReadBytesExt};

use crate::error::InflateError;

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitSequence {
    bits: u32,
    len: u8,
}

impl BitSequence {
    pub fn new(bits: u32, len: u8) -> Self {
        debug_assert!(len <= 32);
        Self { bits, len }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn len(&self) -> u8 {
        self.len
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Where compressed bytes come from.
pub enum Source<'a> {
    /// The whole compressed stream is in memory.
    Resident { data: &'a [u8], cursor: usize },
    /// Bytes are pulled one at a time from a reader (file, socket, ...).
    Callback(Box<dyn Read + 'a>),
}

impl<'a> Source<'a> {
    pub fn resident(data: &'a [u8]) -> Self {
        Source::Resident { data, cursor: 0 }
    }

    pub fn reader<R: Read + 'a>(reader: R) -> Self {
        Source::Callback(Box::new(reader))
    }

    /// Bytes consumed so far, if the source is resident.
    pub fn position(&self) -> Option<usize> {
        match self {
            Source::Resident { cursor, .. } => Some(*cursor),
            Source::Callback(_) => None,
        }
    }

    fn next_byte(&mut self) -> Result<u8, InflateError> {
        match self {
            Source::Resident { data, cursor } => {
                let byte = *data.get(*cursor).ok_or(InflateError::SourceExhausted)?;
                *cursor += 1;
                Ok(byte)
            }
            Source::Callback(reader) => reader.read_u8().map_err(InflateError::from_source),
        }
    }
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Resident { data, cursor } => {
                let n = (&data[*cursor..]).read(buf)?;
                *cursor += n;
                Ok(n)
            }
            Source::Callback(reader) => reader.read(buf),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// LSB-first bit reader. Never holds more than 7 unconsumed bits between
/// calls, so aligning to a byte boundary loses only padding.
pub struct BitReader<'a> {
    source: Source<'a>,
    tag: u32,
    bit_count: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(source: Source<'a>) -> Self {
        Self {
            source,
            tag: 0,
            bit_count: 0,
        }
    }

    pub fn read_bits(&mut self, len: u8) -> Result<BitSequence, InflateError> {
        debug_assert!(len <= 32);
        let mut acc = self.tag as u64;
        let mut have = self.bit_count;
        while have < len {
            acc |= (self.source.next_byte()? as u64) << have;
            have += 8;
        }
        let mask = (1u64 << len) - 1;
        let bits = (acc & mask) as u32;
        self.tag = (acc >> len) as u32;
        self.bit_count = have - len;
        Ok(BitSequence::new(bits, len))
    }

    pub fn read_bit(&mut self) -> Result<u32, InflateError> {
        if self.bit_count == 0 {
            self.tag = self.source.next_byte()? as u32;
            self.bit_count = 8;
        }
        let bit = self.tag & 1;
        self.tag >>= 1;
        self.bit_count -= 1;
        Ok(bit)
    }

    /// Drops the pending bits of a partially consumed byte. Stored blocks and
    /// stream trailers start on a byte boundary (RFC 1951 §3.2.4), so up to
    /// seven padding bits are thrown away here.
    pub fn align_to_byte(&mut self) {
        self.tag = 0;
        self.bit_count = 0;
    }

    pub fn borrow_reader_from_boundary(&mut self) -> &mut Source<'a> {
        self.align_to_byte();
        &mut self.source
    }

    pub fn read_u8(&mut self) -> Result<u8, InflateError> {
        self.align_to_byte();
        self.source.next_byte()
    }

    pub fn read_u16<B: ByteOrder>(&mut self) -> Result<u16, InflateError> {
        self.borrow_reader_from_boundary()
            .read_u16::<B>()
            .map_err(InflateError::from_source)
    }

    pub fn read_u32<B: ByteOrder>(&mut self) -> Result<u32, InflateError> {
        self.borrow_reader_from_boundary()
            .read_u32::<B>()
            .map_err(InflateError::from_source)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InflateError> {
        self.borrow_reader_from_boundary()
            .read_exact(buf)
            .map_err(InflateError::from_source)
    }

    /// Reads a zero-terminated field, dropping the terminator.
    pub fn read_zero_terminated(&mut self) -> Result<Vec<u8>, InflateError> {
        let mut field = Vec::new();
        loop {
            match self.read_u8()? {
                0 => return Ok(field),
                byte => field.push(byte),
            }
        }
    }

    pub fn position(&self) -> Option<usize> {
        self.source.position()
    }
}

////////////////////////////////////////////////////////////////////////////////
