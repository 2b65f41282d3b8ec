#![forbid(unsafe_code)]

use byteorder::LittleEndian;
use log::{debug, trace};

use crate::bit_reader::{BitReader, Source};
use crate::checksum::{adler32, ChecksumKind, ADLER32_INIT};
use crate::error::{DataError, InflateError};
use crate::gzip::{self, MemberHeader};
use crate::huffman_coding::{
    decode_litlen_distance_trees, fixed_trees, DistanceToken, HuffmanCoding, LitLenToken,
};
use crate::tracking_writer::{Destination, RingDictionary, TrackingWriter, HISTORY_SIZE};
use crate::zlib::{self, ZlibHeader};

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Uncompressed = 0,
    FixedTree = 1,
    DynamicTree = 2,
    Reserved = 3,
}

impl From<u32> for CompressionType {
    fn from(value: u32) -> Self {
        match value & 0b11 {
            0 => CompressionType::Uncompressed,
            1 => CompressionType::FixedTree,
            2 => CompressionType::DynamicTree,
            _ => CompressionType::Reserved,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Per-stream settings, fixed once the reader is created.
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    pub checksum: ChecksumKind,
    /// Capacity of the ring dictionary; `Some(0)` keeps no ring. When unset, a
    /// writer destination or a preset dictionary gets a `HISTORY_SIZE` ring.
    pub dictionary_size: Option<usize>,
    /// History the stream may refer to before its first output byte.
    pub preset_dictionary: Option<Vec<u8>>,
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checksum(mut self, kind: ChecksumKind) -> Self {
        self.checksum = kind;
        self
    }

    pub fn dictionary_size(mut self, size: usize) -> Self {
        self.dictionary_size = Some(size);
        self
    }

    pub fn preset_dictionary(mut self, dictionary: impl Into<Vec<u8>>) -> Self {
        self.preset_dictionary = Some(dictionary.into());
        self
    }
}

/// Outcome of one decode step; both carry the number of bytes produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    More(usize),
    Done(usize),
}

impl Status {
    pub fn produced(&self) -> usize {
        match *self {
            Status::More(n) | Status::Done(n) => n,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Raw,
    Zlib,
    Gzip,
}

enum Trees {
    Fixed,
    Dynamic(Box<(HuffmanCoding<LitLenToken>, HuffmanCoding<DistanceToken>)>),
}

impl Trees {
    fn split(&self) -> (&HuffmanCoding<LitLenToken>, &HuffmanCoding<DistanceToken>) {
        match self {
            Trees::Fixed => {
                let (litlen, distance) = fixed_trees();
                (litlen, distance)
            }
            Trees::Dynamic(trees) => (&trees.0, &trees.1),
        }
    }
}

enum State {
    BlockHeader,
    Stored { remaining: u16 },
    Codes(Trees),
    Trailer,
    Done,
    Failed,
}

struct BackReference {
    remaining: usize,
    distance: usize,
}

////////////////////////////////////////////////////////////////////////////////

/// Resumable inflater. Each `decode_step` produces at most `capacity` bytes
/// and keeps every piece of partial progress in `self`.
pub struct DeflateReader<'a> {
    bit_reader: BitReader<'a>,
    writer: TrackingWriter<'a>,
    state: State,
    is_final: bool,
    pending: Option<BackReference>,
    container: Container,
    preset_id: Option<u32>,
    started: bool,
}

impl<'a> DeflateReader<'a> {
    pub fn new(source: Source<'a>, destination: Destination<'a>, options: DecoderOptions) -> Self {
        // A push destination keeps nothing readable, so it always gets a ring
        // unless the caller asked for none.
        let needs_ring = options.preset_dictionary.is_some()
            || matches!(destination, Destination::Writer(_));
        let ring_size = options
            .dictionary_size
            .or_else(|| needs_ring.then_some(HISTORY_SIZE));
        let mut writer = TrackingWriter::new(
            destination,
            ring_size.and_then(RingDictionary::new),
            options.checksum,
        );
        let preset_id = options.preset_dictionary.as_deref().map(|dictionary| {
            writer.preload(dictionary);
            adler32(dictionary, ADLER32_INIT)
        });
        Self {
            bit_reader: BitReader::new(source),
            writer,
            state: State::BlockHeader,
            is_final: false,
            pending: None,
            container: Container::Raw,
            preset_id,
            started: false,
        }
    }

    pub fn parse_zlib_header(&mut self) -> Result<ZlibHeader, InflateError> {
        let result = self.read_zlib_header();
        self.poison_on_error(result)
    }

    pub fn parse_gzip_header(&mut self) -> Result<MemberHeader, InflateError> {
        let result = self.read_gzip_header();
        self.poison_on_error(result)
    }

    pub fn decode_step(&mut self, capacity: usize) -> Result<Status, InflateError> {
        match self.state {
            State::Failed => return Err(InflateError::Poisoned),
            State::Done => return Ok(Status::Done(0)),
            _ => {}
        }
        self.started = true;

        let mut produced = 0;
        let result = self.run(capacity, &mut produced);
        match self.poison_on_error(result)? {
            true => Ok(Status::Done(produced)),
            false => {
                trace!("suspended after {} bytes", produced);
                Ok(Status::More(produced))
            }
        }
    }

    /// Checksum of everything emitted so far, in its trailer form.
    pub fn current_checksum(&self) -> u32 {
        self.writer.checksum()
    }

    pub fn checksum_kind(&self) -> ChecksumKind {
        self.writer.checksum_kind()
    }

    pub fn total_out(&self) -> u64 {
        self.writer.byte_count()
    }

    /// Resident output not yet taken; empty for callback destinations.
    pub fn output(&self) -> &[u8] {
        self.writer.resident()
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        self.writer.take_resident()
    }

    pub fn source_position(&self) -> Option<usize> {
        self.bit_reader.position()
    }

    fn poison_on_error<T>(&mut self, result: Result<T, InflateError>) -> Result<T, InflateError> {
        if let Err(err) = &result {
            debug!(
                "inflate failed after {} bytes: {}",
                self.writer.byte_count(),
                err
            );
            self.state = State::Failed;
        }
        result
    }

    fn check_header_allowed(&self) -> Result<(), InflateError> {
        if let State::Failed = self.state {
            return Err(InflateError::Poisoned);
        }
        if self.started {
            return Err(InflateError::BadHeader("header must precede the first decode step"));
        }
        if self.container != Container::Raw {
            return Err(InflateError::BadHeader("container header already parsed"));
        }
        Ok(())
    }

    fn read_zlib_header(&mut self) -> Result<ZlibHeader, InflateError> {
        self.check_header_allowed()?;
        let header = zlib::read_header(&mut self.bit_reader)?;
        if let Some(id) = header.dictionary_id {
            match self.preset_id {
                Some(preset) if preset == id => {}
                Some(_) => return Err(InflateError::BadHeader("preset dictionary id mismatch")),
                None => return Err(InflateError::BadHeader("stream needs a preset dictionary")),
            }
        }
        self.writer.set_checksum_kind(ChecksumKind::Adler32);
        self.container = Container::Zlib;
        Ok(header)
    }

    fn read_gzip_header(&mut self) -> Result<MemberHeader, InflateError> {
        self.check_header_allowed()?;
        let header = gzip::read_header(&mut self.bit_reader)?;
        self.writer.set_checksum_kind(ChecksumKind::Crc32);
        self.container = Container::Gzip;
        Ok(header)
    }

    /// Returns `true` once the stream is complete.
    fn run(&mut self, capacity: usize, produced: &mut usize) -> Result<bool, InflateError> {
        'steps: loop {
            if let Some(back_reference) = self.pending.as_mut() {
                while back_reference.remaining > 0 {
                    if *produced == capacity {
                        return Ok(false);
                    }
                    let byte = self.writer.get_byte(back_reference.distance)?;
                    self.writer.put_byte(byte)?;
                    back_reference.remaining -= 1;
                    *produced += 1;
                }
                self.pending = None;
            }

            let next = match self.state {
                State::BlockHeader => self.read_block_header()?,
                State::Stored { ref mut remaining } => {
                    while *remaining > 0 {
                        if *produced == capacity {
                            return Ok(false);
                        }
                        let byte = self.bit_reader.read_u8()?;
                        self.writer.put_byte(byte)?;
                        *remaining -= 1;
                        *produced += 1;
                    }
                    self.after_block()
                }
                State::Codes(ref trees) => {
                    let (litlen_coding, distance_coding) = trees.split();
                    loop {
                        if *produced == capacity {
                            return Ok(false);
                        }
                        match litlen_coding.read_symbol(&mut self.bit_reader)? {
                            LitLenToken::Literal(byte) => {
                                self.writer.put_byte(byte)?;
                                *produced += 1;
                            }
                            LitLenToken::EndOfBlock => break,
                            LitLenToken::Length { base, extra_bits } => {
                                let length =
                                    base as usize + self.bit_reader.read_bits(extra_bits)?.bits() as usize;
                                let DistanceToken { base, extra_bits } =
                                    distance_coding.read_symbol(&mut self.bit_reader)?;
                                let distance =
                                    base as usize + self.bit_reader.read_bits(extra_bits)?.bits() as usize;
                                self.writer.check_distance(distance)?;
                                self.pending = Some(BackReference {
                                    remaining: length,
                                    distance,
                                });
                                continue 'steps;
                            }
                        }
                    }
                    self.after_block()
                }
                State::Trailer => {
                    self.read_trailer()?;
                    State::Done
                }
                State::Done => return Ok(true),
                State::Failed => return Err(InflateError::Poisoned),
            };

            self.state = next;
            if let State::Done = self.state {
                self.writer.flush()?;
                debug!("stream done, {} bytes", self.writer.byte_count());
                return Ok(true);
            }
        }
    }

    fn read_block_header(&mut self) -> Result<State, InflateError> {
        self.is_final = self.bit_reader.read_bit()? == 1;
        let compression_type = CompressionType::from(self.bit_reader.read_bits(2)?.bits());
        debug!(
            "block header: final={} type={:?}",
            self.is_final, compression_type
        );
        Ok(match compression_type {
            CompressionType::Uncompressed => {
                let len = self.bit_reader.read_u16::<LittleEndian>()?;
                let nlen = self.bit_reader.read_u16::<LittleEndian>()?;
                if len != !nlen {
                    return Err(DataError::StoredLengthMismatch { len, nlen }.into());
                }
                State::Stored { remaining: len }
            }
            CompressionType::FixedTree => State::Codes(Trees::Fixed),
            CompressionType::DynamicTree => {
                let trees = decode_litlen_distance_trees(&mut self.bit_reader)?;
                State::Codes(Trees::Dynamic(Box::new(trees)))
            }
            CompressionType::Reserved => return Err(DataError::ReservedBlockType.into()),
        })
    }

    fn after_block(&self) -> State {
        match (self.is_final, self.container) {
            (false, _) => State::BlockHeader,
            (true, Container::Raw) => State::Done,
            (true, _) => State::Trailer,
        }
    }

    fn read_trailer(&mut self) -> Result<(), InflateError> {
        let computed = self.writer.checksum();
        let expected = match self.container {
            Container::Raw => return Ok(()),
            Container::Zlib => zlib::read_trailer(&mut self.bit_reader)?,
            Container::Gzip => {
                let footer = gzip::read_footer(&mut self.bit_reader)?;
                let actual = self.writer.byte_count() as u32;
                if footer.data_crc32 == computed && footer.data_size != actual {
                    return Err(InflateError::LengthMismatch {
                        expected: footer.data_size,
                        actual,
                    });
                }
                footer.data_crc32
            }
        };
        if expected != computed {
            return Err(InflateError::Checksum { expected, computed });
        }
        debug!("trailer checksum {:#010x} verified", computed);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
