#![forbid(unsafe_code)]

use std::io::{self, Read, Seek, SeekFrom, Write};

use log::trace;

use crate::checksum::{Checksum, ChecksumKind};
use crate::error::{DataError, InflateError};

////////////////////////////////////////////////////////////////////////////////

/// Largest back-reference distance allowed by RFC 1951.
pub const HISTORY_SIZE: usize = 32768;

pub trait SeekableSink: Read + Write + Seek {}

impl<T: Read + Write + Seek> SeekableSink for T {}

/// Where decompressed bytes go.
pub enum Destination<'a> {
    /// Output stays in memory until the caller drains it.
    Buffer(Vec<u8>),
    /// Every byte is pushed to a writer; nothing can be read back.
    Writer(Box<dyn Write + 'a>),
    /// Bytes are pushed to a stream that back-references read by seeking.
    Seekable(Box<dyn SeekableSink + 'a>),
}

impl<'a> Destination<'a> {
    pub fn buffer() -> Self {
        Destination::Buffer(Vec::new())
    }

    pub fn writer<W: Write + 'a>(writer: W) -> Self {
        Destination::Writer(Box::new(writer))
    }

    pub fn seekable<S: Read + Write + Seek + 'a>(stream: S) -> Self {
        Destination::Seekable(Box::new(stream))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Fixed-capacity history of the most recent output bytes.
pub struct RingDictionary {
    buf: Box<[u8]>,
    index: usize,
    filled: usize,
}

impl RingDictionary {
    /// `None` for a zero capacity.
    pub fn new(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        Some(Self {
            buf: vec![0; capacity].into_boxed_slice(),
            index: 0,
            filled: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn push(&mut self, byte: u8) {
        self.buf[self.index] = byte;
        self.index += 1;
        if self.index == self.buf.len() {
            self.index = 0;
        }
        if self.filled < self.buf.len() {
            self.filled += 1;
        }
    }

    /// Byte written `distance` pushes ago.
    pub fn get(&self, distance: usize) -> Option<u8> {
        if distance == 0 || distance > self.filled {
            return None;
        }
        let capacity = self.buf.len();
        Some(self.buf[(self.index + capacity - distance) % capacity])
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Output sink of the inflater: writes every byte to the destination, mirrors
/// it into the ring dictionary, and folds it into the running checksum.
pub struct TrackingWriter<'a> {
    destination: Destination<'a>,
    ring: Option<RingDictionary>,
    checksum: Checksum,
    byte_count: u64,
    // Bytes at the front of a buffer destination already handed to the caller
    // and kept only as history.
    taken: usize,
}

impl<'a> TrackingWriter<'a> {
    pub fn new(destination: Destination<'a>, ring: Option<RingDictionary>, kind: ChecksumKind) -> Self {
        Self {
            destination,
            ring,
            checksum: Checksum::new(kind),
            byte_count: 0,
            taken: 0,
        }
    }

    /// Restarts the checksum; only valid before any byte was written.
    pub fn set_checksum_kind(&mut self, kind: ChecksumKind) {
        debug_assert_eq!(self.byte_count, 0);
        self.checksum = Checksum::new(kind);
    }

    /// Seeds the history with bytes that are neither output nor checksummed.
    pub fn preload(&mut self, dictionary: &[u8]) {
        if let Some(ring) = self.ring.as_mut() {
            for &byte in dictionary {
                ring.push(byte);
            }
        }
    }

    pub fn put_byte(&mut self, byte: u8) -> Result<(), InflateError> {
        match &mut self.destination {
            Destination::Buffer(buf) => buf.push(byte),
            Destination::Writer(writer) => writer.write_all(&[byte])?,
            Destination::Seekable(stream) => stream.write_all(&[byte])?,
        }
        if let Some(ring) = self.ring.as_mut() {
            ring.push(byte);
        }
        self.checksum.update(&[byte]);
        self.byte_count += 1;
        Ok(())
    }

    /// Byte written `distance` bytes before the next write position. The
    /// resident buffer is preferred, then the ring, then reading back from a
    /// seekable destination.
    pub fn get_byte(&mut self, distance: usize) -> Result<u8, InflateError> {
        let window = self.window();
        if distance == 0 || distance > window {
            return Err(DataError::InvalidDistance { distance, window }.into());
        }
        if let Destination::Buffer(buf) = &self.destination {
            if distance <= buf.len() {
                return Ok(buf[buf.len() - distance]);
            }
        }
        if let Some(byte) = self.ring.as_ref().and_then(|ring| ring.get(distance)) {
            return Ok(byte);
        }
        match &mut self.destination {
            Destination::Seekable(stream) => Ok(read_back(stream.as_mut(), distance)?),
            _ => Err(DataError::InvalidDistance { distance, window }.into()),
        }
    }

    /// Furthest distance a back-reference may currently reach.
    pub fn window(&self) -> usize {
        let resident = match &self.destination {
            Destination::Buffer(buf) => buf.len(),
            Destination::Writer(_) => 0,
            Destination::Seekable(_) => usize::try_from(self.byte_count).unwrap_or(usize::MAX),
        };
        let ring = self.ring.as_ref().map_or(0, RingDictionary::len);
        resident.max(ring).min(HISTORY_SIZE)
    }

    pub fn check_distance(&self, distance: usize) -> Result<(), DataError> {
        let window = self.window();
        if distance == 0 || distance > window {
            return Err(DataError::InvalidDistance { distance, window });
        }
        Ok(())
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    pub fn checksum_kind(&self) -> ChecksumKind {
        self.checksum.kind()
    }

    pub fn resident(&self) -> &[u8] {
        match &self.destination {
            Destination::Buffer(buf) => &buf[self.taken..],
            _ => &[],
        }
    }

    /// Hands out the bytes produced since the last call. The last
    /// `HISTORY_SIZE` bytes stay in the buffer as history.
    pub fn take_resident(&mut self) -> Vec<u8> {
        match &mut self.destination {
            Destination::Buffer(buf) => {
                let output = buf[self.taken..].to_vec();
                let keep_from = buf.len().saturating_sub(HISTORY_SIZE);
                buf.drain(..keep_from);
                self.taken = buf.len();
                output
            }
            _ => Vec::new(),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.destination {
            Destination::Buffer(_) => Ok(()),
            Destination::Writer(writer) => writer.flush(),
            Destination::Seekable(stream) => stream.flush(),
        }
    }
}

fn read_back<S: SeekableSink + ?Sized>(stream: &mut S, distance: usize) -> io::Result<u8> {
    trace!("reading back {} bytes from the destination", distance);
    let position = stream.stream_position()?;
    stream.seek(SeekFrom::Current(-(distance as i64)))?;
    let mut byte = [0u8; 1];
    let read = stream.read_exact(&mut byte);
    stream.seek(SeekFrom::Start(position))?;
    read.map(|_| byte[0])
}

////////////////////////////////////////////////////////////////////////////////
