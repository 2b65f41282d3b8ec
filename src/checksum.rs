#![forbid(unsafe_code)]

use crc::{Crc, CRC_32_ISO_HDLC};
use simd_adler32::Adler32;

////////////////////////////////////////////////////////////////////////////////

pub const ADLER32_INIT: u32 = 1;
pub const CRC32_INIT: u32 = 0xffff_ffff;

static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Continues an Adler-32 computation from `seed` (`ADLER32_INIT` for a fresh one).
pub fn adler32(data: &[u8], seed: u32) -> u32 {
    let mut hasher = Adler32::from_checksum(seed);
    hasher.write(data);
    hasher.finish()
}

/// Continues a CRC-32 computation from the running state `crc`.
///
/// The running state is not complemented: start with `CRC32_INIT` and take
/// `!state` once all data has been fed.
pub fn crc32(data: &[u8], crc: u32) -> u32 {
    // The digest keeps its register bit-reflected and applies the final xor on
    // finalize, so both are undone to hand back the raw register.
    let mut digest = CRC.digest_with_initial(crc.reverse_bits());
    digest.update(data);
    !digest.finalize()
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChecksumKind {
    #[default]
    None,
    Adler32,
    Crc32,
}

impl ChecksumKind {
    fn initial(self) -> u32 {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Adler32 => ADLER32_INIT,
            ChecksumKind::Crc32 => CRC32_INIT,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Checksum {
    kind: ChecksumKind,
    state: u32,
}

impl Checksum {
    pub fn new(kind: ChecksumKind) -> Self {
        Self {
            kind,
            state: kind.initial(),
        }
    }

    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    pub fn update(&mut self, data: &[u8]) {
        self.state = match self.kind {
            ChecksumKind::None => 0,
            ChecksumKind::Adler32 => adler32(data, self.state),
            ChecksumKind::Crc32 => crc32(data, self.state),
        }
    }

    /// Value as it appears in a stream trailer.
    pub fn value(&self) -> u32 {
        match self.kind {
            ChecksumKind::Crc32 => !self.state,
            _ => self.state,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
