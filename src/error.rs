#![forbid(unsafe_code)]

use std::io;

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

/// Structural defects of a deflate bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("reserved block type")]
    ReservedBlockType,
    #[error("stored block length {len:#06x} does not match its complement {nlen:#06x}")]
    StoredLengthMismatch { len: u16, nlen: u16 },
    #[error("too many literal/length or distance codes")]
    TooManyCodes,
    #[error("over-subscribed code lengths")]
    InvalidCodeLengths,
    #[error("code length repeat with no previous length")]
    RepeatWithoutPrevious,
    #[error("code lengths run past the declared alphabet sizes")]
    CodeLengthsOverflow,
    #[error("literal/length table has no end-of-block code")]
    MissingEndOfBlock,
    #[error("bit pattern matches no huffman code")]
    InvalidHuffmanCode,
    #[error("invalid literal/length symbol {0}")]
    InvalidLengthSymbol(u16),
    #[error("invalid distance symbol {0}")]
    InvalidDistanceSymbol(u16),
    #[error("distance {distance} reaches beyond the {window} byte window")]
    InvalidDistance { distance: usize, window: usize },
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Error)]
pub enum InflateError {
    #[error("bad header: {0}")]
    BadHeader(&'static str),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("checksum mismatch: trailer says {expected:#010x}, computed {computed:#010x}")]
    Checksum { expected: u32, computed: u32 },
    #[error("length mismatch: trailer says {expected}, produced {actual}")]
    LengthMismatch { expected: u32, actual: u32 },
    #[error("source exhausted in the middle of the stream")]
    SourceExhausted,
    #[error("decoder already failed")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl InflateError {
    /// Maps an error of the compressed-data reader: running out of input is
    /// reported as `SourceExhausted`, anything else is passed through.
    pub(crate) fn from_source(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::SourceExhausted
        } else {
            Self::Io(err)
        }
    }

    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}
