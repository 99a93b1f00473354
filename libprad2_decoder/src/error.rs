use std::path::PathBuf;
use thiserror::Error;

use super::block_framer::BufferAddress;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum BankScanError {
    #[error("Buffer of {0} words is too short to hold an evio bank header")]
    BufferTooShort(usize),
    #[error("Bank at word {offset} declares length {length} which runs past word {limit}")]
    Overrun {
        offset: usize,
        length: u32,
        limit: usize,
    },
    #[error("Container header at word {offset} is truncated by the end of its parent at word {limit}")]
    Truncated { offset: usize, limit: usize },
    #[error("Bank at word {offset} nests deeper than the maximum depth of {max}")]
    DepthExceeded { offset: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    BlockTrailer,
    EventHeader,
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockTrailer => write!(f, "block trailer"),
            Self::EventHeader => write!(f, "event header"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FramerError {
    #[error("Framer failed to scan containers: {0}")]
    Scan(#[from] BankScanError),
    #[error("Framer expected the event to be a bank of banks, found type {0}")]
    NotAnEventBank(String),
    #[error("Framer expected the first child of the event to be a trigger bank of segments, found type {0}")]
    MissingTriggerBank(String),
    #[error("Framer found unsupported segment type {data_type} (tag {tag}) in the trigger bank")]
    UnsupportedSegmentType { tag: u8, data_type: String },
    #[error("Framer found a {kind} at word {offset} before any block header")]
    MarkerBeforeBlockHeader { kind: MarkerKind, offset: usize },
    #[error("Framer found a {kind} for slot {slot} at word {offset} after block trailer of slot {last_slot} (crate {crate_id}, bank {bank})")]
    MarkerOutsideBlock {
        kind: MarkerKind,
        crate_id: u16,
        bank: u16,
        slot: u8,
        last_slot: u8,
        offset: usize,
    },
    #[error("Framer found a {kind} for slot {found} inside the block of slot {expected} (crate {crate_id}, bank {bank})")]
    SlotMismatch {
        kind: MarkerKind,
        crate_id: u16,
        bank: u16,
        expected: u8,
        found: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    #[error("Decoder found invalid data word 0x{word:08x} at word {offset}")]
    InvalidData { word: u32, offset: usize },
    #[error("Decoder expected {expected} words after the {kind} at word {offset}, but only {found} remain")]
    Truncated {
        kind: &'static str,
        offset: usize,
        expected: usize,
        found: usize,
    },
    #[error("Decoder found data for channel {channel}, but the event only holds {nchannels} channels")]
    BadChannel { channel: usize, nchannels: usize },
    #[error("Decoder was given range {start}..{end} outside a buffer of {len} words")]
    BadRange { start: usize, end: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum EvioFileError {
    #[error("Could not open evio file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Reached end of evio file")]
    EndOfFile,
    #[error("Evio file has bad magic word 0x{0:08x} in block header")]
    BadMagic(u32),
    #[error("Evio file version {0} is not supported; expected version 4")]
    UnsupportedVersion(u32),
    #[error("Evio block header declares inconsistent sizes -- block length: {block_length}, header length: {header_length}")]
    BadBlockHeader {
        block_length: u32,
        header_length: u32,
    },
    #[error("Evio block of {block_length} words runs past the end of the file, which has {remaining_bytes} bytes left")]
    BlockOverrun {
        block_length: u32,
        remaining_bytes: u64,
    },
    #[error("Evio event of {length} words overruns its block")]
    EventOverrun { length: u32 },
    #[error("Evio file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EvioStackError {
    #[error("EvioStack failed with IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("EvioStack did not find any files matching {0:?}")]
    NoMatchingFiles(PathBuf),
    #[error("EvioStack failed due to EvioFile error: {0}")]
    FileError(#[from] EvioFileError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config declares module {0} twice")]
    DuplicateModule(BufferAddress),
    #[error("Config declares channel {channel} for module {module}, which only has {nchannels} channels")]
    BadChannel {
        module: String,
        channel: usize,
        nchannels: usize,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Sink failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[cfg(feature = "hdf5")]
    #[error("Sink failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to EvioStack error: {0}")]
    StackError(#[from] EvioStackError),
    #[error("Processor failed due to sink error: {0}")]
    SinkError(#[from] SinkError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
