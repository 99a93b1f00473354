//! Bit-level views over evio container headers and JLab module marker words.
//!
//! All headers are small `Copy` structs decoded from a word slice. They record
//! where in the buffer they were found, but never own the buffer itself.
use std::fmt::Display;

use super::constants::{
    BANK_HEADER_SIZE, SEGMENT_HEADER_SIZE, SLOT_MASK, SLOT_SHIFT, TAGSEGMENT_HEADER_SIZE,
    TYPE_DEFINING_BIT, TYPE_MASK, TYPE_SHIFT,
};

/// The content type of an evio container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Unknown32,
    UInt32,
    Float32,
    CharStar8,
    Short16,
    UShort16,
    Char8,
    UChar8,
    Double64,
    Long64,
    ULong64,
    Int32,
    TagSegment,
    AlsoSegment,
    AlsoBank,
    Composite,
    Bank,
    Segment,
    Other(u8),
}

impl From<u8> for DataType {
    fn from(value: u8) -> Self {
        match value {
            0x0 => Self::Unknown32,
            0x1 => Self::UInt32,
            0x2 => Self::Float32,
            0x3 => Self::CharStar8,
            0x4 => Self::Short16,
            0x5 => Self::UShort16,
            0x6 => Self::Char8,
            0x7 => Self::UChar8,
            0x8 => Self::Double64,
            0x9 => Self::Long64,
            0xa => Self::ULong64,
            0xb => Self::Int32,
            0xc => Self::TagSegment,
            0xd => Self::AlsoSegment,
            0xe => Self::AlsoBank,
            0xf => Self::Composite,
            0x10 => Self::Bank,
            0x20 => Self::Segment,
            other => Self::Other(other),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Unknown32 => 0x0,
            DataType::UInt32 => 0x1,
            DataType::Float32 => 0x2,
            DataType::CharStar8 => 0x3,
            DataType::Short16 => 0x4,
            DataType::UShort16 => 0x5,
            DataType::Char8 => 0x6,
            DataType::UChar8 => 0x7,
            DataType::Double64 => 0x8,
            DataType::Long64 => 0x9,
            DataType::ULong64 => 0xa,
            DataType::Int32 => 0xb,
            DataType::TagSegment => 0xc,
            DataType::AlsoSegment => 0xd,
            DataType::AlsoBank => 0xe,
            DataType::Composite => 0xf,
            DataType::Bank => 0x10,
            DataType::Segment => 0x20,
            DataType::Other(code) => code,
        }
    }
}

impl DataType {
    /// The children of this container are banks
    pub fn is_bank_of_banks(&self) -> bool {
        matches!(self, Self::Bank | Self::AlsoBank)
    }

    /// The children of this container are segments
    pub fn is_bank_of_segments(&self) -> bool {
        matches!(self, Self::Segment | Self::AlsoSegment)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown32 => write!(f, "Unknown0"),
            Self::UInt32 => write!(f, "uint32"),
            Self::Float32 => write!(f, "float32"),
            Self::CharStar8 => write!(f, "char*8"),
            Self::Short16 => write!(f, "short16"),
            Self::UShort16 => write!(f, "ushort16"),
            Self::Char8 => write!(f, "char8"),
            Self::UChar8 => write!(f, "uchar8"),
            Self::Double64 => write!(f, "double64"),
            Self::Long64 => write!(f, "long64"),
            Self::ULong64 => write!(f, "ulong64"),
            Self::Int32 => write!(f, "int32"),
            Self::TagSegment => write!(f, "tagsegment"),
            Self::AlsoSegment => write!(f, "alsosegment"),
            Self::AlsoBank => write!(f, "alsobank"),
            Self::Composite => write!(f, "composite"),
            Self::Bank => write!(f, "bank"),
            Self::Segment => write!(f, "segment"),
            Self::Other(code) => write!(f, "Unknown{code}"),
        }
    }
}

// 32 bit bank header structure
// -------------------------------------
// |          length:32                |
// -------------------------------------
// |   tag:16   |pad:2| type:6 | num:8 |
// -------------------------------------

/// The generic two-word evio bank header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankHeader {
    pub offset: usize,
    pub length: u32,
    pub tag: u16,
    pub padding: u8,
    pub data_type: DataType,
    pub num: u8,
}

impl BankHeader {
    pub const SIZE: usize = BANK_HEADER_SIZE;

    /// Read the bank header at `offset`. Returns None if the header words are not
    /// inside the buffer.
    pub fn read(buffer: &[u32], offset: usize) -> Option<Self> {
        let length = *buffer.get(offset)?;
        let word = *buffer.get(offset + 1)?;
        Some(Self {
            offset,
            length,
            tag: ((word >> 16) & 0xFFFF) as u16,
            padding: ((word >> 14) & 0x3) as u8,
            data_type: DataType::from(((word >> 8) & 0x3F) as u8),
            num: (word & 0xFF) as u8,
        })
    }

    pub fn encode(&self) -> [u32; 2] {
        let code: u8 = self.data_type.into();
        [
            self.length,
            ((self.tag as u32) << 16)
                | (((self.padding & 0x3) as u32) << 14)
                | (((code & 0x3F) as u32) << 8)
                | self.num as u32,
        ]
    }

    /// First word of the bank payload
    pub fn payload_start(&self) -> usize {
        self.offset + Self::SIZE
    }

    /// One past the last word of the bank (the length word does not count itself)
    pub fn end(&self) -> usize {
        self.offset + 1 + self.length as usize
    }

    /// The payload words, or None if the declared length runs past the buffer
    pub fn payload<'a>(&self, buffer: &'a [u32]) -> Option<&'a [u32]> {
        if self.length == 0 {
            return None;
        }
        buffer.get(self.payload_start()..self.end())
    }
}

/// Single-word segment header: tag:8, pad:2, type:6, length:16
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub offset: usize,
    pub length: u16,
    pub tag: u8,
    pub data_type: DataType,
    pub padding: u8,
}

impl SegmentHeader {
    pub const SIZE: usize = SEGMENT_HEADER_SIZE;

    pub fn read(buffer: &[u32], offset: usize) -> Option<Self> {
        let word = *buffer.get(offset)?;
        Some(Self {
            offset,
            tag: ((word >> 24) & 0xFF) as u8,
            padding: ((word >> 22) & 0x3) as u8,
            data_type: DataType::from(((word >> 16) & 0x3F) as u8),
            length: (word & 0xFFFF) as u16,
        })
    }

    pub fn encode(&self) -> u32 {
        let code: u8 = self.data_type.into();
        ((self.tag as u32) << 24)
            | (((self.padding & 0x3) as u32) << 22)
            | (((code & 0x3F) as u32) << 16)
            | self.length as u32
    }

    pub fn payload_start(&self) -> usize {
        self.offset + Self::SIZE
    }

    pub fn end(&self) -> usize {
        self.payload_start() + self.length as usize
    }

    pub fn payload<'a>(&self, buffer: &'a [u32]) -> Option<&'a [u32]> {
        buffer.get(self.payload_start()..self.end())
    }
}

/// Single-word tag-segment header: tag:12, type:4, length:16
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSegmentHeader {
    pub offset: usize,
    pub length: u16,
    pub tag: u16,
    pub data_type: DataType,
}

impl TagSegmentHeader {
    pub const SIZE: usize = TAGSEGMENT_HEADER_SIZE;

    pub fn read(buffer: &[u32], offset: usize) -> Option<Self> {
        let word = *buffer.get(offset)?;
        Some(Self {
            offset,
            tag: ((word >> 20) & 0xFFF) as u16,
            data_type: DataType::from(((word >> 16) & 0xF) as u8),
            length: (word & 0xFFFF) as u16,
        })
    }

    pub fn encode(&self) -> u32 {
        let code: u8 = self.data_type.into();
        (((self.tag & 0xFFF) as u32) << 20) | (((code & 0xF) as u32) << 16) | self.length as u32
    }

    pub fn payload_start(&self) -> usize {
        self.offset + Self::SIZE
    }

    pub fn end(&self) -> usize {
        self.payload_start() + self.length as usize
    }
}

const BLOCK_HEADER_KIND: u32 = 0;
const BLOCK_TRAILER_KIND: u32 = 1;
const EVENT_HEADER_KIND: u32 = 2;

fn marker_kind(word: u32) -> Option<u32> {
    if word & TYPE_DEFINING_BIT == 0 {
        None
    } else {
        Some((word >> TYPE_SHIFT) & TYPE_MASK)
    }
}

fn marker_slot(word: u32) -> u8 {
    ((word >> SLOT_SHIFT) & SLOT_MASK) as u8
}

fn marker_word(kind: u32, slot: u8) -> u32 {
    TYPE_DEFINING_BIT | (kind << TYPE_SHIFT) | (((slot as u32) & SLOT_MASK) << SLOT_SHIFT)
}

/// Physical block header: slot:5, mod:4, number:10, nevents:8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub slot: u8,
    pub module_id: u8,
    pub number: u16,
    pub nevents: u8,
}

impl BlockHeader {
    pub fn from_word(word: u32) -> Option<Self> {
        if marker_kind(word)? != BLOCK_HEADER_KIND {
            return None;
        }
        Some(Self {
            slot: marker_slot(word),
            module_id: ((word >> 18) & 0xF) as u8,
            number: ((word >> 8) & 0x3FF) as u16,
            nevents: (word & 0xFF) as u8,
        })
    }

    pub fn encode(&self) -> u32 {
        marker_word(BLOCK_HEADER_KIND, self.slot)
            | (((self.module_id & 0xF) as u32) << 18)
            | (((self.number & 0x3FF) as u32) << 8)
            | self.nevents as u32
    }
}

/// Physical block trailer: slot:5, nwords:22
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTrailer {
    pub slot: u8,
    pub nwords: u32,
}

impl BlockTrailer {
    pub fn from_word(word: u32) -> Option<Self> {
        if marker_kind(word)? != BLOCK_TRAILER_KIND {
            return None;
        }
        Some(Self {
            slot: marker_slot(word),
            nwords: word & 0x3F_FFFF,
        })
    }

    pub fn encode(&self) -> u32 {
        marker_word(BLOCK_TRAILER_KIND, self.slot) | (self.nwords & 0x3F_FFFF)
    }
}

/// Logical event header: slot:5, number:22
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub slot: u8,
    pub number: u32,
}

impl EventHeader {
    pub fn from_word(word: u32) -> Option<Self> {
        if marker_kind(word)? != EVENT_HEADER_KIND {
            return None;
        }
        Some(Self {
            slot: marker_slot(word),
            number: word & 0x3F_FFFF,
        })
    }

    pub fn encode(&self) -> u32 {
        marker_word(EVENT_HEADER_KIND, self.slot) | (self.number & 0x3F_FFFF)
    }
}

/// Any word with the high bit set, classified by its 4-bit kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    BlockHeader(BlockHeader),
    BlockTrailer(BlockTrailer),
    EventHeader(EventHeader),
    Other(u8),
}

impl Marker {
    /// Returns None for payload (non-marker) words
    pub fn parse(word: u32) -> Option<Self> {
        let kind = marker_kind(word)?;
        Some(match kind {
            BLOCK_HEADER_KIND => Self::BlockHeader(BlockHeader::from_word(word)?),
            BLOCK_TRAILER_KIND => Self::BlockTrailer(BlockTrailer::from_word(word)?),
            EVENT_HEADER_KIND => Self::EventHeader(EventHeader::from_word(word)?),
            other => Self::Other(other as u8),
        })
    }
}
