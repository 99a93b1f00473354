use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use super::constants::{
    EVIO_BLOCK_HEADER_SIZE, EVIO_LAST_BLOCK_BIT, EVIO_MAGIC, EVIO_SUPPORTED_VERSION,
    EVIO_VERSION_MASK,
};
use super::error::EvioFileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// The fixed header at the start of each evio version 4 block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvioBlockHeader {
    pub block_length: u32,
    pub block_number: u32,
    pub header_length: u32,
    pub event_count: u32,
    pub version: u32,
    pub is_last: bool,
}

impl EvioBlockHeader {
    fn from_words(words: &[u32; EVIO_BLOCK_HEADER_SIZE]) -> Result<Self, EvioFileError> {
        let version = words[5] & EVIO_VERSION_MASK;
        if version != EVIO_SUPPORTED_VERSION {
            return Err(EvioFileError::UnsupportedVersion(version));
        }
        let header = Self {
            block_length: words[0],
            block_number: words[1],
            header_length: words[2],
            event_count: words[3],
            version,
            is_last: words[5] & EVIO_LAST_BLOCK_BIT != 0,
        };
        if (header.header_length as usize) < EVIO_BLOCK_HEADER_SIZE
            || header.block_length < header.header_length
        {
            return Err(EvioFileError::BadBlockHeader {
                block_length: header.block_length,
                header_length: header.header_length,
            });
        }
        Ok(header)
    }
}

/// A single evio version 4 file.
///
/// The file is a sequence of blocks, each an 8 word header followed by whole event
/// banks. Byte order is taken from the magic word of the first block.
#[derive(Debug)]
pub struct EvioFile {
    file_path: PathBuf,
    reader: BufReader<File>,
    size_bytes: u64,
    bytes_read: u64,
    endian: Option<Endian>,
    block: Vec<u32>,
    position: usize,
    is_last_block: bool,
    is_eof: bool,
}

impl EvioFile {
    pub fn new(path: &Path) -> Result<Self, EvioFileError> {
        if !path.exists() {
            return Err(EvioFileError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        Ok(Self {
            file_path: path.to_path_buf(),
            reader: BufReader::new(file),
            size_bytes,
            bytes_read: 0,
            endian: None,
            block: Vec::new(),
            position: 0,
            is_last_block: false,
            is_eof: size_bytes == 0,
        })
    }

    /// Read the next event bank into `buffer`, replacing its contents.
    ///
    /// Returns `EvioFileError::EndOfFile` once every event has been read.
    pub fn read_event(&mut self, buffer: &mut Vec<u32>) -> Result<(), EvioFileError> {
        loop {
            if self.position < self.block.len() {
                let length = self.block[self.position];
                let end = self.position + 1 + length as usize;
                if end > self.block.len() {
                    return Err(EvioFileError::EventOverrun { length });
                }
                buffer.clear();
                buffer.extend_from_slice(&self.block[self.position..end]);
                self.position = end;
                return Ok(());
            }
            if self.is_eof || self.is_last_block {
                self.is_eof = true;
                return Err(EvioFileError::EndOfFile);
            }
            self.read_block()?;
        }
    }

    /// Load the next block into memory
    fn read_block(&mut self) -> Result<EvioBlockHeader, EvioFileError> {
        let mut header_bytes = [0u8; EVIO_BLOCK_HEADER_SIZE * 4];
        match self.reader.read_exact(&mut header_bytes) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.is_eof = true;
                return Err(EvioFileError::EndOfFile);
            }
            Err(e) => return Err(EvioFileError::IOError(e)),
        }
        self.bytes_read += header_bytes.len() as u64;

        let endian = match self.endian {
            Some(endian) => endian,
            None => {
                let endian = Self::detect_endian(&header_bytes)?;
                log::debug!(
                    "Evio file {} is {:?} endian",
                    self.file_path.to_string_lossy(),
                    endian
                );
                self.endian = Some(endian);
                endian
            }
        };

        let mut words = [0u32; EVIO_BLOCK_HEADER_SIZE];
        match endian {
            Endian::Little => LittleEndian::read_u32_into(&header_bytes, &mut words),
            Endian::Big => BigEndian::read_u32_into(&header_bytes, &mut words),
        }
        if words[7] != EVIO_MAGIC {
            return Err(EvioFileError::BadMagic(words[7]));
        }
        let header = EvioBlockHeader::from_words(&words)?;
        let remaining_bytes = self.size_bytes.saturating_sub(self.bytes_read);
        if (header.block_length as u64 - EVIO_BLOCK_HEADER_SIZE as u64) * 4 > remaining_bytes {
            return Err(EvioFileError::BlockOverrun {
                block_length: header.block_length,
                remaining_bytes,
            });
        }

        let mut extra_header = vec![0u32; header.header_length as usize - EVIO_BLOCK_HEADER_SIZE];
        self.read_words(endian, &mut extra_header)?;
        self.block
            .resize((header.block_length - header.header_length) as usize, 0);
        let mut block = std::mem::take(&mut self.block);
        let result = self.read_words(endian, &mut block);
        self.block = block;
        result?;

        self.position = 0;
        self.is_last_block = header.is_last;
        log::trace!(
            "Read evio block {} with {} events",
            header.block_number,
            header.event_count
        );
        Ok(header)
    }

    fn read_words(&mut self, endian: Endian, words: &mut [u32]) -> Result<(), EvioFileError> {
        match endian {
            Endian::Little => self.reader.read_u32_into::<LittleEndian>(words)?,
            Endian::Big => self.reader.read_u32_into::<BigEndian>(words)?,
        }
        self.bytes_read += words.len() as u64 * 4;
        Ok(())
    }

    fn detect_endian(header_bytes: &[u8]) -> Result<Endian, EvioFileError> {
        let magic_bytes = &header_bytes[28..32];
        if LittleEndian::read_u32(magic_bytes) == EVIO_MAGIC {
            Ok(Endian::Little)
        } else if BigEndian::read_u32(magic_bytes) == EVIO_MAGIC {
            Ok(Endian::Big)
        } else {
            Err(EvioFileError::BadMagic(LittleEndian::read_u32(magic_bytes)))
        }
    }

    pub fn get_size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn is_eof(&self) -> bool {
        self.is_eof
    }
}
