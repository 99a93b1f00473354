use std::fmt::Display;
use std::ops::Range;

use bit_set::BitSet;
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::bank_scanner::{read_child_bank, read_outer_bank, scan_segments};
use super::constants::{CODA_END, CODA_GO, CODA_PRESTART};
use super::error::{BankScanError, FramerError, MarkerKind};
use super::evio_header::{BankHeader, BlockHeader, DataType, Marker};

/// Identifies one module's data region: ROC (crate) id, data bank tag, and slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferAddress {
    pub crate_id: u16,
    pub bank: u16,
    pub slot: u8,
}

impl BufferAddress {
    pub fn new(crate_id: u16, bank: u16, slot: u8) -> Self {
        Self {
            crate_id,
            bank,
            slot,
        }
    }
}

impl Display for BufferAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(crate {}, bank {}, slot {})",
            self.crate_id, self.bank, self.slot
        )
    }
}

/// One logical event's word range inside the full event buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub offset: usize,
    pub length: usize,
}

impl BufferInfo {
    pub fn range(&self) -> Range<usize> {
        self.offset..(self.offset + self.length)
    }
}

pub type BufferMap = FxHashMap<BufferAddress, Vec<BufferInfo>>;

/// The result of scanning one data bank.
///
/// `errors` holds the recoverable problems (slot mismatches, markers between
/// blocks) for which data was dropped; the rest of the bank was still scanned.
#[derive(Debug, Clone, Default)]
pub struct DataBankScan {
    pub buffers: BufferMap,
    pub errors: Vec<FramerError>,
}

#[derive(Debug)]
struct OpenBlock {
    header: BlockHeader,
    start: usize,
    open_event: Option<usize>,
    ranges: Vec<BufferInfo>,
    dropped: bool,
}

/// Slice a data bank payload into per-event ranges, keyed by module address.
///
/// Only marker words (high bit set) are looked at. `global_base` is the position
/// of the payload's first word in the full event buffer, so the returned ranges
/// index the full buffer. Markers before the first block header abort the scan;
/// markers between a trailer and the next block header are recorded and skipped.
pub fn scan_data_bank(
    payload: &[u32],
    crate_id: u16,
    bank: u16,
    global_base: usize,
) -> Result<DataBankScan, FramerError> {
    let mut scan = DataBankScan::default();
    let mut block: Option<OpenBlock> = None;
    // slot of the most recent block header, kept after its trailer
    let mut last_slot: Option<u8> = None;

    for (idx, word) in payload.iter().enumerate() {
        let marker = match Marker::parse(*word) {
            Some(marker) => marker,
            None => continue,
        };
        match marker {
            Marker::BlockHeader(header) => {
                if let Some(unfinished) = block.take() {
                    log::warn!(
                        "Block {} of slot {} in crate {crate_id}, bank {bank} has no trailer; dropping {} events",
                        unfinished.header.number,
                        unfinished.header.slot,
                        unfinished.ranges.len() + unfinished.open_event.map_or(0, |_| 1),
                    );
                }
                last_slot = Some(header.slot);
                block = Some(OpenBlock {
                    header,
                    start: idx,
                    open_event: None,
                    ranges: Vec::new(),
                    dropped: false,
                });
            }
            Marker::EventHeader(event) => {
                let Some(current) = block.as_mut() else {
                    let error = outside_block(
                        MarkerKind::EventHeader,
                        event.slot,
                        last_slot,
                        crate_id,
                        bank,
                        global_base + idx,
                    )?;
                    log::warn!("{error}; skipping it");
                    scan.errors.push(error);
                    continue;
                };
                if current.dropped {
                    continue;
                }
                if event.slot != current.header.slot {
                    let error = FramerError::SlotMismatch {
                        kind: MarkerKind::EventHeader,
                        crate_id,
                        bank,
                        expected: current.header.slot,
                        found: event.slot,
                    };
                    log::warn!("{error}; dropping the block");
                    scan.errors.push(error);
                    current.dropped = true;
                    continue;
                }
                if let Some(start) = current.open_event.take() {
                    current.ranges.push(BufferInfo {
                        offset: global_base + start,
                        length: idx - start,
                    });
                }
                current.open_event = Some(idx);
            }
            Marker::BlockTrailer(trailer) => {
                let Some(mut finished) = block.take() else {
                    let error = outside_block(
                        MarkerKind::BlockTrailer,
                        trailer.slot,
                        last_slot,
                        crate_id,
                        bank,
                        global_base + idx,
                    )?;
                    log::warn!("{error}; skipping it");
                    scan.errors.push(error);
                    continue;
                };
                if finished.dropped {
                    continue;
                }
                if trailer.slot != finished.header.slot {
                    let error = FramerError::SlotMismatch {
                        kind: MarkerKind::BlockTrailer,
                        crate_id,
                        bank,
                        expected: finished.header.slot,
                        found: trailer.slot,
                    };
                    log::warn!("{error}; dropping the block");
                    scan.errors.push(error);
                    continue;
                }
                if let Some(start) = finished.open_event.take() {
                    finished.ranges.push(BufferInfo {
                        offset: global_base + start,
                        length: idx - start,
                    });
                }
                let counted = idx - finished.start + 1;
                if trailer.nwords as usize != counted {
                    log::warn!(
                        "Block trailer of slot {} in crate {crate_id}, bank {bank} declares {} words, but the block has {counted}",
                        trailer.slot,
                        trailer.nwords,
                    );
                }
                if finished.header.nevents as usize != finished.ranges.len() {
                    log::debug!(
                        "Block header of slot {} declares {} events, found {}",
                        finished.header.slot,
                        finished.header.nevents,
                        finished.ranges.len()
                    );
                }
                scan.buffers
                    .entry(BufferAddress::new(crate_id, bank, finished.header.slot))
                    .or_default()
                    .extend(finished.ranges);
            }
            Marker::Other(_) => (),
        }
    }

    if let Some(unfinished) = block {
        log::warn!(
            "Data bank of crate {crate_id}, bank {bank} ended inside block {} of slot {}; dropping the block",
            unfinished.header.number,
            unfinished.header.slot
        );
    }

    Ok(scan)
}

/// The error for a marker found with no open block: fatal before the first block
/// header, recoverable after a trailer.
fn outside_block(
    kind: MarkerKind,
    slot: u8,
    last_slot: Option<u8>,
    crate_id: u16,
    bank: u16,
    offset: usize,
) -> Result<FramerError, FramerError> {
    match last_slot {
        None => Err(FramerError::MarkerBeforeBlockHeader { kind, offset }),
        Some(last_slot) => Ok(FramerError::MarkerOutsideBlock {
            kind,
            crate_id,
            bank,
            slot,
            last_slot,
            offset,
        }),
    }
}

/// A uint32 segment of the trigger bank, holding one ROC's trigger words
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RocSegment {
    pub roc: u8,
    pub words: Vec<u32>,
}

/// The contents of the built trigger bank
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerBank {
    pub tag: u16,
    pub nevents: u8,
    pub timestamps: Vec<u64>,
    pub event_types: Vec<u16>,
    pub roc_segments: Vec<RocSegment>,
}

/// Read the segments of the trigger bank.
///
/// Only timestamp (ulong64), event-type (ushort16) and ROC (uint32) segments
/// are allowed; anything else means the event was not built the way we expect.
pub fn scan_trigger_bank(buffer: &[u32], bank: &BankHeader) -> Result<TriggerBank, FramerError> {
    if !bank.data_type.is_bank_of_segments() {
        return Err(FramerError::MissingTriggerBank(bank.data_type.to_string()));
    }
    let mut trigger = TriggerBank {
        tag: bank.tag,
        nevents: bank.num,
        ..Default::default()
    };
    for segment in scan_segments(buffer, bank)? {
        let payload = segment.payload(buffer).ok_or(BankScanError::Overrun {
            offset: segment.offset,
            length: segment.length as u32,
            limit: buffer.len(),
        })?;
        match segment.data_type {
            DataType::ULong64 => trigger.timestamps.extend(
                payload
                    .chunks_exact(2)
                    .map(|pair| ((pair[1] as u64) << 32) | pair[0] as u64),
            ),
            DataType::UShort16 => {
                let n_values = (payload.len() * 2)
                    .checked_sub(segment.padding as usize / 2)
                    .ok_or(BankScanError::Overrun {
                        offset: segment.offset,
                        length: segment.length as u32,
                        limit: segment.end(),
                    })?;
                trigger.event_types.extend(
                    payload
                        .iter()
                        .flat_map(|word| [(word & 0xFFFF) as u16, (word >> 16) as u16])
                        .take(n_values),
                );
            }
            DataType::UInt32 => trigger.roc_segments.push(RocSegment {
                roc: segment.tag,
                words: payload.to_vec(),
            }),
            other => {
                return Err(FramerError::UnsupportedSegmentType {
                    tag: segment.tag,
                    data_type: other.to_string(),
                })
            }
        }
    }
    Ok(trigger)
}

/// CODA classification of a built event by its outer bank tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    Prestart,
    Go,
    End,
    Physics,
}

impl From<u16> for EventTag {
    fn from(tag: u16) -> Self {
        match tag {
            CODA_PRESTART => Self::Prestart,
            CODA_GO => Self::Go,
            CODA_END => Self::End,
            _ => Self::Physics,
        }
    }
}

impl EventTag {
    /// Classify the event in `buffer` without scanning it
    pub fn of_event(buffer: &[u32]) -> Result<Self, BankScanError> {
        Ok(Self::from(read_outer_bank(buffer)?.tag))
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, Self::Physics)
    }
}

/// Everything the framer found in one built event
#[derive(Debug, Clone, Default)]
pub struct EventFrame {
    pub tag: u16,
    pub trigger: TriggerBank,
    pub buffers: BufferMap,
    pub errors: Vec<FramerError>,
}

impl EventFrame {
    /// The event ranges of a module, empty if the module had no (valid) data
    pub fn ranges(&self, address: &BufferAddress) -> &[BufferInfo] {
        self.buffers.get(address).map_or(&[], |r| r.as_slice())
    }
}

/// Locates the per-module event ranges in built CODA events.
///
/// Holds the bank and address selections; an empty selection means "everything".
#[derive(Debug, Clone, Default)]
pub struct BlockFramer {
    interesting_banks: BitSet,
    interesting_addresses: FxHashSet<BufferAddress>,
}

impl BlockFramer {
    pub fn new(banks: &[u16], addresses: &[BufferAddress]) -> Self {
        Self {
            interesting_banks: banks.iter().map(|tag| *tag as usize).collect(),
            interesting_addresses: addresses.iter().copied().collect(),
        }
    }

    fn is_interesting_bank(&self, tag: u16) -> bool {
        self.interesting_banks.is_empty() || self.interesting_banks.contains(tag as usize)
    }

    fn is_interesting_address(&self, address: &BufferAddress) -> bool {
        self.interesting_addresses.is_empty() || self.interesting_addresses.contains(address)
    }

    /// Frame one built event: trigger bank first, then every ROC bank's data banks.
    ///
    /// Corruption of the event structure is returned as an error. Problems local
    /// to one data bank are collected in `EventFrame::errors` and the bank skipped.
    pub fn frame_event(&self, buffer: &[u32]) -> Result<EventFrame, FramerError> {
        let event = read_outer_bank(buffer)?;
        if !event.data_type.is_bank_of_banks() {
            return Err(FramerError::NotAnEventBank(event.data_type.to_string()));
        }
        let limit = event.end();
        let trigger_bank = read_child_bank(buffer, event.payload_start(), limit)?;
        let mut frame = EventFrame {
            tag: event.tag,
            trigger: scan_trigger_bank(buffer, &trigger_bank)?,
            ..Default::default()
        };

        let mut offset = trigger_bank.end();
        while offset < limit {
            let roc = read_child_bank(buffer, offset, limit)?;
            offset = roc.end();
            if !roc.data_type.is_bank_of_banks() {
                log::trace!("Skipping non-ROC bank with tag 0x{:x} at word {}", roc.tag, roc.offset);
                continue;
            }
            self.scan_roc_bank(buffer, &roc, &mut frame)?;
        }

        if !self.interesting_addresses.is_empty() {
            frame
                .buffers
                .retain(|address, _| self.is_interesting_address(address));
        }
        Ok(frame)
    }

    fn scan_roc_bank(
        &self,
        buffer: &[u32],
        roc: &BankHeader,
        frame: &mut EventFrame,
    ) -> Result<(), FramerError> {
        let limit = roc.end();
        let mut offset = roc.payload_start();
        while offset < limit {
            let data_bank = read_child_bank(buffer, offset, limit)?;
            offset = data_bank.end();
            if !self.is_interesting_bank(data_bank.tag) {
                continue;
            }
            let payload = data_bank.payload(buffer).ok_or(BankScanError::Overrun {
                offset: data_bank.offset,
                length: data_bank.length,
                limit,
            })?;
            match scan_data_bank(payload, roc.tag, data_bank.tag, data_bank.payload_start()) {
                Ok(scan) => {
                    for (address, ranges) in scan.buffers {
                        frame.buffers.entry(address).or_default().extend(ranges);
                    }
                    frame.errors.extend(scan.errors);
                }
                Err(e) => {
                    log::warn!(
                        "Skipping data bank 0x{:x} of crate {}: {e}",
                        data_bank.tag,
                        roc.tag
                    );
                    frame.errors.push(e);
                }
            }
        }
        Ok(())
    }
}
