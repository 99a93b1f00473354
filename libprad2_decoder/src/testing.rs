// Builders for synthetic evio events used across the unit tests
use byteorder::{ByteOrder, WriteBytesExt};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::constants::{
    EVIO_BLOCK_HEADER_SIZE, EVIO_LAST_BLOCK_BIT, EVIO_MAGIC, EVIO_SUPPORTED_VERSION,
    FADC250_TIME_MASK, TYPE_DEFINING_BIT, TYPE_SHIFT,
};
use super::evio_header::{
    BankHeader, BlockHeader, BlockTrailer, DataType, EventHeader, SegmentHeader,
};

pub fn wrap_bank(tag: u16, data_type: DataType, num: u8, payload: &[u32]) -> Vec<u32> {
    let header = BankHeader {
        offset: 0,
        length: payload.len() as u32 + 1,
        tag,
        padding: 0,
        data_type,
        num,
    };
    let mut words = header.encode().to_vec();
    words.extend_from_slice(payload);
    words
}

pub fn wrap_segment(tag: u8, data_type: DataType, padding: u8, payload: &[u32]) -> Vec<u32> {
    let header = SegmentHeader {
        offset: 0,
        length: payload.len() as u16,
        tag,
        data_type,
        padding,
    };
    let mut words = vec![header.encode()];
    words.extend_from_slice(payload);
    words
}

pub fn trigger_time_words(ticks: u64) -> [u32; 2] {
    [
        TYPE_DEFINING_BIT | (3 << TYPE_SHIFT) | (ticks as u32 & FADC250_TIME_MASK),
        (ticks >> 24) as u32 & FADC250_TIME_MASK,
    ]
}

pub fn window_raw_words(channel: u8, samples: &[u16]) -> Vec<u32> {
    let mut words = vec![
        TYPE_DEFINING_BIT
            | (4 << TYPE_SHIFT)
            | ((channel as u32 & 0xF) << 23)
            | (samples.len() as u32 & 0xFFF),
    ];
    for pair in samples.chunks(2) {
        let first = (pair[0] as u32) << 16;
        let second = match pair.get(1) {
            Some(s) => *s as u32,
            None => 1 << 13,
        };
        words.push(first | second);
    }
    words
}

/// One logical FADC250 event: header, trigger time, and window raw data per channel
pub fn fadc_event_words(slot: u8, number: u32, ticks: u64, channels: &[(u8, &[u16])]) -> Vec<u32> {
    let mut words = vec![EventHeader { slot, number }.encode()];
    words.extend(trigger_time_words(ticks));
    for (channel, samples) in channels {
        words.extend(window_raw_words(*channel, samples));
    }
    words
}

/// A physical block around the given events, padded with a filler word to an even length
pub fn fadc_block(slot: u8, number: u16, events: &[Vec<u32>]) -> Vec<u32> {
    let mut words = vec![BlockHeader {
        slot,
        module_id: 1,
        number,
        nevents: events.len() as u8,
    }
    .encode()];
    for event in events {
        words.extend_from_slice(event);
    }
    let nwords = words.len() as u32 + 1;
    words.push(BlockTrailer { slot, nwords }.encode());
    if words.len() % 2 == 1 {
        words.push(0xf800_0000 | ((slot as u32) << 22));
    }
    words
}

/// A built physics event holding a trigger bank and one ROC bank per entry of `rocs`
pub fn physics_event(nevents: u8, rocs: &[(u16, Vec<(u16, Vec<u32>)>)]) -> Vec<u32> {
    let mut trigger_payload = Vec::new();
    trigger_payload.extend(wrap_segment(1, DataType::ULong64, 0, &[100, 0, 0x1234, 0x1]));
    trigger_payload.extend(wrap_segment(2, DataType::UShort16, 2, &[0x0001_0002, 0x0000_0003]));
    for (roc, _) in rocs {
        trigger_payload.extend(wrap_segment(*roc as u8, DataType::UInt32, 0, &[0xaaaa, 0xbbbb]));
    }
    let mut payload = wrap_bank(0xff21, DataType::Segment, nevents, &trigger_payload);
    for (roc, banks) in rocs {
        let mut roc_payload = Vec::new();
        for (tag, data) in banks {
            roc_payload.extend(wrap_bank(*tag, DataType::UInt32, 0, data));
        }
        payload.extend(wrap_bank(*roc, DataType::Bank, nevents, &roc_payload));
    }
    wrap_bank(0xff50, DataType::Bank, nevents, &payload)
}

/// Encode the events as evio blocks of at most `per_block` events
pub fn evio_blocks(events: &[Vec<u32>], per_block: usize) -> Vec<u32> {
    let mut words = Vec::new();
    let chunks: Vec<&[Vec<u32>]> = events.chunks(per_block.max(1)).collect();
    for (number, chunk) in chunks.iter().enumerate() {
        let payload: Vec<u32> = chunk.iter().flatten().copied().collect();
        let last = if number + 1 == chunks.len() {
            EVIO_LAST_BLOCK_BIT
        } else {
            0
        };
        words.extend([
            (payload.len() + EVIO_BLOCK_HEADER_SIZE) as u32,
            number as u32 + 1,
            EVIO_BLOCK_HEADER_SIZE as u32,
            chunk.len() as u32,
            0,
            EVIO_SUPPORTED_VERSION | last,
            0,
            EVIO_MAGIC,
        ]);
        words.extend(payload);
    }
    words
}

pub fn write_words<B: ByteOrder>(path: &Path, words: &[u32]) {
    let mut file = File::create(path).unwrap();
    for word in words {
        file.write_u32::<B>(*word).unwrap();
    }
    file.flush().unwrap();
}
