use std::fmt::Write;

use fxhash::FxHashMap;

use super::constants::MAX_BANK_DEPTH;
use super::error::BankScanError;
use super::evio_header::{BankHeader, DataType, SegmentHeader, TagSegmentHeader};

/// Walk every bank in an event buffer and return the headers accepted by `filter`.
///
/// The first word of the buffer is the outer (event) bank. Banks of banks are
/// descended into, all other banks are treated as leaves and skipped over.
/// Headers are returned in file order (parents before their children), and the
/// outer bank is itself subject to the filter.
pub fn scan_banks<F>(buffer: &[u32], filter: F) -> Result<Vec<BankHeader>, BankScanError>
where
    F: Fn(&BankHeader) -> bool,
{
    let outer = read_outer_bank(buffer)?;
    let mut banks = Vec::new();
    if filter(&outer) {
        banks.push(outer);
    }
    if outer.data_type.is_bank_of_banks() {
        walk_children(buffer, &outer, &filter, &mut banks, 1)?;
    }
    Ok(banks)
}

/// Read the outer bank header and check it fits in the buffer
pub fn read_outer_bank(buffer: &[u32]) -> Result<BankHeader, BankScanError> {
    let outer = BankHeader::read(buffer, 0).ok_or(BankScanError::BufferTooShort(buffer.len()))?;
    check_extent(&outer, buffer.len())?;
    Ok(outer)
}

/// Decode the bank header at `offset` and check it ends at or before `limit`
pub fn read_child_bank(
    buffer: &[u32],
    offset: usize,
    limit: usize,
) -> Result<BankHeader, BankScanError> {
    if offset + BankHeader::SIZE > limit {
        return Err(BankScanError::Truncated { offset, limit });
    }
    let bank = BankHeader::read(buffer, offset).ok_or(BankScanError::Truncated { offset, limit })?;
    check_extent(&bank, limit)?;
    Ok(bank)
}

fn check_extent(bank: &BankHeader, limit: usize) -> Result<(), BankScanError> {
    if bank.length == 0 || bank.end() > limit {
        Err(BankScanError::Overrun {
            offset: bank.offset,
            length: bank.length,
            limit,
        })
    } else {
        Ok(())
    }
}

fn walk_children<F>(
    buffer: &[u32],
    parent: &BankHeader,
    filter: &F,
    banks: &mut Vec<BankHeader>,
    depth: usize,
) -> Result<(), BankScanError>
where
    F: Fn(&BankHeader) -> bool,
{
    if depth > MAX_BANK_DEPTH {
        return Err(BankScanError::DepthExceeded {
            offset: parent.offset,
            max: MAX_BANK_DEPTH,
        });
    }
    let limit = parent.end();
    let mut offset = parent.payload_start();
    while offset < limit {
        let bank = read_child_bank(buffer, offset, limit)?;
        if filter(&bank) {
            banks.push(bank);
        }
        if bank.data_type.is_bank_of_banks() {
            walk_children(buffer, &bank, filter, banks, depth + 1)?;
        }
        offset = bank.end();
    }
    Ok(())
}

/// Walk the segments inside a bank of segments
pub fn scan_segments(
    buffer: &[u32],
    bank: &BankHeader,
) -> Result<Vec<SegmentHeader>, BankScanError> {
    let limit = bank.end();
    let mut offset = bank.payload_start();
    let mut segments = Vec::new();
    while offset < limit {
        let segment =
            SegmentHeader::read(buffer, offset).ok_or(BankScanError::Truncated { offset, limit })?;
        if segment.end() > limit {
            return Err(BankScanError::Overrun {
                offset,
                length: segment.length as u32,
                limit,
            });
        }
        segments.push(segment);
        offset = segment.end();
    }
    Ok(segments)
}

/// Walk the tag-segments inside a bank of tag-segments
pub fn scan_tag_segments(
    buffer: &[u32],
    bank: &BankHeader,
) -> Result<Vec<TagSegmentHeader>, BankScanError> {
    let limit = bank.end();
    let mut offset = bank.payload_start();
    let mut segments = Vec::new();
    while offset < limit {
        let segment = TagSegmentHeader::read(buffer, offset)
            .ok_or(BankScanError::Truncated { offset, limit })?;
        if segment.end() > limit {
            return Err(BankScanError::Overrun {
                offset,
                length: segment.length as u32,
                limit,
            });
        }
        segments.push(segment);
        offset = segment.end();
    }
    Ok(segments)
}

enum Annotation {
    Bank(BankHeader),
    TagSegment(TagSegmentHeader),
}

/// Render the outer event as one hex word per line, marking the container headers
pub fn dump_buffer(buffer: &[u32]) -> Result<String, BankScanError> {
    let banks = scan_banks(buffer, |_| true)?;
    let mut annotations: FxHashMap<usize, Annotation> = FxHashMap::default();
    for bank in banks.iter() {
        if bank.data_type == DataType::TagSegment {
            for segment in scan_tag_segments(buffer, bank)? {
                annotations.insert(segment.offset, Annotation::TagSegment(segment));
            }
        }
        annotations.insert(bank.offset, Annotation::Bank(*bank));
    }

    let event_length = banks.first().map(|b| b.end()).unwrap_or(0);
    let mut dump = String::new();
    for (idx, word) in buffer.iter().take(event_length).enumerate() {
        // Writing to a String cannot fail
        let _ = write!(dump, "0x{word:08x}");
        match annotations.get(&idx) {
            Some(Annotation::Bank(bank)) => {
                let code: u8 = bank.data_type.into();
                let _ = write!(
                    dump,
                    "\t <- header word - length: {}, tag: {} (0x{:x}), type: {} (0x{:x}), num: {} (0x{:x})",
                    bank.length, bank.tag, bank.tag, bank.data_type, code, bank.num, bank.num
                );
            }
            Some(Annotation::TagSegment(segment)) => {
                let _ = write!(
                    dump,
                    "\t <- tagsegment word - length: {}, tag: {} (0x{:x}), type: {}",
                    segment.length, segment.tag, segment.tag, segment.data_type
                );
            }
            None => (),
        }
        dump.push('\n');
    }
    dump.push_str("== End of This Event ==\n");
    Ok(dump)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(length: u32, tag: u16, data_type: DataType, num: u8) -> [u32; 2] {
        BankHeader {
            offset: 0,
            length,
            tag,
            padding: 0,
            data_type,
            num,
        }
        .encode()
    }

    // event(bank) -> [roc(bank) -> [data(uint32, 3 words), data(uint32, 1 word)], leaf(uint32, 2 words)]
    fn nested_event() -> Vec<u32> {
        let mut words = Vec::new();
        words.extend(bank(15, 0xff50, DataType::Bank, 1));
        words.extend(bank(9, 1, DataType::Bank, 0));
        words.extend(bank(4, 3, DataType::UInt32, 0));
        words.extend([1, 2, 3]);
        words.extend(bank(2, 4, DataType::UInt32, 0));
        words.push(4);
        words.extend(bank(3, 5, DataType::UInt32, 0));
        words.extend([5, 6]);
        words
    }

    #[test]
    fn test_scan_visits_every_bank_in_order() {
        let buffer = nested_event();
        let banks = scan_banks(&buffer, |_| true).unwrap();
        let tags: Vec<u16> = banks.iter().map(|b| b.tag).collect();
        assert_eq!(tags, vec![0xff50, 1, 3, 4, 5]);
        let offsets: Vec<usize> = banks.iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4, 9, 12]);

        // leaves consume their full extent, containers only their header
        let consumed: usize = banks
            .iter()
            .map(|b| {
                if b.data_type.is_bank_of_banks() {
                    BankHeader::SIZE
                } else {
                    b.length as usize + 1
                }
            })
            .sum();
        assert_eq!(consumed, banks[0].length as usize + 1);
    }

    #[test]
    fn test_scan_filter() {
        let buffer = nested_event();
        let banks = scan_banks(&buffer, |b| b.data_type == DataType::UInt32).unwrap();
        assert_eq!(banks.len(), 3);
        assert_eq!(banks[0].tag, 3);
        assert_eq!(banks[0].payload(&buffer), Some(&[1u32, 2, 3][..]));
    }

    #[test]
    fn test_scan_deep_nesting() {
        let mut buffer = Vec::new();
        buffer.extend(bank(7, 10, DataType::Bank, 0));
        buffer.extend(bank(5, 11, DataType::AlsoBank, 0));
        buffer.extend(bank(3, 12, DataType::Bank, 0));
        buffer.extend(bank(1, 13, DataType::UInt32, 0));
        let banks = scan_banks(&buffer, |_| true).unwrap();
        assert_eq!(banks.iter().map(|b| b.tag).collect::<Vec<_>>(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_scan_reports_overrun() {
        let mut buffer = nested_event();
        // child claims more words than the parent holds
        buffer[4] = 40;
        match scan_banks(&buffer, |_| true) {
            Err(BankScanError::Overrun { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("unexpected result {other:?}"),
        }

        let buffer = bank(100, 1, DataType::Bank, 0);
        assert!(matches!(
            scan_banks(&buffer, |_| true),
            Err(BankScanError::Overrun { offset: 0, .. })
        ));
        assert!(matches!(
            scan_banks(&[], |_| true),
            Err(BankScanError::BufferTooShort(0))
        ));
    }

    #[test]
    fn test_scan_depth_guard() {
        let depth = MAX_BANK_DEPTH + 2;
        let mut buffer = Vec::new();
        for level in 0..depth {
            let length = (2 * (depth - level) - 1) as u32;
            buffer.extend(bank(length, level as u16, DataType::Bank, 0));
        }
        assert!(matches!(
            scan_banks(&buffer, |_| true),
            Err(BankScanError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_scan_segments() {
        let mut buffer = Vec::new();
        buffer.extend(bank(5, 0xff21, DataType::Segment, 1));
        let seg = SegmentHeader {
            offset: 0,
            length: 2,
            tag: 1,
            data_type: DataType::ULong64,
            padding: 0,
        };
        buffer.push(seg.encode());
        buffer.extend([10, 0]);
        let seg = SegmentHeader {
            length: 0,
            data_type: DataType::UShort16,
            ..seg
        };
        buffer.push(seg.encode());
        let outer = read_outer_bank(&buffer).unwrap();
        let segments = scan_segments(&buffer, &outer).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].data_type, DataType::ULong64);
        assert_eq!(segments[0].payload(&buffer), Some(&[10u32, 0][..]));
        assert_eq!(segments[1].offset, 5);
    }

    #[test]
    fn test_dump_buffer() {
        let buffer = nested_event();
        let dump = dump_buffer(&buffer).unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 17);
        assert!(lines[0].starts_with("0x0000000f\t <- header word - length: 15"));
        assert!(lines[0].contains("type: bank (0x10)"));
        assert!(lines[4].contains("tag: 3 (0x3), type: uint32"));
        assert_eq!(lines[5], "0x00030100");
        assert_eq!(lines[6], "0x00000001");
        assert_eq!(lines[16], "== End of This Event ==");
    }

    #[test]
    fn test_dump_tag_segments() {
        let mut buffer = Vec::new();
        buffer.extend(bank(3, 7, DataType::TagSegment, 0));
        buffer.push(
            TagSegmentHeader {
                offset: 0,
                length: 0,
                tag: 0x12,
                data_type: DataType::CharStar8,
            }
            .encode(),
        );
        buffer.push(
            TagSegmentHeader {
                offset: 0,
                length: 0,
                tag: 0x13,
                data_type: DataType::UInt32,
            }
            .encode(),
        );
        let dump = dump_buffer(&buffer).unwrap();
        assert!(dump.contains("<- tagsegment word - length: 0, tag: 18 (0x12), type: char*8"));
        assert!(dump.contains("tag: 19 (0x13), type: uint32"));
    }
}
