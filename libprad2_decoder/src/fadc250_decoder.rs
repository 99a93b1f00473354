//! A decoder for the JLab FADC250 flash ADC data format.
//!
//! Every data-type-defining word has bit 31 set and carries its type in bits
//! 30-27; words with bit 31 clear continue the most recent type-defining word.
use super::block_framer::BufferInfo;
use super::constants::{
    FADC250_SAMPLE_MASK, FADC250_TIME_MASK, TYPE_DEFINING_BIT, TYPE_MASK, TYPE_SHIFT,
};
use super::error::DecoderError;
use super::fadc250_event::{Fadc250Data, Fadc250Event};

/// FADC250 data word types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fadc250Type {
    BlockHeader,
    BlockTrailer,
    EventHeader,
    TriggerTime,
    WindowRawData,
    PulseRawData,
    PulseIntegral,
    PulseTime,
    Scaler,
    InvalidData,
    FillerWord,
    Reserved(u8),
}

impl From<u32> for Fadc250Type {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::BlockHeader,
            1 => Self::BlockTrailer,
            2 => Self::EventHeader,
            3 => Self::TriggerTime,
            4 => Self::WindowRawData,
            6 => Self::PulseRawData,
            7 => Self::PulseIntegral,
            8 => Self::PulseTime,
            12 => Self::Scaler,
            14 => Self::InvalidData,
            15 => Self::FillerWord,
            other => Self::Reserved(other as u8),
        }
    }
}

// Processing modes reported in Fadc250Event::mode
const MODE_WINDOW_RAW: u32 = 1;
const MODE_PULSE_RAW: u32 = 2;
const MODE_PULSE_INTEGRAL: u32 = 3;
const MODE_INTEGRAL_TIME: u32 = 7;

fn is_continuation(word: u32) -> bool {
    word & TYPE_DEFINING_BIT == 0
}

fn word_channel(word: u32) -> usize {
    ((word >> 23) & 0xF) as usize
}

/// Unpack a continuation word holding two samples; bits 29 and 13 flag invalid samples
fn push_samples(channel: &mut Fadc250Data, word: u32) {
    if word & (1 << 29) == 0 {
        channel.raw.push(((word >> 16) & FADC250_SAMPLE_MASK) as u16);
    }
    if word & (1 << 13) == 0 {
        channel.raw.push((word & FADC250_SAMPLE_MASK) as u16);
    }
}

/// Decodes FADC250 event ranges into [`Fadc250Event`]s.
///
/// `clock_period` converts the trigger time counter into time (ns for the default
/// 250 MHz clock).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fadc250Decoder {
    clock_period: f64,
}

impl Fadc250Decoder {
    pub fn new(clock_period: f64) -> Self {
        Self { clock_period }
    }

    /// Decode a single event's words into a new event
    pub fn decode(&self, buffer: &[u32], nchannels: usize) -> Result<Fadc250Event, DecoderError> {
        let mut event = Fadc250Event::new(nchannels);
        self.decode_event(&mut event, buffer)?;
        Ok(event)
    }

    /// Decode the event found at `info` in the full event buffer
    pub fn decode_range(
        &self,
        event: &mut Fadc250Event,
        buffer: &[u32],
        info: &BufferInfo,
    ) -> Result<(), DecoderError> {
        let words = buffer.get(info.range()).ok_or(DecoderError::BadRange {
            start: info.offset,
            end: info.offset + info.length,
            len: buffer.len(),
        })?;
        self.decode_event(event, words)
    }

    /// Decode a single event's words into `event`.
    ///
    /// The event is filled in place and is not cleared first.
    pub fn decode_event(&self, event: &mut Fadc250Event, buffer: &[u32]) -> Result<(), DecoderError> {
        let mut idx = 0;
        while idx < buffer.len() {
            let word = buffer[idx];
            if is_continuation(word) {
                log::trace!("Skipping stray continuation word 0x{word:08x} at {idx}");
                idx += 1;
                continue;
            }

            match Fadc250Type::from((word >> TYPE_SHIFT) & TYPE_MASK) {
                Fadc250Type::EventHeader => {
                    event.number = word & 0x3F_FFFF;
                    idx += 1;
                }
                Fadc250Type::TriggerTime => {
                    let mut ticks = (word & FADC250_TIME_MASK) as u64;
                    idx += 1;
                    if let Some(next) = buffer.get(idx).filter(|w| is_continuation(**w)) {
                        ticks |= ((next & FADC250_TIME_MASK) as u64) << 24;
                        idx += 1;
                    }
                    event.timestamp = ticks;
                    event.time = ticks as f64 * self.clock_period;
                }
                Fadc250Type::WindowRawData => {
                    let width = (word & 0xFFF) as usize;
                    let nwords = width.div_ceil(2);
                    let words = continuation_words(buffer, idx, nwords, "window raw data")?;
                    let channel = event.channel_mut(word_channel(word))?;
                    for sample_word in words {
                        push_samples(channel, *sample_word);
                    }
                    if event.mode == 0 {
                        event.mode = MODE_WINDOW_RAW;
                    }
                    idx += 1 + nwords;
                }
                Fadc250Type::PulseRawData => {
                    let channel = event.channel_mut(word_channel(word))?;
                    idx += 1;
                    while let Some(sample_word) = buffer.get(idx).filter(|w| is_continuation(**w)) {
                        push_samples(channel, *sample_word);
                        idx += 1;
                    }
                    if event.mode < MODE_PULSE_RAW {
                        event.mode = MODE_PULSE_RAW;
                    }
                }
                Fadc250Type::PulseIntegral => {
                    event
                        .channel_mut(word_channel(word))?
                        .integrals
                        .push(word & 0x7_FFFF);
                    event.mode = event.mode.max(MODE_PULSE_INTEGRAL);
                    idx += 1;
                }
                Fadc250Type::PulseTime => {
                    event
                        .channel_mut(word_channel(word))?
                        .pulse_times
                        .push(word & 0xFFFF);
                    event.mode = MODE_INTEGRAL_TIME;
                    idx += 1;
                }
                Fadc250Type::Scaler => {
                    let count = (word & 0x3F) as usize;
                    continuation_words(buffer, idx, count, "scaler header")?;
                    idx += 1 + count;
                }
                Fadc250Type::InvalidData => {
                    return Err(DecoderError::InvalidData { word, offset: idx });
                }
                Fadc250Type::BlockHeader
                | Fadc250Type::BlockTrailer
                | Fadc250Type::FillerWord
                | Fadc250Type::Reserved(_) => idx += 1,
            }
        }
        Ok(())
    }
}

impl Default for Fadc250Decoder {
    fn default() -> Self {
        Self::new(super::constants::FADC250_DEFAULT_CLOCK_PERIOD)
    }
}

/// The `count` words following the type-defining word at `idx`; all must be continuations
fn continuation_words<'a>(
    buffer: &'a [u32],
    idx: usize,
    count: usize,
    kind: &'static str,
) -> Result<&'a [u32], DecoderError> {
    let words = &buffer[(idx + 1).min(buffer.len())..];
    let found = words
        .iter()
        .take(count)
        .take_while(|w| is_continuation(**w))
        .count();
    if found < count {
        return Err(DecoderError::Truncated {
            kind,
            offset: idx,
            expected: count,
            found,
        });
    }
    Ok(&words[..count])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FADC250_CHANNELS;
    use crate::testing::{fadc_event_words, trigger_time_words, window_raw_words};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_decode_window_raw_event() {
        let even: &[u16] = &[100, 101, 102, 4095];
        let odd: &[u16] = &[7, 8, 9];
        let words = fadc_event_words(3, 42, 0x12_3456_789a, &[(0, even), (15, odd)]);
        let event = Fadc250Decoder::default().decode(&words, 16).unwrap();
        assert_eq!(event.number, 42);
        assert_eq!(event.mode, 1);
        assert_eq!(event.timestamp, 0x12_3456_789a);
        assert_approx_eq!(event.time, 0x12_3456_789a_u64 as f64 * 4.0);
        assert_eq!(event.channel(0).unwrap().raw, even);
        assert_eq!(event.channel(15).unwrap().raw, odd);
        assert_eq!(event.fired_channels().collect::<Vec<_>>(), vec![0, 15]);
    }

    #[test]
    fn test_samples_append_in_arrival_order() {
        let mut words = fadc_event_words(3, 1, 0, &[(2, &[1, 2])]);
        words.extend(window_raw_words(2, &[3]));
        let event = Fadc250Decoder::default().decode(&words, 16).unwrap();
        assert_eq!(event.channel(2).unwrap().raw, vec![1, 2, 3]);
    }

    #[test]
    fn test_single_word_trigger_time() {
        let mut words = vec![trigger_time_words(0x10)[0]];
        words.extend(window_raw_words(1, &[5, 6]));
        let decoder = Fadc250Decoder::new(2.0);
        let event = decoder.decode(&words, 16).unwrap();
        assert_eq!(event.timestamp, 0x10);
        assert_approx_eq!(event.time, 32.0);
        assert_eq!(event.channel(1).unwrap().raw, vec![5, 6]);
    }

    #[test]
    fn test_pulse_words() {
        let words = [
            0x8000_0000 | (2 << 27) | 5,
            // pulse raw data, channel 3, two continuation words
            0x8000_0000 | (6 << 27) | (3 << 23),
            (10 << 16) | 11,
            (12 << 16) | (1 << 13),
            // pulse integral, channel 3
            0x8000_0000 | (7 << 27) | (3 << 23) | 0x1_2345,
            // pulse time, channel 3
            0x8000_0000 | (8 << 27) | (3 << 23) | 0x0abc,
            // scaler header with one scaler word, then a filler
            0x8000_0000 | (12 << 27) | 1,
            0x0000_ffff,
            0xf800_0000,
        ];
        let event = Fadc250Decoder::default().decode(&words, 16).unwrap();
        let ch = event.channel(3).unwrap();
        assert_eq!(event.number, 5);
        assert_eq!(ch.raw, vec![10, 11, 12]);
        assert_eq!(ch.integrals, vec![0x1_2345]);
        assert_eq!(ch.pulse_times, vec![0x0abc]);
        assert_eq!(event.mode, 7);
    }

    #[test]
    fn test_truncated_window() {
        let mut words = window_raw_words(0, &[1, 2, 3, 4]);
        words.pop();
        assert_eq!(
            Fadc250Decoder::default().decode(&words, 16),
            Err(DecoderError::Truncated {
                kind: "window raw data",
                offset: 0,
                expected: 2,
                found: 1
            })
        );

        // the next type-defining word ends the window early
        let mut words = window_raw_words(0, &[1, 2, 3, 4]);
        words[2] = 0x8000_0000 | (2 << 27);
        assert!(matches!(
            Fadc250Decoder::default().decode(&words, 16),
            Err(DecoderError::Truncated { found: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_data_word() {
        let words = [0x8000_0000 | (2 << 27) | 1, 0x8000_0000 | (14 << 27)];
        assert_eq!(
            Fadc250Decoder::default().decode(&words, 16),
            Err(DecoderError::InvalidData {
                word: 0xf000_0000,
                offset: 1
            })
        );
    }

    #[test]
    fn test_channel_outside_event() {
        let words = window_raw_words(12, &[1, 2]);
        assert_eq!(
            Fadc250Decoder::default().decode(&words, 8),
            Err(DecoderError::BadChannel {
                channel: 12,
                nchannels: 8
            })
        );
    }

    #[test]
    fn test_decode_is_idempotent() {
        let words = fadc_event_words(3, 7, 1000, &[(0, &[5, 6, 7]), (4, &[8])]);
        let info = BufferInfo {
            offset: 0,
            length: words.len(),
        };
        let decoder = Fadc250Decoder::default();
        let mut event = Fadc250Event::new(FADC250_CHANNELS);
        decoder.decode_range(&mut event, &words, &info).unwrap();
        let first = event.clone();
        event.clear();
        decoder.decode_range(&mut event, &words, &info).unwrap();
        assert_eq!(event, first);

        let bad = BufferInfo {
            offset: 2,
            length: words.len(),
        };
        assert!(matches!(
            decoder.decode_range(&mut event, &words, &bad),
            Err(DecoderError::BadRange { .. })
        ));
    }
}
