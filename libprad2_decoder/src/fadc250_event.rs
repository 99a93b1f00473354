use bitvec::prelude::*;
use serde::Serialize;

use super::constants::FADC250_CHANNELS;
use super::error::DecoderError;

/// Baseline level of a waveform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pedestal {
    pub mean: f64,
    pub err: f64,
}

/// A pulse found in a waveform.
///
/// `height` is relative to the pedestal (negative for pulses below it), `left` and
/// `right` are the inclusive integration bounds, and `integral` is the
/// pedestal-subtracted sum of the raw samples between them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Peak {
    pub pos: usize,
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub integral: f64,
}

/// The data of one FADC250 channel for one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fadc250Data {
    pub raw: Vec<u16>,
    pub ped: Pedestal,
    pub peaks: Vec<Peak>,
    pub integrals: Vec<u32>,
    pub pulse_times: Vec<u32>,
}

impl Fadc250Data {
    /// Empty the channel, keeping the allocations
    pub fn clear(&mut self) {
        self.raw.clear();
        self.ped = Pedestal::default();
        self.peaks.clear();
        self.integrals.clear();
        self.pulse_times.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.integrals.is_empty() && self.pulse_times.is_empty()
    }
}

/// One logical FADC250 event.
///
/// The channels are a fixed set of slots indexed by channel id, allocated once and
/// cleared between events. `fired` marks the channels written since the last clear
/// so clearing only touches those.
#[derive(Debug, Clone, PartialEq)]
pub struct Fadc250Event {
    pub number: u32,
    pub mode: u32,
    pub timestamp: u64,
    pub time: f64,
    channels: Vec<Fadc250Data>,
    fired: BitVec,
}

impl Default for Fadc250Event {
    fn default() -> Self {
        Self::new(FADC250_CHANNELS)
    }
}

impl Fadc250Event {
    pub fn new(nchannels: usize) -> Self {
        Self {
            number: 0,
            mode: 0,
            timestamp: 0,
            time: 0.0,
            channels: vec![Fadc250Data::default(); nchannels],
            fired: bitvec![0; nchannels],
        }
    }

    pub fn clear(&mut self) {
        self.number = 0;
        self.mode = 0;
        self.timestamp = 0;
        self.time = 0.0;
        for ch in self.fired.iter_ones() {
            self.channels[ch].clear();
        }
        self.fired.fill(false);
    }

    pub fn nchannels(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Fadc250Data] {
        &self.channels
    }

    pub fn channel(&self, ch: usize) -> Option<&Fadc250Data> {
        self.channels.get(ch)
    }

    /// Mutable access to a channel slot; marks the channel as fired
    pub fn channel_mut(&mut self, ch: usize) -> Result<&mut Fadc250Data, DecoderError> {
        let nchannels = self.channels.len();
        match self.channels.get_mut(ch) {
            Some(data) => {
                self.fired.set(ch, true);
                Ok(data)
            }
            None => Err(DecoderError::BadChannel {
                channel: ch,
                nchannels,
            }),
        }
    }

    pub fn is_fired(&self, ch: usize) -> bool {
        self.fired.get(ch).is_some_and(|bit| *bit)
    }

    /// Channel ids written since the last clear, in ascending order
    pub fn fired_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.fired.iter_ones()
    }

    pub fn fired_channels_mut(&mut self) -> impl Iterator<Item = (usize, &mut Fadc250Data)> + '_ {
        let fired = &self.fired;
        self.channels
            .iter_mut()
            .enumerate()
            .filter(move |(ch, _)| fired[*ch])
    }
}
