use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::block_framer::{BufferAddress, BufferInfo};
use super::constants::{FADC250_CHANNELS, FADC250_DEFAULT_CLOCK_PERIOD};
use super::error::{ConfigError, DecoderError};
use super::fadc250_decoder::Fadc250Decoder;
use super::fadc250_event::Fadc250Event;
use super::wf_analyzer::Analyzer;

/// The electronics modules the decoder understands.
///
/// Each kind owns its event type and decode routine; adding a module means adding a
/// variant here and handling it in every match below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    #[default]
    Fadc250,
}

impl Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fadc250 => write!(f, "FADC250"),
        }
    }
}

impl ModuleKind {
    pub fn nchannels(&self) -> usize {
        match self {
            Self::Fadc250 => FADC250_CHANNELS,
        }
    }

    /// An empty event of this kind, ready for reuse across events
    pub fn new_event(&self) -> ModuleEvent {
        match self {
            Self::Fadc250 => ModuleEvent::Fadc250(Fadc250Event::new(self.nchannels())),
        }
    }
}

/// Decoders for every module kind, configured once per worker
#[derive(Debug, Clone, Copy)]
pub struct ModuleDecoder {
    fadc250: Fadc250Decoder,
}

impl ModuleDecoder {
    pub fn new(clock_period: f64) -> Self {
        Self {
            fadc250: Fadc250Decoder::new(clock_period),
        }
    }
}

impl Default for ModuleDecoder {
    fn default() -> Self {
        Self::new(FADC250_DEFAULT_CLOCK_PERIOD)
    }
}

/// The decoded data of one module for one logical event
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    Fadc250(Fadc250Event),
}

impl ModuleEvent {
    pub fn clear(&mut self) {
        match self {
            Self::Fadc250(event) => event.clear(),
        }
    }

    /// Decode the event range `info` of `buffer` into this event
    pub fn decode(
        &mut self,
        decoder: &ModuleDecoder,
        buffer: &[u32],
        info: &BufferInfo,
    ) -> Result<(), DecoderError> {
        match self {
            Self::Fadc250(event) => decoder.fadc250.decode_range(event, buffer, info),
        }
    }

    /// Run the waveform analysis on the fired channels listed in `channels`
    pub fn analyze(&mut self, analyzer: &Analyzer, channels: &[ChannelConfig]) {
        match self {
            Self::Fadc250(event) => {
                for (id, data) in event.fired_channels_mut() {
                    if channels.iter().any(|ch| ch.id == id) {
                        analyzer.analyze_into(data);
                    }
                }
            }
        }
    }

    pub fn as_fadc250(&self) -> Option<&Fadc250Event> {
        match self {
            Self::Fadc250(event) => Some(event),
        }
    }
}

/// A named channel of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: usize,
    pub name: String,
}

/// A module as declared in the configuration, located by its crate, bank and slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub crate_id: u16,
    pub bank: u16,
    pub slot: u8,
    #[serde(default)]
    pub kind: ModuleKind,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl Module {
    pub fn address(&self) -> BufferAddress {
        BufferAddress::new(self.crate_id, self.bank, self.slot)
    }

    /// Check that every configured channel exists on this kind of module
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nchannels = self.kind.nchannels();
        match self.channels.iter().find(|ch| ch.id >= nchannels) {
            Some(ch) => Err(ConfigError::BadChannel {
                module: self.name.clone(),
                channel: ch.id,
                nchannels,
            }),
            None => Ok(()),
        }
    }
}

/// Runtime state of one configured module: its configuration and its reusable event
#[derive(Debug, Clone)]
pub struct ModuleData {
    pub module: Module,
    pub event: ModuleEvent,
    pub has_data: bool,
}

impl ModuleData {
    pub fn new(module: &Module) -> Self {
        Self {
            event: module.kind.new_event(),
            module: module.clone(),
            has_data: false,
        }
    }

    pub fn clear(&mut self) {
        self.event.clear();
        self.has_data = false;
    }
}
