use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::SinkError;
use super::event_sink::EventSink;
use super::module::{Module, ModuleData, ModuleEvent, ModuleKind};

/// Accumulated statistics of one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: usize,
    pub name: String,
    pub n_events: u64,
    pub pedestal_mean: f64,
    pub pedestal_err: f64,
    pub n_positive_peaks: u64,
    pub n_negative_peaks: u64,
}

impl ChannelSummary {
    fn add_pedestal(&mut self, mean: f64, err: f64) {
        self.n_events += 1;
        let n = self.n_events as f64;
        self.pedestal_mean += (mean - self.pedestal_mean) / n;
        self.pedestal_err += (err - self.pedestal_err) / n;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub name: String,
    pub crate_id: u16,
    pub bank: u16,
    pub slot: u8,
    pub kind: ModuleKind,
    pub n_events: u64,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub version: String,
    pub n_events: u64,
    /// Trigger times of the first and last events with module data
    pub first_trigger_time: Option<f64>,
    pub last_trigger_time: Option<f64>,
    pub modules: Vec<ModuleSummary>,
}

/// Writes per-channel statistics of a data file as a YAML summary on close
#[derive(Debug)]
pub struct SummaryWriter {
    path: PathBuf,
    summary: RunSummary,
}

impl SummaryWriter {
    pub fn new(path: &Path, modules: &[Module]) -> Self {
        let modules = modules
            .iter()
            .map(|module| ModuleSummary {
                name: module.name.clone(),
                crate_id: module.crate_id,
                bank: module.bank,
                slot: module.slot,
                kind: module.kind,
                n_events: 0,
                channels: module
                    .channels
                    .iter()
                    .map(|ch| ChannelSummary {
                        id: ch.id,
                        name: ch.name.clone(),
                        ..Default::default()
                    })
                    .collect(),
            })
            .collect();
        Self {
            path: path.to_path_buf(),
            summary: RunSummary {
                version: format!("{}:{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
                modules,
                ..Default::default()
            },
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn update_trigger_time(&mut self, time: f64) {
        self.summary.first_trigger_time.get_or_insert(time);
        self.summary.last_trigger_time = Some(time);
    }
}

impl EventSink for SummaryWriter {
    fn write_event(&mut self, _event_counter: u64, modules: &[ModuleData]) -> Result<(), SinkError> {
        let mut trigger_time = None;
        for (data, summary) in modules.iter().zip(self.summary.modules.iter_mut()) {
            if !data.has_data {
                continue;
            }
            summary.n_events += 1;
            match &data.event {
                ModuleEvent::Fadc250(event) => {
                    trigger_time.get_or_insert(event.time);
                    for channel in summary.channels.iter_mut() {
                        if !event.is_fired(channel.id) {
                            continue;
                        }
                        let Some(ch) = event.channel(channel.id) else {
                            continue;
                        };
                        channel.add_pedestal(ch.ped.mean, ch.ped.err);
                        for peak in ch.peaks.iter() {
                            if peak.height > 0.0 {
                                channel.n_positive_peaks += 1;
                            } else {
                                channel.n_negative_peaks += 1;
                            }
                        }
                    }
                }
            }
        }
        if let Some(time) = trigger_time {
            self.update_trigger_time(time);
        }
        self.summary.n_events += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut file = std::fs::File::create(&self.path)?;
        std::io::Write::write_all(&mut file, serde_yaml::to_string(&self.summary)?.as_bytes())?;
        log::info!(
            "{} events summarized in {}",
            self.summary.n_events,
            self.path.to_string_lossy()
        );
        Ok(())
    }
}
