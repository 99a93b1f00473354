use hdf5::types::VarLenUnicode;
use hdf5::File;
use ndarray::Array2;
use std::path::Path;
use std::str::FromStr;

use super::error::SinkError;
use super::event_sink::EventSink;
use super::fadc250_event::Fadc250Event;
use super::module::{ModuleData, ModuleEvent};

const EVENTS_NAME: &str = "events";
const PEAKS_SUFFIX: &str = "_peaks";

// All event counters start from 0
const START_EVENT_NUMBER: u64 = 0;
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";
/// Columns of the peak matrix: pos, left, right, height, integral, time
const PEAK_COLUMNS: usize = 6;

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing decoded logical events.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    events_group: hdf5::Group,
    clock_period: f64,
    last_event: u64,
    first_time: Option<f64>,
    last_time: f64,
}
// Structure
// events - min_event, max_event, first_time, last_time, version
// |---- event_#
// |    |---- <module name> - number, timestamp, time, mode
// |    |    |---- <channel name>(dset) - ped_mean, ped_err
// |    |    |---- <channel name>_peaks(dset, N x 6)

impl HDFWriter {
    /// Create the writer, opening a file at path and creating the events group
    pub fn new(path: &Path, clock_period: f64) -> Result<Self, SinkError> {
        let file_handle = File::create(path)?;
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);

        let events_group = file_handle.create_group(EVENTS_NAME)?;
        events_group.new_attr::<u64>().create("min_event")?;
        events_group.new_attr::<u64>().create("max_event")?;
        events_group.new_attr::<f64>().create("first_time")?;
        events_group.new_attr::<f64>().create("last_time")?;
        if let Ok(version) = VarLenUnicode::from_str(&version) {
            events_group
                .new_attr::<VarLenUnicode>()
                .create("version")?
                .write_scalar(&version)?;
        }

        Ok(Self {
            file_handle,
            events_group,
            clock_period,
            last_event: 0,
            first_time: None,
            last_time: 0.0,
        })
    }

    fn write_fadc250(
        &self,
        group: &hdf5::Group,
        data: &ModuleData,
        event: &Fadc250Event,
    ) -> Result<(), SinkError> {
        group.new_attr::<u32>().create("number")?.write_scalar(&event.number)?;
        group.new_attr::<u64>().create("timestamp")?.write_scalar(&event.timestamp)?;
        group.new_attr::<f64>().create("time")?.write_scalar(&event.time)?;
        group.new_attr::<u32>().create("mode")?.write_scalar(&event.mode)?;

        for channel in data.module.channels.iter() {
            if !event.is_fired(channel.id) {
                continue;
            }
            let Some(ch) = event.channel(channel.id) else {
                continue;
            };
            let raw_dset = group
                .new_dataset_builder()
                .with_data(ch.raw.as_slice())
                .create(channel.name.as_str())?;
            raw_dset.new_attr::<f64>().create("ped_mean")?.write_scalar(&ch.ped.mean)?;
            raw_dset.new_attr::<f64>().create("ped_err")?.write_scalar(&ch.ped.err)?;

            let mut peak_matrix = Array2::<f64>::zeros([ch.peaks.len(), PEAK_COLUMNS]);
            for (row, peak) in ch.peaks.iter().enumerate() {
                peak_matrix[[row, 0]] = peak.pos as f64;
                peak_matrix[[row, 1]] = peak.left as f64;
                peak_matrix[[row, 2]] = peak.right as f64;
                peak_matrix[[row, 3]] = peak.height;
                peak_matrix[[row, 4]] = peak.integral;
                peak_matrix[[row, 5]] = peak.pos as f64 * self.clock_period;
            }
            group
                .new_dataset_builder()
                .with_data(&peak_matrix)
                .create(format!("{}{PEAKS_SUFFIX}", channel.name).as_str())?;
        }
        Ok(())
    }
}

impl EventSink for HDFWriter {
    /// Write a logical event, one group per module with data
    fn write_event(&mut self, event_counter: u64, modules: &[ModuleData]) -> Result<(), SinkError> {
        let event_group = self
            .events_group
            .create_group(&format!("event_{}", event_counter))?;
        let mut time = None;
        for data in modules.iter().filter(|data| data.has_data) {
            let module_group = event_group.create_group(&data.module.name)?;
            match &data.event {
                ModuleEvent::Fadc250(event) => {
                    time.get_or_insert(event.time);
                    self.write_fadc250(&module_group, data, event)?;
                }
            }
        }

        if let Some(time) = time {
            self.first_time.get_or_insert(time);
            self.last_time = time;
        }
        self.last_event = self.last_event.max(event_counter);
        Ok(())
    }

    /// Write meta information on first and last events
    fn close(&mut self) -> Result<(), SinkError> {
        let first_time = self.first_time.unwrap_or(self.last_time);
        self.events_group
            .attr("min_event")?
            .write_scalar(&START_EVENT_NUMBER)?;
        self.events_group
            .attr("max_event")?
            .write_scalar(&self.last_event)?;
        self.events_group
            .attr("first_time")?
            .write_scalar(&first_time)?;
        self.events_group
            .attr("last_time")?
            .write_scalar(&self.last_time)?;
        self.file_handle.flush()?;
        log::info!(
            "{} events written to {}. Run lasted {:.3} seconds.",
            self.last_event + 1,
            self.file_handle.filename(),
            (self.last_time - first_time) * 1.0e-9,
        );
        Ok(())
    }
}
