use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::block_framer::{BlockFramer, EventTag};
use super::config::Config;
use super::error::{ProcessorError, SinkError};
use super::event_sink::{EventSink, SinkList};
use super::evio_stack::EvioStack;
use super::module::{ModuleData, ModuleDecoder};
use super::summary_writer::SummaryWriter;
use super::wf_analyzer::Analyzer;
use super::worker_status::{BarColor, WorkerStatus};

const SUMMARY_SUFFIX: &str = "_summary.yml";
#[cfg(feature = "hdf5")]
const HDF_SUFFIX: &str = ".h5";

/// The decode state of one worker: framer, decoders, analyzer, and the reusable
/// module events.
#[derive(Debug)]
pub struct EventProcessor {
    framer: BlockFramer,
    decoder: ModuleDecoder,
    analyzer: Analyzer,
    modules: Vec<ModuleData>,
    physics_only: bool,
}

impl EventProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            framer: BlockFramer::new(&config.interesting_banks, &config.module_addresses()),
            decoder: ModuleDecoder::new(config.clock_period),
            analyzer: Analyzer::new(config.analyzer.clone()),
            modules: config.modules.iter().map(ModuleData::new).collect(),
            physics_only: config.physics_only,
        }
    }

    pub fn modules(&self) -> &[ModuleData] {
        &self.modules
    }

    /// Decode one built event and hand each of its logical events to the sink.
    ///
    /// Returns the number of logical events written, at most `max_events`. Problems
    /// with the event data are logged and the event skipped; only sink failures are
    /// returned as errors.
    pub fn process_event(
        &mut self,
        buffer: &[u32],
        sink: &mut dyn EventSink,
        first_counter: u64,
        max_events: u64,
    ) -> Result<u64, SinkError> {
        let tag = match EventTag::of_event(buffer) {
            Ok(tag) => tag,
            Err(e) => {
                log::warn!("Skipping unreadable event: {e}");
                return Ok(0);
            }
        };
        if tag.is_control() {
            log::info!("Found {tag:?} event");
            if self.physics_only {
                return Ok(0);
            }
        }

        let frame = match self.framer.frame_event(buffer) {
            Ok(frame) => frame,
            Err(e) => {
                if tag.is_control() {
                    log::debug!("{tag:?} event has no module data: {e}");
                } else {
                    log::warn!("Skipping event: {e}");
                }
                return Ok(0);
            }
        };

        // Every module contributes its i-th event range to logical event i
        let n_logical = self
            .modules
            .iter()
            .map(|data| frame.ranges(&data.module.address()).len())
            .max()
            .unwrap_or(0) as u64;

        let mut written = 0;
        while written < n_logical.min(max_events) {
            let index = written as usize;
            for data in self.modules.iter_mut() {
                data.clear();
                let Some(info) = frame.ranges(&data.module.address()).get(index) else {
                    continue;
                };
                match data.event.decode(&self.decoder, buffer, info) {
                    Ok(()) => {
                        data.event.analyze(&self.analyzer, &data.module.channels);
                        data.has_data = true;
                    }
                    Err(e) => {
                        log::warn!("Failed to decode module {}: {e}", data.module.name);
                        data.clear();
                    }
                }
            }
            sink.write_event(first_counter + written, &self.modules)?;
            written += 1;
        }
        Ok(written)
    }
}

/// The sinks for one data file, written next to each other in the output directory
fn create_sinks(config: &Config, data_path: &Path) -> Result<SinkList, ProcessorError> {
    let mut sinks = SinkList::new();
    let summary_path = config.get_output_file_name(data_path, SUMMARY_SUFFIX)?;
    sinks.push(Box::new(SummaryWriter::new(&summary_path, &config.modules)));
    #[cfg(feature = "hdf5")]
    {
        let hdf_path = config.get_output_file_name(data_path, HDF_SUFFIX)?;
        sinks.push(Box::new(super::hdf_writer::HDFWriter::new(
            &hdf_path,
            config.clock_period,
        )?));
    }
    Ok(sinks)
}

/// The main loop of the decoder.
///
/// Decodes every event of one data file (and its split files) and writes the
/// results, reporting progress over `tx`. Returns the number of logical events
/// written.
pub fn process_file(
    config: &Config,
    file_number: usize,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<u64, ProcessorError> {
    let data_path = &config.data_paths[file_number];
    let mut stack = EvioStack::new(data_path)?;
    let mut sinks = create_sinks(config, data_path)?;
    let mut processor = EventProcessor::new(config);

    let total_data_size = stack.total_stack_size_bytes;
    log::info!(
        "Total size of {}: {}",
        data_path.to_string_lossy(),
        human_bytes::human_bytes(total_data_size as f64)
    );
    let flush_frac: f32 = 0.01;
    let flush_val = (total_data_size as f64 * flush_frac as f64) as u64;
    let mut count = 0;
    let mut progress: f32 = 0.0;

    tx.send(WorkerStatus::new(0.0, file_number, *worker_id, BarColor::CYAN))?;
    let mut buffer: Vec<u32> = Vec::new();
    let mut event_counter = 0;
    while stack.read_event(&mut buffer)? {
        count += (buffer.len() * 4) as u64;
        if count > flush_val {
            count = 0;
            progress += flush_frac;
            tx.send(WorkerStatus::new(
                progress,
                file_number,
                *worker_id,
                BarColor::CYAN,
            ))?;
        }

        let max_events = if config.n_events < 0 {
            u64::MAX
        } else {
            (config.n_events as u64).saturating_sub(event_counter)
        };
        event_counter += processor.process_event(&buffer, &mut sinks, event_counter, max_events)?;
        if config.is_event_limit_reached(event_counter) {
            log::info!("Reached the limit of {} events", config.n_events);
            break;
        }
    }
    sinks.close()?;

    tx.send(WorkerStatus::new(1.0, file_number, *worker_id, BarColor::GREEN))?;
    log::info!(
        "Done with {}: {} events decoded.",
        data_path.to_string_lossy(),
        event_counter
    );
    Ok(event_counter)
}

/// Process a subset of the data files, stopping at the first failed file
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<usize>,
) -> Result<(), ProcessorError> {
    for file_number in subset {
        let path: &PathBuf = &config.data_paths[file_number];
        log::info!("Processing {}...", path.to_string_lossy());
        if let Err(e) = process_file(&config, file_number, &tx, &worker_id) {
            // the front end may already be gone
            let _ = tx.send(WorkerStatus::new(0.0, file_number, worker_id, BarColor::RED));
            return Err(e);
        }
        log::info!("Finished processing {}.", path.to_string_lossy());
    }
    Ok(())
}

/// Divide the data files in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<usize>> {
    let mut subsets: Vec<Vec<usize>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for idx in 0..config.data_paths.len() {
        subsets[idx % n_subsets].push(idx)
    }

    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evio_header::DataType;
    use crate::module::ModuleEvent;
    use crate::summary_writer::RunSummary;
    use crate::testing::{
        evio_blocks, fadc_block, fadc_event_words, physics_event, wrap_bank, write_words,
    };
    use byteorder::LittleEndian;
    use tempfile::tempdir;

    /// Keeps the raw samples of channel 0 of every module for each logical event
    #[derive(Default)]
    struct Collector {
        events: Vec<(u64, Vec<Option<Vec<u16>>>)>,
    }

    impl EventSink for Collector {
        fn write_event(&mut self, event_counter: u64, modules: &[ModuleData]) -> Result<(), SinkError> {
            let samples = modules
                .iter()
                .map(|data| match &data.event {
                    ModuleEvent::Fadc250(event) if data.has_data => {
                        event.channel(0).map(|ch| ch.raw.clone())
                    }
                    _ => None,
                })
                .collect();
            self.events.push((event_counter, samples));
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.interesting_banks = vec![3];
        let mut second = config.modules[0].clone();
        second.name = String::from("fadc_1_3_4");
        second.slot = 4;
        config.modules.push(second);
        config
    }

    fn two_event_block(slot: u8) -> Vec<u32> {
        fadc_block(
            slot,
            0,
            &[
                fadc_event_words(slot, 1, 100, &[(0, &[1, 2, 3])]),
                fadc_event_words(slot, 2, 200, &[(0, &[4, 5])]),
            ],
        )
    }

    #[test]
    fn test_logical_events() {
        let mut data_bank = two_event_block(3);
        // slot 4 only reads out the first event
        data_bank.extend(fadc_block(4, 0, &[fadc_event_words(4, 1, 100, &[(0, &[9])])]));
        let buffer = physics_event(2, &[(1, vec![(3, data_bank)])]);

        let mut processor = EventProcessor::new(&test_config());
        let mut sink = Collector::default();
        let written = processor.process_event(&buffer, &mut sink, 10, u64::MAX).unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            sink.events,
            vec![
                (10, vec![Some(vec![1, 2, 3]), Some(vec![9])]),
                (11, vec![Some(vec![4, 5]), None]),
            ]
        );

        let written = processor.process_event(&buffer, &mut sink, 12, 1).unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn test_control_and_broken_events_are_skipped() {
        let mut processor = EventProcessor::new(&test_config());
        let mut sink = Collector::default();
        let go = wrap_bank(0xffd2, DataType::UInt32, 0, &[0, 1, 0]);
        assert_eq!(processor.process_event(&go, &mut sink, 0, u64::MAX).unwrap(), 0);
        let broken = wrap_bank(0xff50, DataType::UInt32, 0, &[1, 2]);
        assert_eq!(processor.process_event(&broken, &mut sink, 0, u64::MAX).unwrap(), 0);
        assert_eq!(processor.process_event(&[7], &mut sink, 0, u64::MAX).unwrap(), 0);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_process_file() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        let data_path = dir.join("run.evio");
        let physics = physics_event(2, &[(1, vec![(3, two_event_block(3))])]);
        let prestart = wrap_bank(0xffd1, DataType::UInt32, 0, &[0, 12, 1]);
        let events = vec![prestart, physics.clone(), physics];
        write_words::<LittleEndian>(&data_path, &evio_blocks(&events, 2));

        let mut config = test_config();
        config.data_paths = vec![data_path];
        config.output_path = dir.to_path_buf();
        config.n_events = 3;
        let (tx, rx) = std::sync::mpsc::channel();
        let n_events = process_file(&config, 0, &tx, &0).unwrap();
        assert_eq!(n_events, 3);
        let last = rx.try_iter().last().unwrap();
        assert_eq!(last.progress, 1.0);
        assert_eq!(last.color, BarColor::GREEN);

        let text = std::fs::read_to_string(dir.join("run_summary.yml")).unwrap();
        let summary: RunSummary = serde_yaml::from_str(&text).unwrap();
        assert_eq!(summary.n_events, 3);
        assert_eq!(summary.modules[0].n_events, 3);
        assert_eq!(summary.modules[1].n_events, 0);
    }

    #[test]
    fn test_failed_file_turns_bar_red() {
        let temp = tempdir().unwrap();
        let mut config = test_config();
        config.data_paths = vec![temp.path().join("missing.evio")];
        config.output_path = temp.path().to_path_buf();
        let (tx, rx) = std::sync::mpsc::channel();
        assert!(process_subset(config, tx, 1, vec![0]).is_err());
        let statuses: Vec<WorkerStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].color, BarColor::RED);
        assert_eq!(statuses[0].worker_id, 1);
    }

    #[test]
    fn test_create_subsets() {
        let mut config = Config::default();
        config.n_threads = 2;
        config.data_paths = (0..5).map(|i| PathBuf::from(format!("run.evio.{i}"))).collect();
        assert_eq!(create_subsets(&config), vec![vec![0, 2, 4], vec![1, 3]]);
    }
}
