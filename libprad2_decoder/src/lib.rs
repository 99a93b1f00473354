//! # prad2_decoder
//!
//! prad2_decoder is a decoder for the CODA/evio data of JLab flash ADC readouts, written in
//! Rust. It takes the built events of a CODA run in the form of evio version 4 files,
//! locates the data of every configured FADC250 module, decodes the raw waveforms, and
//! extracts pedestals and pulses from them.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installing the tool chain, then
//! run `cargo install --path ./prad2_decoder_cli` from the repository.
//!
//! ### HDF5
//!
//! Writing HDF5 output requires the `hdf5` feature (`--features hdf5`) and an HDF5
//! installation. Typically this will be installed using a package manager (homebrew, apt,
//! etc), and the Rust libraries will auto detect the location of the HDF install. If HDF5 is
//! installed to a custom location, write the following snippet into `.cargo/config.toml`:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//! ```
//!
//! Without the feature the decoder writes only the YAML summary of each data file.
//!
//! ## Structure
//!
//! Decoding proceeds in layers, each usable on its own:
//!
//! - [`evio_header`]: bit-exact codecs for the evio container headers and the JLab
//!   block/event marker words.
//! - [`bank_scanner`]: walks the bank tree of an event and annotates raw buffers.
//! - [`block_framer`]: finds the word range of every logical event of every module
//!   (crate, bank, slot) inside a built event.
//! - [`fadc250_decoder`]: decodes one event range of an FADC250 into a [`fadc250_event::Fadc250Event`].
//! - [`wf_analyzer`]: finds the pedestal and the peaks of a waveform.
//! - [`process`]: drives the above over the files of a run, writing to
//!   [`event_sink::EventSink`]s.
//!
//! ## Configuration
//!
//! The CLI is configured with a YAML file. Create a template with
//! `prad2_decoder_cli new -p config.yml`. The format is as follows:
//!
//! ```yml
//! data_paths:
//! - /data/prad_001234.evio
//! output_path: /data/decoded
//! n_events: -1
//! n_threads: 1
//! clock_period: 4.0
//! physics_only: true
//! analyzer:
//!   resolution: 3
//!   threshold: 20.0
//!   n_pedestal: 8
//!   flatness: 1.0
//! interesting_banks:
//! - 3
//! modules:
//! - name: fadc_1_3_3
//!   crate_id: 1
//!   bank: 3
//!   slot: 3
//!   kind: Fadc250
//!   channels:
//!   - id: 0
//!     name: ch0
//! ```
//!
//! Each entry of `data_paths` is the base name of a run; its split files
//! (`prad_001234.evio.0`, `prad_001234.evio.1`, ...) are read in order. Data files are
//! divided among `n_threads` workers. `n_events` limits the number of logical events
//! decoded per data file (negative for all). An empty `interesting_banks` keeps every
//! data bank.
//!
//! ## Output
//!
//! For every data file `<name>.evio` the decoder writes `<name>_summary.yml` to the output
//! directory, holding per-channel pedestal averages and peak counts. With the `hdf5`
//! feature it also writes `<name>.h5`:
//!
//! ```text
//! events - min_event, max_event, first_time, last_time, version
//! |---- event_#
//! |    |---- <module name> - number, timestamp, time, mode
//! |    |    |---- <channel name>(dset) - ped_mean, ped_err
//! |    |    |---- <channel name>_peaks(dset, pos, left, right, height, integral, time)
//! ```
pub mod bank_scanner;
pub mod block_framer;
pub mod config;
pub mod constants;
pub mod error;
pub mod event_sink;
pub mod evio_file;
pub mod evio_header;
pub mod evio_stack;
pub mod fadc250_decoder;
pub mod fadc250_event;
#[cfg(feature = "hdf5")]
pub mod hdf_writer;
pub mod module;
pub mod process;
pub mod summary_writer;
pub mod wf_analyzer;
pub mod worker_status;

#[cfg(test)]
mod testing;
