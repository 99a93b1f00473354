use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::block_framer::BufferAddress;
use super::constants::FADC250_DEFAULT_CLOCK_PERIOD;
use super::error::ConfigError;
use super::module::{ChannelConfig, Module, ModuleKind};
use super::wf_analyzer::AnalyzerConfig;

/// Structure representing the application configuration. Contains the data files, the
/// modules to decode, and the analysis parameters.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub n_events: i64,
    pub n_threads: i32,
    pub clock_period: f64,
    pub physics_only: bool,
    pub analyzer: AnalyzerConfig,
    pub interesting_banks: Vec<u16>,
    pub modules: Vec<Module>,
}

impl Default for Config {
    /// Generate a template Config, with a single example FADC250 module
    fn default() -> Self {
        Self {
            data_paths: vec![PathBuf::from("None")],
            output_path: PathBuf::from("None"),
            n_events: -1,
            n_threads: 1,
            clock_period: FADC250_DEFAULT_CLOCK_PERIOD,
            physics_only: true,
            analyzer: AnalyzerConfig::default(),
            interesting_banks: vec![3],
            modules: vec![Module {
                name: String::from("fadc_1_3_3"),
                crate_id: 1,
                bank: 3,
                slot: 3,
                kind: ModuleKind::Fadc250,
                channels: (0..ModuleKind::Fadc250.nchannels())
                    .map(|id| ChannelConfig {
                        id,
                        name: format!("ch{id}"),
                    })
                    .collect(),
            }],
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful and consistent
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check that no two modules share an address and every channel exists
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut addresses = FxHashSet::default();
        for module in self.modules.iter() {
            if !addresses.insert(module.address()) {
                return Err(ConfigError::DuplicateModule(module.address()));
            }
            module.validate()?;
        }
        Ok(())
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    /// Has the event limit been reached
    pub fn is_event_limit_reached(&self, n_processed: u64) -> bool {
        self.n_events >= 0 && n_processed >= self.n_events as u64
    }

    pub fn module_addresses(&self) -> Vec<BufferAddress> {
        self.modules.iter().map(|m| m.address()).collect()
    }

    /// Get the path to an output file for a given data file, with the given suffix
    pub fn get_output_file_name(
        &self,
        data_path: &Path,
        suffix: &str,
    ) -> Result<PathBuf, ConfigError> {
        if !self.output_path.exists() {
            return Err(ConfigError::BadFilePath(self.output_path.clone()));
        }
        let stem = data_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        // run.evio.3 -> run_3
        let stem = stem.replace(".evio.", "_").replace(".evio", "");
        Ok(self.output_path.join(format!("{stem}{suffix}")))
    }
}
