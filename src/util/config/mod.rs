//! gcharness configuration
//!
//! A single TOML file describes the heap, the VM and the workload.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Config file (--config)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use gcharness::util::config::HarnessConfig;
//!
//! let config = HarnessConfig::from_toml_str("[gc]\nheap_size = 64\n").unwrap();
//! assert_eq!(config.gc.heap_size, 64);
//! assert_eq!(config.gc.cell_size, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::runtime::gc::{AllocatorKind, GCConfig};
use crate::util::logger::LogLevel;
use crate::vm::VMConfig;
use crate::workload::WorkloadConfig;

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    /// Heap and collector settings
    #[serde(default)]
    pub gc: GcSection,
    /// VM settings
    #[serde(default)]
    pub vm: VmSection,
    /// Workload settings
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Log settings
    #[serde(default)]
    pub log: LogSection,
}

/// `[gc]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcSection {
    /// Heap size in cells, including the reserved null index
    #[serde(default = "default_heap_size")]
    pub heap_size: usize,
    /// Slots per cell
    #[serde(default = "default_cell_size")]
    pub cell_size: usize,
    /// Collection strategy
    #[serde(default)]
    pub strategy: AllocatorKind,
    /// Pause warning threshold in milliseconds
    #[serde(default = "default_max_pause_ms")]
    pub max_pause_ms: u64,
}

fn default_heap_size() -> usize {
    GCConfig::default().heap_size
}

fn default_cell_size() -> usize {
    GCConfig::default().cell_size
}

fn default_max_pause_ms() -> u64 {
    10
}

impl Default for GcSection {
    fn default() -> Self {
        Self {
            heap_size: default_heap_size(),
            cell_size: default_cell_size(),
            strategy: AllocatorKind::default(),
            max_pause_ms: default_max_pause_ms(),
        }
    }
}

/// `[vm]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSection {
    /// Maximum call depth per mutator thread
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Trace frame operations at debug level
    #[serde(default)]
    pub trace_execution: bool,
}

fn default_max_call_depth() -> usize {
    VMConfig::default().max_call_depth
}

impl Default for VmSection {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
            trace_execution: false,
        }
    }
}

/// `[log]` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogSection {
    #[serde(default)]
    pub level: LogLevel,
}

impl HarnessConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::ParseError)
    }

    /// Render as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Collector configuration.
    pub fn gc_config(&self) -> GCConfig {
        GCConfig {
            heap_size: self.gc.heap_size,
            cell_size: self.gc.cell_size,
            strategy: self.gc.strategy,
            max_pause: Duration::from_millis(self.gc.max_pause_ms),
        }
    }

    /// VM configuration.
    pub fn vm_config(&self) -> VMConfig {
        VMConfig {
            max_call_depth: self.vm.max_call_depth,
            trace_execution: self.vm.trace_execution,
        }
    }
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    HarnessConfig::from_toml_str(&content)
}

/// Save a configuration file, creating parent directories as needed
pub fn save_config(
    path: &Path,
    config: &HarnessConfig,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }
    let content = config.to_toml_string()?;
    fs::write(path, content).map_err(ConfigError::IoError)?;
    Ok(())
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
