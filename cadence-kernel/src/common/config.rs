/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     you may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::Path;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::common::{KernelError, Time};

/// Configuration for the Cadence kernel.
///
/// Loaded from TOML files in XDG-compliant directories. Every component that
/// reads configuration also accepts an explicit `KernelConfig`, which takes
/// precedence over the global [`CONFIG`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Receiver sizing
    pub receivers: ReceiverConfig,
    /// Process director behavior
    pub process: ProcessConfig,
    /// Sequential director behavior
    pub sequential: SequentialConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
    /// Path configuration for various directories
    pub paths: PathsConfig,
}

/// Receiver sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Initial capacity of the blocking queues allocated by the process director
    pub blocking_queue_capacity: usize,
    /// Capacity of the queues allocated by the sequential director; `None` is unbounded
    pub sequential_queue_capacity: Option<usize>,
}

/// Process director behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Grow the smallest full queue when every live thread is blocked and at
    /// least one of them is blocked writing
    pub grow_queues_on_deadlock: bool,
    /// Upper bound for queue growth
    pub max_queue_capacity: usize,
}

/// Sequential director behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialConfig {
    /// Number of iterations after which postfire returns false; 0 runs until
    /// every actor finishes or stop is requested
    pub iterations: u64,
    /// Model time at initialize
    pub start_time: f64,
}

/// Tracing and logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    /// Also write logs to a file in `log_directory`
    pub log_to_file: bool,
    /// Directory for log files
    pub log_directory: String,
    /// Log file name
    pub log_file: String,
}

/// Path configuration for various directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for data files
    pub data_directory: String,
    /// Directory for configuration files
    pub config_directory: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            blocking_queue_capacity: 1,
            sequential_queue_capacity: None,
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            grow_queues_on_deadlock: false,
            max_queue_capacity: 65_536,
        }
    }
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            iterations: 0,
            start_time: 0.0,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_directory: "~/.local/share/cadence/logs".to_string(),
            log_file: "cadence.log".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_directory: "~/.local/share/cadence".to_string(),
            config_directory: "~/.config/cadence".to_string(),
        }
    }
}

impl KernelConfig {
    /// Model time the sequential director starts from.
    #[must_use]
    pub const fn start_time(&self) -> Time {
        Time::new(self.sequential.start_time)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] when the text is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self, KernelError> {
        toml::from_str::<Self>(text).map_err(|e| KernelError::Config(e.to_string()))
    }

    /// Reads and parses a specific configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] when the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, KernelError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `cadence/config.toml` under `$XDG_CONFIG_HOME` (falling back
    /// to `~/.config`). If no configuration file is found, returns the default
    /// configuration. If a configuration file exists but is malformed, logs an
    /// error and uses defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("cadence") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => {
                info!("Successfully loaded configuration");
                config
            }
            Err(e) => {
                error!("{e}; falling back to defaults");
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: KernelConfig = KernelConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config = KernelConfig::from_toml_str(
            r"
            [receivers]
            blocking_queue_capacity = 4

            [sequential]
            iterations = 10
            ",
        )
        .unwrap();
        assert_eq!(config.receivers.blocking_queue_capacity, 4);
        assert_eq!(config.receivers.sequential_queue_capacity, None);
        assert_eq!(config.sequential.iterations, 10);
        assert_eq!(config.process, ProcessConfig::default());
        assert_eq!(config.tracing.level, "info");
    }

    #[test]
    fn malformed_text_is_a_config_error() {
        let err = KernelConfig::from_toml_str("[process]\nmax_queue_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }
}
