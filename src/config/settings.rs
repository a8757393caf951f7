//! Robot settings

use crate::core::cycle::{DurabilityPlan, TimingConfig};
use crate::core::error::{Result, RobotError};
use crate::core::orchestrator::{CommanderConfig, DEFAULT_STARTUP_IMPORT};
use crate::core::repl::Command;
use crate::core::transport::{discover, SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Robot configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Serial connection
    pub serial: SerialSettings,
    /// Device timing table
    pub timing: TimingConfig,
    /// Log files
    pub logging: LoggingConfig,
    /// Statements run after connecting
    pub startup: StartupConfig,
    /// Cycle test defaults
    pub cycle: CycleSettings,
}

impl RobotConfig {
    /// Load from `path`, or from the default location when `None`
    ///
    /// An explicit path must exist. A missing default file yields the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match super::default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| RobotError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| RobotError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RobotError::Config(e.to_string()))
    }

    /// Save to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| RobotError::Config(e.to_string()))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory receiving session log files
    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .log_dir
            .clone()
            .or_else(super::log_dir)
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    /// Serial settings, discovering the port when none is configured
    pub fn serial_config(&self) -> Result<SerialConfig> {
        let port = match &self.serial.port {
            Some(port) => port.clone(),
            None => discover(&self.serial.device_description)?,
        };
        Ok(SerialConfig::new(&port, self.serial.baud_rate)
            .read_timeout(Duration::from_millis(self.serial.read_timeout_ms)))
    }

    /// Settings for the commander
    pub fn commander_config(&self) -> Result<CommanderConfig> {
        let startup_imports = self
            .startup
            .imports
            .iter()
            .map(Command::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(CommanderConfig {
            timing: self.timing,
            log_dir: self.log_dir(),
            session_per_cycle: self.logging.session_per_cycle,
            startup_imports,
        })
    }

    /// Durability loop described by the cycle defaults
    pub fn durability_plan(&self) -> DurabilityPlan {
        DurabilityPlan {
            slots: self.cycle.slots.clone(),
            num: self.cycle.num,
            press_ms: self.cycle.press_ms,
            retract_ms: self.cycle.retract_ms,
            pause: Duration::from_secs(self.cycle.pause_secs),
            rounds: self.cycle.rounds,
        }
    }
}

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Substring of the USB description used for discovery
    pub device_description: String,
    /// Fixed port name, skips discovery
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Soft read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device_description: "CH340".to_string(),
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Session log directory (platform data dir when unset)
    pub log_dir: Option<PathBuf>,
    /// New log file for every cycle test
    pub session_per_cycle: bool,
    /// Also write diagnostics to a daily rolling file in the log directory
    pub diagnostics_file: bool,
}

/// Startup statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Statements run with echo wait right after connecting
    pub imports: Vec<String>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            imports: vec![DEFAULT_STARTUP_IMPORT.to_string()],
        }
    }
}

/// Cycle test defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Slots visited by the durability loop
    pub slots: Vec<u8>,
    /// Repetitions per cycle test
    pub num: u32,
    /// Press duration in milliseconds
    pub press_ms: u64,
    /// Retract duration in milliseconds
    pub retract_ms: u64,
    /// Pause between cycle tests in seconds
    pub pause_secs: u64,
    /// Durability rounds, unlimited when unset
    pub rounds: Option<u32>,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            slots: vec![0, 1, 2],
            num: 5000,
            press_ms: 1500,
            retract_ms: 2000,
            pause_secs: 60,
            rounds: None,
        }
    }
}
