//! Configuration resolution for timekeep.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/timekeep/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`TIMEKEEP_*`)
//! 5. CLI arguments (highest priority, applied by the binary)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::PoolSettings;
use crate::error::{Error, Result};

/// Complete timekeep configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub attendance: AttendanceConfig,
    #[serde(default)]
    pub terminals: TerminalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage location and pool tuning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub pool: PoolSettings,
}

/// Working-day rules used when deriving lateness and early leave.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    #[serde(with = "hhmm")]
    pub standard_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub standard_end: NaiveTime,
    /// Per-department shift windows, keyed by department name.
    #[serde(default)]
    pub departments: HashMap<String, ShiftWindow>,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            standard_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            standard_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            departments: HashMap::new(),
        }
    }
}

impl AttendanceConfig {
    /// The shift window that applies to an employee of `department`.
    pub fn window_for(&self, department: Option<&str>) -> ShiftWindow {
        department
            .and_then(|d| self.departments.get(d))
            .copied()
            .unwrap_or(ShiftWindow {
                standard_start: self.standard_start,
                standard_end: self.standard_end,
            })
    }
}

/// Expected arrival and departure times for one working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    #[serde(with = "hhmm")]
    pub standard_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub standard_end: NaiveTime,
}

/// Terminal liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Seconds without contact before an online terminal is marked offline.
    pub offline_after_secs: i64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            offline_after_secs: 300,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// File layers only override the keys they set; anything they omit keeps
/// the value from the layer below.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            layers.push(load_config_file(&global_path)?);
        }
    }

    if let Some(path) = explicit {
        layers.push(load_config_file(path)?);
    }

    let mut config = resolve_layers(layers)?;
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("timekeep").join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("timekeep").join("timekeep.db"))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let layer: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !layer.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must hold a JSON object",
            path.display()
        )));
    }
    Ok(layer)
}

/// Fold file layers, lowest priority first, over the defaults.
fn resolve_layers(layers: Vec<Value>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for layer in layers {
        merge_layer(&mut merged, layer);
    }
    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid config: {e}")))
}

/// Overlay `layer` onto `base` key by key. Objects merge recursively; any
/// other value replaces what was there.
fn merge_layer(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                merge_layer(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `TIMEKEEP_*` overrides read through `lookup`.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("TIMEKEEP_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("TIMEKEEP_DB_MAX_CONNECTIONS") {
        if let Ok(n) = val.parse() {
            config.database.pool.max_connections = n;
        }
    }
    if let Some(val) = lookup("TIMEKEEP_STANDARD_START") {
        config.attendance.standard_start = hhmm::parse(&val).map_err(Error::Config)?;
    }
    if let Some(val) = lookup("TIMEKEEP_STANDARD_END") {
        config.attendance.standard_end = hhmm::parse(&val).map_err(Error::Config)?;
    }
    if let Some(val) = lookup("TIMEKEEP_OFFLINE_AFTER_SECS") {
        if let Ok(n) = val.parse() {
            config.terminals.offline_after_secs = n;
        }
    }
    if let Some(val) = lookup("TIMEKEEP_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some(val) = lookup("TIMEKEEP_LOG_JSON") {
        config.logging.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
    Ok(())
}

/// `HH:MM` (seconds optional) serde representation for [`NaiveTime`].
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map_err(|e| format!("invalid time of day {s:?}: {e}"))
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
