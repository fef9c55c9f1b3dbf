use anyhow::{bail, Context, Result};
use chrono::Duration;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::calendar::{Calendar, WorkingHours};
use crate::classifier::StateMachineConfig;

pub const CONFIG_PATH_ENV: &str = "MONITOR_CONFIG";
pub const DEBUG_ENV: &str = "MONITOR_DEBUG";
const DEFAULT_CONFIG_FILE: &str = "monitor.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub movement_threshold: f64,
    pub error_timeout_secs: f64,
    pub state_change_delay_secs: f64,
    pub history_size: usize,
    pub confidence_count: usize,
    pub target_fps: u32,
    pub tick_timeout_ms: u64,
    /// IANA timezone of the plant wall clock.
    pub timezone: String,
    pub working_hours: WorkingHours,
    pub full_workday_secs: f64,
    pub database_path: PathBuf,
    /// Seeded random descriptions when set, round-robin otherwise.
    pub description_seed: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.5,
            error_timeout_secs: 3.0,
            state_change_delay_secs: 0.5,
            history_size: 6,
            confidence_count: 4,
            target_fps: 30,
            tick_timeout_ms: 500,
            timezone: "America/Chicago".to_string(),
            working_hours: WorkingHours::default(),
            full_workday_secs: 28_800.0,
            database_path: PathBuf::from("machine_states.sqlite3"),
            description_seed: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if !positive(self.movement_threshold) {
            bail!("movementThreshold must be positive, got {}", self.movement_threshold);
        }
        if !positive(self.error_timeout_secs) {
            bail!("errorTimeoutSecs must be positive, got {}", self.error_timeout_secs);
        }
        if !positive(self.state_change_delay_secs) {
            bail!(
                "stateChangeDelaySecs must be positive, got {}",
                self.state_change_delay_secs
            );
        }
        if self.history_size == 0 {
            bail!("historySize must be at least 1");
        }
        if self.confidence_count > self.history_size {
            bail!(
                "confidenceCount ({}) cannot exceed historySize ({})",
                self.confidence_count,
                self.history_size
            );
        }
        if self.target_fps == 0 {
            bail!("targetFps must be at least 1");
        }
        if self.tick_timeout_ms == 0 {
            bail!("tickTimeoutMs must be at least 1");
        }
        if !positive(self.full_workday_secs) {
            bail!("fullWorkdaySecs must be positive, got {}", self.full_workday_secs);
        }
        self.calendar().map(|_| ())
    }

    pub fn state_machine(&self) -> StateMachineConfig {
        StateMachineConfig {
            movement_threshold: self.movement_threshold,
            error_timeout: secs_to_duration(self.error_timeout_secs),
            state_change_delay: secs_to_duration(self.state_change_delay_secs),
            history_size: self.history_size,
            confidence_count: self.confidence_count,
        }
    }

    pub fn calendar(&self) -> Result<Calendar> {
        Calendar::new(&self.timezone, self.working_hours.clone())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    pub fn tick_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_timeout_ms)
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::microseconds((secs * 1_000_000.0).round() as i64)
}

/// `MONITOR_CONFIG` if set, else `monitor.json` in the working directory.
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn debug_mode() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// JSON-file backed configuration, shared between the sensing loop and queries.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<MonitorConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            match serde_json::from_str::<MonitorConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!(
                        "Ignoring unreadable config {}: {err}; using defaults",
                        path.display()
                    );
                    MonitorConfig::default()
                }
            }
        } else {
            MonitorConfig::default()
        };
        data.validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> MonitorConfig {
        self.read().clone()
    }

    pub fn update(&self, config: MonitorConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self.write();
        self.persist(&config)?;
        *guard = config;
        Ok(())
    }

    /// Write the loaded config out when no file exists yet, so there is one to edit.
    /// Returns whether a file was written.
    pub fn ensure_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.update(self.get())?;
        Ok(true)
    }

    fn persist(&self, data: &MonitorConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorConfig> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorConfig> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        let machine = config.state_machine();
        assert_eq!(machine.error_timeout, Duration::seconds(3));
        assert_eq!(machine.state_change_delay, Duration::milliseconds(500));
        assert_eq!(config.tick_interval().as_millis(), 33);
    }

    #[test]
    fn partial_json_falls_back_to_defaults_per_field() {
        let json = r#"{
            "movementThreshold": 1.5,
            "workingHours": { "weekdays": ["Mon"], "startHour": 6, "endHour": 14 }
        }"#;
        let config: MonitorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.movement_threshold, 1.5);
        assert_eq!(config.history_size, 6);
        assert_eq!(config.working_hours.start_hour, 6);
        assert_eq!(config.working_hours.weekdays.len(), 1);
    }

    #[test]
    fn rejects_inconsistent_values() {
        let config = MonitorConfig {
            confidence_count: 7,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            target_fps: 0,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            movement_threshold: f64::NAN,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            timezone: "Central".to_string(),
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        let store = ConfigStore::new(path.clone()).unwrap();
        assert_eq!(store.get(), MonitorConfig::default());

        let updated = MonitorConfig {
            target_fps: 15,
            description_seed: Some(7),
            ..MonitorConfig::default()
        };
        store.update(updated.clone()).unwrap();

        let reopened = ConfigStore::new(path).unwrap();
        assert_eq!(reopened.get(), updated);
    }

    #[test]
    fn invalid_update_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("monitor.json")).unwrap();
        let bad = MonitorConfig {
            history_size: 0,
            ..MonitorConfig::default()
        };
        assert!(store.update(bad).is_err());
        assert_eq!(store.get().history_size, 6);
        assert!(!store.path().exists());
    }

    #[test]
    fn ensure_file_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        let store = ConfigStore::new(path.clone()).unwrap();
        assert!(store.ensure_file().unwrap());
        assert!(!store.ensure_file().unwrap());

        let written: MonitorConfig =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, MonitorConfig::default());
        assert_eq!(written.timezone, "America/Chicago");
    }

    #[test]
    fn unreadable_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        fs::write(&path, "not json").unwrap();
        let store = ConfigStore::new(path).unwrap();
        assert_eq!(store.get().target_fps, 30);
    }
}
