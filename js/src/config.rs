//! Configuration types and loading for the `js` binary

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::SchedulerError;
use crate::job::SleepJob;
use crate::pool::PoolConfig;
use crate::scheduler::{ScheduledJob, SchedulerConfig};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Worker pool settings
    pub pool: PoolConfig,

    /// Scheduler settings
    pub scheduler: SchedulerConfig,

    /// Jobs submitted by `js run`
    pub jobs: Vec<JobSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            pool: PoolConfig::default(),
            scheduler: SchedulerConfig::default(),
            jobs: demo_jobs(),
        }
    }
}

/// One demo job: announce, sleep for `duration-secs`, announce again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Number printed by the job
    pub id: u32,

    /// Dispatch priority; falls back to the scheduler default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Delay before the first run
    #[serde(default, rename = "delay-secs")]
    pub delay_secs: u64,

    /// How long the job sleeps when it runs
    #[serde(default, rename = "duration-secs")]
    pub duration_secs: u64,

    /// Run again `interval-secs` after every dispatch
    #[serde(default)]
    pub recurring: bool,

    #[serde(default, rename = "interval-secs")]
    pub interval_secs: u64,
}

impl JobSpec {
    /// A recurring job needs a positive interval
    pub fn validate(&self) -> std::result::Result<(), SchedulerError> {
        if self.recurring && self.interval_secs == 0 {
            return Err(SchedulerError::InvalidInterval {
                interval_secs: self.interval_secs,
            });
        }
        Ok(())
    }

    /// Build the scheduled job, counting the delay from `now`
    pub fn to_scheduled(&self, default_priority: i32, now: Instant) -> std::result::Result<ScheduledJob, SchedulerError> {
        let next_execution = now
            .checked_add(Duration::from_secs(self.delay_secs))
            .ok_or(SchedulerError::DelayTooLarge {
                delay_secs: self.delay_secs,
            })?;
        let scheduled = ScheduledJob::new(
            Arc::new(SleepJob::new(self.id, Duration::from_secs(self.duration_secs))),
            self.priority.unwrap_or(default_priority),
            next_execution,
            self.recurring,
            self.interval_secs,
        );
        scheduled.validate()?;
        Ok(scheduled)
    }
}

/// The two jobs the scheduler demo has always shipped with
pub fn demo_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec {
            id: 1,
            priority: Some(1),
            delay_secs: 2,
            duration_secs: 3,
            recurring: false,
            interval_secs: 1,
        },
        JobSpec {
            id: 2,
            priority: Some(3),
            delay_secs: 2,
            duration_secs: 3,
            recurring: true,
            interval_secs: 5,
        },
    ]
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(SchedulerError::InvalidWorkerCount {
                count: self.pool.workers,
            })
            .context("Invalid pool configuration");
        }
        for spec in &self.jobs {
            spec.validate().context(format!("Invalid job {}", spec.id))?;
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./jobscheduler.yml
        let local_config = PathBuf::from("jobscheduler.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/jobscheduler/jobscheduler.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jobscheduler").join("jobscheduler.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed here; `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from("jobscheduler.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("jobscheduler").join("jobscheduler.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|path| path.exists())
            .and_then(|path| Self::load_from_file(path).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_has_demo_jobs() {
        let config = Config::default();
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.pool.workers, 2);
        assert!(config.validate().is_ok());

        let recurring: Vec<_> = config.jobs.iter().filter(|j| j.recurring).collect();
        assert_eq!(recurring.len(), 1);
        assert_eq!(recurring[0].priority, Some(3));
        assert_eq!(recurring[0].interval_secs, 5);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("js.yml");
        fs::write(
            &path,
            r#"
log-level: debug
pool:
  workers: 4
scheduler:
  default-priority: 2
jobs:
  - id: 7
    delay-secs: 1
    duration-secs: 0
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.scheduler.default_priority, 2);
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].priority, None);
        assert!(!config.jobs[0].recurring);

        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_validate_rejects_zero_interval_recurring() {
        let mut config = Config::default();
        config.jobs.push(JobSpec {
            id: 9,
            priority: None,
            delay_secs: 0,
            duration_secs: 0,
            recurring: true,
            interval_secs: 0,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid job 9"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.pool.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.yml");
        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_to_scheduled_uses_default_priority() {
        let spec = JobSpec {
            id: 3,
            priority: None,
            delay_secs: 4,
            duration_secs: 1,
            recurring: true,
            interval_secs: 2,
        };
        let now = Instant::now();
        let scheduled = spec.to_scheduled(6, now).unwrap();
        assert_eq!(scheduled.priority, 6);
        assert_eq!(scheduled.next_execution, now + Duration::from_secs(4));
        assert_eq!(scheduled.interval(), Some(Duration::from_secs(2)));
        assert_eq!(scheduled.job.name(), "job-3");
    }

    #[test]
    fn test_to_scheduled_rejects_unrepresentable_times() {
        let now = Instant::now();
        let far_delay = JobSpec {
            id: 4,
            priority: None,
            delay_secs: u64::MAX,
            duration_secs: 0,
            recurring: false,
            interval_secs: 0,
        };
        assert_eq!(
            far_delay.to_scheduled(0, now).unwrap_err(),
            SchedulerError::DelayTooLarge { delay_secs: u64::MAX }
        );

        let far_interval = JobSpec {
            id: 5,
            delay_secs: 0,
            recurring: true,
            interval_secs: u64::MAX,
            ..far_delay
        };
        assert_eq!(
            far_interval.to_scheduled(0, now).unwrap_err(),
            SchedulerError::IntervalTooLarge { interval_secs: u64::MAX }
        );
    }
}
