// Speed Guard Configuration
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Thresholds and timings for the guard loop and load controller. Defaults
// match the provisioning script; every field can be overridden through a
// SPEED_GUARD_* environment variable (a `.env` file is honored by main).

use std::str::FromStr;
use std::time::Duration;

use crate::error::{GuardError, GuardResult};

#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    /// CPU % above which a CPU alert is recorded.
    pub cpu_threshold: f32,
    /// CPU % above which the emergency throttle fires and new load is refused.
    pub safety_threshold: f32,
    /// Memory % above which a MEMORY alert is recorded.
    pub memory_threshold: f32,
    /// Temperature (°C) above which a TEMPERATURE alert is recorded.
    pub temperature_threshold: f32,
    /// Temperature (°C) above which the emergency throttle fires.
    pub critical_temperature: f32,
    /// Delay between guard cycles.
    pub check_interval: Duration,
    /// CPU measurement window used by the system sampler.
    pub sample_window: Duration,
    /// Number of samples kept in the history buffer.
    pub history_capacity: usize,
    /// Hard lifetime cap of a single load worker.
    pub worker_max_runtime: Duration,
    /// Time between graceful stop and force-kill on cancel.
    pub termination_grace: Duration,
    /// Maximum concurrent load workers. Defaults to, and may not exceed, the host core count.
    pub max_workers: usize,
    /// Kill untracked load-generator processes on cancel.
    pub sweep_strays: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 90.0,
            safety_threshold: 95.0,
            memory_threshold: 85.0,
            temperature_threshold: 80.0,
            critical_temperature: 90.0,
            check_interval: Duration::from_secs(2),
            sample_window: Duration::from_secs(1),
            history_capacity: 100,
            worker_max_runtime: Duration::from_secs(300),
            termination_grace: Duration::from_secs(5),
            max_workers: num_cpus::get().max(1),
            sweep_strays: false,
        }
    }
}

impl GuardConfig {
    /// Build from defaults overlaid with `SPEED_GUARD_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> GuardResult<Self> {
        let d = Self::default();
        let cfg = Self {
            cpu_threshold: env_or("SPEED_GUARD_CPU_THRESHOLD", d.cpu_threshold),
            safety_threshold: env_or("SPEED_GUARD_SAFETY_THRESHOLD", d.safety_threshold),
            memory_threshold: env_or("SPEED_GUARD_MEMORY_THRESHOLD", d.memory_threshold),
            temperature_threshold: env_or(
                "SPEED_GUARD_TEMPERATURE_THRESHOLD",
                d.temperature_threshold,
            ),
            critical_temperature: env_or(
                "SPEED_GUARD_CRITICAL_TEMPERATURE",
                d.critical_temperature,
            ),
            check_interval: Duration::from_millis(env_or(
                "SPEED_GUARD_CHECK_INTERVAL_MS",
                d.check_interval.as_millis() as u64,
            )),
            sample_window: Duration::from_millis(env_or(
                "SPEED_GUARD_SAMPLE_WINDOW_MS",
                d.sample_window.as_millis() as u64,
            )),
            history_capacity: env_or("SPEED_GUARD_HISTORY_CAPACITY", d.history_capacity),
            worker_max_runtime: Duration::from_secs(env_or(
                "SPEED_GUARD_WORKER_MAX_SECS",
                d.worker_max_runtime.as_secs(),
            )),
            termination_grace: Duration::from_secs(env_or(
                "SPEED_GUARD_TERMINATION_GRACE_SECS",
                d.termination_grace.as_secs(),
            )),
            max_workers: env_or("SPEED_GUARD_MAX_WORKERS", d.max_workers),
            sweep_strays: env_or("SPEED_GUARD_SWEEP_STRAYS", d.sweep_strays),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> GuardResult<()> {
        let percents = [
            ("cpu_threshold", self.cpu_threshold),
            ("safety_threshold", self.safety_threshold),
            ("memory_threshold", self.memory_threshold),
        ];
        for (name, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(GuardError::Config(format!(
                    "{} must be within 0-100, got {}",
                    name, value
                )));
            }
        }
        if self.safety_threshold < self.cpu_threshold {
            return Err(GuardError::Config(format!(
                "safety_threshold ({}) must not be below cpu_threshold ({})",
                self.safety_threshold, self.cpu_threshold
            )));
        }
        let temperatures = [
            ("temperature_threshold", self.temperature_threshold),
            ("critical_temperature", self.critical_temperature),
        ];
        for (name, value) in temperatures {
            if !value.is_finite() {
                return Err(GuardError::Config(format!(
                    "{} must be a finite temperature, got {}",
                    name, value
                )));
            }
        }
        if self.critical_temperature < self.temperature_threshold {
            return Err(GuardError::Config(format!(
                "critical_temperature ({}) must not be below temperature_threshold ({})",
                self.critical_temperature, self.temperature_threshold
            )));
        }
        if self.check_interval.is_zero() {
            return Err(GuardError::Config("check_interval must be non-zero".into()));
        }
        if self.history_capacity == 0 {
            return Err(GuardError::Config("history_capacity must be non-zero".into()));
        }
        if self.max_workers == 0 {
            return Err(GuardError::Config("max_workers must be non-zero".into()));
        }
        let cores = num_cpus::get().max(1);
        if self.max_workers > cores {
            return Err(GuardError::Config(format!(
                "max_workers ({}) must not exceed the host core count ({})",
                self.max_workers, cores
            )));
        }
        if self.worker_max_runtime.is_zero() {
            return Err(GuardError::Config("worker_max_runtime must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "[CONFIG] Ignoring unparseable override");
                default
            }
        },
        Err(_) => default,
    }
}
