// Speed Guard Sampler
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Reads CPU %, memory % and (best-effort) temperature from the host. The
// CPU reading blocks for the measurement window, so async callers go through
// `sample_blocking`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{ComponentExt, CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

use crate::error::{GuardError, GuardResult};

/// Shortest window that gives sysinfo two distinguishable CPU readings.
const MIN_CPU_WINDOW: Duration = Duration::from_millis(200);

/// One reading of host utilization. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub temperature_celsius: Option<f32>,
}

impl Sample {
    /// Stamp a reading with the current time. Percentages are clamped to 0-100.
    pub fn new(cpu_percent: f32, memory_percent: f32, temperature_celsius: Option<f32>) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_percent: clamp_percent(cpu_percent),
            memory_percent: clamp_percent(memory_percent),
            temperature_celsius,
        }
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Source of samples for the guard loop.
pub trait Sampler: Send {
    fn sample(&mut self) -> GuardResult<Sample>;
}

/// A sampler shared between the guard loop and the control API.
pub type SharedSampler = Arc<Mutex<Box<dyn Sampler>>>;

pub fn shared(sampler: impl Sampler + 'static) -> SharedSampler {
    Arc::new(Mutex::new(Box::new(sampler)))
}

/// Take one sample on the blocking pool. A panic inside the sampler is
/// reported as a cycle failure and does not poison later calls.
pub async fn sample_blocking(sampler: &SharedSampler) -> GuardResult<Sample> {
    let sampler = Arc::clone(sampler);
    tokio::task::spawn_blocking(move || {
        let mut inner = sampler.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.sample()
    })
    .await
    .map_err(|e| GuardError::CycleFailure(format!("sampler task aborted: {}", e)))?
}

/// Production sampler backed by sysinfo.
pub struct SystemSampler {
    sys: System,
    window: Duration,
}

impl SystemSampler {
    pub fn new(window: Duration) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_components_list();
        Self {
            sys,
            window: window.max(MIN_CPU_WINDOW),
        }
    }

    fn cpu_percent(&mut self) -> f32 {
        self.sys.refresh_cpu();
        std::thread::sleep(self.window);
        self.sys.refresh_cpu();
        self.sys.global_cpu_info().cpu_usage()
    }

    fn memory_percent(&mut self) -> GuardResult<f32> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(GuardError::SamplingUnavailable(
                "host reported zero total memory".into(),
            ));
        }
        Ok((self.sys.used_memory() as f64 / total as f64 * 100.0) as f32)
    }

    fn temperature(&mut self) -> Option<f32> {
        self.sys.refresh_components();
        let hottest = hottest_reading(self.sys.components().iter().map(|c| c.temperature()));
        if hottest.is_none() {
            debug!("[SAMPLER] No temperature sensors readable; skipping temperature signal");
        }
        hottest
    }
}

impl Sampler for SystemSampler {
    fn sample(&mut self) -> GuardResult<Sample> {
        let cpu = self.cpu_percent();
        let memory = self.memory_percent()?;
        let temperature = self.temperature();
        Ok(Sample::new(cpu, memory, temperature))
    }
}

/// Highest plausible sensor reading. Zero and non-finite values are what
/// sysinfo reports for unreadable sensors, so they count as absent.
pub fn hottest_reading(readings: impl IntoIterator<Item = f32>) -> Option<f32> {
    readings
        .into_iter()
        .filter(|t| t.is_finite() && *t > 0.0)
        .fold(None, |hottest: Option<f32>, t| {
            Some(hottest.map_or(t, |h| h.max(t)))
        })
}

/// Host facts that the guard does not threshold on but the control API reports.
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub disk_percent: Option<f32>,
    pub host_uptime_secs: u64,
    pub core_count: usize,
}

pub fn host_snapshot() -> HostSnapshot {
    let mut sys = System::new();
    sys.refresh_disks_list();
    sys.refresh_disks();

    let disks = sys.disks();
    let root = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()));

    let disk_percent = root.and_then(|d| {
        let total = d.total_space();
        if total == 0 {
            return None;
        }
        let used = total.saturating_sub(d.available_space());
        Some((used as f64 / total as f64 * 100.0) as f32)
    });

    HostSnapshot {
        disk_percent,
        host_uptime_secs: sys.uptime(),
        core_count: num_cpus::get(),
    }
}
