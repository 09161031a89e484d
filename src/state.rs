// Speed Guard Shared State
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// One owned context shared (via Arc) by the guard loop and the control API.
// Each resource carries its own lock; nothing here is a process global.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::config::GuardConfig;
use crate::error::GuardResult;
use crate::guard::alerts::AlertLog;
use crate::guard::history::HistoryBuffer;
use crate::guard::load::{LoadController, LoadLauncher};
use crate::guard::sampler::{self, Sample, SharedSampler};

pub struct GuardContext {
    pub config: GuardConfig,
    pub history: Arc<HistoryBuffer>,
    pub alerts: AlertLog,
    pub load: LoadController,
    pub sampler: SharedSampler,
    enabled: watch::Sender<bool>,
    started_at: Instant,
}

/// Serializable view of the guard's switch and thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct GuardState {
    pub enabled: bool,
    pub cpu_threshold: f32,
    pub safety_threshold: f32,
    pub memory_threshold: f32,
    pub temperature_threshold: f32,
    pub critical_temperature: f32,
    pub check_interval_ms: u64,
    pub max_workers: usize,
}

impl GuardContext {
    /// Guard starts enabled.
    pub fn new(config: GuardConfig, sampler: SharedSampler, launcher: Box<dyn LoadLauncher>) -> Self {
        let history = Arc::new(HistoryBuffer::new(config.history_capacity));
        let load = LoadController::new(&config, history.clone(), launcher);
        let (enabled, _) = watch::channel(true);

        Self {
            config,
            history,
            alerts: AlertLog::new(),
            load,
            sampler,
            enabled,
            started_at: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Flip the guard on/off and return the new value. Disabling does not
    /// touch running load workers.
    pub fn toggle(&self) -> bool {
        let mut now_enabled = false;
        self.enabled.send_modify(|on| {
            *on = !*on;
            now_enabled = *on;
        });
        info!(
            "[GUARD] Speed Guard {}",
            if now_enabled { "enabled" } else { "disabled" }
        );
        now_enabled
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.send_replace(on);
    }

    pub fn subscribe_enabled(&self) -> watch::Receiver<bool> {
        self.enabled.subscribe()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn guard_state(&self) -> GuardState {
        let cfg = &self.config;
        GuardState {
            enabled: self.is_enabled(),
            cpu_threshold: cfg.cpu_threshold,
            safety_threshold: cfg.safety_threshold,
            memory_threshold: cfg.memory_threshold,
            temperature_threshold: cfg.temperature_threshold,
            critical_temperature: cfg.critical_temperature,
            check_interval_ms: cfg.check_interval.as_millis() as u64,
            max_workers: self.load.max_workers(),
        }
    }

    /// Latest recorded sample if it is no older than two guard periods,
    /// otherwise a fresh reading (which is not recorded into history).
    pub async fn current_sample(&self) -> GuardResult<Sample> {
        if let Some(latest) = self.history.latest() {
            let age = chrono::Utc::now().signed_duration_since(latest.timestamp);
            let fresh_for = chrono::Duration::from_std(self.config.check_interval * 2)
                .unwrap_or_else(|_| chrono::Duration::seconds(4));
            if age <= fresh_for {
                return Ok(latest);
            }
        }
        sampler::sample_blocking(&self.sampler).await
    }
}
