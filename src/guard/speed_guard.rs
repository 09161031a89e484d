// Speed Guard Control Loop
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Every period: sample -> record -> evaluate thresholds -> alert / throttle.
// A failed cycle is logged and the next one runs on schedule. The loop only
// ends on shutdown, and cancels all load workers on the way out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::alerts::{Alert, AlertKind};
use super::sampler::{self, Sample};
use crate::error::{GuardError, GuardResult};
use crate::state::GuardContext;

/// Outcome of one guard cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sample: Sample,
    pub alerts: Vec<AlertKind>,
    pub emergency: bool,
    pub workers_terminated: usize,
}

pub struct SpeedGuard {
    ctx: Arc<GuardContext>,
    cycles: AtomicU64,
    failures: AtomicU64,
}

impl SpeedGuard {
    pub fn new(ctx: Arc<GuardContext>) -> Self {
        Self {
            ctx,
            cycles: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Run the loop on its own task until `shutdown` fires.
    pub fn spawn(ctx: Arc<GuardContext>, shutdown: CancellationToken) -> JoinHandle<()> {
        let guard = SpeedGuard::new(ctx);
        tokio::spawn(async move { guard.run(shutdown).await })
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let period = self.ctx.config.check_interval;
        let mut enabled = self.ctx.subscribe_enabled();
        info!("[GUARD] Speed Guard loop started (interval: {:?})", period);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if !*enabled.borrow_and_update() {
                debug!("[GUARD] Disabled; waiting for toggle");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = enabled.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            match self.run_cycle().await {
                Ok(report) => {
                    debug!(
                        cpu = report.sample.cpu_percent,
                        memory = report.sample.memory_percent,
                        temperature = ?report.sample.temperature_celsius,
                        alerts = report.alerts.len(),
                        "[GUARD] Cycle complete"
                    );
                }
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "[GUARD] Cycle failed; continuing");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }

        info!("[GUARD] Shutdown requested; cancelling load workers");
        let terminated = self.ctx.load.cancel_all().await;
        info!(
            terminated,
            cycles = self.cycles(),
            failures = self.failures(),
            "[GUARD] Speed Guard loop stopped"
        );
    }

    /// Execute one cycle. The body runs on its own task so that even a panic
    /// comes back as a `CycleFailure`.
    pub async fn run_cycle(&self) -> GuardResult<CycleReport> {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { evaluate(&ctx).await })
            .await
            .map_err(|e| GuardError::CycleFailure(format!("cycle task aborted: {}", e)))?
    }
}

async fn evaluate(ctx: &GuardContext) -> GuardResult<CycleReport> {
    let sample = sampler::sample_blocking(&ctx.sampler).await?;
    ctx.history.record(sample.clone());

    let cfg = &ctx.config;
    let mut raised = Vec::new();
    let mut critical: Vec<(String, f32)> = Vec::new();

    let cpu = sample.cpu_percent;
    if cpu > cfg.cpu_threshold {
        ctx.alerts.record(Alert::new(
            AlertKind::Cpu,
            format!("High CPU usage: {:.1}% (threshold {:.1}%)", cpu, cfg.cpu_threshold),
            Some(cpu),
        ));
        raised.push(AlertKind::Cpu);
        if cpu > cfg.safety_threshold {
            critical.push((format!("CPU {:.1}% above safety limit {:.1}%", cpu, cfg.safety_threshold), cpu));
        }
    }

    let memory = sample.memory_percent;
    if memory > cfg.memory_threshold {
        ctx.alerts.record(Alert::new(
            AlertKind::Memory,
            format!("High memory usage: {:.1}% (threshold {:.1}%)", memory, cfg.memory_threshold),
            Some(memory),
        ));
        raised.push(AlertKind::Memory);
    }

    if let Some(temp) = sample.temperature_celsius {
        if temp > cfg.temperature_threshold {
            ctx.alerts.record(Alert::new(
                AlertKind::Temperature,
                format!(
                    "High temperature: {:.1}°C (threshold {:.1}°C)",
                    temp, cfg.temperature_threshold
                ),
                Some(temp),
            ));
            raised.push(AlertKind::Temperature);
            if temp > cfg.critical_temperature {
                critical.push((
                    format!("temperature {:.1}°C above critical {:.1}°C", temp, cfg.critical_temperature),
                    temp,
                ));
            }
        }
    }

    // One throttle per cycle, however many limits were crossed.
    let mut workers_terminated = 0;
    let emergency = !critical.is_empty();
    if emergency {
        workers_terminated = ctx.load.cancel_all().await;
        let reasons: Vec<&str> = critical.iter().map(|(r, _)| r.as_str()).collect();
        ctx.alerts.record(Alert::new(
            AlertKind::Emergency,
            format!(
                "Emergency throttle: {}; terminated {} load worker(s)",
                reasons.join(", "),
                workers_terminated
            ),
            critical.first().map(|(_, v)| *v),
        ));
        raised.push(AlertKind::Emergency);
    }

    Ok(CycleReport {
        sample,
        alerts: raised,
        emergency,
        workers_terminated,
    })
}
