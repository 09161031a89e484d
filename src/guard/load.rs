// Speed Guard Load Controller
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Owns the registry of synthetic load workers. The registry is the single
// source of truth: start_one checks capacity and registers under one lock,
// cancel_all drains a snapshot and terminates it outside the lock.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{Pid, PidExt, ProcessExt, Signal, System, SystemExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::burn::LOAD_MARKER;
use super::history::HistoryBuffer;
use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};

/// How often cancel_all re-checks workers during the grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running load generator as seen by the controller.
pub trait LoadProcess: Send {
    fn pid(&self) -> Option<u32>;
    /// Ask the worker to stop (SIGTERM on Unix).
    fn request_stop(&mut self) -> std::io::Result<()>;
    /// `true` once the worker has exited (and been reaped).
    fn has_exited(&mut self) -> std::io::Result<bool>;
    fn force_kill(&mut self) -> std::io::Result<()>;
}

/// Starts load generators that stop on their own after `max_runtime`.
pub trait LoadLauncher: Send + Sync {
    fn launch(&self, max_runtime: Duration) -> GuardResult<Box<dyn LoadProcess>>;
}

/// Re-executes a binary (normally this one) with the hidden `burn` subcommand.
pub struct BurnProcessLauncher {
    program: PathBuf,
}

impl BurnProcessLauncher {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn current_exe() -> GuardResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl LoadLauncher for BurnProcessLauncher {
    fn launch(&self, max_runtime: Duration) -> GuardResult<Box<dyn LoadProcess>> {
        let child = Command::new(&self.program)
            .arg("burn")
            .arg("--seconds")
            .arg(max_runtime.as_secs().max(1).to_string())
            .arg("--tag")
            .arg(LOAD_MARKER)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(ChildLoad { child }))
    }
}

struct ChildLoad {
    child: std::process::Child,
}

impl LoadProcess for ChildLoad {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn request_stop(&mut self) -> std::io::Result<()> {
        let pid = Pid::from_u32(self.child.id());
        let mut sys = System::new();
        if !sys.refresh_process(pid) {
            // Already gone; has_exited will reap it.
            return Ok(());
        }
        match sys.process(pid).and_then(|p| p.kill_with(Signal::Term)) {
            Some(true) => Ok(()),
            Some(false) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("SIGTERM to pid {} was not delivered", pid),
            )),
            // No SIGTERM on this platform.
            None => self.child.kill(),
        }
    }

    fn has_exited(&mut self) -> std::io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    fn force_kill(&mut self) -> std::io::Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadWorkerHandle {
    pub id: Uuid,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

struct ActiveWorker {
    handle: LoadWorkerHandle,
    process: Box<dyn LoadProcess>,
}

pub struct LoadController {
    launcher: Box<dyn LoadLauncher>,
    history: Arc<HistoryBuffer>,
    max_workers: usize,
    safety_threshold: f32,
    max_runtime: Duration,
    grace: Duration,
    sweep_strays: bool,
    workers: Mutex<Vec<ActiveWorker>>,
}

impl LoadController {
    pub fn new(
        config: &GuardConfig,
        history: Arc<HistoryBuffer>,
        launcher: Box<dyn LoadLauncher>,
    ) -> Self {
        Self {
            launcher,
            history,
            max_workers: config.max_workers.max(1),
            safety_threshold: config.safety_threshold,
            max_runtime: config.worker_max_runtime,
            grace: config.termination_grace,
            sweep_strays: config.sweep_strays,
            workers: Mutex::new(Vec::new()),
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<ActiveWorker>> {
        self.workers.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Start one load worker.
    ///
    /// Refused with `SafetyBlocked` when the latest recorded CPU sample is
    /// above the safety threshold, and with `CapacityExceeded` when the
    /// registry already holds `max_workers` live workers.
    pub fn start_one(&self) -> GuardResult<LoadWorkerHandle> {
        if let Some(latest) = self.history.latest() {
            if latest.cpu_percent > self.safety_threshold {
                warn!(
                    "[LOAD] Refusing new worker: CPU at {:.1}% (safety {:.1}%)",
                    latest.cpu_percent, self.safety_threshold
                );
                return Err(GuardError::SafetyBlocked {
                    cpu_percent: latest.cpu_percent,
                    threshold: self.safety_threshold,
                });
            }
        }

        let mut workers = self.lock_workers();
        prune_exited(&mut workers);

        if workers.len() >= self.max_workers {
            return Err(GuardError::CapacityExceeded {
                active: workers.len(),
                limit: self.max_workers,
            });
        }

        let process = self.launcher.launch(self.max_runtime)?;
        let handle = LoadWorkerHandle {
            id: Uuid::new_v4(),
            pid: process.pid(),
            started_at: Utc::now(),
        };
        workers.push(ActiveWorker {
            handle: handle.clone(),
            process,
        });

        info!(
            worker = %handle.id,
            pid = ?handle.pid,
            "[LOAD] Started load worker ({}/{})",
            workers.len(),
            self.max_workers
        );
        Ok(handle)
    }

    /// Live workers, after dropping any that finished on their own.
    pub fn active_count(&self) -> usize {
        let mut workers = self.lock_workers();
        prune_exited(&mut workers);
        workers.len()
    }

    pub fn active_workers(&self) -> Vec<LoadWorkerHandle> {
        let mut workers = self.lock_workers();
        prune_exited(&mut workers);
        workers.iter().map(|w| w.handle.clone()).collect()
    }

    /// Terminate every worker registered at the time of the call.
    ///
    /// Graceful stop first, force-kill whatever is still alive after the
    /// grace period. Returns how many live workers were terminated, leaving
    /// out any that survived a failed force-kill; calling with nothing
    /// registered returns 0.
    pub async fn cancel_all(&self) -> usize {
        let snapshot = std::mem::take(&mut *self.lock_workers());

        let mut pending = Vec::with_capacity(snapshot.len());
        for mut worker in snapshot {
            if matches!(worker.process.has_exited(), Ok(true)) {
                continue;
            }
            if let Err(e) = worker.process.request_stop() {
                debug!(worker = %worker.handle.id, error = %e, "[LOAD] Graceful stop failed; will force-kill");
            }
            pending.push(worker);
        }

        let stopping = pending.len();
        if stopping > 0 {
            info!("[LOAD] Stopping {} load worker(s)", stopping);
        }

        let deadline = Instant::now() + self.grace;
        while !pending.is_empty() && Instant::now() < deadline {
            pending.retain_mut(|w| !matches!(w.process.has_exited(), Ok(true)));
            if pending.is_empty() {
                break;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        let mut failed = 0;
        for mut worker in pending {
            warn!(worker = %worker.handle.id, "[LOAD] Worker ignored stop request; force-killing");
            if let Err(e) = worker.process.force_kill() {
                let failure = GuardError::WorkerTerminationFailure {
                    worker: worker.handle.id.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %failure, "[LOAD] Force-kill failed");
                failed += 1;
            }
        }

        if self.sweep_strays {
            self.sweep_stray_processes();
        }

        stopping - failed
    }

    /// Kill marker-tagged processes that are not in the registry. Workers
    /// registered while this runs are left alone.
    fn sweep_stray_processes(&self) -> usize {
        let tracked: Vec<u32> = self
            .lock_workers()
            .iter()
            .filter_map(|w| w.handle.pid)
            .collect();
        let me = sysinfo::get_current_pid().ok().map(|p| p.as_u32());

        let mut sys = System::new();
        sys.refresh_processes();

        let strays = stray_pids(
            sys.processes()
                .iter()
                .map(|(pid, process)| (pid.as_u32(), process.cmd())),
            me,
            &tracked,
        );

        let mut killed = 0;
        for pid in strays {
            match sys.process(Pid::from_u32(pid)) {
                Some(process) if process.kill() => killed += 1,
                _ => warn!(pid, "[LOAD] Sweep could not kill stray load process"),
            }
        }

        if killed > 0 {
            warn!("[LOAD] Sweep killed {} untracked load process(es)", killed);
        }
        killed
    }
}

/// PIDs whose command line carries the load marker, excluding this process
/// and anything in `tracked`.
fn stray_pids<'a>(
    processes: impl IntoIterator<Item = (u32, &'a [String])>,
    me: Option<u32>,
    tracked: &[u32],
) -> Vec<u32> {
    processes
        .into_iter()
        .filter(|(pid, _)| Some(*pid) != me && !tracked.contains(pid))
        .filter(|(_, cmd)| cmd.iter().any(|arg| arg == LOAD_MARKER))
        .map(|(pid, _)| pid)
        .collect()
}

fn prune_exited(workers: &mut Vec<ActiveWorker>) {
    workers.retain_mut(|w| match w.process.has_exited() {
        Ok(true) => {
            debug!(worker = %w.handle.id, "[LOAD] Worker finished on its own");
            false
        }
        Ok(false) => true,
        Err(e) => {
            warn!(worker = %w.handle.id, error = %e, "[LOAD] Could not poll worker; keeping it registered");
            true
        }
    });
}
