#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use speed_guard::config::GuardConfig;
use speed_guard::error::{GuardError, GuardResult};
use speed_guard::guard::sampler;
use speed_guard::guard::{LoadLauncher, LoadProcess, Sample, Sampler};
use speed_guard::state::GuardContext;

/// Plays back a fixed list of readings, then repeats the last one.
/// `None` entries simulate a failed read.
pub struct ScriptedSampler {
    script: VecDeque<Option<(f32, f32, Option<f32>)>>,
    last: (f32, f32, Option<f32>),
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedSampler {
    pub fn new(script: Vec<Option<(f32, f32, Option<f32>)>>) -> Self {
        Self {
            script: script.into(),
            last: (10.0, 20.0, None),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cpu(values: &[f32]) -> Self {
        Self::new(values.iter().map(|v| Some((*v, 40.0, None))).collect())
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&mut self) -> GuardResult<Sample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Some(reading)) => {
                self.last = reading;
                Ok(Sample::new(reading.0, reading.1, reading.2))
            }
            Some(None) => Err(GuardError::SamplingUnavailable("scripted failure".into())),
            None => Ok(Sample::new(self.last.0, self.last.1, self.last.2)),
        }
    }
}

/// In-memory worker that stops as soon as it is asked to.
pub struct FakeWorker {
    alive: Arc<AtomicBool>,
}

impl LoadProcess for FakeWorker {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn request_stop(&mut self) -> std::io::Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn has_exited(&mut self) -> std::io::Result<bool> {
        Ok(!self.alive.load(Ordering::SeqCst))
    }

    fn force_kill(&mut self) -> std::io::Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    pub launched: AtomicUsize,
    pub workers: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeLauncher {
    pub fn alive(&self) -> usize {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.load(Ordering::SeqCst))
            .count()
    }
}

/// Lets a test keep a handle on the launcher it gave to the context.
pub struct SharedLauncher(pub Arc<FakeLauncher>);

impl LoadLauncher for SharedLauncher {
    fn launch(&self, _max_runtime: Duration) -> GuardResult<Box<dyn LoadProcess>> {
        self.0.launched.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        self.0.workers.lock().unwrap().push(alive.clone());
        Ok(Box::new(FakeWorker { alive }))
    }
}

pub fn test_config(max_workers: usize) -> GuardConfig {
    GuardConfig {
        cpu_threshold: 90.0,
        safety_threshold: 95.0,
        memory_threshold: 85.0,
        temperature_threshold: 80.0,
        critical_temperature: 90.0,
        check_interval: Duration::from_millis(20),
        termination_grace: Duration::from_millis(200),
        max_workers,
        ..GuardConfig::default()
    }
}

pub fn context_with(
    config: GuardConfig,
    sampler: ScriptedSampler,
) -> (Arc<GuardContext>, Arc<FakeLauncher>) {
    let launcher = Arc::new(FakeLauncher::default());
    let ctx = GuardContext::new(config, sampler::shared(sampler), Box::new(SharedLauncher(launcher.clone())));
    (Arc::new(ctx), launcher)
}
