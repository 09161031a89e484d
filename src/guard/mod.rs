// Speed Guard Core Modules
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod alerts;
pub mod burn;
pub mod history;
pub mod load;
pub mod sampler;
pub mod signals;
pub mod speed_guard;

pub use alerts::{Alert, AlertKind, AlertLog};
pub use history::HistoryBuffer;
pub use load::{BurnProcessLauncher, LoadController, LoadLauncher, LoadProcess, LoadWorkerHandle};
pub use sampler::{Sample, Sampler, SystemSampler};
pub use speed_guard::{CycleReport, SpeedGuard};
