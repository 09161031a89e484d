// Speed Guard Error Taxonomy
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Expected control-flow signals (capacity, safety) surface as 400s on the
// control API. Everything else is logged and reported as a 500 with a short
// message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// An optional metric (or the whole reading) could not be taken.
    #[error("Sampling unavailable: {0}")]
    SamplingUnavailable(String),

    /// Active worker count already matches the host core count.
    #[error("Load capacity reached: {active}/{limit} workers already running")]
    CapacityExceeded { active: usize, limit: usize },

    /// Latest CPU reading is above the safety threshold.
    #[error("Safety block: CPU at {cpu_percent:.1}% exceeds the {threshold:.1}% safety threshold")]
    SafetyBlocked { cpu_percent: f32, threshold: f32 },

    /// Graceful stop or force-kill of a worker failed.
    #[error("Worker {worker} could not be terminated: {reason}")]
    WorkerTerminationFailure { worker: String, reason: String },

    /// Anything unexpected inside one guard-loop iteration.
    #[error("Guard cycle failed: {0}")]
    CycleFailure(String),

    #[error("Failed to launch load worker: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    fn code(&self) -> &'static str {
        match self {
            GuardError::SamplingUnavailable(_) => "SAMPLING_UNAVAILABLE",
            GuardError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            GuardError::SafetyBlocked { .. } => "SAFETY_BLOCKED",
            GuardError::WorkerTerminationFailure { .. } => "WORKER_TERMINATION_FAILURE",
            GuardError::CycleFailure(_) => "CYCLE_FAILURE",
            GuardError::Launch(_) => "LAUNCH_FAILED",
            GuardError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = match &self {
            GuardError::CapacityExceeded { .. } | GuardError::SafetyBlocked { .. } => {
                StatusCode::BAD_REQUEST
            }
            other => {
                tracing::error!(error = %other, "[SERVER] Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = json!({
            "status": "error",
            "code": self.code(),
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
