// Speed Guard Alert Log
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Append-only record of threshold violations. Growth is unbounded for the
// life of the process; queries only look at a recent window.

use std::sync::RwLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Cpu,
    Memory,
    Temperature,
    Emergency,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Cpu => write!(f, "CPU"),
            AlertKind::Memory => write!(f, "MEMORY"),
            AlertKind::Temperature => write!(f, "TEMPERATURE"),
            AlertKind::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub message: String,
    pub value: Option<f32>,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>, value: Option<f32>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            value,
        }
    }
}

#[derive(Default)]
pub struct AlertLog {
    entries: RwLock<Vec<Alert>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, alert: Alert) {
        match alert.kind {
            AlertKind::Emergency => error!(kind = %alert.kind, "[GUARD] {}", alert.message),
            _ => warn!(kind = %alert.kind, value = ?alert.value, "[GUARD] {}", alert.message),
        }
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(alert);
    }

    /// Alerts no older than `window`, truncated to the newest `limit`,
    /// returned oldest first.
    pub fn recent(&self, window: std::time::Duration, limit: usize) -> Vec<Alert> {
        self.recent_at(Utc::now(), window, limit)
    }

    pub fn recent_at(
        &self,
        now: DateTime<Utc>,
        window: std::time::Duration,
        limit: usize,
    ) -> Vec<Alert> {
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());

        let mut picked: Vec<Alert> = entries
            .iter()
            .rev()
            .filter(|a| now.signed_duration_since(a.timestamp) <= window)
            .take(limit)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    pub fn count_kind(&self, kind: AlertKind) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|a| a.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn push_raw(&self, alert: Alert) {
        self.entries.write().unwrap().push(alert);
    }
}
