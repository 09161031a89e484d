// Speed Guard
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Single-host CPU load generator with a background guard that samples
// utilization, records alerts, and kills load workers when the host runs hot.

pub mod config;
pub mod error;
pub mod guard;
pub mod server;
pub mod state;
