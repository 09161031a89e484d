mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{context_with, test_config, ScriptedSampler};
use speed_guard::error::GuardError;
use speed_guard::guard::{AlertKind, SpeedGuard};
use tokio_util::sync::CancellationToken;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_threshold_scenario_70_92_97() {
    let (ctx, launcher) = context_with(test_config(4), ScriptedSampler::cpu(&[70.0, 92.0, 97.0]));
    let guard = SpeedGuard::new(ctx.clone());

    let first = guard.run_cycle().await.unwrap();
    assert!(first.alerts.is_empty());

    let second = guard.run_cycle().await.unwrap();
    assert_eq!(second.alerts, vec![AlertKind::Cpu]);
    assert!(!second.emergency);

    // 92% is under the safety limit, so load may still be added.
    ctx.load.start_one().unwrap();
    ctx.load.start_one().unwrap();
    assert_eq!(ctx.load.active_count(), 2);

    let third = guard.run_cycle().await.unwrap();
    assert_eq!(third.alerts, vec![AlertKind::Cpu, AlertKind::Emergency]);
    assert!(third.emergency);
    assert_eq!(third.workers_terminated, 2);
    assert_eq!(ctx.load.active_count(), 0);
    assert_eq!(launcher.alive(), 0);

    let recorded: Vec<(AlertKind, Option<f32>)> = ctx
        .alerts
        .recent(DAY, 20)
        .iter()
        .map(|a| (a.kind, a.value))
        .collect();
    assert_eq!(
        recorded,
        vec![
            (AlertKind::Cpu, Some(92.0)),
            (AlertKind::Cpu, Some(97.0)),
            (AlertKind::Emergency, Some(97.0)),
        ]
    );
    assert_eq!(ctx.history.len(), 3);
}

#[tokio::test]
async fn test_safety_breach_without_workers_still_records_one_emergency() {
    let (ctx, _) = context_with(test_config(2), ScriptedSampler::cpu(&[99.0]));
    let report = SpeedGuard::new(ctx.clone()).run_cycle().await.unwrap();

    assert!(report.emergency);
    assert_eq!(report.workers_terminated, 0);
    assert_eq!(ctx.alerts.count_kind(AlertKind::Emergency), 1);
    assert_eq!(ctx.load.active_count(), 0);
}

#[tokio::test]
async fn test_cpu_and_temperature_critical_share_one_throttle() {
    let sampler = ScriptedSampler::new(vec![Some((98.0, 40.0, Some(95.0)))]);
    let (ctx, _) = context_with(test_config(2), sampler);
    let report = SpeedGuard::new(ctx.clone()).run_cycle().await.unwrap();

    assert_eq!(
        report.alerts,
        vec![AlertKind::Cpu, AlertKind::Temperature, AlertKind::Emergency]
    );
    assert_eq!(ctx.alerts.count_kind(AlertKind::Emergency), 1);
    let emergency = ctx
        .alerts
        .recent(DAY, 20)
        .into_iter()
        .find(|a| a.kind == AlertKind::Emergency)
        .unwrap();
    assert!(emergency.message.contains("CPU"));
    assert!(emergency.message.contains("temperature"));
}

#[tokio::test]
async fn test_critical_temperature_alone_triggers_throttle() {
    let sampler = ScriptedSampler::new(vec![Some((20.0, 40.0, Some(95.0)))]);
    let (ctx, launcher) = context_with(test_config(2), sampler);
    ctx.load.start_one().unwrap();
    ctx.load.start_one().unwrap();

    let report = SpeedGuard::new(ctx.clone()).run_cycle().await.unwrap();

    assert_eq!(report.alerts, vec![AlertKind::Temperature, AlertKind::Emergency]);
    assert!(report.emergency);
    assert_eq!(report.workers_terminated, 2);
    assert_eq!(ctx.load.active_count(), 0);
    assert_eq!(launcher.alive(), 0);

    let emergency = ctx
        .alerts
        .recent(DAY, 20)
        .into_iter()
        .find(|a| a.kind == AlertKind::Emergency)
        .unwrap();
    assert_eq!(emergency.value, Some(95.0));
    assert_eq!(ctx.alerts.count_kind(AlertKind::Cpu), 0);
}

#[tokio::test]
async fn test_high_memory_alerts_without_throttle() {
    let sampler = ScriptedSampler::new(vec![Some((20.0, 93.0, None))]);
    let (ctx, _) = context_with(test_config(2), sampler);
    ctx.load.start_one().unwrap();

    let report = SpeedGuard::new(ctx.clone()).run_cycle().await.unwrap();
    assert_eq!(report.alerts, vec![AlertKind::Memory]);
    assert!(!report.emergency);
    assert_eq!(ctx.load.active_count(), 1);
}

#[tokio::test]
async fn test_warm_but_not_critical_temperature() {
    let sampler = ScriptedSampler::new(vec![Some((20.0, 30.0, Some(85.0))), Some((20.0, 30.0, None))]);
    let (ctx, _) = context_with(test_config(2), sampler);
    let guard = SpeedGuard::new(ctx.clone());

    let warm = guard.run_cycle().await.unwrap();
    assert_eq!(warm.alerts, vec![AlertKind::Temperature]);
    assert!(!warm.emergency);

    // No sensor data: temperature checks are skipped, not failed.
    let blind = guard.run_cycle().await.unwrap();
    assert!(blind.alerts.is_empty());
    assert_eq!(blind.sample.temperature_celsius, None);
}

#[tokio::test]
async fn test_failed_cycle_does_not_stop_the_loop() {
    let sampler = ScriptedSampler::new(vec![None, None, Some((30.0, 30.0, None))]);
    let (ctx, _) = context_with(test_config(2), sampler);
    let shutdown = CancellationToken::new();
    let handle = SpeedGuard::spawn(ctx.clone(), shutdown.clone());

    assert!(wait_until(|| !ctx.history.is_empty()).await, "loop never recovered");
    assert_eq!(ctx.history.latest().unwrap().cpu_percent, 30.0);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_disabled_guard_does_not_sample_until_enabled() {
    let sampler = ScriptedSampler::cpu(&[25.0]);
    let calls = sampler.calls.clone();
    let (ctx, _) = context_with(test_config(2), sampler);
    ctx.set_enabled(false);

    let shutdown = CancellationToken::new();
    let handle = SpeedGuard::spawn(ctx.clone(), shutdown.clone());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(ctx.history.is_empty());

    assert!(ctx.toggle());
    assert!(wait_until(|| !ctx.history.is_empty()).await, "loop did not resume");

    assert!(!ctx.toggle());
    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_disabling_keeps_running_workers() {
    let (ctx, launcher) = context_with(test_config(2), ScriptedSampler::cpu(&[10.0]));
    ctx.load.start_one().unwrap();
    assert!(!ctx.toggle());
    assert_eq!(ctx.load.active_count(), 1);
    assert_eq!(launcher.alive(), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_workers_without_emergency() {
    let (ctx, launcher) = context_with(test_config(3), ScriptedSampler::cpu(&[15.0]));
    ctx.load.start_one().unwrap();
    ctx.load.start_one().unwrap();

    let shutdown = CancellationToken::new();
    let handle = SpeedGuard::spawn(ctx.clone(), shutdown.clone());
    assert!(wait_until(|| !ctx.history.is_empty()).await);

    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(ctx.load.active_count(), 0);
    assert_eq!(launcher.alive(), 0);
    assert_eq!(ctx.alerts.count_kind(AlertKind::Emergency), 0);
}

#[tokio::test]
async fn test_user_cancel_on_empty_registry() {
    let (ctx, _) = context_with(test_config(2), ScriptedSampler::cpu(&[10.0]));
    assert_eq!(ctx.load.cancel_all().await, 0);
    assert_eq!(ctx.alerts.count_kind(AlertKind::Emergency), 0);
    assert!(ctx.alerts.is_empty());
}

#[tokio::test]
async fn test_three_concurrent_starts_on_two_cores() {
    let (ctx, launcher) = context_with(test_config(2), ScriptedSampler::cpu(&[10.0]));

    let attempts: Vec<_> = (0..3)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            tokio::task::spawn_blocking(move || ctx.load.start_one())
        })
        .collect();

    let mut ok = 0;
    let mut capacity = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => ok += 1,
            Err(GuardError::CapacityExceeded { .. }) => capacity += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(ok, 2);
    assert_eq!(capacity, 1);
    assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_worker_started_after_cancel_snapshot_survives() {
    let (ctx, _) = context_with(test_config(4), ScriptedSampler::cpu(&[10.0]));
    ctx.load.start_one().unwrap();

    assert_eq!(ctx.load.cancel_all().await, 1);
    let survivor = ctx.load.start_one().unwrap();

    let active = ctx.load.active_workers();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, survivor.id);
}
