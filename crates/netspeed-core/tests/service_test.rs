#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{Call, FakeLink, Harness, settle, with_threshold};
use netspeed_core::{Configuration, PreferenceStore, RateSample, ServiceMode, Signal};
use pretty_assertions::assert_eq;
use tokio::time::sleep;

// ── Threshold scenarios ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn zero_threshold_never_suppresses() {
    let h = Harness::new(with_threshold(0), FakeLink::new(0, 0));
    h.host.start(with_threshold(0)).await.unwrap();

    sleep(Duration::from_millis(10_500)).await;

    let state = h.host.state().await;
    assert!(!state.suppressed);
    assert!(
        h.renderer
            .calls()
            .iter()
            .all(|c| c.content().is_some_and(|content| !content.hidden))
    );
}

#[tokio::test(start_paused = true)]
async fn foreground_shows_blank_once_suppressed() {
    let h = Harness::new(with_threshold(1_000_000), FakeLink::new(10_000, 2_000));
    h.host.start(with_threshold(1_000_000)).await.unwrap();

    sleep(Duration::from_millis(2_500)).await;
    let state = h.host.state().await;
    assert_eq!(state.mode, ServiceMode::ForegroundVisible);
    assert!(!state.suppressed);
    assert_eq!(state.last_rates, RateSample::new(10_000, 2_000));

    sleep(Duration::from_millis(1_000)).await;
    assert!(h.host.state().await.suppressed);
    let Some(Call::Publish(content)) = h.renderer.last() else {
        panic!("expected a publish");
    };
    assert!(content.hidden);

    sleep(Duration::from_millis(1_600)).await;
    assert!(h.host.state().await.suppressed);
    assert_eq!(h.renderer.cancels(), 0);
}

#[tokio::test(start_paused = true)]
async fn background_bound_cancels_once_suppressed() {
    let h = Harness::new(with_threshold(1_000_000), FakeLink::new(10_000, 10_000));
    let _grant = h.host.grant_keepalive();
    h.host.start(with_threshold(1_000_000)).await.unwrap();

    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(h.host.state().await.mode, ServiceMode::BackgroundBound);
    assert!(matches!(h.renderer.last(), Some(Call::Publish(c)) if !c.hidden));

    sleep(Duration::from_millis(2_600)).await;
    let state = h.host.state().await;
    assert!(state.suppressed);
    assert_eq!(state.mode, ServiceMode::BackgroundBound);
    // One cancel at the third second, nothing published after it.
    assert_eq!(h.renderer.last(), Some(Call::Cancel));
    assert_eq!(h.renderer.cancels(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_foreground_while_suppressed_cancels_the_blank() {
    let h = Harness::new(with_threshold(1_000_000), FakeLink::new(10_000, 10_000));
    h.host.start(with_threshold(1_000_000)).await.unwrap();

    sleep(Duration::from_millis(3_500)).await;
    assert!(h.host.state().await.suppressed);
    assert!(matches!(h.renderer.last(), Some(Call::Publish(c)) if c.hidden));

    h.renderer.clear();
    h.host.broadcast(Signal::StopForeground).await;
    sleep(Duration::from_millis(3_000)).await;

    let state = h.host.state().await;
    assert_eq!(state.mode, ServiceMode::BackgroundBound);
    assert!(state.suppressed);
    assert_eq!(h.renderer.calls(), vec![Call::Cancel]);
}

#[tokio::test(start_paused = true)]
async fn keepalive_granted_while_suppressed_cancels_the_blank() {
    let h = Harness::new(with_threshold(1_000_000), FakeLink::new(10_000, 10_000));
    h.host.start(with_threshold(1_000_000)).await.unwrap();
    sleep(Duration::from_millis(3_500)).await;
    assert!(h.host.state().await.suppressed);

    h.renderer.clear();
    let _grant = h.host.grant_keepalive();
    sleep(Duration::from_millis(2_000)).await;

    assert_eq!(h.host.state().await.mode, ServiceMode::BackgroundBound);
    assert_eq!(h.renderer.calls(), vec![Call::Cancel]);
}

#[tokio::test(start_paused = true)]
async fn traffic_back_above_threshold_unsuppresses_immediately() {
    let h = Harness::new(with_threshold(5_000), FakeLink::new(100, 100));
    h.host.start(with_threshold(5_000)).await.unwrap();

    sleep(Duration::from_millis(3_500)).await;
    assert!(h.host.state().await.suppressed);

    h.link.set_rate(50_000, 0);
    sleep(Duration::from_millis(1_000)).await;
    assert!(!h.host.state().await.suppressed);
    let Some(Call::Publish(content)) = h.renderer.last() else {
        panic!("expected a publish");
    };
    assert!(!content.hidden);

    sleep(Duration::from_millis(1_000)).await;
    let content = h.renderer.last().unwrap().content().cloned().unwrap();
    assert_eq!(content.rates.rx_rate, 50_000);
}

// ── Reconfiguration ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn equal_configuration_causes_no_renderer_calls() {
    let configuration = with_threshold(0);
    let h = Harness::new(configuration.clone(), FakeLink::new(1_000, 1_000));
    h.host.start(configuration.clone()).await.unwrap();
    let binding = h.host.bind().await.unwrap();
    sleep(Duration::from_millis(500)).await;
    h.renderer.clear();

    h.host
        .update_configuration(binding, configuration)
        .await
        .unwrap();
    settle().await;

    assert_eq!(h.renderer.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn interval_change_rearms_without_losing_baseline() {
    let h = Harness::new(Configuration::default(), FakeLink::new(4_000, 0));
    h.host.start(Configuration::default()).await.unwrap();
    let binding = h.host.bind().await.unwrap();

    sleep(Duration::from_millis(500)).await;
    h.link.set_rate(0, 0);
    let slower = Configuration {
        interval_ms: 2_000,
        ..Configuration::default()
    };
    h.host
        .update_configuration(binding, slower.clone())
        .await
        .unwrap();
    settle().await;

    // Immediate re-render with the new configuration.
    let last = h.renderer.last().unwrap();
    assert_eq!(last.content().unwrap().configuration, slower);

    // No tick at t=1s any more; next one is 2s after the re-arm.
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(h.host.state().await.last_rates, RateSample::ZERO);

    sleep(Duration::from_millis(600)).await;
    // 2000 bytes since the t=0 baseline over 2.5s.
    assert_eq!(h.host.state().await.last_rates.rx_rate, 800);
}

// ── Screen state ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn screen_off_pauses_and_screen_on_rebaselines() {
    let h = Harness::new(Configuration::default(), FakeLink::new(1_000, 1_000));
    h.host.start(Configuration::default()).await.unwrap();
    sleep(Duration::from_millis(1_500)).await;

    h.host.broadcast(Signal::ScreenOff).await;
    settle().await;
    assert!(h.host.state().await.paused);
    let reads = h.link.reads();
    let calls = h.renderer.len();

    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.link.reads(), reads);
    assert_eq!(h.renderer.len(), calls);

    h.host.broadcast(Signal::ScreenOn).await;
    settle().await;
    let state = h.host.state().await;
    assert!(!state.paused);
    // Immediate refresh with the last known rates.
    assert_eq!(h.renderer.len(), calls + 1);
    assert_eq!(
        h.renderer.last().unwrap().content().unwrap().rates,
        RateSample::new(1_000, 1_000)
    );

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(
        h.host.state().await.last_rates,
        RateSample::new(1_000, 1_000)
    );
}

// ── Failures ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn counter_failures_republish_previous_rates() {
    let h = Harness::new(Configuration::default(), FakeLink::new(3_000, 1_000));
    h.host.start(Configuration::default()).await.unwrap();
    sleep(Duration::from_millis(1_500)).await;

    h.link.set_failing(true);
    let before = h.renderer.len();
    sleep(Duration::from_millis(4_000)).await;

    let state = h.host.state().await;
    assert_eq!(state.mode, ServiceMode::ForegroundVisible);
    assert_eq!(state.last_rates, RateSample::new(3_000, 1_000));
    let republished = &h.renderer.calls()[before..];
    assert_eq!(republished.len(), 4);
    assert!(
        republished
            .iter()
            .all(|c| c.content().unwrap().rates == RateSample::new(3_000, 1_000))
    );
}

// ── Mode transitions ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn drop_foreground_is_idempotent() {
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let _grant = h.host.grant_keepalive();
    h.host.start(Configuration::default()).await.unwrap();
    settle().await;
    assert_eq!(h.host.state().await.mode, ServiceMode::BackgroundBound);

    h.renderer.clear();
    h.host.broadcast(Signal::StopForeground).await;
    settle().await;

    assert_eq!(h.host.state().await.mode, ServiceMode::BackgroundBound);
    assert_eq!(h.renderer.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn revoked_keepalive_returns_to_foreground() {
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    h.host.start(Configuration::default()).await.unwrap();
    settle().await;
    assert_eq!(h.host.state().await.mode, ServiceMode::ForegroundVisible);

    let grant = h.host.grant_keepalive();
    settle().await;
    assert_eq!(h.host.state().await.mode, ServiceMode::BackgroundBound);

    drop(grant);
    settle().await;
    assert_eq!(h.host.state().await.mode, ServiceMode::ForegroundVisible);
    assert!(matches!(h.renderer.last(), Some(Call::Foreground(_))));
}

#[tokio::test(start_paused = true)]
async fn bind_only_instance_lives_with_its_bindings() {
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    let binding = h.host.bind().await.unwrap();
    settle().await;
    assert_eq!(h.host.state().await.mode, ServiceMode::BackgroundBound);
    assert!(
        !h.renderer
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Foreground(_)))
    );

    h.host.unbind(binding).await;
    assert_eq!(h.host.state().await.mode, ServiceMode::Stopped);
    assert_eq!(h.renderer.cancels(), 1);
    // Not a user-initiated close.
    assert!(h.store.status());
}

#[tokio::test(start_paused = true)]
async fn started_instance_survives_unbind() {
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    h.host.start(Configuration::default()).await.unwrap();
    let binding = h.host.bind().await.unwrap();
    h.host.unbind(binding).await;
    settle().await;
    assert_eq!(h.host.state().await.mode, ServiceMode::ForegroundVisible);
}

// ── Teardown ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn close_signal_tears_down_once_and_clears_status() {
    let h = Harness::new(Configuration::default(), FakeLink::new(500, 500));
    h.host.start(Configuration::default()).await.unwrap();
    sleep(Duration::from_millis(2_500)).await;

    h.host.broadcast(Signal::Close).await;
    sleep(Duration::from_secs(5)).await;

    assert_eq!(h.host.state().await.mode, ServiceMode::Stopped);
    assert_eq!(h.renderer.cancels(), 1);
    assert_eq!(h.renderer.last(), Some(Call::Cancel));
    assert!(!h.store.status());
}

#[tokio::test(start_paused = true)]
async fn shutdown_keeps_status_for_next_launch() {
    let h = Harness::new(Configuration::default(), FakeLink::new(0, 0));
    h.host.start(Configuration::default()).await.unwrap();
    settle().await;

    h.host.shutdown().await;
    assert_eq!(h.renderer.cancels(), 1);
    assert!(h.store.status());

    h.host.start(Configuration::default()).await.unwrap();
    settle().await;
    h.host.stop().await;
    assert_eq!(h.renderer.cancels(), 2);
    assert!(!h.store.status());
}

#[tokio::test(start_paused = true)]
async fn status_report_describes_running_instance() {
    let h = Harness::new(with_threshold(7), FakeLink::new(0, 0));
    assert_eq!(h.host.status().await.state.mode, ServiceMode::Stopped);

    h.host.start(with_threshold(7)).await.unwrap();
    h.host.bind().await.unwrap();
    settle().await;

    let report = h.host.status().await;
    assert_eq!(report.state.mode, ServiceMode::ForegroundVisible);
    assert_eq!(report.configuration, Some(with_threshold(7)));
    assert_eq!(report.bindings, 1);
    assert!(report.started_at.is_some());
    assert!(report.status_flag);
    assert!(!report.keepalive);
}
