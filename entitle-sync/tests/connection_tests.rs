mod common;

use entitle_sync::client::mock::MockBillingClient;
use entitle_sync::{
    Backoff, BillingClient, BillingListener, ConnectOutcome, ConnectionManager, ConnectionState, ReconnectConfig,
    ReconnectRequest, ResponseCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn manager(
    client: &Arc<MockBillingClient>,
    config: &ReconnectConfig,
) -> (ConnectionManager, mpsc::UnboundedReceiver<ReconnectRequest>) {
    common::init_tracing();
    let (tx, rx) = mpsc::unbounded_channel();
    let manager = ConnectionManager::new(client.clone(), config, move |request| {
        let _ = tx.send(request);
    });
    (manager, rx)
}

fn listener() -> BillingListener {
    BillingListener::channel().0
}

// ── Backoff ──────────────────────────────────────────────────────

#[test]
fn backoff_starts_at_floor_and_doubles() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    assert_eq!(backoff.current(), Duration::from_secs(8));
}

#[test]
fn backoff_caps_at_ceiling() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
    let delays: Vec<_> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 5, 5, 5]);
}

#[test]
fn backoff_reset_restores_floor() {
    let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(10));
    backoff.next_delay();
    backoff.next_delay();
    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_millis(250));
}

#[test]
fn backoff_ceiling_never_below_floor() {
    let backoff = Backoff::new(Duration::from_secs(3), Duration::from_secs(1));
    assert_eq!(backoff.ceiling(), Duration::from_secs(3));
}

#[test]
fn default_backoff_runs_from_one_second_to_fifteen_minutes() {
    let mut backoff = Backoff::from(&ReconnectConfig::default());
    assert_eq!(backoff.floor(), Duration::from_secs(1));
    assert_eq!(backoff.ceiling(), Duration::from_secs(15 * 60));
    let last = (0..20).map(|_| backoff.next_delay()).last().unwrap();
    assert_eq!(last, Duration::from_secs(15 * 60));
}

// ── Connecting ───────────────────────────────────────────────────

#[tokio::test]
async fn start_connects() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, _rx) = manager(&client, &ReconnectConfig::default());

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.start(listener()).await, ConnectOutcome::Connected);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(manager.is_ready());
    assert!(!manager.has_pending_reconnect());
}

#[tokio::test]
async fn start_while_connected_is_noop() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, _rx) = manager(&client, &ReconnectConfig::default());

    manager.start(listener()).await;
    assert_eq!(manager.start(listener()).await, ConnectOutcome::AlreadyActive);
    assert_eq!(client.connect_attempts(), 1);
}

#[tokio::test]
async fn state_changes_are_observable() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, _rx) = manager(&client, &ReconnectConfig::default());
    let mut states = manager.subscribe();

    manager.start(listener()).await;
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);
}

// ── Reconnect backoff ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_connects_retry_with_doubling_delay() {
    let client = Arc::new(MockBillingClient::new());
    client.fail_next_connects(3, ResponseCode::ServiceUnavailable);
    let (manager, mut rx) = manager(&client, &ReconnectConfig::default());

    let outcome = manager.start(listener()).await;
    assert!(matches!(outcome, ConnectOutcome::Failed(r) if r.code == ResponseCode::ServiceUnavailable));
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    for (attempt, secs) in [(1, 1), (2, 2), (3, 4)] {
        let before = Instant::now();
        let request = rx.recv().await.unwrap();
        let waited = before.elapsed();

        assert_eq!(request.attempt, attempt);
        assert_eq!(request.delay, Duration::from_secs(secs));
        assert!(waited >= request.delay, "fired early: {waited:?}");
        assert!(waited < request.delay + Duration::from_millis(50), "fired late: {waited:?}");

        manager.start(listener()).await;
    }

    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(client.connect_attempts(), 4);
    assert_eq!(manager.next_reconnect_delay(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn service_disconnect_schedules_one_reconnect() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, mut rx) = manager(&client, &ReconnectConfig::default());
    manager.start(listener()).await;

    client.disconnect();
    assert!(manager.on_disconnected());
    assert!(!manager.on_disconnected());
    assert!(!manager.ensure_reconnect());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(manager.has_pending_reconnect());

    let request = rx.recv().await.unwrap();
    assert_eq!(request.attempt, 1);
    assert_eq!(request.delay, Duration::from_secs(1));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn fired_reconnect_stays_pending_until_next_attempt() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, mut rx) = manager(&client, &ReconnectConfig::default());
    manager.start(listener()).await;

    client.disconnect();
    assert!(manager.on_disconnected());
    let request = rx.recv().await.unwrap();
    assert_eq!(request.attempt, 1);

    // The timer has fired but nothing has acted on the request yet.
    assert!(manager.has_pending_reconnect());
    assert!(!manager.ensure_reconnect());
    assert!(!manager.ensure_reconnect());
    assert_eq!(manager.next_reconnect_delay(), Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());

    assert_eq!(manager.start(listener()).await, ConnectOutcome::Connected);
    assert!(!manager.has_pending_reconnect());
    assert_eq!(manager.next_reconnect_delay(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn ensure_reconnect_detects_stale_connection() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, mut rx) = manager(&client, &ReconnectConfig::default());
    manager.start(listener()).await;

    client.disconnect();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(!manager.is_ready());

    assert!(manager.ensure_reconnect());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(rx.recv().await.unwrap().attempt, 1);
}

#[tokio::test]
async fn ensure_reconnect_is_noop_when_healthy() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, _rx) = manager(&client, &ReconnectConfig::default());
    manager.start(listener()).await;

    assert!(!manager.ensure_reconnect());
    assert!(!manager.has_pending_reconnect());
}

// ── Release ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn release_cancels_pending_reconnect() {
    let client = Arc::new(MockBillingClient::new());
    client.fail_next_connects(1, ResponseCode::ServiceUnavailable);
    let (manager, mut rx) = manager(&client, &ReconnectConfig::default());

    manager.start(listener()).await;
    assert!(manager.has_pending_reconnect());

    manager.release();
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert!(!manager.has_pending_reconnect());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(client.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn halt_stops_reconnects_but_keeps_the_connection() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, mut rx) = manager(&client, &ReconnectConfig::default());
    manager.start(listener()).await;

    manager.halt();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(client.is_ready());
    assert_eq!(client.end_calls(), 0);

    client.disconnect();
    assert!(manager.on_disconnected());
    assert!(!manager.ensure_reconnect());
    assert!(!manager.has_pending_reconnect());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(manager.start(listener()).await, ConnectOutcome::Closed);
    assert_eq!(client.connect_attempts(), 1);

    manager.release();
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(client.end_calls(), 1);
}

#[tokio::test]
async fn release_is_idempotent_and_terminal() {
    let client = Arc::new(MockBillingClient::new());
    let (manager, _rx) = manager(&client, &ReconnectConfig::default());
    manager.start(listener()).await;

    manager.release();
    manager.release();
    assert_eq!(client.end_calls(), 1);
    assert!(!client.is_ready());

    assert_eq!(manager.start(listener()).await, ConnectOutcome::Closed);
    assert!(!manager.on_disconnected());
    assert!(!manager.ensure_reconnect());
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(client.connect_attempts(), 1);
}
