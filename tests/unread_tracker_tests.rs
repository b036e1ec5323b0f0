// Unread tracker tests
// Time is paused so the poll interval can be stepped through deterministically.

mod common;
use common::{admin, setup_logging, summary, user, FakeTransport};

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use deskline::messaging::unread::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
use deskline::messaging::{ConversationDirectory, Signal, Signals, UnreadTracker};

fn tracker(transport: &Arc<FakeTransport>) -> (UnreadTracker<FakeTransport>, mpsc::Receiver<Signal>) {
    setup_logging();
    let (signals, rx) = Signals::channel(16);
    let directory = ConversationDirectory::new(transport.clone(), admin(), signals.clone());
    (UnreadTracker::new(directory, DEFAULT_POLL_INTERVAL, signals), rx)
}

fn unread_signals(rx: &mut mpsc::Receiver<Signal>) -> Vec<u32> {
    let mut counts = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        if let Signal::UnreadCountChanged(count) = signal {
            counts.push(count);
        }
    }
    counts
}

fn polls(transport: &FakeTransport) -> usize {
    transport.count_calls("list_conversations")
}

#[tokio::test(start_paused = true)]
async fn test_polls_immediately_then_every_interval() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.set_conversations(vec![summary(user("u1", "Ada"), "hi", 1, 2)]);
    let (mut tracker, mut rx) = tracker(&transport);

    tracker.activate();
    assert!(tracker.is_active());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(polls(&transport), 1);
    assert_eq!(tracker.displayed_count().await, 2);
    assert_eq!(unread_signals(&mut rx), vec![2]);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(polls(&transport), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(polls(&transport), 2);
    // Unchanged count is not re-announced
    assert!(unread_signals(&mut rx).is_empty());

    tracker.deactivate().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_keeps_last_count() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.set_conversations(vec![
        summary(user("u1", "Ada"), "hi", 1, 3),
        summary(user("u2", "Ben"), "yo", 2, 1),
    ]);
    let (mut tracker, mut rx) = tracker(&transport);

    tracker.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(tracker.displayed_count().await, 4);
    assert_eq!(unread_signals(&mut rx), vec![4]);

    transport.fail_conversations.store(true, Ordering::SeqCst);
    tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    assert_eq!(polls(&transport), 2);
    assert_eq!(tracker.failed_polls().await, 1);
    assert_eq!(tracker.displayed_count().await, 4);
    assert_eq!(tracker.last_known().await, Some(4));
    assert!(unread_signals(&mut rx).is_empty());

    // Recovers on the next successful poll
    transport.fail_conversations.store(false, Ordering::SeqCst);
    transport.set_conversations(vec![summary(user("u1", "Ada"), "hi", 1, 1)]);
    tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    assert_eq!(tracker.displayed_count().await, 1);
    assert_eq!(unread_signals(&mut rx), vec![1]);

    tracker.deactivate().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_opening_conversation_resets_locally() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.set_conversations(vec![summary(user("u1", "Ada"), "hi", 1, 3)]);
    let (mut tracker, mut rx) = tracker(&transport);

    tracker.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(unread_signals(&mut rx), vec![3]);
    let calls_before = transport.calls().len();

    tracker.conversation_opened().await;
    assert_eq!(tracker.displayed_count().await, 0);
    assert_eq!(unread_signals(&mut rx), vec![0]);
    // Nothing is sent to the server
    assert_eq!(transport.calls().len(), calls_before);

    // The server still reports the messages as unread
    tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    assert_eq!(tracker.displayed_count().await, 3);
    assert_eq!(unread_signals(&mut rx), vec![3]);

    tracker.deactivate().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_stops_polling() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    let (mut tracker, _rx) = tracker(&transport);

    tracker.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(polls(&transport), 1);

    tracker.deactivate().await;
    assert!(!tracker.is_active());

    tokio::time::sleep(DEFAULT_POLL_INTERVAL * 4).await;
    assert_eq!(polls(&transport), 1);

    // Deactivating twice is harmless
    tracker.deactivate().await;
    Ok(())
}

#[tokio::test]
async fn test_refresh_now_without_activation() -> Result<()> {
    let transport = Arc::new(FakeTransport::new());
    transport.set_conversations(vec![summary(user("u1", "Ada"), "hi", 1, 5)]);
    let (tracker, mut rx) = tracker(&transport);

    assert_eq!(tracker.refresh_now().await?, 5);
    assert!(!tracker.is_active());
    assert_eq!(tracker.last_known().await, Some(5));
    assert_eq!(unread_signals(&mut rx), vec![5]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_raised_to_minimum() -> Result<()> {
    setup_logging();
    let transport = Arc::new(FakeTransport::new());
    transport.set_conversations(vec![summary(user("u1", "Ada"), "hi", 1, 1)]);
    let directory = ConversationDirectory::new(transport.clone(), admin(), Signals::disabled());
    let mut tracker = UnreadTracker::new(directory, Duration::ZERO, Signals::disabled());
    assert_eq!(tracker.interval(), MIN_POLL_INTERVAL);

    tracker.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(polls(&transport), 1);
    assert_eq!(tracker.displayed_count().await, 1);

    tokio::time::sleep(MIN_POLL_INTERVAL).await;
    assert_eq!(polls(&transport), 2);

    tracker.deactivate().await;
    Ok(())
}
