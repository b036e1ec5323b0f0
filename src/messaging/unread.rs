// Background unread poller
// Refreshes the directory immediately on activation and then every interval
// until deactivated. A failed poll never replaces the last known count.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::transport::Transport;
use super::directory::ConversationDirectory;
use super::{ChatError, Signal, Signals};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Shorter configured intervals are raised to this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct BadgeState {
    /// Aggregate from the last successful poll
    last_known: Option<u32>,
    /// What the host shows
    displayed: u32,
    failures: u64,
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct UnreadTracker<T: Transport + 'static> {
    directory: ConversationDirectory<T>,
    interval: Duration,
    signals: Signals,
    state: Arc<TokioMutex<BadgeState>>,
    worker: Option<Worker>,
}

impl<T: Transport + 'static> UnreadTracker<T> {
    pub fn new(directory: ConversationDirectory<T>, interval: Duration, signals: Signals) -> Self {
        if interval < MIN_POLL_INTERVAL {
            warn!("Poll interval {:?} too short, using {:?}", interval, MIN_POLL_INTERVAL);
        }
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self {
            directory,
            interval,
            signals,
            state: Arc::new(TokioMutex::new(BadgeState::default())),
            worker: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Start polling. The first poll runs right away.
    pub fn activate(&mut self) {
        if self.worker.is_some() {
            debug!("Unread tracker already active");
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_poll_loop(
            self.directory.clone(),
            self.state.clone(),
            self.signals.clone(),
            self.interval,
            shutdown_rx,
        ));

        info!("Unread tracker started, polling every {:?}", self.interval);
        self.worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Stop polling and wait for the loop to exit. Nothing is applied after this returns.
    pub async fn deactivate(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.shutdown.send(());
        if let Err(e) = worker.handle.await {
            warn!("Unread poll loop ended abnormally: {}", e);
        }
        info!("Unread tracker stopped");
    }

    /// Poll once outside the schedule
    pub async fn refresh_now(&self) -> Result<u32, ChatError> {
        poll_once(&self.directory, &self.state, &self.signals).await
    }

    /// Local-only reset when the conversation view opens. The server is not
    /// told, so the next successful poll may bring the count back.
    pub async fn conversation_opened(&self) {
        let mut state = self.state.lock().await;
        if state.displayed != 0 {
            state.displayed = 0;
            self.signals.emit(Signal::UnreadCountChanged(0));
        }
        debug!("Unread badge reset locally");
    }

    pub async fn displayed_count(&self) -> u32 {
        self.state.lock().await.displayed
    }

    pub async fn last_known(&self) -> Option<u32> {
        self.state.lock().await.last_known
    }

    pub async fn failed_polls(&self) -> u64 {
        self.state.lock().await.failures
    }
}

impl<T: Transport + 'static> Drop for UnreadTracker<T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.handle.abort();
        }
    }
}

async fn poll_once<T: Transport>(
    directory: &ConversationDirectory<T>,
    state: &TokioMutex<BadgeState>,
    signals: &Signals,
) -> Result<u32, ChatError> {
    let result = directory.refresh().await;
    apply_poll_result(directory, state, signals, result).await
}

async fn apply_poll_result<T: Transport>(
    directory: &ConversationDirectory<T>,
    state: &TokioMutex<BadgeState>,
    signals: &Signals,
    result: Result<usize, ChatError>,
) -> Result<u32, ChatError> {
    match result {
        Ok(_) => {
            let aggregate = directory.aggregate_unread().await;
            let mut state = state.lock().await;
            state.last_known = Some(aggregate);
            if state.displayed != aggregate {
                state.displayed = aggregate;
                signals.emit(Signal::UnreadCountChanged(aggregate));
            }
            debug!("Unread poll: {}", aggregate);
            Ok(aggregate)
        }
        Err(e) => {
            let mut state = state.lock().await;
            state.failures += 1;
            warn!(
                "Unread poll failed ({} so far), keeping {:?}: {}",
                state.failures, state.last_known, e
            );
            Err(e)
        }
    }
}

async fn run_poll_loop<T: Transport + 'static>(
    directory: ConversationDirectory<T>,
    state: Arc<TokioMutex<BadgeState>>,
    signals: Signals,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // First tick completes immediately
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        // Dropping an in-flight refresh on shutdown keeps late results out
        let result = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = directory.refresh() => result,
        };

        let _ = apply_poll_result(&directory, &state, &signals, result).await;
    }
    debug!("Unread poll loop exiting");
}
