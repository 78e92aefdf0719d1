use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::settings::Settings;
use crate::models::sync::{
    rate_limited_message, SyncOutcome, SyncState, SyncStatus, SYNC_FAILED_MESSAGE,
};
use crate::services::holdings_store::HoldingsStore;
use crate::services::price_service::PriceService;

/// Holdings list shared between the facade and the sync loop.
pub type SharedStore = Arc<Mutex<HoldingsStore>>;

/// On-demand refresh sent to the loop; carries a reply slot when the caller
/// waits for the outcome.
type RefreshRequest = Option<oneshot::Sender<SyncOutcome>>;

/// Lower bound for the periodic timer (`tokio::time::interval` rejects zero).
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Periodic,
    Manual,
    Retry,
}

/// Drives price refreshes for the holdings list.
///
/// State machine: `Idle → Syncing` on the periodic tick or a manual refresh,
/// `Syncing → Idle` on success, `Syncing → Backoff` on failure with exactly one
/// retry scheduled (60s after a rate limit, 30s after anything else), and
/// `Backoff → Syncing` when that retry fires. Triggers that arrive while a
/// cycle is running or a retry is pending are dropped.
///
/// Once `spawn`ed, the loop task owns every cycle and `refresh` is forwarded
/// to it. Without a loop, `refresh` runs the cycle itself and keeps the retry
/// in a background task.
#[derive(Clone)]
pub struct SyncController {
    store: SharedStore,
    prices: Arc<PriceService>,
    refresh_interval: Duration,
    rate_limit_retry: Duration,
    failure_retry: Duration,
    status: Arc<watch::Sender<SyncStatus>>,
    /// Held for the whole of a cycle.
    cycle: Arc<tokio::sync::Mutex<()>>,
    /// Request queue of the running loop.
    requests: Arc<Mutex<Option<mpsc::Sender<RefreshRequest>>>>,
    /// Pending retry of a refresh made without the loop.
    retry_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncController {
    pub fn new(store: SharedStore, prices: Arc<PriceService>, settings: &Settings) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            prices,
            refresh_interval: settings.refresh_interval(),
            rate_limit_retry: settings.rate_limit_retry(),
            failure_retry: settings.failure_retry(),
            status: Arc::new(status),
            cycle: Arc::new(tokio::sync::Mutex::new(())),
            requests: Arc::new(Mutex::new(None)),
            retry_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to status updates.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Latest published status.
    pub fn current_status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Request a cycle now and wait for its outcome.
    ///
    /// Returns `Skipped` without touching the provider when a cycle is already
    /// running or a retry is pending. A failed cycle schedules its retry.
    pub async fn refresh(&self) -> SyncOutcome {
        if let Some(outcome) = self.refresh_via_loop().await {
            return outcome;
        }

        let Ok(_cycle) = self.cycle.try_lock() else {
            debug!("sync in flight, refresh dropped");
            return SyncOutcome::Skipped;
        };
        if self.status.borrow().state == SyncState::Backoff {
            debug!("retry pending, refresh dropped");
            return SyncOutcome::Skipped;
        }

        let outcome = self.run_cycle(Trigger::Manual).await;
        if let Some(delay) = self.retry_delay(&outcome) {
            self.schedule_retry(delay);
        }
        outcome
    }

    /// Forward to the running loop. `None` when no loop is running.
    async fn refresh_via_loop(&self) -> Option<SyncOutcome> {
        let sender = self.lock_requests().clone()?;
        let (reply, outcome) = oneshot::channel();
        match sender.try_send(Some(reply)) {
            Ok(()) => Some(outcome.await.unwrap_or(SyncOutcome::Skipped)),
            Err(mpsc::error::TrySendError::Full(_)) => Some(SyncOutcome::Skipped),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.release(&sender);
                None
            }
        }
    }

    /// Start the loop on the current tokio runtime.
    ///
    /// The first periodic tick fires immediately, so a cycle runs at startup.
    /// A retry left over from a standalone refresh is cancelled; that first
    /// cycle replaces it.
    pub fn spawn(self) -> SyncHandle {
        self.cancel_retry();

        let (request_tx, request_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.lock_requests() = Some(request_tx.clone());

        let task = tokio::spawn(self.clone().run(request_rx, shutdown_rx));
        SyncHandle {
            requests: request_tx,
            shutdown: Some(shutdown_tx),
            controller: self,
            task: Some(task),
        }
    }

    /// Abort a pending standalone retry, if any, and return to `Idle`.
    pub fn cancel_retry(&self) {
        if let Some(task) = self.lock_retry().take() {
            task.abort();
            self.status.send_modify(|s| {
                s.state = SyncState::Idle;
                s.next_retry = None;
            });
        }
    }

    async fn run(
        self,
        mut requests: mpsc::Receiver<RefreshRequest>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let period = self.refresh_interval.max(MIN_REFRESH_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut retry_at: Option<Instant> = None;
        info!(interval_secs = self.refresh_interval.as_secs(), "price sync started");

        loop {
            let retry_due = retry_at.unwrap_or_else(Instant::now);
            let (trigger, reply) = tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => (Trigger::Periodic, None),
                msg = requests.recv() => match msg {
                    Some(reply) => (Trigger::Manual, reply),
                    None => break,
                },
                _ = tokio::time::sleep_until(retry_due), if retry_at.is_some() => {
                    (Trigger::Retry, None)
                }
            };

            match trigger {
                Trigger::Retry => {
                    retry_at = None;
                    self.clear_retry_message();
                }
                Trigger::Periodic | Trigger::Manual if retry_at.is_some() => {
                    debug!(?trigger, "retry pending, trigger ignored");
                    skip(reply);
                    continue;
                }
                Trigger::Periodic | Trigger::Manual => {}
            }

            let outcome = {
                let _cycle = self.cycle.lock().await;
                self.run_cycle(trigger).await
            };
            if let Some(delay) = self.retry_delay(&outcome) {
                retry_at = Some(Instant::now() + delay);
            }
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }

            // Refresh requests that queued up during the cycle are dropped.
            while let Ok(queued) = requests.try_recv() {
                skip(queued);
            }
        }

        self.mark_idle();
        info!("price sync stopped");
    }

    /// One cycle: resolve prices, apply them, publish the resulting state.
    ///
    /// Periodic cycles always ask the provider; manual and retry cycles serve
    /// valid cache entries first.
    async fn run_cycle(&self, trigger: Trigger) -> SyncOutcome {
        let ids = self.lock_store().token_ids();
        if ids.is_empty() {
            debug!("no holdings, skipping price sync");
            return SyncOutcome::Skipped;
        }

        self.status.send_modify(|s| s.state = SyncState::Syncing);
        debug!(count = ids.len(), ?trigger, "syncing prices");

        let fetched = match trigger {
            Trigger::Periodic => self.prices.refresh_prices(&ids).await,
            Trigger::Manual | Trigger::Retry => self.prices.get_prices(&ids).await,
        };
        let outcome = match fetched {
            // Applied to the list as it is now; edits made during the fetch win
            // for amount, the fetched prices win for price fields.
            Ok(quotes) => match self.lock_store().apply_quotes(&quotes) {
                Ok(report) => SyncOutcome::Completed(report),
                Err(e) => {
                    warn!(error = %e, "saving synced holdings failed");
                    SyncOutcome::Failed(e.to_string())
                }
            },
            Err(e) if e.is_rate_limited() => SyncOutcome::RateLimited,
            Err(e) => SyncOutcome::Failed(e.to_string()),
        };

        self.publish(&outcome);
        outcome
    }

    /// Publish the state that follows `outcome` in a single update.
    fn publish(&self, outcome: &SyncOutcome) {
        let (message, delay) = match outcome {
            SyncOutcome::Skipped => return,
            SyncOutcome::Completed(report) => {
                info!(
                    updated = report.updated.len(),
                    unavailable = report.unavailable.len(),
                    "price sync completed"
                );
                let report = report.clone();
                self.status.send_modify(|s| {
                    s.state = SyncState::Idle;
                    s.message = None;
                    s.last_synced = Some(Utc::now());
                    s.last_report = Some(report);
                    s.next_retry = None;
                });
                return;
            }
            SyncOutcome::RateLimited => {
                warn!("price sync rate limited");
                let message = rate_limited_message(self.rate_limit_retry.as_secs());
                (message, self.rate_limit_retry)
            }
            SyncOutcome::Failed(reason) => {
                warn!(error = %reason, "price sync failed");
                (SYNC_FAILED_MESSAGE.to_string(), self.failure_retry)
            }
        };

        let due = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        info!(retry_in_secs = delay.as_secs(), "price sync backing off");
        self.status.send_modify(|s| {
            s.state = SyncState::Backoff;
            s.message = Some(message);
            s.next_retry = due;
        });
    }

    /// Delay before the single retry that follows `outcome`, if any.
    fn retry_delay(&self, outcome: &SyncOutcome) -> Option<Duration> {
        match outcome {
            SyncOutcome::RateLimited => Some(self.rate_limit_retry),
            SyncOutcome::Failed(_) => Some(self.failure_retry),
            SyncOutcome::Skipped | SyncOutcome::Completed(_) => None,
        }
    }

    /// Run one retry after `delay` outside the loop. A failed retry schedules
    /// the next one.
    fn schedule_retry(&self, delay: Duration) {
        let controller = self.clone();
        // Spawned under the slot lock so a quickly failing retry cannot store
        // its successor before this handle is stored.
        let mut slot = self.lock_retry();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _cycle = controller.cycle.lock().await;
            controller.clear_retry_message();
            let outcome = controller.run_cycle(Trigger::Retry).await;
            if let Some(delay) = controller.retry_delay(&outcome) {
                controller.schedule_retry(delay);
            }
        }));
    }

    fn clear_retry_message(&self) {
        self.status.send_modify(|s| {
            s.message = None;
            s.next_retry = None;
        });
    }

    /// Forget the loop behind `requests` unless a newer loop replaced it.
    fn release(&self, requests: &mpsc::Sender<RefreshRequest>) {
        let mut slot = self.lock_requests();
        if slot.as_ref().is_some_and(|s| s.same_channel(requests)) {
            *slot = None;
        }
    }

    fn mark_idle(&self) {
        self.status.send_modify(|s| {
            s.state = SyncState::Idle;
            s.next_retry = None;
        });
    }

    fn lock_store(&self) -> MutexGuard<'_, HoldingsStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_requests(&self) -> MutexGuard<'_, Option<mpsc::Sender<RefreshRequest>>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_retry(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.retry_task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn skip(reply: RefreshRequest) {
    if let Some(reply) = reply {
        let _ = reply.send(SyncOutcome::Skipped);
    }
}

/// Owner handle of a running `SyncController` loop.
///
/// Dropping the handle aborts the loop, pending retry included.
pub struct SyncHandle {
    requests: mpsc::Sender<RefreshRequest>,
    shutdown: Option<oneshot::Sender<()>>,
    controller: SyncController,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Queue an on-demand refresh without waiting for it. Returns `false`
    /// when one is already queued or the loop has stopped.
    pub fn refresh(&self) -> bool {
        self.requests.try_send(None).is_ok()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.controller.status()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it to exit. A cycle already in flight finishes first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.controller.mark_idle();
        }
        self.controller.release(&self.requests);
    }
}
