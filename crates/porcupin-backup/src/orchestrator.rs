use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use porcupin_core::constants;
use porcupin_indexer::{RealtimeEvent, RealtimeSubscriber};
use porcupin_store::StoreHandle;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, warn};

use crate::clear::{self, ClearEvents};
use crate::pin_manager::PinManager;
use crate::status::{EngineState, ProgressCounters, StatusSnapshot};
use crate::synchronizer::{CycleOutcome, Synchronizer};

/// Why an account was pushed onto the trigger queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Realtime,
    Manual,
    Stale,
}

/// One entry on the orchestrator's trigger queue (§4.6).
#[derive(Debug, Clone)]
pub struct Trigger {
    pub address: String,
    pub reason: TriggerReason,
}

impl Trigger {
    pub fn new(address: impl Into<String>, reason: TriggerReason) -> Self {
        Self {
            address: address.into(),
            reason,
        }
    }
}

/// Lifecycle, pause/resume coordination, one realtime subscription per
/// account with bounded crash retries, and the single trigger queue that
/// feeds the synchronizer.
pub struct Orchestrator {
    store: Arc<StoreHandle>,
    synchronizer: Arc<Synchronizer>,
    pin_manager: Arc<PinManager>,
    progress: Arc<ProgressCounters>,
    paused: Arc<RwLock<bool>>,
    trigger_tx: mpsc::Sender<Trigger>,
    trigger_rx: AsyncMutex<mpsc::Receiver<Trigger>>,
    realtime_base_url: String,
    clear_events: ClearEvents,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StoreHandle>,
        synchronizer: Arc<Synchronizer>,
        pin_manager: Arc<PinManager>,
        progress: Arc<ProgressCounters>,
        paused: Arc<RwLock<bool>>,
        realtime_base_url: impl Into<String>,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(constants::TRIGGER_QUEUE_CAPACITY);
        Self {
            store,
            synchronizer,
            pin_manager,
            progress,
            paused,
            trigger_tx,
            trigger_rx: AsyncMutex::new(trigger_rx),
            realtime_base_url: realtime_base_url.into(),
            clear_events: ClearEvents::new(),
        }
    }

    /// Subscribe to `clear:*` lifecycle events (§6). Any number of observers
    /// may subscribe independently; a clear sweep proceeds whether or not
    /// anyone is listening.
    pub fn subscribe_clear_events(&self) -> tokio::sync::broadcast::Receiver<crate::clear::ClearEvent> {
        self.clear_events.subscribe()
    }

    /// Bulk-delete everything the engine has accumulated: unpin and GC the
    /// blob store, then wipe the local `tokens`/`pin_intents` tables.
    /// Auto-pauses first so no new pin work races the sweep, and stays
    /// paused afterwards — the caller decides when to `resume()`.
    pub async fn clear_data(&self) -> Result<(), porcupin_core::PorcupinError> {
        self.pause().await;
        clear::clear_data(&self.store, self.pin_manager.blobstore(), &self.clear_events).await
    }

    pub fn status(&self) -> StatusSnapshot {
        self.progress.snapshot()
    }

    /// Non-blocking enqueue; the trigger is silently dropped if the queue
    /// is full (§4.6) — the retry scanner will re-raise a missed stale
    /// account within one tick.
    pub fn enqueue(&self, trigger: Trigger) -> bool {
        match self.trigger_tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(t)) => {
                warn!(address = %t.address, "trigger queue full, dropping trigger");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn pause(&self) {
        *self.paused.write().await = true;
        self.progress.set_paused(true);
        self.progress.set_state(EngineState::Paused, "paused");
        info!("backup engine paused");
    }

    pub async fn resume(&self) {
        *self.paused.write().await = false;
        self.progress.set_paused(false);
        self.progress.set_state(EngineState::Watching, "watching");
        info!("backup engine resumed");
    }

    async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    /// Drive the orchestrator's whole lifetime: catch-up, then realtime
    /// subscribers plus the trigger-queue drain loop, until `shutdown`
    /// fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        self.progress.set_state(EngineState::Starting, "starting");
        let accounts = match self.store.list_accounts().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "failed to list accounts at boot");
                Vec::new()
            }
        };

        self.progress.set_state(EngineState::Syncing, "catch-up in progress");
        for account in &accounts {
            if *shutdown.borrow() {
                self.progress.set_state(EngineState::Stopped, "stopped");
                return;
            }
            self.run_one_cycle(&account.address).await;
        }

        self.progress.set_state(EngineState::Watching, "watching");
        info!(accounts = accounts.len(), "catch-up complete, starting realtime subscribers");

        for account in &accounts {
            let this = Arc::clone(&self);
            let address = account.address.clone();
            let shutdown_rx = shutdown.clone();
            tokio::spawn(async move { this.run_subscriber_supervised(address, shutdown_rx).await });
        }

        let mut rx = self.trigger_rx.lock().await;
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                trigger = rx.recv() => {
                    match trigger {
                        Some(t) => {
                            debug!(address = %t.address, reason = ?t.reason, "draining trigger");
                            self.run_one_cycle(&t.address).await;
                        }
                        None => break,
                    }
                }
            }
        }

        self.progress.set_state(EngineState::Stopped, "stopped");
        info!("orchestrator shut down");
    }

    async fn run_one_cycle(&self, address: &str) {
        if self.is_paused().await {
            debug!(%address, "paused, skipping cycle");
            return;
        }
        self.progress.set_current(Some(address.to_string()), None);
        match self.synchronizer.run_cycle(address).await {
            Ok(CycleOutcome::Success { new_level }) => {
                info!(%address, new_level, "sync cycle complete");
            }
            Ok(CycleOutcome::AccountMissing) => {
                debug!(%address, "account missing, skipped");
            }
            Ok(CycleOutcome::Failed(reason)) => {
                warn!(%address, %reason, "sync cycle failed, cursor not advanced");
            }
            Err(e) => {
                warn!(%address, error = %e, "sync cycle errored");
            }
        }
        self.progress.set_current(None, None);
    }

    /// Supervises one account's realtime subscription: restarts on
    /// transport error up to `SUBSCRIBER_MAX_RESTARTS` times, each after a
    /// `SUBSCRIBER_RESTART_COOLDOWN` cool-down. Beyond the cap the
    /// subscriber is abandoned for good — the account then relies solely
    /// on the retry worker's stale-account health check (§4.5).
    async fn run_subscriber_supervised(&self, address: String, mut shutdown: watch::Receiver<bool>) {
        let restarts = AtomicU32::new(0);
        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.run_subscriber_once(&address, &mut shutdown).await {
                Ok(()) => debug!(%address, "realtime subscription ended cleanly"),
                Err(e) => warn!(%address, error = %e, "realtime subscription errored"),
            }

            if *shutdown.borrow() {
                return;
            }

            let n = restarts.fetch_add(1, Ordering::SeqCst) + 1;
            if n > constants::SUBSCRIBER_MAX_RESTARTS {
                warn!(
                    %address,
                    restarts = n,
                    "realtime subscriber exceeded restart cap, abandoning; relying on stale-account polling"
                );
                return;
            }
            info!(%address, attempt = n, "restarting realtime subscriber after cooldown");
            tokio::select! {
                _ = tokio::time::sleep(constants::SUBSCRIBER_RESTART_COOLDOWN) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Open one subscription, forward account-scoped events into the
    /// trigger queue, and return once the connection drops.
    async fn run_subscriber_once(
        &self,
        address: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), porcupin_core::PorcupinError> {
        let url = format!(
            "{}/v1/ws?account={}",
            self.realtime_base_url.trim_end_matches('/'),
            address
        );
        let (subscriber, mut handle) = RealtimeSubscriber::connect(url);
        let mut run_task = tokio::spawn(async move { subscriber.run_once().await });

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(()),
                result = &mut run_task => {
                    return result.map_err(|e| porcupin_core::PorcupinError::Other(e.to_string()))?;
                }
                event = handle.events_rx.recv() => {
                    match event {
                        Some(RealtimeEvent::NewToken { account, .. })
                        | Some(RealtimeEvent::Transfer { account, .. }) if account == address => {
                            self.enqueue(Trigger::new(account, TriggerReason::Realtime));
                        }
                        Some(_) => {}
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Access to the pin manager's live state, for wiring the retry
    /// scanner (§4.5) which shares the same semaphore and pause flag.
    pub fn pin_manager(&self) -> &Arc<PinManager> {
        &self.pin_manager
    }

    pub fn store(&self) -> &Arc<StoreHandle> {
        &self.store
    }
}
