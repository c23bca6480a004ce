use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use porcupin_core::constants;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::diskusage::DiskUsageProbe;
use crate::orchestrator::{Orchestrator, Trigger, TriggerReason};
use crate::pin_manager::PinManager;

/// Periodic sweeps independent of any particular sync cycle: promotes stuck
/// `pending` intents, reschedules retriable failures, refreshes the cached
/// disk-usage sample, and nudges quiet accounts back onto the trigger queue
/// (§4.5).
pub struct ScannerWorker {
    pin_manager: Arc<PinManager>,
    orchestrator: Arc<Orchestrator>,
    disk_probe: Arc<dyn DiskUsageProbe>,
    repo_path: PathBuf,
    max_retries: i64,
    wake_interval: std::time::Duration,
}

impl ScannerWorker {
    pub fn new(
        pin_manager: Arc<PinManager>,
        orchestrator: Arc<Orchestrator>,
        disk_probe: Arc<dyn DiskUsageProbe>,
        repo_path: PathBuf,
        max_retries: i64,
    ) -> Self {
        Self {
            pin_manager,
            orchestrator,
            disk_probe,
            repo_path,
            max_retries,
            wake_interval: constants::SCANNER_WAKE_INTERVAL,
        }
    }

    /// Run the periodic loop until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.wake_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.wake().await;
                }
            }
        }
    }

    /// One wake: run every sub-sweep, logging but never propagating a
    /// single sweep's failure into the others.
    pub async fn wake(&self) {
        if let Err(e) = self.promote_pending().await {
            warn!(error = %e, "scanner: promoting pending intents failed");
        }
        self.refresh_disk_usage_if_dirty().await;
        if let Err(e) = self.reschedule_retriable_failures().await {
            warn!(error = %e, "scanner: rescheduling failures failed");
        }
        if let Err(e) = self.nudge_stale_accounts().await {
            warn!(error = %e, "scanner: nudging stale accounts failed");
        }
    }

    /// Promote up to `SCANNER_PENDING_BATCH_CAP` `pending` intents, running
    /// the same pin sub-procedure C4 uses (§4.4 step 7c–k), directly.
    async fn promote_pending(&self) -> Result<(), porcupin_core::PorcupinError> {
        let pending = self
            .orchestrator
            .store()
            .scan_pending(constants::SCANNER_PENDING_BATCH_CAP)
            .await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!(count = pending.len(), "scanner: promoting pending intents");
        for intent in pending {
            if let Err(e) = self.pin_manager.pin_intent(&intent.uri, intent.id).await {
                warn!(uri = %intent.uri, error = %e, "scanner: pin attempt errored");
            }
        }
        Ok(())
    }

    /// Refresh the cached disk-usage sample only if the dirty flag is set,
    /// exchanging it for `false` atomically so a pin completing mid-refresh
    /// isn't lost.
    async fn refresh_disk_usage_if_dirty(&self) {
        let was_dirty = self.pin_manager.disk_dirty.swap(false, Ordering::SeqCst);
        if !was_dirty {
            return;
        }

        let probe = Arc::clone(&self.disk_probe);
        let repo_path = self.repo_path.clone();
        let sample = tokio::task::spawn_blocking(move || probe.sample(&repo_path)).await;

        match sample {
            Ok(Ok(sample)) => {
                let value = serde_json::to_string(&sample).unwrap_or_default();
                if let Err(e) = self
                    .orchestrator
                    .store()
                    .put_setting("disk_usage_sample", &value)
                    .await
                {
                    warn!(error = %e, "scanner: failed to persist disk usage sample");
                } else {
                    debug!(used_pct = sample.used_pct(), "scanner: disk usage sample refreshed");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "scanner: disk usage probe failed"),
            Err(e) => warn!(error = %e, "scanner: disk usage probe task panicked"),
        }
    }

    /// `failed`/`failed_unavailable` intents with room left under
    /// `max_retries` go back to `pending` for the next wake to pick up.
    async fn reschedule_retriable_failures(&self) -> Result<(), porcupin_core::PorcupinError> {
        let store = self.orchestrator.store();
        let retriable = store.scan_retriable_failed(self.max_retries).await?;
        if retriable.is_empty() {
            return Ok(());
        }
        debug!(count = retriable.len(), "scanner: rescheduling retriable failures");
        for intent in retriable {
            store.reset_to_pending(intent.id).await?;
        }
        Ok(())
    }

    /// Accounts whose last successful cycle is older than the staleness
    /// threshold get a trigger enqueued so they get a poll-driven refresh
    /// even if their realtime subscriber has been abandoned.
    async fn nudge_stale_accounts(&self) -> Result<(), porcupin_core::PorcupinError> {
        let stale = self
            .orchestrator
            .store()
            .list_stale_accounts(constants::STALE_ACCOUNT_THRESHOLD)
            .await?;
        for account in stale {
            if self
                .orchestrator
                .enqueue(Trigger::new(account.address.clone(), TriggerReason::Stale))
            {
                info!(address = %account.address, "scanner: nudged stale account");
            }
        }
        Ok(())
    }
}
