//! Mute expiry sweeper
//!
//! Background task that lifts mutes whose deadline has passed. Each candidate is
//! re-checked under the actor's lock, so overlapping sweeps and the lazy lift in
//! the event path never unrestrict the same mute twice. A failed unrestrict
//! leaves the actor muted for the next sweep.

use crate::SWEEP_TARGET;
use crate::moderation::{ActorTracker, EnforcementExecutor, Issuer, ModerationResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Requests accepted by a running sweeper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepRequest {
    /// Sweep immediately instead of waiting for the next tick
    SweepNow,
    /// Stop the sweeper task
    Shutdown,
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub lifted: usize,
    pub failed: usize,
    /// Already lifted by someone else by the time the lock was taken
    pub skipped: usize,
}

#[derive(Clone)]
pub struct MuteSweeper {
    tracker: Arc<ActorTracker>,
    executor: Arc<EnforcementExecutor>,
    interval: Duration,
}

impl MuteSweeper {
    #[must_use]
    pub fn new(
        tracker: Arc<ActorTracker>,
        executor: Arc<EnforcementExecutor>,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            executor,
            interval,
        }
    }

    /// Lift every mute that expired before `now`
    ///
    /// # Errors
    /// Returns an error if the expired mutes cannot be listed. Failures for
    /// single actors are counted in the report instead.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> ModerationResult<SweepReport> {
        let expired = self.tracker.store().list_expired_mutes(now).await?;
        let mut report = SweepReport {
            candidates: expired.len(),
            ..SweepReport::default()
        };

        for candidate in expired {
            let key = candidate.key();
            let mut session = match self.tracker.acquire(key).await {
                Ok(session) => session,
                Err(e) => {
                    error!(target: SWEEP_TARGET, actor = %key, error = %e, "Failed to load muted actor");
                    report.failed += 1;
                    continue;
                }
            };
            if !session.state().mute_expired(now) {
                report.skipped += 1;
                continue;
            }

            let outcome = self
                .executor
                .lift_mute(session.state_mut(), "mute expired", Issuer::Sweeper)
                .await;
            let committed = session.commit().await;
            let lifted = outcome.succeeded();
            self.executor.audit(outcome.record).await;

            match committed {
                Ok(()) if lifted => report.lifted += 1,
                Ok(()) => report.failed += 1,
                Err(e) => {
                    error!(target: SWEEP_TARGET, actor = %key, error = %e, "Failed to save unmuted actor");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Start the periodic sweep task
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(self.run(rx));
        SweeperHandle { tx, task }
    }

    async fn run(self, mut rx: Receiver<SweepRequest>) {
        info!(
            target: SWEEP_TARGET,
            "Starting mute sweeper with {}s interval",
            self.interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(SweepRequest::SweepNow) => self.sweep_logged("requested").await,
                    Some(SweepRequest::Shutdown) | None => break,
                },
                _ = interval.tick() => self.sweep_logged("periodic").await,
            }
        }

        info!(target: SWEEP_TARGET, "Mute sweeper shut down");
    }

    async fn sweep_logged(&self, trigger: &'static str) {
        match self.sweep_once(Utc::now()).await {
            Ok(report) if report.candidates > 0 => info!(
                target: SWEEP_TARGET,
                trigger,
                candidates = report.candidates,
                lifted = report.lifted,
                failed = report.failed,
                skipped = report.skipped,
                "Mute sweep finished"
            ),
            Ok(_) => {}
            Err(e) => error!(target: SWEEP_TARGET, trigger, error = %e, "Mute sweep failed"),
        }
    }
}

/// Control handle for a running sweeper
pub struct SweeperHandle {
    tx: Sender<SweepRequest>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Ask for an immediate sweep; returns false if the sweeper has stopped
    pub async fn sweep_now(&self) -> bool {
        self.tx.send(SweepRequest::SweepNow).await.is_ok()
    }

    /// Stop the sweeper and wait for its current sweep to finish
    pub async fn shutdown(self) {
        if self.tx.send(SweepRequest::Shutdown).await.is_err() {
            warn!(target: SWEEP_TARGET, "Mute sweeper already stopped");
        }
        if let Err(e) = self.task.await {
            error!(target: SWEEP_TARGET, error = %e, "Mute sweeper task failed");
        }
    }
}
