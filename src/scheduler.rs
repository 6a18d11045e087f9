use crate::error::SyncError;
use crate::mailbox::MailboxProvider;
use crate::sync::{SyncReport, SyncState, Syncer};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// Funnels periodic and manual triggers into one sync entry point, with at
/// most one cycle in flight.
pub struct Scheduler<P> {
    syncer: Syncer<P>,
    state: Arc<Mutex<SyncState>>,
}

impl<P: MailboxProvider + 'static> Scheduler<P> {
    pub fn new(syncer: Syncer<P>) -> Self {
        Self {
            syncer,
            state: Arc::new(Mutex::new(SyncState::default())),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> Arc<Mutex<SyncState>> {
        self.state.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs one cycle. Returns `None` without doing anything when another
    /// cycle is still running.
    pub async fn trigger(&self, trigger: Trigger) -> Option<Result<SyncReport, SyncError>> {
        {
            let mut state = self.lock_state();
            if !state.try_begin() {
                info!(?trigger, since = ?state.last_started, "sync already running, trigger ignored");
                return None;
            }
        }

        info!(?trigger, "sync cycle started");
        let result = self.syncer.run_cycle().await;
        match &result {
            Ok(report) => info!(
                inserted = report.inserted,
                skipped = report.skipped,
                candidates = report.candidates,
                fallback_dated = report.fallback_dated,
                expired_purged = report.expired_purged,
                legacy_purged = report.legacy_purged,
                "sync cycle finished"
            ),
            Err(e) => error!(error = %e, "sync cycle failed"),
        }

        self.lock_state().finish(&result);
        Some(result)
    }

    /// Triggers a cycle every `interval` (the first immediately) and on
    /// SIGUSR1, until Ctrl-C.
    pub async fn run(self: Arc<Self>, interval: Duration) -> anyhow::Result<()> {
        self.run_until(interval, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Like [`Scheduler::run`], stopping when `shutdown` resolves. Cycles
    /// already in flight are waited for before returning.
    pub async fn run_until(
        self: Arc<Self>,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut manual = manual_signal()?;
        let mut cycles = JoinSet::new();
        tokio::pin!(shutdown);

        info!(interval_secs = interval.as_secs(), "scheduler running");
        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => Trigger::Scheduled,
                _ = manual_requested(&mut manual) => Trigger::Manual,
                Some(_) = cycles.join_next(), if !cycles.is_empty() => continue,
                _ = &mut shutdown => break,
            };

            let scheduler = self.clone();
            cycles.spawn(async move {
                scheduler.trigger(trigger).await;
            });
        }

        if !cycles.is_empty() {
            info!(in_flight = cycles.len(), "waiting for running sync cycle");
            while cycles.join_next().await.is_some() {}
        }

        let state = self.lock_state();
        info!(
            cycles = state.cycles,
            last_finished = ?state.last_finished,
            last_inserted = ?state.last_report.as_ref().map(|r| r.inserted),
            last_error = ?state.last_error,
            "shutting down"
        );
        Ok(())
    }
}

#[cfg(unix)]
type ManualSignal = tokio::signal::unix::Signal;

#[cfg(not(unix))]
type ManualSignal = ();

#[cfg(unix)]
fn manual_signal() -> std::io::Result<ManualSignal> {
    use tokio::signal::unix::{SignalKind, signal};
    signal(SignalKind::user_defined1())
}

#[cfg(not(unix))]
fn manual_signal() -> std::io::Result<ManualSignal> {
    Ok(())
}

#[cfg(unix)]
async fn manual_requested(signal: &mut ManualSignal) {
    if signal.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
async fn manual_requested(_signal: &mut ManualSignal) {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::dates::AmbiguousDates;
    use crate::db::Database;
    use crate::mailbox::{Mailbox, SearchQuery};
    use crate::models::RawMessage;
    use async_trait::async_trait;
    use tokio::sync::{Notify, oneshot};

    struct EmptyMailbox;

    #[async_trait]
    impl Mailbox for EmptyMailbox {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<String>, SyncError> {
            Ok(Vec::new())
        }

        async fn fetch(&self, message_id: &str) -> Result<RawMessage, SyncError> {
            Err(SyncError::Transport(anyhow::anyhow!("unexpected fetch of {message_id}")))
        }
    }

    /// Holds `connect` until released.
    struct GatedProvider {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl MailboxProvider for GatedProvider {
        type Client = EmptyMailbox;

        async fn connect(&self) -> Result<EmptyMailbox, SyncError> {
            self.release.notified().await;
            Ok(EmptyMailbox)
        }
    }

    async fn scheduler(release: Arc<Notify>) -> Arc<Scheduler<GatedProvider>> {
        let db = Database::in_memory().await.unwrap();
        let syncer = Syncer::new(
            db,
            GatedProvider { release },
            SyncConfig::default(),
            AmbiguousDates::DayFirst,
        );
        Arc::new(Scheduler::new(syncer))
    }

    #[tokio::test]
    async fn test_trigger_records_report() {
        let release = Arc::new(Notify::new());
        release.notify_one();
        let scheduler = scheduler(release).await;

        let result = scheduler.trigger(Trigger::Manual).await;
        assert!(matches!(result, Some(Ok(ref report)) if report.candidates == 0));

        let state = scheduler.state();
        let state = state.lock().unwrap();
        assert_eq!(state.cycles, 1);
        assert!(!state.running);
        assert!(state.last_report.is_some());
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let release = Arc::new(Notify::new());
        let scheduler = scheduler(release.clone()).await;

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger(Trigger::Scheduled).await }
        });
        while !scheduler.state().lock().unwrap().running {
            tokio::task::yield_now().await;
        }

        assert!(scheduler.trigger(Trigger::Manual).await.is_none());

        release.notify_one();
        let result = first.await.unwrap();
        assert!(matches!(result, Some(Ok(_))));
        assert_eq!(scheduler.state().lock().unwrap().cycles, 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_cycle() {
        let release = Arc::new(Notify::new());
        let scheduler = scheduler(release.clone()).await;
        let (stop, stopped) = oneshot::channel::<()>();

        let run = tokio::spawn(scheduler.clone().run_until(Duration::from_secs(3600), async move {
            let _ = stopped.await;
        }));
        while !scheduler.state().lock().unwrap().running {
            tokio::task::yield_now().await;
        }

        stop.send(()).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!run.is_finished());

        release.notify_one();
        run.await.unwrap().unwrap();
        let state = scheduler.state();
        let state = state.lock().unwrap();
        assert_eq!(state.cycles, 1);
        assert!(!state.running);
    }
}
