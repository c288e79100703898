//! Periodic driver for scan controllers.
//!
//! Each controller gets its own task and ticker, and every cycle runs on
//! tokio's blocking pool, so a station stuck in a phase never delays
//! another one.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::controller::{CycleOutcome, ScanController};
use crate::error::CoreError;
use crate::model::StationId;

/// What to do after a phase error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and keep scanning
    #[default]
    Continue,
    /// Stop scanning that station
    Stop,
}

/// Per-station counters collected while scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub station: StationId,
    pub completed: u64,
    pub inert: u64,
    pub skipped: u64,
    pub rejected: u64,
    pub failed: u64,
    pub stopped_on_failure: bool,
}

impl ScanSummary {
    fn new(station: StationId) -> Self {
        Self {
            station,
            completed: 0,
            inert: 0,
            skipped: 0,
            rejected: 0,
            failed: 0,
            stopped_on_failure: false,
        }
    }

    /// Total `execute` calls made.
    pub fn ticks(&self) -> u64 {
        self.completed + self.inert + self.skipped + self.rejected + self.failed
    }
}

/// Ticks a set of controllers until shutdown or a cycle limit.
pub struct ScanScheduler {
    controllers: Vec<Arc<ScanController>>,
    interval: Duration,
    policy: FailurePolicy,
    max_cycles: Option<u64>,
}

impl ScanScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            controllers: Vec::new(),
            interval,
            policy: FailurePolicy::default(),
            max_cycles: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop each controller after this many ticks.
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn add(&mut self, controller: Arc<ScanController>) {
        self.controllers.push(controller);
    }

    pub fn controller(mut self, controller: Arc<ScanController>) -> Self {
        self.add(controller);
        self
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Drive every controller until `shutdown` turns true, its sender is
    /// dropped, or the cycle limit is reached.
    ///
    /// Summaries are returned in station order.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Vec<ScanSummary> {
        info!(
            "Scan scheduler started for {} station(s), interval {:?}",
            self.controllers.len(),
            self.interval
        );

        let mut tasks = JoinSet::new();
        for controller in self.controllers {
            tasks.spawn(drive(
                controller,
                self.interval,
                self.policy,
                self.max_cycles,
                shutdown.clone(),
            ));
        }

        let mut summaries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!("scan task aborted: {}", e),
            }
        }
        summaries.sort_by_key(|s| s.station);

        info!("Scan scheduler stopped");
        summaries
    }
}

async fn drive(
    controller: Arc<ScanController>,
    period: Duration,
    policy: FailurePolicy,
    max_cycles: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) -> ScanSummary {
    let station = controller.station_id();
    let mut summary = ScanSummary::new(station);

    if !controller.is_loaded() {
        warn!(station = %station, "station not loaded, not scheduling");
        return summary;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!(station = %station, "shutdown sender dropped");
                    break;
                }
                continue;
            }
        }

        match Arc::clone(&controller).scan_blocking().await {
            Ok(CycleOutcome::Completed(_)) => summary.completed += 1,
            Ok(CycleOutcome::Inert) => summary.inert += 1,
            Ok(CycleOutcome::Skipped) => summary.skipped += 1,
            Err(CoreError::ScanInProgress(_)) => {
                debug!(station = %station, "previous cycle still running, tick skipped");
                summary.rejected += 1;
            }
            Err(e) => {
                error!(station = %station, "scan cycle failed: {:#}", anyhow::Error::new(e));
                summary.failed += 1;
                if policy == FailurePolicy::Stop {
                    warn!(station = %station, "stopping scans after failure");
                    summary.stopped_on_failure = true;
                    break;
                }
            }
        }

        if max_cycles.is_some_and(|max| summary.ticks() >= max) {
            break;
        }
    }

    debug!(
        station = %station,
        completed = summary.completed,
        failed = summary.failed,
        "scan task finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerOptions;
    use crate::kind::{ScanPhase, StationKind};
    use crate::mock::{MemorySession, PhaseRecorder};
    use crate::registry::VariantRegistry;
    use crate::session::{Session, TracingNotifier};
    use crate::variant::{StationVariant, VariantContext};

    /// Variant whose main script blocks its thread.
    struct Sluggish(Duration);

    impl StationVariant for Sluggish {
        fn check_for_replies(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn main_script(&mut self) -> anyhow::Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    async fn controller(
        session: &Arc<dyn Session>,
        recorder: &PhaseRecorder,
        id: i64,
    ) -> Arc<ScanController> {
        Arc::new(
            ScanController::attach(
                StationId(id),
                Some(Arc::clone(session)),
                &recorder.registry(),
                &TracingNotifier,
                ControllerOptions::default(),
            )
            .await,
        )
    }

    #[tokio::test]
    async fn test_stops_after_max_cycles() {
        let session: Arc<dyn Session> = Arc::new(
            MemorySession::new()
                .with_station(1, "ST.CONV.BUFFER")
                .with_station(2, "ST.CONV.GROUPBUFFER"),
        );
        let recorder = PhaseRecorder::new();
        let scheduler = ScanScheduler::new(Duration::from_millis(1))
            .controller(controller(&session, &recorder, 2).await)
            .controller(controller(&session, &recorder, 1).await)
            .with_max_cycles(Some(3));

        let (_tx, rx) = watch::channel(false);
        let summaries = scheduler.run(rx).await;

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].station, StationId(1));
        assert_eq!(summaries[0].completed, 3);
        assert_eq!(summaries[1].completed, 3);
        // 3 cycles x 2 phases + 3 cycles x 3 phases
        assert_eq!(recorder.calls().len(), 15);
    }

    #[tokio::test]
    async fn test_stop_policy_ends_station_on_first_failure() {
        let session: Arc<dyn Session> =
            Arc::new(MemorySession::new().with_station(1, "ST.CONV.STACKERSYSTEM"));
        let recorder = PhaseRecorder::new().fail_on(ScanPhase::MainScript, "stacker jammed");
        let scheduler = ScanScheduler::new(Duration::from_millis(1))
            .controller(controller(&session, &recorder, 1).await)
            .with_policy(FailurePolicy::Stop)
            .with_max_cycles(Some(10));

        let (_tx, rx) = watch::channel(false);
        let summaries = scheduler.run(rx).await;

        assert_eq!(summaries[0].failed, 1);
        assert!(summaries[0].stopped_on_failure);
        assert_eq!(summaries[0].ticks(), 1);
    }

    #[tokio::test]
    async fn test_continue_policy_keeps_scanning() {
        let session: Arc<dyn Session> =
            Arc::new(MemorySession::new().with_station(1, "ST.CONV.STACKERSYSTEM"));
        let recorder = PhaseRecorder::new().fail_on(ScanPhase::CheckForReplies, "no PLC");
        let scheduler = ScanScheduler::new(Duration::from_millis(1))
            .controller(controller(&session, &recorder, 1).await)
            .with_max_cycles(Some(4));

        let (_tx, rx) = watch::channel(false);
        let summaries = scheduler.run(rx).await;

        assert_eq!(summaries[0].failed, 4);
        assert!(!summaries[0].stopped_on_failure);
        // main script never runs after a failed reply check
        assert!(recorder
            .phases()
            .iter()
            .all(|p| *p == ScanPhase::CheckForReplies));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_unbounded_run() {
        let session: Arc<dyn Session> =
            Arc::new(MemorySession::new().with_station(1, "ST.CONV.PASSTHROUGH"));
        let recorder = PhaseRecorder::new();
        let scheduler = ScanScheduler::new(Duration::from_millis(5))
            .controller(controller(&session, &recorder, 1).await);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        let summaries = handle.await.unwrap();
        assert!(summaries[0].completed >= 1);
        assert_eq!(summaries[0].failed, 0);
    }

    #[tokio::test]
    async fn test_unloaded_controller_is_not_scheduled() {
        let session: Arc<dyn Session> = Arc::new(MemorySession::new());
        let recorder = PhaseRecorder::new();
        let scheduler = ScanScheduler::new(Duration::from_millis(1))
            .controller(controller(&session, &recorder, 77).await)
            .with_max_cycles(Some(5));

        let (_tx, rx) = watch::channel(false);
        let summaries = scheduler.run(rx).await;

        assert_eq!(summaries[0].ticks(), 0);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_station_does_not_starve_others() {
        let session: Arc<dyn Session> = Arc::new(
            MemorySession::new()
                .with_station(1, "ST.CONV.PALLETIZER")
                .with_station(2, "ST.CONV.PASSTHROUGH"),
        );
        let recorder = PhaseRecorder::new();
        let registry = VariantRegistry::new()
            .with(
                StationKind::Palletizer,
                |_: &VariantContext| -> anyhow::Result<Box<dyn StationVariant>> {
                    Ok(Box::new(Sluggish(Duration::from_millis(100))))
                },
            )
            .unwrap()
            .with(StationKind::PassThrough, recorder.constructor())
            .unwrap();

        let mut scheduler = ScanScheduler::new(Duration::from_millis(5));
        for id in [1, 2] {
            scheduler.add(Arc::new(
                ScanController::attach(
                    StationId(id),
                    Some(Arc::clone(&session)),
                    &registry,
                    &TracingNotifier,
                    ControllerOptions::default(),
                )
                .await,
            ));
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(rx));
        tokio::time::sleep(Duration::from_millis(400)).await;
        tx.send(true).unwrap();
        let summaries = handle.await.unwrap();

        let (slow, fast) = (&summaries[0], &summaries[1]);
        assert!(slow.completed <= 5, "slow station completed {}", slow.completed);
        // about 80 ticks fit in the window
        assert!(fast.completed >= 30, "fast station completed only {}", fast.completed);
        assert_eq!(fast.failed, 0);
    }
}
