//! Waits until the renter reports a run's uploads complete.
//!
//! Each cycle recomputes progress from a fresh listing instead of tracking
//! deltas, so missed intermediate states do not matter.

use super::context::UploadPlan;
use super::tracker::RunProgress;
use crate::naming::is_tracked;
use crate::remote::{RemoteIndex, RemoteStorage};
use crate::transfer::progress::{format_duration, percent_of};
use crate::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of delays between polls.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock delays via the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PollCycle {
    /// Uploaded bytes of the files this run submitted
    pub uploaded_bytes: f64,
    pub fully_available: bool,
    /// Tracked files the renter does not list
    pub missing: usize,
}

impl PollCycle {
    pub fn is_complete(&self, upload_size: u64) -> bool {
        // Half a byte of slack for float accumulation.
        self.fully_available && self.uploaded_bytes + 0.5 >= upload_size as f64
    }
}

pub struct UploadPoller<'a> {
    remote: &'a dyn RemoteStorage,
    clock: &'a dyn Clock,
    interval: Duration,
    extension: &'a str,
}

impl<'a> UploadPoller<'a> {
    pub fn new(
        remote: &'a dyn RemoteStorage,
        clock: &'a dyn Clock,
        interval: Duration,
        extension: &'a str,
    ) -> Self {
        Self {
            remote,
            clock,
            interval,
            extension,
        }
    }

    /// Poll until every tracked file is available and the submitted bytes
    /// are uploaded. A failed listing ends the wait with an error.
    pub async fn wait(
        &self,
        run_name: &str,
        plan: &UploadPlan,
        progress: &RunProgress,
        cancel: &CancellationToken,
    ) -> Result<PollCycle> {
        let mut cycles = 0u64;
        loop {
            let cycle = self.poll_once(plan).await?;
            cycles += 1;
            let percent = percent_of(cycle.uploaded_bytes, plan.upload_size);
            progress.set_upload_percent(percent);

            if cycle.is_complete(plan.upload_size) {
                info!(run = %run_name, "All {} files available after {} polls", plan.files.len(), cycles);
                return Ok(cycle);
            }

            info!(
                run = %run_name,
                "Uploads at {:.1}%, fully available: {}; checking again in {}",
                percent,
                cycle.fully_available,
                format_duration(self.interval.as_secs())
            );

            tokio::select! {
                _ = self.clock.sleep(self.interval) => {}
                _ = cancel.cancelled() => {
                    return Err(AgentError::Cancelled(run_name.to_string()));
                }
            }
        }
    }

    pub async fn poll_once(&self, plan: &UploadPlan) -> Result<PollCycle> {
        let index = RemoteIndex::new(self.remote.list_files().await?);
        Ok(evaluate(plan, &index, self.extension))
    }
}

/// Aggregate one remote listing against the plan.
pub fn evaluate(plan: &UploadPlan, index: &RemoteIndex, extension: &str) -> PollCycle {
    let mut cycle = PollCycle {
        uploaded_bytes: 0.0,
        fully_available: true,
        missing: 0,
    };

    for entry in &plan.files {
        match index.get(&entry.remote_name) {
            Some(remote) => {
                if plan.submitted.contains(&entry.remote_name) {
                    cycle.uploaded_bytes += remote.uploaded_bytes();
                }
                if !remote.available {
                    cycle.fully_available = false;
                }
            }
            None if is_tracked(&entry.remote_name, extension) => {
                warn!("File {} not found on the renter", entry.remote_name);
                cycle.fully_available = false;
                cycle.missing += 1;
            }
            None => {
                debug!("File {} not on the renter and not a tracked name", entry.remote_name);
            }
        }
    }

    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::context::FileEntry;
    use crate::remote::{MemoryStorage, RemoteFileState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Clock that returns immediately and lets the test react to each tick.
    struct ManualClock {
        ticks: AtomicU32,
        on_tick: Box<dyn Fn(u32) + Send + Sync>,
    }

    impl ManualClock {
        fn new(on_tick: impl Fn(u32) + Send + Sync + 'static) -> Self {
            Self {
                ticks: AtomicU32::new(0),
                on_tick: Box::new(on_tick),
            }
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        async fn sleep(&self, _duration: Duration) {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            (self.on_tick)(tick);
        }
    }

    fn remote_file(name: &str, size: u64, progress: f64, available: bool) -> RemoteFileState {
        RemoteFileState {
            name: name.into(),
            size,
            progress,
            available,
        }
    }

    fn plan(files: &[(&str, u64, bool)]) -> UploadPlan {
        let mut plan = UploadPlan::default();
        for (name, size, submitted) in files {
            plan.files.push(FileEntry {
                remote_name: name.to_string(),
                size: *size,
            });
            plan.backup_size += size;
            if *submitted {
                plan.submitted.insert(name.to_string());
                plan.upload_size += size;
            }
        }
        plan
    }

    #[test]
    fn test_only_submitted_files_count_towards_upload() {
        let plan = plan(&[("old.1.dat", 100, false), ("new.2.dat", 50, true)]);
        let index = RemoteIndex::new(vec![
            remote_file("old.1.dat", 100, 100.0, true),
            remote_file("new.2.dat", 50, 40.0, false),
        ]);

        let cycle = evaluate(&plan, &index, ".dat");
        assert!((cycle.uploaded_bytes - 20.0).abs() < 1e-9);
        assert!(!cycle.fully_available);
        assert!(!cycle.is_complete(plan.upload_size));
    }

    #[test]
    fn test_missing_tracked_file_blocks_completion() {
        let plan = plan(&[("gone.1.dat", 10, false), ("aux.json", 5, false)]);
        let index = RemoteIndex::new(vec![]);

        let cycle = evaluate(&plan, &index, ".dat");
        assert_eq!(cycle.missing, 1);
        assert!(!cycle.fully_available);
    }

    #[test]
    fn test_untracked_missing_file_is_ignored() {
        let plan = plan(&[("aux.json", 5, false)]);
        let cycle = evaluate(&plan, &RemoteIndex::new(vec![]), ".dat");
        assert_eq!(cycle.missing, 0);
        assert!(cycle.fully_available);
        assert!(cycle.is_complete(0));
    }

    #[test]
    fn test_accumulator_is_monotonic() {
        let plan = plan(&[("a.1.dat", 100, true), ("b.2.dat", 300, true)]);
        let mut last = 0.0;
        for step in 0..=10 {
            let p = step as f64 * 10.0;
            let index = RemoteIndex::new(vec![
                remote_file("a.1.dat", 100, p, p >= 100.0),
                remote_file("b.2.dat", 300, (p * 0.5).min(100.0), false),
            ]);
            let cycle = evaluate(&plan, &index, ".dat");
            assert!(cycle.uploaded_bytes >= last);
            last = cycle.uploaded_bytes;
        }
    }

    #[tokio::test]
    async fn test_wait_finishes_once_available() {
        let remote = Arc::new(MemoryStorage::new());
        remote.insert(remote_file("a.1.dat", 100, 0.0, false));
        remote.insert(remote_file("b.2.dat", 50, 100.0, true));

        let ticked = Arc::clone(&remote);
        let clock = ManualClock::new(move |tick| match tick {
            1 => {
                ticked.set_progress("a.1.dat", 60.0, false);
            }
            _ => {
                ticked.set_progress("a.1.dat", 100.0, true);
            }
        });

        let plan = plan(&[("a.1.dat", 100, true), ("b.2.dat", 50, false)]);
        let progress = RunProgress::default();
        let poller = UploadPoller::new(remote.as_ref(), &clock, Duration::from_secs(300), ".dat");
        let cycle = poller
            .wait("1500000000", &plan, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert!(cycle.fully_available);
        assert_eq!(clock.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(progress.snapshot().upload_percent, Some(100.0));
    }

    #[tokio::test]
    async fn test_wait_fails_on_query_error() {
        let remote = MemoryStorage::new();
        remote.insert(remote_file("a.1.dat", 100, 0.0, false));
        remote.set_failing_queries(true);

        let clock = ManualClock::new(|_| {});
        let plan = plan(&[("a.1.dat", 100, true)]);
        let poller = UploadPoller::new(&remote, &clock, Duration::from_secs(300), ".dat");
        let err = poller
            .wait("1500000000", &plan, &RunProgress::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::QueryFailed(_)));
        assert_eq!(clock.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_can_be_cancelled() {
        let remote = MemoryStorage::new();
        remote.insert(remote_file("a.1.dat", 100, 0.0, false));

        let plan = plan(&[("a.1.dat", 100, true)]);
        let cancel = CancellationToken::new();
        let poller = UploadPoller::new(&remote, &TokioClock, Duration::from_secs(3600), ".dat");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = poller
            .wait("1500000000", &plan, &RunProgress::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled(_)));
    }
}
