//! Cancellable periodic task driving one sampler.

use crate::error::{Result, SonkenError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a successful tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A sample was persisted and broadcast.
    Recorded,
    /// Nothing to sample this time (e.g. no database configured).
    Skipped,
}

impl TickOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Skipped => "skipped",
        }
    }
}

/// Body of a periodic sampler.
///
/// Implementations own all per-sampler state; the task never runs two ticks
/// of the same job at once.
#[async_trait]
pub trait SamplerJob: Send + 'static {
    /// Sampler name used in logs and metric labels.
    fn kind(&self) -> &'static str;

    fn project_id(&self) -> &str;

    /// Collect, persist and broadcast one sample.
    async fn tick(&mut self) -> Result<TickOutcome>;

    /// Called after a tick failed or timed out.
    async fn on_error(&mut self, _err: &SonkenError) {}

    /// Called once after the last tick, before the task exits.
    async fn shutdown(&mut self) {}
}

/// Handle to a spawned periodic job.
///
/// Fires immediately, then every `period`. Dropping the handle cancels the
/// task without waiting for it.
pub struct PeriodicTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `job` on the current runtime. Each tick is bounded by `timeout`.
    pub fn spawn<J: SamplerJob>(mut job: J, period: Duration, timeout: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                run_tick(&mut job, timeout).await;
            }

            job.shutdown().await;
            debug!(sampler = job.kind(), project_id = job.project_id(), "Sampler task exited");
        });

        Self { cancel, handle: Some(handle) }
    }

    /// Stop scheduling ticks and wait for the task to wind down.
    ///
    /// A tick already in flight is allowed to finish. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!(error = %e, "Sampler task panicked");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_tick<J: SamplerJob>(job: &mut J, timeout: Duration) {
    let started = Instant::now();

    let result = match tokio::time::timeout(timeout, job.tick()).await {
        Ok(result) => result,
        Err(_) => Err(SonkenError::TickTimeout { sampler: job.kind(), elapsed: timeout }),
    };

    metrics::histogram!("sonken_sampler_tick_duration_seconds", "sampler" => job.kind())
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            metrics::counter!(
                "sonken_sampler_ticks_total",
                "sampler" => job.kind(),
                "outcome" => outcome.as_str()
            )
            .increment(1);
        }
        Err(e) => {
            warn!(sampler = job.kind(), project_id = job.project_id(), error = %e, "Sampler tick failed");
            metrics::counter!(
                "sonken_sampler_ticks_total",
                "sampler" => job.kind(),
                "outcome" => "failed"
            )
            .increment(1);
            job.on_error(&e).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Probe {
        ticks: AtomicUsize,
        errors: AtomicUsize,
        in_tick: AtomicBool,
        overlapped: AtomicBool,
        shut_down: AtomicBool,
    }

    struct CountingJob {
        probe: Arc<Probe>,
        fail_on: Option<usize>,
        tick_delay: Duration,
    }

    #[async_trait]
    impl SamplerJob for CountingJob {
        fn kind(&self) -> &'static str {
            "counting"
        }

        fn project_id(&self) -> &str {
            "p-test"
        }

        async fn tick(&mut self) -> Result<TickOutcome> {
            if self.probe.in_tick.swap(true, Ordering::SeqCst) {
                self.probe.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(self.tick_delay).await;
            self.probe.in_tick.store(false, Ordering::SeqCst);

            let n = self.probe.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on {
                return Err(SonkenError::Internal("injected".to_string()));
            }
            Ok(TickOutcome::Recorded)
        }

        async fn on_error(&mut self, _err: &SonkenError) {
            self.probe.errors.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.probe.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn job(probe: &Arc<Probe>) -> CountingJob {
        CountingJob { probe: probe.clone(), fail_on: None, tick_delay: Duration::ZERO }
    }

    #[tokio::test]
    async fn test_fires_immediately() {
        let probe = Arc::new(Probe::default());
        let mut task =
            PeriodicTask::spawn(job(&probe), Duration::from_secs(3600), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.ticks.load(Ordering::SeqCst), 1);

        task.stop().await;
        assert!(probe.shut_down.load(Ordering::SeqCst));
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_error_does_not_stop_timer() {
        let probe = Arc::new(Probe::default());
        let job = CountingJob { fail_on: Some(2), ..job(&probe) };
        let mut task = PeriodicTask::spawn(job, Duration::from_millis(10), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;

        assert!(probe.ticks.load(Ordering::SeqCst) >= 3);
        assert_eq!(probe.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ticks_never_overlap() {
        let probe = Arc::new(Probe::default());
        let job = CountingJob { tick_delay: Duration::from_millis(25), ..job(&probe) };
        let mut task = PeriodicTask::spawn(job, Duration::from_millis(5), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(150)).await;
        task.stop().await;

        assert!(probe.ticks.load(Ordering::SeqCst) >= 2);
        assert!(!probe.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_error() {
        let probe = Arc::new(Probe::default());
        let job = CountingJob { tick_delay: Duration::from_millis(200), ..job(&probe) };
        let mut task =
            PeriodicTask::spawn(job, Duration::from_secs(3600), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.stop().await;

        assert_eq!(probe.errors.load(Ordering::SeqCst), 1);
        assert_eq!(probe.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let probe = Arc::new(Probe::default());
        let mut task =
            PeriodicTask::spawn(job(&probe), Duration::from_millis(10), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(40)).await;
        task.stop().await;
        task.stop().await;
        let after_stop = probe.ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.ticks.load(Ordering::SeqCst), after_stop);
    }
}
