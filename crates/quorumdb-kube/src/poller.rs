//! Interval polling with a deadline
//!
//! The first probe runs immediately, later probes one interval apart. The
//! deadline is checked before every probe and raced against a running one, so
//! no probe starts after it fires. When a tick and the deadline coincide the
//! deadline wins.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::debug;

use crate::error::{KubeError, Result};

/// Where a poll currently stands
#[derive(Debug)]
pub enum PollState {
    /// A probe is due
    Probing,
    /// Waiting for the next tick
    Waiting,
    Ready,
    Failed(KubeError),
    TimedOut,
}

/// Runs a probe until it reports done, fails, or the deadline passes
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll `probe` until it returns `Ok(true)`
    ///
    /// Probe errors end the poll immediately and are returned unchanged. The
    /// deadline yields `KubeError::WaitTimeout` naming `what`.
    pub async fn poll<F, Fut>(&self, what: &str, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = PollState::Probing;
        let mut probes = 0u32;

        loop {
            state = match state {
                PollState::Probing => {
                    tokio::select! {
                        biased;
                        _ = &mut deadline => PollState::TimedOut,
                        outcome = probe() => {
                            probes += 1;
                            match outcome {
                                Ok(true) => PollState::Ready,
                                Ok(false) => PollState::Waiting,
                                Err(e) => PollState::Failed(e),
                            }
                        }
                    }
                }
                PollState::Waiting => {
                    tokio::select! {
                        biased;
                        _ = &mut deadline => PollState::TimedOut,
                        _ = ticker.tick() => PollState::Probing,
                    }
                }
                PollState::Ready => {
                    debug!(what, probes, "poll done");
                    return Ok(());
                }
                PollState::Failed(e) => {
                    debug!(what, probes, error = %e, "poll failed");
                    return Err(e);
                }
                PollState::TimedOut => {
                    debug!(what, probes, "poll timed out");
                    return Err(KubeError::WaitTimeout {
                        what: what.to_string(),
                        timeout: format!("{:?}", self.timeout),
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Probe that records when it ran and reports done on the `done_at`-th call
    fn recording_probe(
        done_at: Option<usize>,
    ) -> (Arc<Mutex<Vec<Instant>>>, impl FnMut() -> std::future::Ready<Result<bool>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let probe = move || {
            let mut calls = seen.lock().unwrap();
            calls.push(Instant::now());
            std::future::ready(Ok(done_at == Some(calls.len())))
        };
        (calls, probe)
    }

    fn offsets(start: Instant, calls: &[Instant]) -> Vec<u64> {
        calls.iter().map(|t| (*t - start).as_secs()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_is_immediate() {
        let start = Instant::now();
        let (calls, probe) = recording_probe(Some(1));
        let poller = Poller::new(Duration::from_secs(10), Duration::from_secs(60));

        poller.poll("pod", probe).await.unwrap();

        assert_eq!(offsets(start, &calls.lock().unwrap()), vec![0]);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_are_spaced_by_interval() {
        let start = Instant::now();
        let (calls, probe) = recording_probe(Some(4));
        let poller = Poller::new(Duration::from_secs(10), Duration::from_secs(3600));

        poller.poll("pod", probe).await.unwrap();

        assert_eq!(offsets(start, &calls.lock().unwrap()), vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline() {
        let start = Instant::now();
        let (calls, probe) = recording_probe(None);
        let poller = Poller::new(Duration::from_secs(10), Duration::from_secs(35));

        let err = poller.poll("pod db-0", probe).await.unwrap_err();

        assert!(matches!(err, KubeError::WaitTimeout { ref what, .. } if what == "pod db-0"));
        assert_eq!(Instant::now() - start, Duration::from_secs(35));
        assert_eq!(offsets(start, &calls.lock().unwrap()), vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_over_tick() {
        let start = Instant::now();
        let (calls, probe) = recording_probe(None);
        let poller = Poller::new(Duration::from_secs(10), Duration::from_secs(30));

        let err = poller.poll("pod", probe).await.unwrap_err();

        assert!(matches!(err, KubeError::WaitTimeout { .. }));
        assert_eq!(offsets(start, &calls.lock().unwrap()), vec![0, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_stops_polling() {
        let mut calls = 0;
        let poller = Poller::new(Duration::from_secs(10), Duration::from_secs(60));

        let err = poller
            .poll("pod", || {
                calls += 1;
                let result = if calls == 2 {
                    Err(KubeError::PodFailed {
                        namespace: "db".to_string(),
                        name: "db-0".to_string(),
                    })
                } else {
                    Ok(false)
                };
                std::future::ready(result)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::PodFailed { .. }));
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_is_cut_by_deadline() {
        let start = Instant::now();
        let poller = Poller::new(Duration::from_secs(10), Duration::from_secs(30));

        let err = poller
            .poll("pod", || async {
                sleep(Duration::from_secs(3600)).await;
                Ok(true)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::WaitTimeout { .. }));
        assert_eq!(Instant::now() - start, Duration::from_secs(30));
    }
}
