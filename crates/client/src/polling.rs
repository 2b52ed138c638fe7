//! Fixed-period refresh of a single request.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cell::{LoadingCell, LoadingState};
use crate::error::ClientError;
use crate::fetcher::{ReactiveFetcher, RequestDescriptor};

/// Poll period used unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// A fetcher re-run on every timer tick.
///
/// Ticks never wait for the previous fetch; out-of-order completions are resolved
/// by the fetcher's sequencing. Dropping the source stops the timer.
pub struct PollingSource<T> {
    fetcher: ReactiveFetcher<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> PollingSource<T> {
    /// Starts polling at once. Must be called within a tokio runtime.
    pub fn start(descriptor: RequestDescriptor<T>, period: Duration) -> Self {
        Self::start_gated(descriptor, period, || true)
    }

    /// Like `start`, but ticks are skipped while `gate` returns false.
    pub fn start_gated(
        descriptor: RequestDescriptor<T>,
        period: Duration,
        gate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        let fetcher = ReactiveFetcher::new(descriptor);
        let shared = Arc::clone(fetcher.shared());
        let period = period.max(Duration::from_millis(1));

        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !gate() {
                    debug!("poll skipped: gate closed");
                    continue;
                }
                shared.spawn_fetch();
            }
        });
        info!("polling every {period:?}");

        Self {
            fetcher,
            timer: Some(timer),
        }
    }

    /// Ends the timer. Fetches already dispatched still complete.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Fetches now, outside the tick schedule.
    pub async fn refresh(&self) -> Result<T, ClientError> {
        self.fetcher.fetch().await
    }

    pub fn result(&self) -> Option<T> {
        self.fetcher.result()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.fetcher.subscribe()
    }

    pub fn loading_state(&self) -> LoadingState {
        self.fetcher.loading_state()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<LoadingState> {
        self.fetcher.subscribe_loading()
    }

    pub fn cell(&self) -> &LoadingCell {
        self.fetcher.cell()
    }
}

impl<T> Drop for PollingSource<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_do_not_wait_for_unsettled_fetches() {
        let start = Instant::now();
        let ticks: Arc<Mutex<Vec<Duration>>> = Arc::default();
        let log = Arc::clone(&ticks);

        let source = PollingSource::<u32>::start(
            RequestDescriptor::new(move || {
                log.lock().unwrap().push(start.elapsed());
                std::future::pending()
            }),
            DEFAULT_POLL_INTERVAL,
        );

        tokio::time::sleep(Duration::from_millis(10_001)).await;
        let ticks = ticks.lock().unwrap().clone();
        assert_eq!(
            ticks,
            vec![
                Duration::ZERO,
                Duration::from_millis(5000),
                Duration::from_millis(10_000)
            ]
        );
        assert!(source.loading_state().loading);
        assert_eq!(source.result(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_gate_skips_ticks() {
        let open = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::clone(&open);
        let counter = Arc::clone(&calls);

        let source = PollingSource::start_gated(
            RequestDescriptor::new(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n) }
            }),
            Duration::from_secs(1),
            move || gate.load(Ordering::SeqCst),
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        open.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.result(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut source = PollingSource::start(
            RequestDescriptor::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.stop();
        assert!(!source.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
