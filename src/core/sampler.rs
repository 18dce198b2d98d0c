// src/core/sampler.rs
use crate::connectors::traits::{FeedError, OraclePrice, PriceSource};
use crate::core::session::SharedSession;
use crate::types::{PriceSample, UiEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

/// Most recent price samples in arrival order, oldest evicted first.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        debug_assert!(self.samples.len() <= self.capacity);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceSample> {
        self.samples.iter()
    }
}

impl Default for PriceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl TryFrom<OraclePrice> for PriceSample {
    type Error = FeedError;

    fn try_from(quote: OraclePrice) -> Result<Self, Self::Error> {
        if !quote.price.is_finite() || quote.price <= 0.0 {
            return Err(FeedError::InvalidPrice(quote.price));
        }
        if quote.timestamp_secs < 0 {
            return Err(FeedError::InvalidTimestamp(quote.timestamp_secs));
        }
        Ok(PriceSample {
            timestamp_millis: quote.timestamp_secs.saturating_mul(1000),
            price: quote.price,
        })
    }
}

/// Polls a price source on a fixed interval and feeds the session window.
#[derive(Clone)]
pub struct PriceSampler {
    source: Arc<dyn PriceSource>,
    session: SharedSession,
    period: Duration,
    ui_sender: Option<mpsc::Sender<UiEvent>>,
}

impl PriceSampler {
    pub fn new(source: Arc<dyn PriceSource>, session: SharedSession, period: Duration) -> Self {
        Self {
            source,
            session,
            period,
            ui_sender: None,
        }
    }

    pub fn with_ui(mut self, sender: mpsc::Sender<UiEvent>) -> Self {
        self.ui_sender = Some(sender);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawns the polling task. The first fetch happens right away.
    pub fn start(&self) -> SamplerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let sampler = self.clone();
        info!("Price sampler starting ({:?} interval)", self.period);
        let task = tokio::spawn(async move { sampler.run(cancel_rx).await });
        SamplerHandle {
            cancel_tx,
            task: Some(task),
        }
    }

    async fn run(self, mut cancel: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.changed() => break,
                _ = ticker.tick() => {}
            }

            // One fetch in flight at most; cancellation drops it.
            let fetched = tokio::select! {
                biased;
                _ = cancel.changed() => break,
                res = self.source.fetch_price() => res,
            };

            let sample = match fetched.and_then(PriceSample::try_from) {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Price fetch failed, sample skipped: {}", e);
                    continue;
                }
            };

            let mut session = self.session.lock().await;
            if *cancel.borrow() {
                break;
            }
            if let Some(risk) = session.record_sample(sample) {
                self.send_ui_event(UiEvent::Sample { sample, risk });
            }
        }
        info!("Price sampler stopped");
    }

    fn send_ui_event(&self, event: UiEvent) {
        let Some(sender) = &self.ui_sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("UI Channel closed! Interface is likely dead.");
            }
        }
    }
}

/// Running sampler. Dropping it without `stop` aborts the task.
pub struct SamplerHandle {
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Cancels polling and waits for the task to exit. Once this returns the
    /// window is never touched by this sampler again.
    pub async fn stop(mut self) {
        let _ = self.cancel_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Price sampler task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::RiskClassifier;
    use crate::core::ledger::PositionLedger;
    use crate::core::session::Session;
    use crate::types::RiskLevel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    const PERIOD: Duration = Duration::from_millis(5000);

    /// Replays a fixed list of quotes; `None` stands for a failed fetch.
    struct ScriptedSource {
        script: StdMutex<VecDeque<Option<f64>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(prices: &[Option<f64>]) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(prices.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_price(&self) -> Result<OraclePrice, FeedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
            let next = self.script.lock().unwrap().pop_front().flatten();
            match next {
                Some(price) => Ok(OraclePrice {
                    price,
                    timestamp_secs: 1_700_000_000 + n * 5,
                }),
                None => Err(FeedError::Transport("scripted failure".to_string())),
            }
        }
    }

    /// Blocks every fetch until the gate is opened.
    struct GatedSource {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl PriceSource for GatedSource {
        async fn fetch_price(&self) -> Result<OraclePrice, FeedError> {
            self.gate.notified().await;
            Ok(OraclePrice {
                price: 1.0,
                timestamp_secs: 1_700_000_000,
            })
        }
    }

    fn session() -> SharedSession {
        Session::new(50, RiskClassifier::default(), PositionLedger::default()).shared()
    }

    async fn window_len(session: &SharedSession) -> usize {
        session.lock().await.window().len()
    }

    fn sample(ts: i64, price: f64) -> PriceSample {
        PriceSample {
            timestamp_millis: ts,
            price,
        }
    }

    #[test]
    fn window_evicts_oldest_first() {
        let mut w = PriceWindow::new(50);
        for i in 0..51 {
            w.push(sample(i, 1.0 + i as f64));
        }
        assert_eq!(w.len(), 50);
        let ts: Vec<i64> = w.iter().map(|s| s.timestamp_millis).collect();
        assert_eq!(ts, (1..51).collect::<Vec<_>>());
        assert_eq!(w.latest().map(|s| s.timestamp_millis), Some(50));
    }

    #[test]
    fn invalid_quotes_are_rejected() {
        let bad = [0.0, -1.0, f64::NAN, f64::INFINITY];
        for price in bad {
            let quote = OraclePrice {
                price,
                timestamp_secs: 1,
            };
            assert!(PriceSample::try_from(quote).is_err());
        }
        assert!(matches!(
            PriceSample::try_from(OraclePrice {
                price: 1.5,
                timestamp_secs: -1,
            }),
            Err(FeedError::InvalidTimestamp(-1))
        ));
        let ok = PriceSample::try_from(OraclePrice {
            price: 1.5,
            timestamp_secs: 2,
        })
        .unwrap();
        assert_eq!(ok, sample(2000, 1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_on_each_interval() {
        let source = ScriptedSource::new(&[Some(1.0), Some(1.01), Some(1.02)]);
        let session = session();
        let handle = PriceSampler::new(source.clone(), session.clone(), PERIOD).start();

        sleep(Duration::from_millis(1)).await;
        assert_eq!(window_len(&session).await, 1);

        sleep(PERIOD).await;
        assert_eq!(window_len(&session).await, 2);

        sleep(PERIOD).await;
        assert_eq!(window_len(&session).await, 3);

        handle.stop().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_leaves_window_unchanged() {
        let source = ScriptedSource::new(&[Some(1.0), None, Some(0.0), Some(1.1)]);
        let session = session();
        let handle = PriceSampler::new(source, session.clone(), PERIOD).start();

        sleep(Duration::from_millis(1)).await;
        assert_eq!(window_len(&session).await, 1);

        sleep(PERIOD * 2).await;
        assert_eq!(window_len(&session).await, 1);

        sleep(PERIOD).await;
        let guard = session.lock().await;
        assert_eq!(guard.window().len(), 2);
        assert_eq!(guard.latest_price(), Some(1.1));
        drop(guard);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn risk_is_reclassified_once_window_fills() {
        let prices = [1.00, 1.05, 1.00, 1.05, 1.00].map(Some);
        let session = session();
        let handle = PriceSampler::new(ScriptedSource::new(&prices), session.clone(), PERIOD).start();

        sleep(Duration::from_millis(1) + PERIOD * 3).await;
        assert_eq!(session.lock().await.risk(), RiskLevel::Low);

        sleep(PERIOD).await;
        assert_eq!(session.lock().await.risk(), RiskLevel::High);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_samples_after_stop() {
        let source = ScriptedSource::new(&[Some(1.0); 10]);
        let session = session();
        let handle = PriceSampler::new(source.clone(), session.clone(), PERIOD).start();

        sleep(Duration::from_millis(1)).await;
        handle.stop().await;
        let len = window_len(&session).await;

        sleep(PERIOD * 5).await;
        assert_eq!(window_len(&session).await, len);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetch_is_discarded_on_stop() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(GatedSource { gate: gate.clone() });
        let session = session();
        let handle = PriceSampler::new(source, session.clone(), PERIOD).start();

        sleep(Duration::from_millis(1)).await;
        handle.stop().await;

        gate.notify_waiters();
        sleep(PERIOD * 3).await;
        assert_eq!(window_len(&session).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ui_receives_samples() {
        let (tx, mut rx) = mpsc::channel(8);
        let session = session();
        let handle = PriceSampler::new(ScriptedSource::new(&[Some(2.0)]), session, PERIOD)
            .with_ui(tx)
            .start();

        match rx.recv().await {
            Some(UiEvent::Sample { sample, risk }) => {
                assert_eq!(sample.price, 2.0);
                assert_eq!(risk, RiskLevel::Low);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        handle.stop().await;
    }
}
