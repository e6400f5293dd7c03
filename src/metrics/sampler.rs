//! Periodic telemetry sampling and fan-out to status subscribers.

use crate::config::MIN_SAMPLE_INTERVAL;
use crate::fanout::SubscriberId;
use crate::gpio::PinController;
use crate::metrics::data::{MetricReadings, TelemetrySample};
use crate::metrics::traits::MetricSource;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Samples buffered per status subscriber.
const SUBSCRIBER_BUFFER: usize = 8;

type SharedSource = Arc<Mutex<Box<dyn MetricSource>>>;

/// Produces one [`TelemetrySample`] per tick and pushes it to every subscriber.
///
/// Ticks with no subscribers are skipped, so an idle gateway does not sample.
pub struct TelemetrySampler {
    inner: Arc<SamplerInner>,
    stop: watch::Sender<bool>,
}

struct SamplerInner {
    source: SharedSource,
    pins: Arc<PinController>,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<TelemetrySample>>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl SamplerInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Arc<TelemetrySample>>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Run the metric source on the blocking pool.
    async fn collect(&self) -> MetricReadings {
        let source = self.source.clone();
        let collected = tokio::task::spawn_blocking(move || {
            let mut source = source.lock().unwrap_or_else(|e| e.into_inner());
            source.sample()
        })
        .await;

        collected.unwrap_or_else(|e| {
            error!("Metric collection task failed: {}", e);
            MetricReadings::unavailable("collector task failed")
        })
    }

    async fn sample(&self) -> TelemetrySample {
        let readings = self.collect().await;
        TelemetrySample::from_readings(readings, self.pins.get())
    }

    fn broadcast(&self, sample: Arc<TelemetrySample>) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|id, tx| match tx.try_send(sample.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Status subscriber {} lagging, skipped one sample", id);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Status subscriber {} gone, unsubscribing", id);
                false
            }
        });
        subscribers.len()
    }

    fn unsubscribe(&self, id: SubscriberId) {
        if self.lock().remove(&id).is_some() {
            debug!("Status subscriber {} unsubscribed", id);
        }
    }
}

impl TelemetrySampler {
    /// Start sampling `source` every `interval`.
    pub fn start(source: Box<dyn MetricSource>, pins: Arc<PinController>, interval: Duration) -> Self {
        let inner = Arc::new(SamplerInner {
            source: Arc::new(Mutex::new(source)),
            pins,
            subscribers: Mutex::new(HashMap::new()),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        let (stop, stop_rx) = watch::channel(false);

        tokio::spawn(sampling_loop(inner.clone(), interval, stop_rx));
        info!("Telemetry sampler started with {:?} interval", interval);

        Self { inner, stop }
    }

    /// Register for samples. After shutdown the subscriber ends immediately.
    pub fn subscribe(&self) -> TelemetrySubscriber {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        // Checked under the lock so a concurrent shutdown cannot miss this sender
        let mut subscribers = self.inner.lock();
        if !self.inner.is_closed() {
            subscribers.insert(id, tx);
            debug!(
                "Status subscriber {} joined ({} total)",
                id,
                subscribers.len()
            );
        }
        drop(subscribers);

        TelemetrySubscriber {
            id,
            rx,
            sampler: Arc::downgrade(&self.inner),
        }
    }

    /// Remove `subscriber`. Same as dropping it.
    pub fn unsubscribe(&self, subscriber: TelemetrySubscriber) {
        drop(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Take one sample right now, outside the tick schedule.
    pub async fn sample_now(&self) -> TelemetrySample {
        self.inner.sample().await
    }

    /// Stop ticking and end every subscription.
    pub fn shutdown(&self) {
        let closed = {
            let mut subscribers = self.inner.lock();
            self.inner
                .closed
                .store(true, std::sync::atomic::Ordering::SeqCst);
            let n = subscribers.len();
            subscribers.clear();
            n
        };
        self.stop.send_replace(true);
        info!("Telemetry sampler stopped ({} subscribers closed)", closed);
    }
}

async fn sampling_loop(inner: Arc<SamplerInner>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval.max(MIN_SAMPLE_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut degraded: HashSet<&'static str> = HashSet::new();

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        if inner.lock().is_empty() {
            continue;
        }

        let readings = inner.collect().await;
        report_degradation(&readings, &mut degraded);

        let sample = Arc::new(TelemetrySample::from_readings(readings, inner.pins.get()));
        let delivered = inner.broadcast(sample);
        debug!("Telemetry sample sent to {} subscribers", delivered);
    }

    debug!("Telemetry sampling loop exited");
}

/// Warn when a metric starts failing and note when it comes back, instead of
/// logging the same failure every tick.
fn report_degradation(readings: &MetricReadings, degraded: &mut HashSet<&'static str>) {
    let failing: HashSet<&'static str> = readings.failures().iter().map(|f| f.metric).collect();

    for failure in readings.failures() {
        if !degraded.contains(failure.metric) {
            warn!("{}; reporting null", failure);
        }
    }
    for recovered in degraded.difference(&failing) {
        info!("Metric {} available again", recovered);
    }
    *degraded = failing;
}

/// One status client's sample feed. Dropping it unsubscribes.
pub struct TelemetrySubscriber {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<TelemetrySample>>,
    sampler: Weak<SamplerInner>,
}

impl TelemetrySubscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next sample, or `None` once the sampler has shut down or dropped us.
    pub async fn next_sample(&mut self) -> Option<Arc<TelemetrySample>> {
        self.rx.recv().await
    }

    /// Stop receiving without unregistering; the sampler notices on its next
    /// write and drops the subscription.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for TelemetrySubscriber {
    fn drop(&mut self) {
        if let Some(inner) = self.sampler.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}
