//! Fan-out of the camera feed to MJPEG stream clients.

use super::frame::EncodedFrame;
use super::session::{CameraSession, FeedHandle, FrameSink};
use crate::error::CaptureError;
use crate::fanout::{DropOldestQueue, SubscriberId};
use futures_util::stream::{self, Stream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info};

type FrameQueue = DropOldestQueue<Arc<EncodedFrame>>;

/// Shares one camera feed between any number of stream subscribers.
///
/// The feed runs only while at least one subscriber exists. Each subscriber
/// has its own bounded queue; a slow one loses its oldest frames instead of
/// holding up the others.
#[derive(Clone)]
pub struct FrameBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    camera: Arc<CameraSession>,
    queue_depth: usize,
    state: Mutex<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<SubscriberId, Arc<FrameQueue>>,
    feed: Option<FeedHandle>,
    closed: bool,
}

impl BrokerInner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unsubscribe(&self, id: SubscriberId) {
        let mut state = self.lock();
        let Some(queue) = state.subscribers.remove(&id) else {
            return;
        };
        queue.close();
        debug!(
            "Stream subscriber {} left ({} remaining, {} frames dropped)",
            id,
            state.subscribers.len(),
            queue.dropped()
        );

        if state.subscribers.is_empty() {
            if let Some(feed) = state.feed.take() {
                info!("Last stream subscriber left, stopping camera feed");
                feed.stop();
            }
        }
    }
}

struct BrokerSink(Weak<BrokerInner>);

impl FrameSink for BrokerSink {
    fn publish(&self, frame: Arc<EncodedFrame>) -> bool {
        let Some(inner) = self.0.upgrade() else {
            return false;
        };
        let state = inner.lock();
        if state.closed {
            return false;
        }

        for (id, queue) in &state.subscribers {
            if let Some(stale) = queue.push(frame.clone()) {
                debug!(
                    "Subscriber {} behind, dropped frame {}",
                    id, stale.sequence
                );
            }
        }
        true
    }
}

impl FrameBroker {
    /// `queue_depth` frames are buffered per subscriber.
    pub fn new(camera: Arc<CameraSession>, queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                camera,
                queue_depth,
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    /// Register a new subscriber, starting the feed if it is the first.
    pub fn subscribe(&self) -> Result<FrameSubscriber, CaptureError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(CaptureError::Closed);
        }

        let id = SubscriberId::new();
        let queue = Arc::new(FrameQueue::new(self.inner.queue_depth));
        state.subscribers.insert(id, queue.clone());

        // A feed that ended on its own (camera closed) is replaced, not reused
        if state.feed.as_ref().map_or(true, FeedHandle::is_finished) {
            info!("Starting camera feed for stream subscribers");
            let sink = Arc::new(BrokerSink(Arc::downgrade(&self.inner)));
            state.feed = Some(self.inner.camera.open_feed(sink));
        }
        debug!(
            "Stream subscriber {} joined ({} total)",
            id,
            state.subscribers.len()
        );

        Ok(FrameSubscriber {
            id,
            queue,
            broker: Arc::downgrade(&self.inner),
        })
    }

    /// Remove `subscriber`. Same as dropping it.
    pub fn unsubscribe(&self, subscriber: FrameSubscriber) {
        drop(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Whether the camera feed is currently running for this broker.
    pub fn is_streaming(&self) -> bool {
        self.inner
            .lock()
            .feed
            .as_ref()
            .is_some_and(|feed| !feed.is_finished())
    }

    /// Stop the feed and close every subscriber queue. New subscriptions fail.
    pub async fn shutdown(&self) {
        let (feed, queues) = {
            let mut state = self.inner.lock();
            state.closed = true;
            let queues: Vec<_> = state.subscribers.drain().map(|(_, q)| q).collect();
            (state.feed.take(), queues)
        };

        for queue in &queues {
            queue.close();
        }
        if let Some(feed) = feed {
            feed.stop_and_wait().await;
        }
        info!("Frame broker shut down ({} subscribers closed)", queues.len());
    }
}

/// One stream client's view of the feed. Dropping it unsubscribes.
pub struct FrameSubscriber {
    id: SubscriberId,
    queue: Arc<FrameQueue>,
    broker: Weak<BrokerInner>,
}

impl FrameSubscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame in capture order, or `None` once the broker closed this queue.
    pub async fn next_frame(&self) -> Option<Arc<EncodedFrame>> {
        self.queue.recv().await
    }

    /// Frames waiting to be read.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Frames discarded because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Turn the subscription into a stream of frames.
    pub fn into_stream(self) -> impl Stream<Item = Arc<EncodedFrame>> + Send + 'static {
        stream::unfold(self, |subscriber| async move {
            let frame = subscriber.next_frame().await?;
            Some((frame, subscriber))
        })
    }
}

impl Drop for FrameSubscriber {
    fn drop(&mut self) {
        if let Some(inner) = self.broker.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}
