//! Bridges the broadcast log to live push connections.
//!
//! Every subscription gets its own tail (positioned at "now") and a bounded
//! queue. When the queue is full the newest notification is dropped, so a
//! slow client only misses updates. Dropping the subscription cancels its
//! tail task.

use futures::Stream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::domain::Notification;
use crate::ports::{BroadcastLog, BroadcastTail, StoreResult};

const TAIL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct LiveGateway {
    broadcast: Arc<dyn BroadcastLog>,
    buffer: usize,
    block: Duration,
    shutdown: watch::Receiver<bool>,
}

impl LiveGateway {
    pub fn new(
        broadcast: Arc<dyn BroadcastLog>,
        buffer: usize,
        block: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            broadcast,
            buffer: buffer.max(1),
            block,
            shutdown,
        }
    }

    /// Open a subscription that sees every notification appended from this
    /// point on.
    pub async fn subscribe(&self) -> StoreResult<LiveSubscription> {
        let tail = self.broadcast.tail().await?;
        let (tx, rx) = mpsc::channel(self.buffer);
        let (cancel, cancelled) = oneshot::channel();
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_tail(
            tail,
            tx,
            cancelled,
            self.shutdown.clone(),
            self.block,
            dropped.clone(),
        ));

        Ok(LiveSubscription {
            rx,
            dropped,
            _cancel: cancel,
        })
    }
}

pub struct LiveSubscription {
    rx: mpsc::Receiver<Notification>,
    dropped: Arc<AtomicU64>,
    // Dropping the sender wakes the tail task's cancellation branch.
    _cancel: oneshot::Sender<()>,
}

impl LiveSubscription {
    /// Next notification, or `None` once the tail has stopped.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Notifications discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Notification> {
        async_stream::stream! {
            while let Some(notification) = self.recv().await {
                yield notification;
            }
        }
    }
}

async fn run_tail(
    mut tail: Box<dyn BroadcastTail>,
    tx: mpsc::Sender<Notification>,
    mut cancelled: oneshot::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
    block: Duration,
    dropped: Arc<AtomicU64>,
) {
    debug!("Live tail started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let batch = tokio::select! {
            _ = &mut cancelled => break,
            _ = shutdown.changed() => break,
            batch = tail.next_batch(block) => batch,
        };

        match batch {
            Ok(records) => {
                for record in records {
                    match tx.try_send(Notification::from_record(&record)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            dropped.fetch_add(1, Ordering::Relaxed);
                            debug!("Live queue full, dropping notification");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!("Live subscriber gone");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Live tail read failed");
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(TAIL_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    debug!("Live tail stopped");
}
