//! Bounded handoff channel between two stages
//!
//! A thin layer over `tokio::sync::mpsc` that carries [`Envelope`]s, so the
//! end of a stream travels in-band behind the last item. Each channel has one
//! producing and one consuming stage for its whole lifetime.
//!
//! Backpressure is the channel's only flow control: `put` suspends while the
//! channel holds `capacity` elements, `get` suspends while it is empty.

use log::warn;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::types::Envelope;

/// Create a bounded channel holding at most `capacity` pending elements
pub fn bounded<T>(name: impl Into<String>, capacity: NonZeroUsize) -> (ChannelTx<T>, ChannelRx<T>) {
    let (tx, rx) = mpsc::channel(capacity.get());
    let stats = Arc::new(ChannelStats::new(name.into(), capacity.get()));
    (
        ChannelTx {
            tx,
            stats: stats.clone(),
        },
        ChannelRx {
            rx,
            stats,
            ended: false,
        },
    )
}

/// The consuming stage dropped its end of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownstreamClosed;

/// Sending half, owned by the producing stage
pub struct ChannelTx<T> {
    tx: mpsc::Sender<Envelope<T>>,
    stats: Arc<ChannelStats>,
}

impl<T> ChannelTx<T> {
    /// Append an item, waiting while the channel is full
    ///
    /// Fails only when the consumer is gone; the item is dropped in that case.
    pub async fn put(&self, item: T) -> Result<(), DownstreamClosed> {
        self.tx
            .send(Envelope::Item(item))
            .await
            .map_err(|_| DownstreamClosed)?;
        self.stats.items_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.record_occupancy(self.tx.max_capacity() - self.tx.capacity());
        Ok(())
    }

    /// Enqueue the end-of-stream marker
    ///
    /// Consumes the sender: nothing can be sent after the marker. Returns
    /// `false` if the consumer was already gone.
    pub async fn finish(self) -> bool {
        match self.tx.send(Envelope::End).await {
            Ok(()) => {
                self.stats.end_markers_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Check if the consumer has dropped its end
    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> &Arc<ChannelStats> {
        &self.stats
    }
}

/// Receiving half, owned by the consuming stage
///
/// Dropping it closes the channel, which `put` reports upstream as
/// [`DownstreamClosed`].
pub struct ChannelRx<T> {
    rx: mpsc::Receiver<Envelope<T>>,
    stats: Arc<ChannelStats>,
    ended: bool,
}

impl<T> ChannelRx<T> {
    /// Remove the head element, waiting while the channel is empty
    ///
    /// If the producer disappears without sending the end marker (its task
    /// panicked), this reports the end of the stream instead of hanging.
    pub async fn get(&mut self) -> Envelope<T> {
        if self.ended {
            return Envelope::End;
        }

        match self.rx.recv().await {
            Some(Envelope::Item(item)) => {
                self.stats.items_received.fetch_add(1, Ordering::Relaxed);
                Envelope::Item(item)
            }
            Some(Envelope::End) => {
                self.stats.end_markers_received.fetch_add(1, Ordering::Relaxed);
                self.ended = true;
                Envelope::End
            }
            None => {
                warn!(
                    "{}: producer went away without an end marker",
                    self.stats.name
                );
                self.ended = true;
                Envelope::End
            }
        }
    }

    /// Number of elements currently queued
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn stats(&self) -> &Arc<ChannelStats> {
        &self.stats
    }
}

/// Traffic counters shared by both halves of a channel
#[derive(Debug)]
pub struct ChannelStats {
    name: String,
    capacity: usize,
    items_sent: AtomicU64,
    items_received: AtomicU64,
    end_markers_sent: AtomicU64,
    end_markers_received: AtomicU64,
    /// Highest number of elements observed queued right after a put
    high_water: AtomicUsize,
}

impl ChannelStats {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            items_sent: AtomicU64::new(0),
            items_received: AtomicU64::new(0),
            end_markers_sent: AtomicU64::new(0),
            end_markers_received: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    fn record_occupancy(&self, queued: usize) {
        self.high_water.fetch_max(queued, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take a point-in-time copy of the counters
    pub fn snapshot(&self) -> ChannelReport {
        ChannelReport {
            name: self.name.clone(),
            capacity: self.capacity,
            items_sent: self.items_sent.load(Ordering::Relaxed),
            items_received: self.items_received.load(Ordering::Relaxed),
            end_markers_sent: self.end_markers_sent.load(Ordering::Relaxed),
            end_markers_received: self.end_markers_received.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }
}

/// Counters of one channel at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub name: String,
    pub capacity: usize,
    pub items_sent: u64,
    pub items_received: u64,
    pub end_markers_sent: u64,
    pub end_markers_received: u64,
    pub high_water: usize,
}

impl std::fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: sent={} received={} end={}/{} peak={}/{}",
            self.name,
            self.items_sent,
            self.items_received,
            self.end_markers_sent,
            self.end_markers_received,
            self.high_water,
            self.capacity
        )
    }
}
