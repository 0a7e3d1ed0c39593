//! End-of-stream protocol shared by every stage
//!
//! On every exit path (input exhausted, limit reached, end marker seen,
//! stop requested, capability failure, downstream gone) a stage:
//!
//! 1. stops pulling and producing items,
//! 2. enqueues exactly one end marker on its output channel, if it has one,
//! 3. drops its input channel, if it has one.
//!
//! Step 2 guarantees that downstream stages always terminate. Step 3 is how
//! an early stop travels upstream: the producer's next `put` fails with
//! [`DownstreamClosed`](super::channel::DownstreamClosed), the producer runs
//! the same three steps, and so on up to the source.

use log::debug;

use super::channel::{ChannelTx, DownstreamClosed};

/// Output side of a stage
pub(crate) struct Outlet<T> {
    tx: Option<ChannelTx<T>>,
}

impl<T> Outlet<T> {
    pub(crate) fn new(tx: ChannelTx<T>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A stage with nothing downstream
    pub(crate) fn none() -> Self {
        Self { tx: None }
    }

    /// Forward an item downstream, waiting for room
    pub(crate) async fn put(&self, item: T) -> Result<(), DownstreamClosed> {
        match &self.tx {
            Some(tx) => tx.put(item).await,
            None => Err(DownstreamClosed),
        }
    }

    /// Emit the end marker; later calls do nothing
    pub(crate) async fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let name = tx.stats().name().to_string();
            if !tx.finish().await {
                debug!("{}: consumer already gone, end marker dropped", name);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}
