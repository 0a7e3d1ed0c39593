use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;
use tokio::fs::File;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::frame::Frame;
use super::y4m::Y4mWriter;
use crate::pipeline::{Sink, SinkFlow};

/// Presents frames at a fixed rate
///
/// Every frame is handed to the inner sink, then the display waits for the
/// next tick. Cancelling `stop` ends playback after the current frame.
pub struct Display<K> {
    inner: K,
    period: Option<Duration>,
    ticker: Option<Interval>,
    stop: CancellationToken,
    shown: u64,
}

impl<K: Sink<Input = Frame>> Display<K> {
    /// A frame rate of 0 disables pacing
    pub fn new(inner: K, fps: u32, stop: CancellationToken) -> Self {
        Self {
            inner,
            period: (fps > 0).then(|| Duration::from_secs(1) / fps),
            ticker: None,
            stop,
            shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }

    async fn pace(&mut self) {
        let Some(period) = self.period else {
            return;
        };
        // First tick completes immediately, so the first frame is not delayed
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::select! {
            _ = ticker.tick() => {}
            _ = self.stop.cancelled() => {}
        }
    }
}

#[async_trait]
impl<K: Sink<Input = Frame>> Sink for Display<K> {
    type Input = Frame;

    async fn consume(&mut self, frame: Frame) -> Result<SinkFlow> {
        let index = frame.index;
        let flow = self.inner.consume(frame).await?;
        self.shown += 1;
        debug!("displaying frame {}", index);

        self.pace().await;

        if self.stop.is_cancelled() {
            info!("Display: stop requested after frame {}", index);
            return Ok(SinkFlow::Stop);
        }
        Ok(flow)
    }

    async fn close(&mut self) -> Result<()> {
        info!("Display: {} frames shown", self.shown);
        self.inner.close().await
    }
}

/// Sink that drops every frame
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    type Input = Frame;

    async fn consume(&mut self, _frame: Frame) -> Result<SinkFlow> {
        Ok(SinkFlow::Continue)
    }
}

/// Where displayed frames end up
pub enum FrameOutput {
    File(Y4mWriter<File>),
    Discard(NullSink),
}

#[async_trait]
impl Sink for FrameOutput {
    type Input = Frame;

    async fn consume(&mut self, frame: Frame) -> Result<SinkFlow> {
        match self {
            FrameOutput::File(writer) => writer.consume(frame).await,
            FrameOutput::Discard(null) => null.consume(frame).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            FrameOutput::File(writer) => writer.close().await,
            FrameOutput::Discard(null) => null.close().await,
        }
    }
}
