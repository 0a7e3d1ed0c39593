//! Pipeline stage trait, capabilities and the stage run loop
//!
//! Sources, transforms and sinks are supplied as capabilities. The pipeline
//! wraps each one in a [`Stage`], which drives the same loop for every role:
//! pull an item, apply the capability, forward the result, count it, and
//! stop on exhaustion, limit, end marker, stop request or failure.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

use super::channel::ChannelRx;
use super::error::PipelineError;
use super::health::StageHealth;
use super::shutdown::Outlet;
use super::types::{FailureKind, StageConfig, StageExit, StageReport, StageRole};

/// Produces the items that enter the pipeline
#[async_trait]
pub trait Source: Send + 'static {
    type Item: Send + 'static;

    /// Pull the next item; `None` once the input is exhausted
    async fn next_item(&mut self) -> Result<Option<Self::Item>>;
}

/// Maps each item to a derived item
#[async_trait]
pub trait Transform: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn apply(&mut self, item: Self::Input) -> Result<Self::Output>;
}

/// What a sink wants after consuming an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    Continue,
    /// Stop voluntarily; the consumed item still counts
    Stop,
}

/// Final destination of items
#[async_trait]
pub trait Sink: Send + 'static {
    type Input: Send + 'static;

    async fn consume(&mut self, item: Self::Input) -> Result<SinkFlow>;

    /// Called once when the sink stops, whatever the reason
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Trait for pipeline stages run by the coordinator
#[async_trait]
pub(crate) trait PipelineStage: Send {
    /// Run the stage until it stops, then apply the shutdown protocol
    async fn run(&mut self) -> StageOutcome;

    /// Get the name of this stage for logging
    fn name(&self) -> &str;

    fn role(&self) -> StageRole;

    fn health(&self) -> &Arc<StageHealth>;
}

/// Result of running one stage
#[derive(Debug)]
pub(crate) struct StageOutcome {
    pub report: StageReport,
    pub error: Option<PipelineError>,
    /// When the error was encountered, before the stage shut down
    pub failed_at: Option<Instant>,
}

/// Where a stage's items come from
#[async_trait]
pub(crate) trait Intake: Send {
    type Item: Send + 'static;

    /// Exit reported once nothing more can be pulled
    const DRY: StageExit;

    async fn pull(&mut self) -> Result<Option<Self::Item>>;
}

/// Intake backed by a source capability
pub(crate) struct SourceIntake<S>(pub S);

#[async_trait]
impl<S: Source> Intake for SourceIntake<S> {
    type Item = S::Item;
    const DRY: StageExit = StageExit::Exhausted;

    async fn pull(&mut self) -> Result<Option<S::Item>> {
        self.0.next_item().await
    }
}

#[async_trait]
impl<T: Send + 'static> Intake for ChannelRx<T> {
    type Item = T;
    const DRY: StageExit = StageExit::UpstreamEnded;

    async fn pull(&mut self) -> Result<Option<T>> {
        Ok(self.get().await.into_item())
    }
}

/// Outcome of applying a stage's capability to one item
pub(crate) enum Step<T> {
    /// Forward this value downstream
    Emit(T),
    /// The item was consumed
    Done,
    /// The item was consumed and the stage should stop
    Stop,
}

/// The per-item work of a stage
#[async_trait]
pub(crate) trait Operation<In: Send + 'static>: Send {
    type Out: Send + 'static;

    /// Failure kind reported for errors of this operation
    const FAILURE: FailureKind;

    async fn apply(&mut self, item: In) -> Result<Step<Self::Out>>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source stages forward what they pull
pub(crate) struct Forward;

#[async_trait]
impl<T: Send + 'static> Operation<T> for Forward {
    type Out = T;
    const FAILURE: FailureKind = FailureKind::Read;

    async fn apply(&mut self, item: T) -> Result<Step<T>> {
        Ok(Step::Emit(item))
    }
}

/// Transform stages forward the mapped item
pub(crate) struct Apply<X>(pub X);

#[async_trait]
impl<X: Transform> Operation<X::Input> for Apply<X> {
    type Out = X::Output;
    const FAILURE: FailureKind = FailureKind::Transform;

    async fn apply(&mut self, item: X::Input) -> Result<Step<X::Output>> {
        Ok(Step::Emit(self.0.apply(item).await?))
    }
}

/// Sink stages consume the item
pub(crate) struct Deliver<K>(pub K);

#[async_trait]
impl<K: Sink> Operation<K::Input> for Deliver<K> {
    type Out = ();
    const FAILURE: FailureKind = FailureKind::Sink;

    async fn apply(&mut self, item: K::Input) -> Result<Step<()>> {
        Ok(match self.0.consume(item).await? {
            SinkFlow::Continue => Step::Done,
            SinkFlow::Stop => Step::Stop,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await
    }
}

/// A pipeline stage: one intake, one operation, at most one output channel
pub(crate) struct Stage<I, Op>
where
    I: Intake,
    Op: Operation<I::Item>,
{
    name: String,
    role: StageRole,
    config: StageConfig,
    intake: Option<I>,
    op: Op,
    outlet: Outlet<Op::Out>,
    health: Arc<StageHealth>,
}

impl<I, Op> Stage<I, Op>
where
    I: Intake,
    Op: Operation<I::Item>,
{
    pub(crate) fn new(
        name: String,
        role: StageRole,
        config: StageConfig,
        intake: I,
        op: Op,
        outlet: Outlet<Op::Out>,
    ) -> Self {
        let health = Arc::new(StageHealth::new(name.clone(), role));
        Self {
            name,
            role,
            config,
            intake: Some(intake),
            op,
            outlet,
            health,
        }
    }

    fn report(&self, processed: u64, exit: StageExit) -> StageReport {
        StageReport {
            name: self.name.clone(),
            role: self.role,
            processed,
            exit,
        }
    }

    fn fail(
        &self,
        kind: FailureKind,
        index: u64,
        error: anyhow::Error,
    ) -> (StageExit, (Instant, PipelineError)) {
        let failed_at = Instant::now();
        self.health.record_failure();
        (
            StageExit::Failed { kind, index },
            (failed_at, PipelineError::stage(self.name.clone(), kind, index, error)),
        )
    }
}

#[async_trait]
impl<I, Op> PipelineStage for Stage<I, Op>
where
    I: Intake,
    Op: Operation<I::Item>,
{
    async fn run(&mut self) -> StageOutcome {
        let Some(mut intake) = self.intake.take() else {
            warn!("{}: already ran", self.name);
            return StageOutcome {
                report: self.report(0, I::DRY),
                error: None,
                failed_at: None,
            };
        };

        let op_failure = <Op as Operation<I::Item>>::FAILURE;
        info!("{}: started", self.name);
        let mut processed = 0u64;
        let mut failure = None;

        let mut exit = loop {
            if self.config.limit_reached(processed) {
                break StageExit::LimitReached;
            }

            let item = match intake.pull().await {
                Ok(Some(item)) => item,
                Ok(None) => break I::DRY,
                Err(error) => {
                    let (exit, error) = self.fail(FailureKind::Read, processed, error);
                    failure = Some(error);
                    break exit;
                }
            };

            let stop = match self.op.apply(item).await {
                Ok(Step::Emit(out)) => {
                    if self.outlet.put(out).await.is_err() {
                        break StageExit::DownstreamClosed;
                    }
                    false
                }
                Ok(Step::Done) => false,
                Ok(Step::Stop) => true,
                Err(error) => {
                    let (exit, error) = self.fail(op_failure, processed, error);
                    failure = Some(error);
                    break exit;
                }
            };

            debug!("{}: item {} done", self.name, processed);
            self.health.record_item();
            processed += 1;

            if stop {
                break StageExit::Cancelled;
            }
        };

        if let Err(error) = self.op.close().await {
            if failure.is_none() {
                let (close_exit, error) = self.fail(op_failure, processed, error);
                exit = close_exit;
                failure = Some(error);
            } else {
                warn!("{}: close failed after an earlier error: {:#}", self.name, error);
            }
        }

        self.outlet.close().await;
        drop(intake);
        self.health.mark_finished();

        match &failure {
            Some((_, error)) => error!("{}: {}", self.name, error),
            None => info!("{}: finished after {} items ({})", self.name, processed, exit),
        }

        let (failed_at, error) = failure.unzip();
        StageOutcome {
            report: self.report(processed, exit),
            error,
            failed_at,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> StageRole {
        self.role
    }

    fn health(&self) -> &Arc<StageHealth> {
        &self.health
    }
}
