//! Pipeline coordinator
//!
//! Chains source → transforms → sink through bounded channels and manages
//! the lifecycle of one run.

use futures_util::future::join_all;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::channel::{self, ChannelReport, ChannelRx, ChannelStats};
use super::error::PipelineError;
use super::health::StageHealth;
use super::shutdown::Outlet;
use super::stage::{
    Apply, Deliver, Forward, PipelineStage, Sink, Source, SourceIntake, Stage, StageOutcome,
    Transform,
};
use super::types::{StageConfig, StageExit, StageReport, StageRole};
use crate::assets::HEALTH_LOG_INTERVAL;

/// A wired pipeline, ready to run once
///
/// Built with [`Pipeline::source`], then any number of
/// [`transform`](PipelineWithOutput::transform) calls, then
/// [`sink`](PipelineWithOutput::sink):
///
/// ```ignore
/// let report = Pipeline::source("extract", reader, config)
///     .transform("convert", Grayscale, config)
///     .sink("display", display, config)
///     .run()
///     .await?;
/// ```
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    channels: Vec<Arc<ChannelStats>>,
    stats_interval: Option<Duration>,
}

impl Pipeline {
    /// Start a pipeline with a source stage
    pub fn source<S: Source>(
        name: impl Into<String>,
        source: S,
        config: StageConfig,
    ) -> PipelineWithOutput<S::Item> {
        let name = name.into();
        let (tx, rx) = channel::bounded(name.clone(), config.capacity);
        let channels = vec![tx.stats().clone()];
        let stage = Stage::new(
            name,
            StageRole::Source,
            config,
            SourceIntake(source),
            Forward,
            Outlet::new(tx),
        );

        PipelineWithOutput {
            stages: vec![Box::new(stage)],
            channels,
            receiver: rx,
        }
    }

    /// Set how often stage health is logged during the run; `None` disables it
    pub fn with_stats_interval(mut self, interval: Option<Duration>) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Names of the stages, in pipeline order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage to completion and return the first fatal error, if any
    pub async fn run(self) -> Result<PipelineReport, PipelineError> {
        self.run_with_report().await.into_result()
    }

    /// Run every stage to completion and report on each of them
    ///
    /// All stages start together and the call returns only once every one of
    /// them has finished, even when one fails early.
    pub async fn run_with_report(self) -> PipelineReport {
        let started = Instant::now();
        let health: Vec<Arc<StageHealth>> =
            self.stages.iter().map(|stage| stage.health().clone()).collect();

        info!("Pipeline: starting {} stages", self.stages.len());

        let monitor = self
            .stats_interval
            .map(|interval| spawn_monitor(interval, health.clone(), self.channels.clone()));

        let tasks = self.stages.into_iter().zip(health).map(|(stage, health)| {
            let name = stage.name().to_string();
            let role = stage.role();
            let handle = tokio::spawn(async move {
                let mut stage = stage;
                stage.run().await
            });

            async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        error!("Pipeline: stage '{}' aborted: {}", name, join_error);
                        health.mark_finished();
                        StageOutcome {
                            report: StageReport {
                                name: name.clone(),
                                role,
                                processed: health.items_processed(),
                                exit: StageExit::Panicked,
                            },
                            error: Some(PipelineError::Panicked { stage: name }),
                            failed_at: Some(Instant::now()),
                        }
                    }
                }
            }
        });

        let outcomes = join_all(tasks).await;

        if let Some(monitor) = monitor {
            monitor.cancel();
        }

        let mut first_error: Option<(Instant, PipelineError)> = None;
        let mut stages = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(error) = outcome.error {
                let failed_at = outcome.failed_at.unwrap_or(started);
                let earlier = first_error
                    .as_ref()
                    .is_some_and(|(at, _)| *at <= failed_at);
                if !earlier {
                    first_error = Some((failed_at, error));
                }
            }
            stages.push(outcome.report);
        }

        let report = PipelineReport {
            stages,
            channels: self.channels.iter().map(|stats| stats.snapshot()).collect(),
            elapsed: started.elapsed(),
            error: first_error.map(|(_, error)| error),
        };

        match &report.error {
            Some(error) => error!("Pipeline: failed after {:?}: {}", report.elapsed, error),
            None => info!("Pipeline: completed in {:?}", report.elapsed),
        }
        report
    }
}

/// A pipeline whose last stage still has an unconsumed output channel
pub struct PipelineWithOutput<T> {
    stages: Vec<Box<dyn PipelineStage>>,
    channels: Vec<Arc<ChannelStats>>,
    receiver: ChannelRx<T>,
}

impl<T: Send + 'static> PipelineWithOutput<T> {
    /// Append a transform stage
    pub fn transform<X>(
        mut self,
        name: impl Into<String>,
        transform: X,
        config: StageConfig,
    ) -> PipelineWithOutput<X::Output>
    where
        X: Transform<Input = T>,
    {
        let name = name.into();
        let (tx, rx) = channel::bounded(name.clone(), config.capacity);
        self.channels.push(tx.stats().clone());
        let stage = Stage::new(
            name,
            StageRole::Transform,
            config,
            self.receiver,
            Apply(transform),
            Outlet::new(tx),
        );
        self.stages.push(Box::new(stage));

        PipelineWithOutput {
            stages: self.stages,
            channels: self.channels,
            receiver: rx,
        }
    }

    /// Terminate the pipeline with a sink stage
    ///
    /// The sink has no output channel, so `config.capacity` is not used.
    pub fn sink<K>(mut self, name: impl Into<String>, sink: K, config: StageConfig) -> Pipeline
    where
        K: Sink<Input = T>,
    {
        let stage = Stage::new(
            name.into(),
            StageRole::Sink,
            config,
            self.receiver,
            Deliver(sink),
            Outlet::none(),
        );
        self.stages.push(Box::new(stage));

        Pipeline {
            stages: self.stages,
            channels: self.channels,
            stats_interval: Some(HEALTH_LOG_INTERVAL),
        }
    }
}

/// Log stage and channel health periodically until the returned token is cancelled
fn spawn_monitor(
    interval: Duration,
    health: Vec<Arc<StageHealth>>,
    channels: Vec<Arc<ChannelStats>>,
) -> CancellationToken {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = ticker.tick() => {
                    for stage in &health {
                        info!("Pipeline: {}", stage.summary());
                        if stage.is_stalled(interval) {
                            warn!(
                                "Pipeline: stage '{}' made no progress in {:?}",
                                stage.name(),
                                interval
                            );
                        }
                    }
                    for channel in &channels {
                        info!("Pipeline: {}", channel.snapshot());
                    }
                }
            }
        }
    });

    token
}

/// Everything that happened during one run
#[derive(Debug)]
pub struct PipelineReport {
    /// One report per stage, in pipeline order
    pub stages: Vec<StageReport>,
    /// One report per channel, in pipeline order
    pub channels: Vec<ChannelReport>,
    pub elapsed: Duration,
    error: Option<PipelineError>,
}

impl PipelineReport {
    /// Check if no stage failed
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The first fatal error of the run
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Channel fed by the named stage
    pub fn channel(&self, producer: &str) -> Option<&ChannelReport> {
        self.channels.iter().find(|channel| channel.name == producer)
    }

    /// Turn the report into the run's result
    pub fn into_result(mut self) -> Result<Self, PipelineError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}
