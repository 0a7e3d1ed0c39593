use anyhow::{Result, bail};
use async_trait::async_trait;
use frameflow::pipeline::{
    CollectSink, FailureKind, FnTransform, IterSource, Pipeline, PipelineError, PipelineReport,
    Sink, SinkFlow, StageConfig, StageExit,
};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::timeout;

const DEADLINE: Duration = Duration::from_secs(10);

fn config(capacity: usize) -> StageConfig {
    StageConfig::new(NonZeroUsize::new(capacity).unwrap())
}

fn letters() -> Vec<char> {
    vec!['A', 'B', 'C', 'D', 'E']
}

fn identity() -> FnTransform<impl FnMut(char) -> Result<char> + Send + 'static, char, char> {
    FnTransform::new(|c: char| Ok(c))
}

/// Build source → transform → sink with one config for every stage
fn chain(items: Vec<char>, config: StageConfig, sink: CollectSink<char>) -> Pipeline {
    Pipeline::source("source", IterSource::new(items), config)
        .transform("transform", identity(), config)
        .sink("sink", sink, config)
        .with_stats_interval(None)
}

async fn run(pipeline: Pipeline) -> PipelineReport {
    timeout(DEADLINE, pipeline.run_with_report())
        .await
        .expect("pipeline deadlocked")
}

/// Stops after accepting `keep` items
struct StopAfter {
    keep: usize,
    seen: Vec<u64>,
}

#[async_trait]
impl Sink for StopAfter {
    type Input = u64;

    async fn consume(&mut self, item: u64) -> Result<SinkFlow> {
        self.seen.push(item);
        Ok(if self.seen.len() >= self.keep {
            SinkFlow::Stop
        } else {
            SinkFlow::Continue
        })
    }
}

/// Fails on the given item
struct FailOn(char);

#[async_trait]
impl Sink for FailOn {
    type Input = char;

    async fn consume(&mut self, item: char) -> Result<SinkFlow> {
        if item == self.0 {
            bail!("device lost");
        }
        Ok(SinkFlow::Continue)
    }
}

/// Takes a while on every item, then fails on the first one
struct SlowBrokenSink(Duration);

#[async_trait]
impl Sink for SlowBrokenSink {
    type Input = char;

    async fn consume(&mut self, _item: char) -> Result<SinkFlow> {
        tokio::time::sleep(self.0).await;
        bail!("sink broke");
    }
}

#[tokio::test]
async fn test_small_capacity_delivers_everything_in_order() {
    let sink = CollectSink::new();
    let report = run(chain(letters(), config(2), sink.clone())).await;

    assert!(report.is_success());
    assert_eq!(sink.items(), letters());
    assert_eq!(report.stage("sink").unwrap().processed, 5);
    for stage in &report.stages {
        assert_eq!(stage.processed, 5);
    }
    for channel in &report.channels {
        assert!(channel.high_water <= 2);
    }
}

#[tokio::test]
async fn test_limit_everywhere() {
    let sink = CollectSink::new();
    let report = run(chain(letters(), config(10).with_limit(3), sink.clone())).await;

    assert!(report.is_success());
    assert_eq!(sink.items(), vec!['A', 'B', 'C']);
    for stage in &report.stages {
        assert_eq!(stage.processed, 3);
        assert_eq!(stage.exit, StageExit::LimitReached);
    }
}

#[tokio::test]
async fn test_transform_failure() {
    let sink = CollectSink::new();
    let failing = FnTransform::new(|c: char| {
        if c == 'C' {
            bail!("corrupt frame");
        }
        Ok(c)
    });
    let pipeline = Pipeline::source("source", IterSource::new(letters()), config(10))
        .transform("transform", failing, config(10))
        .sink("sink", sink.clone(), config(10))
        .with_stats_interval(None);

    let report = run(pipeline).await;

    assert_eq!(sink.items(), vec!['A', 'B']);
    let error = report.error().unwrap();
    assert_eq!(error.failure(), Some((FailureKind::Transform, 2)));
    assert_eq!(error.stage_name(), Some("transform"));
    assert_eq!(
        error.to_string(),
        "transform error in stage 'transform' at item 2: corrupt frame"
    );
    assert_eq!(
        report.stage("transform").unwrap().exit,
        StageExit::Failed {
            kind: FailureKind::Transform,
            index: 2
        }
    );

    // The sink was still told the stream ended
    let into_sink = report.channel("transform").unwrap();
    assert_eq!(into_sink.end_markers_sent, 1);
    assert_eq!(into_sink.end_markers_received, 1);
    assert_eq!(report.stage("sink").unwrap().exit, StageExit::UpstreamEnded);
}

#[tokio::test]
async fn test_run_returns_first_error() {
    let failing = FnTransform::new(|c: char| {
        if c == 'B' {
            bail!("corrupt frame");
        }
        Ok(c)
    });
    let result = Pipeline::source("source", IterSource::new(letters()), config(1))
        .transform("transform", failing, config(1))
        .sink("sink", CollectSink::new(), config(1))
        .with_stats_interval(None)
        .run()
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Stage {
            kind: FailureKind::Transform,
            index: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn test_earliest_failure_wins_over_later_downstream_failure() {
    // The transform fails on 'C' right away but then waits to hand over its
    // end marker, while the sink fails on 'A' only after its delay
    let failing = FnTransform::new(|c: char| {
        if c == 'C' {
            bail!("corrupt frame");
        }
        Ok(c)
    });
    let report = run(
        Pipeline::source("source", IterSource::new(letters()), config(1))
            .transform("transform", failing, config(1))
            .sink("sink", SlowBrokenSink(Duration::from_millis(150)), config(1))
            .with_stats_interval(None),
    )
    .await;

    assert_eq!(
        report.stage("sink").unwrap().exit,
        StageExit::Failed {
            kind: FailureKind::Sink,
            index: 0
        }
    );
    let error = report.error().unwrap();
    assert_eq!(error.stage_name(), Some("transform"));
    assert_eq!(error.failure(), Some((FailureKind::Transform, 2)));
}

#[tokio::test]
async fn test_zero_limit_processes_nothing() {
    let sink = CollectSink::new();
    let report = run(chain(letters(), config(3).with_limit(0), sink.clone())).await;

    assert!(report.is_success());
    assert!(sink.is_empty());
    for stage in &report.stages {
        assert_eq!(stage.processed, 0);
    }
}

#[tokio::test]
async fn test_exhaustion_before_limit() {
    let sink = CollectSink::new();
    let report = run(chain(letters(), config(4).with_limit(100), sink.clone())).await;

    assert!(report.is_success());
    assert_eq!(sink.items(), letters());
    assert_eq!(report.stage("source").unwrap().exit, StageExit::Exhausted);
    assert_eq!(report.stage("transform").unwrap().exit, StageExit::UpstreamEnded);
    assert_eq!(report.stage("sink").unwrap().exit, StageExit::UpstreamEnded);
    for channel in &report.channels {
        assert_eq!(channel.end_markers_sent, 1);
        assert_eq!(channel.end_markers_received, 1);
        assert_eq!(channel.items_sent, 5);
        assert_eq!(channel.items_received, 5);
    }
}

#[tokio::test]
async fn test_empty_source() {
    let sink = CollectSink::new();
    let report = run(chain(Vec::new(), config(2), sink.clone())).await;

    assert!(report.is_success());
    assert!(sink.is_empty());
    for channel in &report.channels {
        assert_eq!(channel.end_markers_sent, 1);
    }
}

#[tokio::test]
async fn test_sink_stop_with_endless_source() {
    let pipeline = Pipeline::source("source", IterSource::new(0u64..), config(2))
        .transform("transform", FnTransform::new(|n: u64| Ok(n * 10)), config(2))
        .sink(
            "sink",
            StopAfter {
                keep: 4,
                seen: Vec::new(),
            },
            config(2),
        )
        .with_stats_interval(None);

    let report = run(pipeline).await;

    assert!(report.is_success());
    assert_eq!(report.stage("sink").unwrap().processed, 4);
    assert_eq!(report.stage("sink").unwrap().exit, StageExit::Cancelled);
    assert_eq!(
        report.stage("transform").unwrap().exit,
        StageExit::DownstreamClosed
    );
    assert_eq!(report.stage("source").unwrap().exit, StageExit::DownstreamClosed);
    for channel in &report.channels {
        assert_eq!(channel.end_markers_sent, 0);
    }
}

#[tokio::test]
async fn test_sink_limit_with_endless_source() {
    let sink = CollectSink::new();
    let pipeline = Pipeline::source("source", IterSource::new(0u64..), config(3))
        .transform("transform", FnTransform::new(|n: u64| Ok(n + 1)), config(3))
        .sink("sink", sink.clone(), config(3).with_limit(7))
        .with_stats_interval(None);

    let report = run(pipeline).await;

    assert!(report.is_success());
    assert_eq!(sink.items(), (1..=7).collect::<Vec<u64>>());
    assert_eq!(report.stage("source").unwrap().exit, StageExit::DownstreamClosed);
}

#[tokio::test]
async fn test_sink_failure() {
    let report = run(
        Pipeline::source("source", IterSource::new(letters()), config(2))
            .transform("transform", identity(), config(2))
            .sink("sink", FailOn('D'), config(2))
            .with_stats_interval(None),
    )
    .await;

    let error = report.error().unwrap();
    assert_eq!(error.failure(), Some((FailureKind::Sink, 3)));
    assert_eq!(error.stage_name(), Some("sink"));
    assert_eq!(report.stage("sink").unwrap().processed, 3);
}

#[tokio::test]
async fn test_source_failure() {
    struct Flaky(u32);

    #[async_trait]
    impl frameflow::pipeline::Source for Flaky {
        type Item = char;

        async fn next_item(&mut self) -> Result<Option<char>> {
            self.0 += 1;
            if self.0 > 2 {
                bail!("disk read failed");
            }
            Ok(Some('x'))
        }
    }

    let sink = CollectSink::new();
    let report = run(
        Pipeline::source("source", Flaky(0), config(2))
            .transform("transform", identity(), config(2))
            .sink("sink", sink.clone(), config(2))
            .with_stats_interval(None),
    )
    .await;

    assert_eq!(sink.items(), vec!['x', 'x']);
    let error = report.error().unwrap();
    assert_eq!(error.failure(), Some((FailureKind::Read, 2)));
    assert_eq!(report.stage("sink").unwrap().exit, StageExit::UpstreamEnded);
}
