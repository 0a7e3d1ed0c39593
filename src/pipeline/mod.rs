//! Bounded staged pipeline
//!
//! Items flow from a source stage through any number of transform stages
//! to a sink stage. Neighbouring stages are connected by fixed-capacity
//! channels, so a fast stage waits for a slow one instead of buffering
//! without bound.
//!
//! # Architecture
//!
//! - Each stage runs in its own async task
//! - Sources, transforms and sinks are plugged in as capabilities and
//!   driven by one shared stage loop
//! - End of stream is an explicit `Envelope::End`, sent exactly once per
//!   channel
//! - A stage that stops early drops its input, and the stage feeding it
//!   stops at its next send
//! - Health monitoring tracks per-stage progress and logs stalls
//! - `Pipeline` builds the chain, runs it and reports the first failure

pub mod adapters;
pub mod channel;
pub mod coordinator;
pub mod error;
pub mod health;
pub(crate) mod shutdown;
pub mod stage;
pub mod types;

pub use adapters::{CollectSink, FnTransform, IterSource};
pub use channel::{ChannelReport, ChannelRx, ChannelTx, DownstreamClosed, bounded};
pub use coordinator::{Pipeline, PipelineReport, PipelineWithOutput};
pub use error::PipelineError;
pub use health::{HealthSummary, StageHealth};
pub use stage::{Sink, SinkFlow, Source, Transform};
pub use types::{Envelope, FailureKind, StageConfig, StageExit, StageReport, StageRole};
