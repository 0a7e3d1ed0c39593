//! Core types for the pipeline system

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use crate::assets::MAX_QUEUE_SIZE;

/// Element carried by a bounded channel
///
/// The end of a stream is a distinct variant rather than a reserved payload
/// value, so any `T` (including empty frames) can flow through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    /// A unit of work
    Item(T),
    /// No more items will follow on this channel
    End,
}

impl<T> Envelope<T> {
    /// Check if this is the end-of-stream marker
    pub fn is_end(&self) -> bool {
        matches!(self, Envelope::End)
    }

    /// Extract the item, if any
    pub fn into_item(self) -> Option<T> {
        match self {
            Envelope::Item(item) => Some(item),
            Envelope::End => None,
        }
    }
}

/// Role a stage plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageRole {
    /// Pulls items from an external producer
    Source,
    /// Maps each item to a derived item
    Transform,
    /// Delivers items for final handling
    Sink,
}

impl std::fmt::Display for StageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageRole::Source => write!(f, "Source"),
            StageRole::Transform => write!(f, "Transform"),
            StageRole::Sink => write!(f, "Sink"),
        }
    }
}

/// Per-stage configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Maximum number of items this stage processes before it stops on its own
    pub item_limit: Option<u64>,
    /// Bound of the stage's output channel
    pub capacity: NonZeroUsize,
}

impl StageConfig {
    /// Create a config with the given output capacity and no item limit
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            item_limit: None,
            capacity,
        }
    }

    /// Set the item limit
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.item_limit = Some(limit);
        self
    }

    /// Whether a stage that already processed `processed` items must stop
    pub fn limit_reached(&self, processed: u64) -> bool {
        self.item_limit.is_some_and(|limit| processed >= limit)
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::new(MAX_QUEUE_SIZE)
    }
}

/// Why a stage left its run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// The source capability ran out of data
    Exhausted,
    /// The configured item limit was reached
    LimitReached,
    /// The end-of-stream marker arrived on the input channel
    UpstreamEnded,
    /// The sink capability asked to stop
    Cancelled,
    /// The downstream stage stopped reading
    DownstreamClosed,
    /// A capability returned an error
    Failed {
        kind: FailureKind,
        /// Zero-based index of the item the stage was working on
        index: u64,
    },
    /// The stage task panicked
    Panicked,
}

impl StageExit {
    /// Check if this exit counts as an error for the run
    pub fn is_failure(&self) -> bool {
        matches!(self, StageExit::Failed { .. } | StageExit::Panicked)
    }
}

impl std::fmt::Display for StageExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageExit::Exhausted => write!(f, "exhausted"),
            StageExit::LimitReached => write!(f, "limit reached"),
            StageExit::UpstreamEnded => write!(f, "upstream ended"),
            StageExit::Cancelled => write!(f, "cancelled"),
            StageExit::DownstreamClosed => write!(f, "downstream closed"),
            StageExit::Failed { kind, index } => write!(f, "{} at item {}", kind, index),
            StageExit::Panicked => write!(f, "panicked"),
        }
    }
}

/// Kind of capability failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The source could not produce the next item
    Read,
    /// The transform failed on an item
    Transform,
    /// The sink failed to consume an item
    Sink,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Read => write!(f, "read error"),
            FailureKind::Transform => write!(f, "transform error"),
            FailureKind::Sink => write!(f, "sink error"),
        }
    }
}

/// What a stage did during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub role: StageRole,
    /// Items fully processed (pulled, applied and forwarded)
    pub processed: u64,
    pub exit: StageExit,
}

impl std::fmt::Display for StageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: {} items, {}",
            self.name, self.role, self.processed, self.exit
        )
    }
}
