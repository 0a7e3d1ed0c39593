use super::types::FailureKind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal outcome of a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A capability failed inside a stage
    #[error("{kind} in stage '{stage}' at item {index}: {source}")]
    Stage {
        stage: String,
        kind: FailureKind,
        /// Zero-based index of the failing item within the stage
        index: u64,
        source: BoxError,
    },

    /// A stage task panicked
    #[error("stage '{stage}' panicked")]
    Panicked { stage: String },

    /// The run configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn stage(
        stage: impl Into<String>,
        kind: FailureKind,
        index: u64,
        error: anyhow::Error,
    ) -> Self {
        PipelineError::Stage {
            stage: stage.into(),
            kind,
            index,
            source: error.into(),
        }
    }

    /// Kind and item index, for capability failures
    pub fn failure(&self) -> Option<(FailureKind, u64)> {
        match self {
            PipelineError::Stage { kind, index, .. } => Some((*kind, *index)),
            _ => None,
        }
    }

    /// Name of the stage that failed, if any
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::Stage { stage, .. } | PipelineError::Panicked { stage } => Some(stage),
            PipelineError::Config(_) => None,
        }
    }
}
