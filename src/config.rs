use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assets::{FRAME_RATE, HEALTH_LOG_INTERVAL, MAX_QUEUE_SIZE};
use crate::pipeline::{PipelineError, StageConfig};

/// Settings for one playback run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Display pacing in frames per second, 0 to run unpaced
    pub frame_rate: u32,
    /// Capacity of every channel between stages
    pub capacity: NonZeroUsize,
    /// Maximum number of frames each stage processes
    pub frame_limit: Option<u64>,
    /// Seconds between health reports, 0 to disable them
    pub stats_interval_secs: u64,
    /// Write displayed frames to this Y4M file
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: FRAME_RATE,
            capacity: MAX_QUEUE_SIZE,
            frame_limit: None,
            stats_interval_secs: HEALTH_LOG_INTERVAL.as_secs(),
            output: None,
        }
    }
}

impl Config {
    /// Load a JSON configuration file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Settings shared by every stage
    pub fn stage(&self) -> StageConfig {
        StageConfig {
            item_limit: self.frame_limit,
            capacity: self.capacity,
        }
    }

    /// Check the settings against the video about to be played
    ///
    /// Paths are resolved first, so an output reaching the input through
    /// `..`, a symlink or a relative path is caught too.
    pub fn validate(&self, input: &Path) -> Result<(), PipelineError> {
        match &self.output {
            Some(output) if resolve_path(output) == resolve_path(input) => {
                Err(PipelineError::Config(format!(
                    "output {} would overwrite the input {}",
                    output.display(),
                    input.display()
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

/// Absolute form of `path` with symlinks and `..` resolved, as far as the
/// filesystem allows; a file that does not exist yet is resolved through its
/// parent directory
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    std::fs::canonicalize(parent)
        .map(|dir| dir.join(name))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.frame_rate, 24);
        assert_eq!(config.capacity.get(), 10);
        assert_eq!(config.stats_interval(), Some(Duration::from_secs(30)));

        let stage = config.stage();
        assert_eq!(stage.item_limit, None);
        assert_eq!(stage.capacity.get(), 10);
    }

    #[test]
    fn test_output_must_differ_from_input() {
        let config = Config {
            output: Some(PathBuf::from("clip.y4m")),
            ..Config::default()
        };
        assert!(config.validate(Path::new("other.y4m")).is_ok());
        assert!(matches!(
            config.validate(Path::new("clip.y4m")),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_output_aliasing_the_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.y4m");
        std::fs::write(&input, b"YUV4MPEG2 W2 H2\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let through_parent = Config {
            output: Some(dir.path().join("sub").join("..").join("in.y4m")),
            ..Config::default()
        };
        assert!(matches!(
            through_parent.validate(&input),
            Err(PipelineError::Config(_))
        ));

        let sibling = Config {
            output: Some(dir.path().join("sub").join("in.y4m")),
            ..Config::default()
        };
        assert!(sibling.validate(&input).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_output_symlinked_to_the_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.y4m");
        let link = dir.path().join("link.y4m");
        std::fs::write(&input, b"YUV4MPEG2 W2 H2\n").unwrap();
        std::os::unix::fs::symlink(&input, &link).unwrap();

        let config = Config {
            output: Some(link),
            ..Config::default()
        };
        assert!(config.validate(&input).is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "capacity": 2, "frame_limit": 100, "stats_interval_secs": 0 }}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.capacity.get(), 2);
        assert_eq!(config.frame_limit, Some(100));
        assert_eq!(config.frame_rate, 24);
        assert_eq!(config.stats_interval(), None);
        assert_eq!(config.stage().item_limit, Some(100));
    }

    #[test]
    fn test_rejects_bad_files() {
        let mut zero = tempfile::NamedTempFile::new().unwrap();
        write!(zero, r#"{{ "capacity": 0 }}"#).unwrap();
        assert!(Config::load(zero.path()).is_err());

        let mut unknown = tempfile::NamedTempFile::new().unwrap();
        write!(unknown, r#"{{ "queue": 3 }}"#).unwrap();
        assert!(Config::load(unknown.path()).is_err());

        assert!(Config::load("/nonexistent/frameflow.json").is_err());
    }
}
