use std::num::NonZeroUsize;
use std::time::Duration;

/// Display pacing rate in frames per second
pub const FRAME_RATE: u32 = 24;

/// Default bound of every inter-stage channel
pub const MAX_QUEUE_SIZE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

/// How often stage health is logged while a run is in progress
pub const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Y4M stream and frame markers
pub const Y4M_MAGIC: &str = "YUV4MPEG2";
pub const Y4M_FRAME: &str = "FRAME";

/// Largest raw frame accepted from a Y4M header, in bytes (8K 4:4:4 fits)
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;
