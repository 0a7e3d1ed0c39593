use anyhow::Result;
use async_trait::async_trait;

use super::frame::{Frame, PixelFormat};
use crate::pipeline::Transform;

/// Converts frames to grayscale by keeping only the luma plane
///
/// The output shares the input's buffer, so no pixel is copied.
#[derive(Debug, Default, Clone, Copy)]
pub struct Grayscale;

impl Grayscale {
    pub fn convert(frame: Frame) -> Result<Frame> {
        frame.check_size()?;

        Ok(Frame {
            data: frame.luma(),
            format: PixelFormat::Mono,
            ..frame
        })
    }
}

#[async_trait]
impl Transform for Grayscale {
    type Input = Frame;
    type Output = Frame;

    async fn apply(&mut self, frame: Frame) -> Result<Frame> {
        Self::convert(frame)
    }
}
