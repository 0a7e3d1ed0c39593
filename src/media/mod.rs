//! Frame type and the media capabilities plugged into the pipeline

mod display;
mod frame;
mod grayscale;
mod y4m;

pub use display::{Display, FrameOutput, NullSink};
pub use frame::{Frame, PixelFormat};
pub use grayscale::Grayscale;
pub use y4m::{Y4mHeader, Y4mReader, Y4mWriter};

#[cfg(test)]
pub(crate) use y4m::tests::sample_stream;
