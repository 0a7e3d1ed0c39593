//! Raw video frame type

use anyhow::{Context, ensure};
use bytes::Bytes;

/// Planar pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit Y plane plus U and V planes subsampled 2x2
    Yuv420,
    /// 8-bit Y plane plus U and V planes subsampled horizontally
    Yuv422,
    /// 8-bit Y, U and V planes at full resolution
    Yuv444,
    /// 8-bit Y plane only (grayscale)
    Mono,
}

impl PixelFormat {
    /// Parse the value of a Y4M `C` header tag
    pub fn from_y4m_tag(tag: &str) -> Option<Self> {
        match tag {
            "420" | "420jpeg" | "420paldv" | "420mpeg2" => Some(PixelFormat::Yuv420),
            "422" => Some(PixelFormat::Yuv422),
            "444" => Some(PixelFormat::Yuv444),
            "mono" => Some(PixelFormat::Mono),
            _ => None,
        }
    }

    /// Value written in a Y4M `C` header tag
    pub fn y4m_tag(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420 => "420jpeg",
            PixelFormat::Yuv422 => "422",
            PixelFormat::Yuv444 => "444",
            PixelFormat::Mono => "mono",
        }
    }

    /// Size in bytes of one frame of `width` x `height` pixels
    ///
    /// `None` if the size does not fit in `usize`.
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        let luma = w.checked_mul(h)?;
        let chroma_w = w.div_ceil(2);
        let chroma_h = h.div_ceil(2);
        match self {
            PixelFormat::Yuv420 => luma.checked_add(chroma_w.checked_mul(chroma_h)?.checked_mul(2)?),
            PixelFormat::Yuv422 => luma.checked_add(chroma_w.checked_mul(h)?.checked_mul(2)?),
            PixelFormat::Yuv444 => luma.checked_mul(3),
            PixelFormat::Mono => Some(luma),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Yuv420 => write!(f, "YUV 4:2:0"),
            PixelFormat::Yuv422 => write!(f, "YUV 4:2:2"),
            PixelFormat::Yuv444 => write!(f, "YUV 4:4:4"),
            PixelFormat::Mono => write!(f, "Mono"),
        }
    }
}

/// One raw video frame
///
/// Planes are stored back to back (Y, then U, then V) in `data`, which is
/// reference counted so slicing a plane never copies pixels.
#[derive(Clone)]
pub struct Frame {
    /// Position of the frame in its source, starting at 0
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
}

impl Frame {
    /// Expected payload size for this frame's geometry and format
    pub fn expected_size(&self) -> Option<usize> {
        self.format.frame_size(self.width, self.height)
    }

    /// Check that the payload matches the frame's geometry and format
    pub fn check_size(&self) -> anyhow::Result<()> {
        let expected = self.expected_size().with_context(|| {
            format!("frame {}: {}x{} is too large", self.index, self.width, self.height)
        })?;
        ensure!(
            self.size() == expected,
            "frame {}: {} bytes, expected {} for {}x{} {}",
            self.index,
            self.size(),
            expected,
            self.width,
            self.height,
            self.format
        );
        Ok(())
    }

    /// The Y plane
    pub fn luma(&self) -> Bytes {
        let len = (self.width as usize)
            .saturating_mul(self.height as usize)
            .min(self.data.len());
        self.data.slice(..len)
    }

    /// Get the size of the frame data in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::Yuv420.frame_size(4, 2), Some(8 + 2 * 2));
        assert_eq!(PixelFormat::Yuv420.frame_size(3, 3), Some(9 + 2 * 4));
        assert_eq!(PixelFormat::Yuv422.frame_size(4, 2), Some(8 + 2 * 4));
        assert_eq!(PixelFormat::Yuv444.frame_size(4, 2), Some(24));
        assert_eq!(PixelFormat::Mono.frame_size(4, 2), Some(8));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_huge_frame_size_does_not_overflow() {
        let max = u32::MAX as usize;
        assert_eq!(PixelFormat::Mono.frame_size(u32::MAX, u32::MAX), Some(max * max));
        assert_eq!(PixelFormat::Yuv420.frame_size(u32::MAX, u32::MAX), None);
        assert_eq!(PixelFormat::Yuv444.frame_size(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn test_y4m_tags() {
        for tag in ["420", "420jpeg", "420paldv", "420mpeg2"] {
            assert_eq!(PixelFormat::from_y4m_tag(tag), Some(PixelFormat::Yuv420));
        }
        assert_eq!(PixelFormat::from_y4m_tag("mono"), Some(PixelFormat::Mono));
        assert_eq!(PixelFormat::from_y4m_tag("420p10"), None);
        assert_eq!(PixelFormat::Mono.y4m_tag(), "mono");
    }

    #[test]
    fn test_luma_plane_is_a_slice() {
        let frame = Frame {
            index: 0,
            width: 2,
            height: 2,
            format: PixelFormat::Yuv420,
            data: Bytes::from_static(&[1, 2, 3, 4, 5, 6]),
        };
        assert_eq!(frame.expected_size(), Some(6));
        frame.check_size().unwrap();
        assert_eq!(&frame.luma()[..], &[1, 2, 3, 4]);
    }
}
