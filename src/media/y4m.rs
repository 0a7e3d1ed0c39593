//! YUV4MPEG2 (`.y4m`) reading and writing
//!
//! A Y4M stream is one header line followed by frames, each a `FRAME` line
//! and the raw planes:
//!
//! ```text
//! YUV4MPEG2 W640 H360 F24:1 Ip A1:1 C420jpeg\n
//! FRAME\n<Y plane><U plane><V plane>
//! FRAME\n...
//! ```

use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use bytes::BytesMut;
use log::debug;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};

use super::frame::{Frame, PixelFormat};
use crate::assets::{FRAME_RATE, MAX_FRAME_SIZE, Y4M_FRAME, Y4M_MAGIC};
use crate::pipeline::{Sink, SinkFlow, Source};

/// Longest header or frame line accepted
const MAX_LINE: u64 = 4096;

/// Stream parameters from a Y4M header line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    /// Frames per second as numerator and denominator
    pub frame_rate: (u32, u32),
    pub format: PixelFormat,
}

impl Y4mHeader {
    /// Parse a header line, without its trailing newline
    pub fn parse(line: &str) -> Result<Self> {
        let mut params = line.split_ascii_whitespace();
        if params.next() != Some(Y4M_MAGIC) {
            bail!("not a YUV4MPEG2 stream");
        }

        let mut width = None;
        let mut height = None;
        let mut frame_rate = (FRAME_RATE, 1);
        let mut format = PixelFormat::Yuv420;

        for param in params {
            let (tag, value) = param.split_at(param.chars().next().map_or(0, char::len_utf8));
            match tag {
                "W" => width = Some(value.parse().with_context(|| format!("bad width '{value}'"))?),
                "H" => {
                    height = Some(value.parse().with_context(|| format!("bad height '{value}'"))?)
                }
                "F" => frame_rate = parse_ratio(value)?,
                "C" => {
                    format = PixelFormat::from_y4m_tag(value)
                        .with_context(|| format!("unsupported colour space '{value}'"))?
                }
                // Interlacing, aspect ratio and extensions do not affect the layout
                _ => {}
            }
        }

        let width: u32 = width.context("header has no width")?;
        let height: u32 = height.context("header has no height")?;
        ensure!(width > 0 && height > 0, "empty frame size {width}x{height}");

        let header = Self {
            width,
            height,
            frame_rate,
            format,
        };
        match header.frame_size() {
            Some(size) if size <= MAX_FRAME_SIZE => Ok(header),
            _ => bail!("frame size {width}x{height} {format} is too large"),
        }
    }

    /// Bytes of pixel data per frame; `None` if it does not fit in `usize`
    pub fn frame_size(&self) -> Option<usize> {
        self.format.frame_size(self.width, self.height)
    }
}

impl std::fmt::Display for Y4mHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} W{} H{} F{}:{} Ip A1:1 C{}",
            Y4M_MAGIC,
            self.width,
            self.height,
            self.frame_rate.0,
            self.frame_rate.1,
            self.format.y4m_tag()
        )
    }
}

fn parse_ratio(value: &str) -> Result<(u32, u32)> {
    let (num, den) = value
        .split_once(':')
        .with_context(|| format!("bad frame rate '{value}'"))?;
    let num: u32 = num.parse().with_context(|| format!("bad frame rate '{value}'"))?;
    let den: u32 = den.parse().with_context(|| format!("bad frame rate '{value}'"))?;
    ensure!(num > 0 && den > 0, "bad frame rate '{value}'");
    Ok((num, den))
}

/// Read one `\n`-terminated line; `None` at a clean end of stream
async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if line.pop() != Some(b'\n') {
        bail!("unterminated line");
    }
    Ok(Some(line))
}

/// Frame source reading a Y4M stream
pub struct Y4mReader<R> {
    reader: BufReader<R>,
    header: Y4mHeader,
    frame_size: usize,
    next_index: u64,
}

impl Y4mReader<File> {
    /// Open a Y4M file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::new(file)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }
}

impl<R: AsyncRead + Unpin + Send> Y4mReader<R> {
    /// Read the stream header
    pub async fn new(inner: R) -> Result<Self> {
        let mut reader = BufReader::new(inner);
        let line = read_line(&mut reader)
            .await?
            .context("stream is empty")?;
        let header = Y4mHeader::parse(std::str::from_utf8(&line).context("header is not text")?)?;
        let frame_size = header.frame_size().context("frame size is too large")?;
        debug!("Y4mReader: {}", header);

        Ok(Self {
            reader,
            header,
            frame_size,
            next_index: 0,
        })
    }

    pub fn header(&self) -> &Y4mHeader {
        &self.header
    }

    /// Read the next frame; `None` at the end of the stream
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.next_index;
        let Some(line) = read_line(&mut self.reader)
            .await
            .with_context(|| format!("frame {index}: bad frame header"))?
        else {
            return Ok(None);
        };
        if !line.starts_with(Y4M_FRAME.as_bytes()) {
            bail!("frame {index}: expected {Y4M_FRAME} marker");
        }

        let mut data = BytesMut::zeroed(self.frame_size);
        self.reader
            .read_exact(&mut data)
            .await
            .with_context(|| format!("frame {index} is truncated"))?;

        self.next_index += 1;
        Ok(Some(Frame {
            index,
            width: self.header.width,
            height: self.header.height,
            format: self.header.format,
            data: data.freeze(),
        }))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> Source for Y4mReader<R> {
    type Item = Frame;

    async fn next_item(&mut self) -> Result<Option<Frame>> {
        self.read_frame().await
    }
}

/// Frame sink writing a Y4M stream
///
/// The header is derived from the first frame; later frames must share its
/// geometry and format.
pub struct Y4mWriter<W> {
    writer: BufWriter<W>,
    frame_rate: (u32, u32),
    header: Option<Y4mHeader>,
    frames_written: u64,
}

impl Y4mWriter<File> {
    /// Create (or truncate) a Y4M file
    pub async fn create(path: impl AsRef<Path>, frame_rate: (u32, u32)) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self::new(file, frame_rate))
    }
}

impl<W: AsyncWrite + Unpin + Send> Y4mWriter<W> {
    pub fn new(inner: W, frame_rate: (u32, u32)) -> Self {
        Self {
            writer: BufWriter::new(inner),
            frame_rate,
            header: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        frame.check_size()?;

        match &self.header {
            Some(header) => ensure!(
                header.width == frame.width
                    && header.height == frame.height
                    && header.format == frame.format,
                "frame {}: {}x{} {} does not match stream {}x{} {}",
                frame.index,
                frame.width,
                frame.height,
                frame.format,
                header.width,
                header.height,
                header.format
            ),
            None => {
                let header = Y4mHeader {
                    width: frame.width,
                    height: frame.height,
                    frame_rate: self.frame_rate,
                    format: frame.format,
                };
                self.writer.write_all(format!("{header}\n").as_bytes()).await?;
                self.header = Some(header);
            }
        }

        self.writer.write_all(Y4M_FRAME.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.write_all(&frame.data).await?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush buffered frames to the underlying writer
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> Sink for Y4mWriter<W> {
    type Input = Frame;

    async fn consume(&mut self, frame: Frame) -> Result<SinkFlow> {
        self.write_frame(&frame).await?;
        Ok(SinkFlow::Continue)
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }
}
