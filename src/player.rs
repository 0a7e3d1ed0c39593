//! Plays a Y4M video through the extract → convert → display pipeline

use anyhow::Result;
use log::info;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::media::{Display, FrameOutput, Grayscale, NullSink, Y4mReader, Y4mWriter};
use crate::pipeline::{Pipeline, PipelineReport};

/// Build the playback pipeline for `input`
///
/// Frames are read from the file, converted to grayscale and displayed at
/// `config.frame_rate`. Cancelling `stop` ends playback after the frame
/// currently on screen.
pub async fn build(input: &Path, config: &Config, stop: CancellationToken) -> Result<Pipeline> {
    config.validate(input)?;
    let reader = Y4mReader::open(input).await?;
    let header = *reader.header();
    info!(
        "Player: {} is {}x{} {} at {}:{} fps",
        input.display(),
        header.width,
        header.height,
        header.format,
        header.frame_rate.0,
        header.frame_rate.1
    );

    let output = match &config.output {
        Some(path) => FrameOutput::File(Y4mWriter::create(path, header.frame_rate).await?),
        None => FrameOutput::Discard(NullSink),
    };

    let stage = config.stage();
    let pipeline = Pipeline::source("extract", reader, stage)
        .transform("convert", Grayscale, stage)
        .sink("display", Display::new(output, config.frame_rate, stop), stage)
        .with_stats_interval(config.stats_interval());

    Ok(pipeline)
}

/// Play `input` to completion and report the run
///
/// The report is returned even when a stage failed; its error says which one.
pub async fn play(input: &Path, config: &Config, stop: CancellationToken) -> Result<PipelineReport> {
    let pipeline = build(input, config, stop).await?;
    Ok(pipeline.run_with_report().await)
}
