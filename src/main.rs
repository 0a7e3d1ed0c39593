use frameflow::{cli, player};
use log::{error, info, warn};
use std::process::{self, ExitCode};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Play the requested video; `Ok(false)` when a stage failed
async fn run() -> anyhow::Result<bool> {
    let matches = cli::command().get_matches();
    let (input, config) = cli::resolve(&matches)?;

    // first Ctrl-C stops playback gracefully, a second one exits at once
    let stop = CancellationToken::new();
    let interrupt = stop.clone();
    ctrlc::set_handler(move || {
        if interrupt.is_cancelled() {
            process::exit(130);
        }
        warn!("Interrupt received, stopping playback");
        interrupt.cancel();
    })?;

    let report = player::play(&input, &config, stop).await?;

    for stage in &report.stages {
        info!("{}", stage);
    }
    for channel in &report.channels {
        info!("{}", channel);
    }

    match report.error() {
        Some(e) => {
            error!("Playback failed: {}", e);
            Ok(false)
        }
        None => {
            info!("Playback finished in {:?}", report.elapsed);
            Ok(true)
        }
    }
}
