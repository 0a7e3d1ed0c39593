use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, value_parser};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::config::{Config, app_name, version};

/// Command line of the `frameflow` binary
pub fn command() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Y4M video to play.")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("frame-limit")
                .value_name("FRAME_LIMIT")
                .help("Stop after this many frames.")
                .required(false)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("Write the processed frames to a Y4M file.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("N")
                .help("Display rate in frames per second (0 = as fast as possible).")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("capacity")
                .long("capacity")
                .value_name("N")
                .help("Number of frames each queue between stages can hold.")
                .value_parser(value_parser!(NonZeroUsize)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("JSON configuration file.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .value_name("SECS")
                .help("Seconds between health reports (0 = off).")
                .value_parser(value_parser!(u64)),
        )
}

/// Input path and run configuration from parsed arguments
///
/// Flags override the configuration file, which overrides the defaults.
pub fn resolve(matches: &ArgMatches) -> Result<(PathBuf, Config)> {
    let input = matches
        .get_one::<PathBuf>("input")
        .cloned()
        .context("no input video given")?;

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(limit) = matches.get_one::<u64>("frame-limit") {
        config.frame_limit = Some(*limit);
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.output = Some(output.clone());
    }
    if let Some(fps) = matches.get_one::<u32>("fps") {
        config.frame_rate = *fps;
    }
    if let Some(capacity) = matches.get_one::<NonZeroUsize>("capacity") {
        config.capacity = *capacity;
    }
    if let Some(secs) = matches.get_one::<u64>("stats") {
        config.stats_interval_secs = *secs;
    }

    Ok((input, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Result<(PathBuf, Config)> {
        let matches = command().try_get_matches_from(args.iter().copied())?;
        resolve(&matches)
    }

    #[test]
    fn test_command_is_valid() {
        command().debug_assert();
    }

    #[test]
    fn test_input_only() {
        let (input, config) = parse(&["frameflow", "clip.y4m"]).unwrap();
        assert_eq!(input, PathBuf::from("clip.y4m"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_flags() {
        let (_, config) = parse(&[
            "frameflow",
            "clip.y4m",
            "120",
            "-o",
            "gray.y4m",
            "--fps",
            "0",
            "--capacity",
            "3",
            "--stats",
            "5",
        ])
        .unwrap();

        assert_eq!(config.frame_limit, Some(120));
        assert_eq!(config.output, Some(PathBuf::from("gray.y4m")));
        assert_eq!(config.frame_rate, 0);
        assert_eq!(config.capacity.get(), 3);
        assert_eq!(config.stats_interval_secs, 5);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "frame_rate": 60, "capacity": 4, "frame_limit": 9 }}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let (_, config) = parse(&["frameflow", "clip.y4m", "--config", path, "--capacity", "2"]).unwrap();
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.capacity.get(), 2);
        assert_eq!(config.frame_limit, Some(9));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(parse(&["frameflow"]).is_err());
        assert!(parse(&["frameflow", "clip.y4m", "many"]).is_err());
        assert!(parse(&["frameflow", "clip.y4m", "--capacity", "0"]).is_err());
    }
}
