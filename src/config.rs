use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::storage::DEFAULT_API_BASE;

#[derive(Parser, Debug)]
#[command(
    name = "cubetimer",
    version = env!("CARGO_PKG_VERSION"),
    about = "Speedcubing timer with inspection, records and history"
)]
pub struct Args {
    /// Base URL of the timer backend API.
    #[arg(long, value_name = "URL", default_value = DEFAULT_API_BASE)]
    pub api: String,

    /// Cube type to select at startup.
    #[arg(long, value_name = "NAME")]
    pub cube: Option<String>,

    /// Log file; the terminal belongs to the UI.
    #[arg(long, value_name = "FILE", default_value = "cubetimer.log")]
    pub log_file: PathBuf,

    #[arg(short, long, action)]
    pub verbose: bool,
}

/// Routes the `log` facade into `args.log_file`. `RUST_LOG` wins over the
/// default level.
pub fn init_logging(args: &Args) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .with_context(|| format!("cannot open log file {}", args.log_file.display()))?;

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
        .context("logger already initialized")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["cubetimer"]);
        assert_eq!(args.api, "http://127.0.0.1:5000/api");
        assert_eq!(args.cube, None);
        assert!(!args.verbose);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "cubetimer",
            "--api",
            "http://timer.local/api",
            "--cube",
            "3x3",
            "--log-file",
            "/tmp/t.log",
            "-v",
        ]);
        assert_eq!(args.api, "http://timer.local/api");
        assert_eq!(args.cube.as_deref(), Some("3x3"));
        assert_eq!(args.log_file, PathBuf::from("/tmp/t.log"));
        assert!(args.verbose);
    }
}
