use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "stream-executor")]
#[command(version)]
#[command(about = "Run a detection component against a live video stream", long_about = None)]
pub(crate) struct Cli {
    /// Path to the job's TOML launch configuration
    pub job_config: PathBuf,

    /// Log filter (e.g. debug, stream_executor=trace). Overrides STREAM_EXECUTOR_LOG and RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print messages as JSON lines on stdout instead of using the configured transport
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_config_and_flags() {
        let cli = Cli::try_parse_from(["stream-executor", "job.toml", "--log-level", "debug", "--dry-run"]).unwrap();
        assert_eq!(cli.job_config, PathBuf::from("job.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.dry_run);
    }

    #[test]
    fn config_path_is_required() {
        assert!(Cli::try_parse_from(["stream-executor"]).is_err());
    }
}
