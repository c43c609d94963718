use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    StreamExecutorLog,
    StreamExecutorRunDir,
    StreamExecutorFfmpeg,
    RustLog,
}

impl EnvVar {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StreamExecutorLog => "STREAM_EXECUTOR_LOG",
            Self::StreamExecutorRunDir => "STREAM_EXECUTOR_RUN_DIR",
            Self::StreamExecutorFfmpeg => "STREAM_EXECUTOR_FFMPEG",
            Self::RustLog => "RUST_LOG",
        }
    }
}

const FALLBACK_DATA_DIR: &str = "~/.local/share";
const EXECUTOR_SUBDIR: &str = "stream-executor";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_LOG_FILTER: &str = "info";

/// Set and non-blank.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Log filter ($STREAM_EXECUTOR_LOG, then $RUST_LOG, then "info")
pub fn log_filter() -> String {
    env_opt(EnvVar::StreamExecutorLog.as_str())
        .or_else(|| env_opt(EnvVar::RustLog.as_str()))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Default component run directory ($STREAM_EXECUTOR_RUN_DIR or ~/.local/share/stream-executor)
pub fn run_dir() -> PathBuf {
    let dir = env_opt(EnvVar::StreamExecutorRunDir.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
                .join(EXECUTOR_SUBDIR)
        });
    tracing::trace!(dir = %dir.display(), "Resolved run directory");
    dir
}

/// ffmpeg binary ($STREAM_EXECUTOR_FFMPEG or "ffmpeg" from PATH)
pub fn ffmpeg_binary() -> String {
    let binary = env_opt(EnvVar::StreamExecutorFfmpeg.as_str()).unwrap_or_else(|| DEFAULT_FFMPEG.to_string());
    tracing::trace!(binary = %binary, "ffmpeg binary");
    binary
}
