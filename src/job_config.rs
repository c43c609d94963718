//! Job launch configuration, read from a TOML file.
//!
//! ```toml
//! job_name = "lobby-camera"
//! job_number = 42
//! stream_uri = "rtsp://10.0.0.5/stream1"
//! segment_size = 100
//! stall_alert_threshold_ms = 10000
//! stall_timeout_ms = 60000
//!
//! [component]
//! name = "frame-diff"
//! library_path = "/opt/components/libframe_diff.so"
//!
//! [component.environment]
//! MODEL_DIR = "/opt/models"
//!
//! [job_properties]
//! THRESHOLD = "8.5"
//!
//! [transport]
//! uri = "unix:///run/broker.sock"
//! job_status_queue = "job-status"
//! activity_alert_queue = "activity-alerts"
//! summary_report_queue = "summary-reports"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, Result};
use crate::model::{JobIdentity, Properties};

const DEFAULT_SEGMENT_SIZE: i32 = 100;
const DEFAULT_STALL_ALERT_THRESHOLD_MS: u64 = 10_000;
const DEFAULT_FRAME_WIDTH: i32 = 640;
const DEFAULT_FRAME_HEIGHT: i32 = 480;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_name: String,
    pub job_number: i32,
    pub stream_uri: String,
    #[serde(default = "default_segment_size")]
    pub segment_size: i32,
    /// How long the stream may fail to produce frames before `STALLED` is reported.
    #[serde(default = "default_stall_alert_threshold_ms")]
    pub stall_alert_threshold_ms: u64,
    /// How long the stream may stall before the job gives up. Absent means never.
    #[serde(default)]
    pub stall_timeout_ms: Option<u64>,
    #[serde(default = "default_frame_width")]
    pub frame_width: i32,
    #[serde(default = "default_frame_height")]
    pub frame_height: i32,
    pub component: ComponentConfig,
    #[serde(default)]
    pub job_properties: Properties,
    #[serde(default)]
    pub media_properties: Properties,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(default)]
    pub name: String,
    pub library_path: PathBuf,
    /// Falls back to $STREAM_EXECUTOR_RUN_DIR.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Exported into the process environment before the library is loaded.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub uri: String,
    pub job_status_queue: String,
    pub activity_alert_queue: String,
    pub summary_report_queue: String,
}

fn default_segment_size() -> i32 {
    DEFAULT_SEGMENT_SIZE
}

fn default_stall_alert_threshold_ms() -> u64 {
    DEFAULT_STALL_ALERT_THRESHOLD_MS
}

fn default_frame_width() -> i32 {
    DEFAULT_FRAME_WIDTH
}

fn default_frame_height() -> i32 {
    DEFAULT_FRAME_HEIGHT
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading job config");

        let content = fs::read_to_string(path)
            .map_err(|e| ExecutorError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;

        tracing::debug!(
            job = %config.job_name,
            number = config.job_number,
            uri = %config.stream_uri,
            segment_size = config.segment_size,
            "Job config loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.job_name.trim().is_empty() {
            return Err(ExecutorError::Config("job_name must not be empty".into()));
        }
        if self.stream_uri.trim().is_empty() {
            return Err(ExecutorError::Config("stream_uri must not be empty".into()));
        }
        if self.segment_size < 1 {
            return Err(ExecutorError::Config(format!(
                "segment_size must be at least 1, got {}",
                self.segment_size
            )));
        }
        if self.frame_width < 1 || self.frame_height < 1 {
            return Err(ExecutorError::Config(format!(
                "frame size must be positive, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.component.library_path.as_os_str().is_empty() {
            return Err(ExecutorError::Config("component.library_path must not be empty".into()));
        }
        let transport = &self.transport;
        for (field, value) in [
            ("transport.uri", &transport.uri),
            ("transport.job_status_queue", &transport.job_status_queue),
            ("transport.activity_alert_queue", &transport.activity_alert_queue),
            ("transport.summary_report_queue", &transport.summary_report_queue),
        ] {
            if value.trim().is_empty() {
                return Err(ExecutorError::Config(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }

    pub fn job(&self) -> JobIdentity {
        JobIdentity::new(self.job_name.clone(), self.job_number)
    }

    pub fn stall_alert_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_alert_threshold_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    pub fn run_directory(&self) -> PathBuf {
        self.component
            .run_directory
            .clone()
            .unwrap_or_else(crate::clienv::run_dir)
    }

    /// Export `[component.environment]` so the component sees it when loaded.
    /// Call before any other thread is started.
    pub fn export_environment(&self) {
        for (key, value) in &self.component.environment {
            tracing::debug!(key = %key, "Exporting component environment variable");
            std::env::set_var(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExitCode;

    const MINIMAL: &str = r#"
job_name = "lobby"
job_number = 7
stream_uri = "rtsp://camera/1"

[component]
library_path = "/opt/libdetector.so"

[transport]
uri = "stdout"
job_status_queue = "status"
activity_alert_queue = "alerts"
summary_report_queue = "summaries"
"#;

    #[test]
    fn defaults_are_applied() {
        let config = JobConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.segment_size, 100);
        assert_eq!(config.stall_alert_threshold(), Duration::from_secs(10));
        assert_eq!(config.stall_timeout(), None);
        assert_eq!((config.frame_width, config.frame_height), (640, 480));
        assert!(config.job_properties.is_empty());
        assert_eq!(config.job(), JobIdentity::new("lobby", 7));
    }

    #[test]
    fn full_config_parses() {
        let content = r#"
job_name = "dock"
job_number = 12
stream_uri = "udp://0.0.0.0:5000"
segment_size = 25
stall_alert_threshold_ms = 500
stall_timeout_ms = 3000

[component]
name = "frame-diff"
library_path = "/opt/libframe_diff.so"
run_directory = "/var/run/detector"

[component.environment]
MODEL_DIR = "/opt/models"

[job_properties]
THRESHOLD = "4.0"

[media_properties]
CAMERA = "north"

[transport]
uri = "tcp://127.0.0.1:9000"
job_status_queue = "status"
activity_alert_queue = "alerts"
summary_report_queue = "summaries"
"#;
        let config = JobConfig::from_toml_str(content).unwrap();
        assert_eq!(config.segment_size, 25);
        assert_eq!(config.stall_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.run_directory(), PathBuf::from("/var/run/detector"));
        assert_eq!(config.component.environment["MODEL_DIR"], "/opt/models");
        assert_eq!(config.job_properties["THRESHOLD"], "4.0");
        assert_eq!(config.media_properties["CAMERA"], "north");
    }

    #[test]
    fn zero_segment_size_is_rejected() {
        let content = MINIMAL.replace("stream_uri", "segment_size = 0\nstream_uri");
        let err = JobConfig::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ExecutorError::Config(_)));
        assert_eq!(err.exit_code(), ExitCode::InvalidJobConfig);
    }

    #[test]
    fn empty_queue_name_is_rejected() {
        let content = MINIMAL.replace("\"alerts\"", "\"\"");
        let err = JobConfig::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("activity_alert_queue"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = JobConfig::from_toml_str("job_name = ").unwrap_err();
        assert!(matches!(err, ExecutorError::Toml(_)));
        assert_eq!(err.exit_code(), ExitCode::InvalidJobConfig);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let path = std::env::temp_dir().join("stream-executor-missing-job.toml");
        let err = JobConfig::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::InvalidJobConfig);
    }

    #[test]
    fn load_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("stream-executor-job-{}.toml", std::process::id()));
        fs::write(&path, MINIMAL).unwrap();
        let config = JobConfig::load(&path).unwrap();
        assert_eq!(config.job_name, "lobby");
        let _ = fs::remove_file(&path);
    }
}
