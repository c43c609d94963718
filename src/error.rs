use std::fmt;
use thiserror::Error;

/// Process exit codes surfaced by fatal conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    Success = 0,
    UnexpectedError = 1,
    InvalidCommandLineArguments = 2,
    InvalidJobConfig = 3,
    UnableToReadFromStandardIn = 4,
    UnableToConnectToStream = 5,
    ComponentLoadError = 6,
    ComponentInitError = 7,
    ComponentUnsupported = 8,
    StreamStalled = 9,
    MessageTransportError = 10,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "Job stopped cleanly",
            Self::UnexpectedError => "An unexpected error occurred",
            Self::InvalidCommandLineArguments => "Invalid command line arguments",
            Self::InvalidJobConfig => "The job configuration file is invalid",
            Self::UnableToReadFromStandardIn => "Unable to read from standard in",
            Self::UnableToConnectToStream => "Unable to connect to stream",
            Self::ComponentLoadError => "Unable to load the detection component",
            Self::ComponentInitError => "The detection component failed to initialize",
            Self::ComponentUnsupported => "The detection component does not support video",
            Self::StreamStalled => "The stream stalled for longer than the stall timeout",
            Self::MessageTransportError => "Unable to publish to the message transport",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {}: {}", self.code(), self.description())
    }
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("{message}")]
    Fatal { code: ExitCode, message: String },

    #[error("failed to load detection component: {0}")]
    ComponentLoad(String),

    #[error("invalid job configuration: {0}")]
    Config(String),

    #[error("message transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse job configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExecutorError {
    pub fn fatal(code: ExitCode, message: impl Into<String>) -> Self {
        Self::Fatal {
            code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Fatal { code, .. } => *code,
            Self::ComponentLoad(_) => ExitCode::ComponentLoadError,
            Self::Config(_) | Self::Toml(_) => ExitCode::InvalidJobConfig,
            Self::Transport(_) => ExitCode::MessageTransportError,
            Self::Io(_) | Self::Json(_) => ExitCode::UnexpectedError,
        }
    }
}

/// Result codes reported by a detection component. The executor forwards
/// these without interpreting them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("the component does not support this data type")]
    UnsupportedDataType,

    #[error("the component could not read the data file")]
    CouldNotReadDataFile,

    #[error("detection failed: {0}")]
    DetectionFailed(String),

    #[error("invalid job property: {0}")]
    InvalidProperty(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
