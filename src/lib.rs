pub mod backoff;
pub mod capture;
pub mod clienv;
pub mod codec;
pub mod component;
pub mod error;
pub mod executor;
pub mod job_config;
pub mod model;
pub mod transport;
pub mod watcher;

pub use component::{ComponentHandle, DetectionComponent, MediaKind};
pub use error::{DetectionError, ExecutorError, ExitCode, Result};
pub use executor::Executor;
pub use job_config::JobConfig;
