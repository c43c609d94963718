use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stream_executor::clienv;

/// Install the global subscriber. Logs go to stderr: stdin is the control
/// channel and stdout may carry published messages.
pub(crate) fn initialize_tracing(level_override: Option<&str>) -> anyhow::Result<()> {
    let directives = level_override
        .map(str::to_string)
        .unwrap_or_else(clienv::log_filter);
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter: {}", directives))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::trace!(filter = %directives, "Tracing initialized");
    Ok(())
}
