mod args;
mod init;

use std::process::ExitCode as ProcessExitCode;

use args::Cli;
use clap::Parser;
use stream_executor::error::ExitCode;
use stream_executor::executor;
use stream_executor::job_config::JobConfig;
use stream_executor::transport::{self, JsonLinesPublisher, Publisher};

fn run(cli: &Cli) -> stream_executor::Result<()> {
    let config = JobConfig::load(&cli.job_config)?;

    let publisher: Box<dyn Publisher> = if cli.dry_run {
        tracing::info!("Dry run: publishing to stdout");
        Box::new(JsonLinesPublisher::stdout())
    } else {
        transport::open_publisher(&config.transport.uri)?
    };

    executor::launch(&config, publisher)
}

fn exit_with(code: ExitCode) -> ProcessExitCode {
    ProcessExitCode::from(code.code() as u8)
}

fn main() -> ProcessExitCode {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                exit_with(ExitCode::InvalidCommandLineArguments)
            } else {
                exit_with(ExitCode::Success)
            };
        }
    };

    if let Err(e) = init::initialize_tracing(cli.log_level.as_deref()) {
        eprintln!("{:#}", e);
        return exit_with(ExitCode::InvalidCommandLineArguments);
    }

    match run(&cli) {
        Ok(()) => {
            tracing::info!("Job stopped");
            exit_with(ExitCode::Success)
        }
        Err(e) => {
            let code = e.exit_code();
            tracing::error!("{} ({})", e, code);
            exit_with(code)
        }
    }
}
