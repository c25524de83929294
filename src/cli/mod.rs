//! Command line interface for the release pipeline.
//!
//! Parses arguments, builds the runtime configuration and dispatches to the
//! subcommand implementations in [`commands`].

mod args;
pub mod commands;
mod output;

pub use args::{
    Args, BuildArgs, Command, GateArgs, MatrixArgs, PublishArgs, ReleaseArgs, RunArgs,
    RuntimeConfig, SourceArgs, VerifyArgs,
};
pub use output::OutputManager;

use crate::error::{CliError, Result};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let runtime_config = RuntimeConfig::from(&args);

    match &args.command {
        Command::Run(run) => commands::run::execute(run, &runtime_config).await,
        Command::Gate(gate) => commands::gate::execute(gate, &runtime_config).await,
        Command::Build(build) => commands::build::execute(build, &runtime_config).await,
        Command::Publish(publish) => commands::publish::execute(publish, &runtime_config).await,
        Command::Matrix(matrix) => commands::matrix::execute(matrix, &runtime_config),
        Command::Verify(verify) => commands::verify::execute(verify, &runtime_config).await,
    }
}
