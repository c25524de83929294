//! `run`: the full release pipeline on this host.

use super::shared;
use crate::builder::CargoBackend;
use crate::cli::RuntimeConfig;
use crate::cli::args::RunArgs;
use crate::error::Result;
use crate::pipeline::Pipeline;
use std::time::Duration;

pub async fn execute(args: &RunArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let mut config = shared::resolve_config(&args.release)?;
    config.jobs = args.jobs;
    config.build_timeout = Duration::from_secs(args.build_timeout);

    runtime_config.section(&format!("Release pipeline: {}", config.source_dir.display()))?;
    if config.dry_run {
        runtime_config.warn("Dry run: no tag will be created and nothing will be published")?;
    }

    let vcs = shared::version_control(&config);
    let host = shared::release_host(&config, args.release.token.as_deref(), runtime_config)?;
    let backend = CargoBackend::new(config.build_timeout);
    let pipeline = Pipeline::new(config, vcs, backend, host);

    shared::finish(pipeline.run().await, runtime_config)
}
