//! `publish`: release the archives the per-platform `build` runs left behind.

use super::shared;
use crate::builder::CargoBackend;
use crate::cli::RuntimeConfig;
use crate::cli::args::PublishArgs;
use crate::error::Result;
use crate::pipeline::Pipeline;

pub async fn execute(args: &PublishArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let config = shared::resolve_config(&args.release)?;
    let dir = shared::absolute(&args.dir)?;

    runtime_config.progress(&format!("Collecting artifacts from {}", dir.display()))?;
    if config.dry_run {
        runtime_config.warn("Dry run: nothing will be published")?;
    }

    let vcs = shared::version_control(&config);
    let host = shared::release_host(&config, args.release.token.as_deref(), runtime_config)?;
    let backend = CargoBackend::new(config.build_timeout);
    let pipeline = Pipeline::new(config, vcs, backend, host);

    shared::finish(pipeline.publish_from(&dir).await, runtime_config)
}
