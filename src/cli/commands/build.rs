//! `build`: one platform of the matrix, for a runner of its own.

use super::shared;
use crate::builder::CargoBackend;
use crate::cli::RuntimeConfig;
use crate::cli::args::BuildArgs;
use crate::error::Result;
use crate::pipeline::{build_platform, handoff};
use std::time::Duration;

pub async fn execute(args: &BuildArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let mut config = shared::resolve_source(&args.source)?;
    config.build_timeout = Duration::from_secs(args.build_timeout);
    let out_dir = shared::absolute(&args.out)?;

    runtime_config.progress(&format!(
        "Building {} ({})",
        args.platform,
        args.platform.target_triple()
    ))?;

    let backend = CargoBackend::new(config.build_timeout);
    let outcome = build_platform(&backend, &config, args.platform, &out_dir).await?;

    match &outcome.result {
        Ok(artifact) => {
            runtime_config.success(&format!(
                "{} in {:.1}s",
                artifact.archive_name,
                outcome.duration.as_secs_f64()
            ))?;
            runtime_config.indent(&format!("{}  {}", artifact.checksum, artifact.archive_name))?;
            runtime_config.verbose_println(
                &handoff::checksum_path(&artifact.archive_path)
                    .display()
                    .to_string(),
            )?;
            Ok(0)
        }
        Err(failure) => {
            runtime_config.error(&format!("{} [{}]: {}", failure.platform, failure.stage, failure.reason))?;
            Ok(1)
        }
    }
}
