//! `matrix`: print the fixed platform matrix.

use crate::cli::RuntimeConfig;
use crate::cli::args::MatrixArgs;
use crate::error::Result;
use crate::matrix;

pub fn execute(args: &MatrixArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let rows = matrix::rows();

    if args.json {
        runtime_config
            .output()
            .info(&serde_json::to_string_pretty(&rows)?)?;
        return Ok(0);
    }

    runtime_config.output().info(&format!(
        "{:<16} {:<32} {:<8} {:<8} {}",
        "PLATFORM", "TARGET", "RUNNER", "ARCHIVE", "STATIC"
    ))?;
    for row in rows {
        runtime_config.output().info(&format!(
            "{:<16} {:<32} {:<8} {:<8} {}",
            row.platform_label,
            row.target_triple,
            row.runner_kind.to_string(),
            row.archive_format.to_string(),
            if row.static_linkage { "yes" } else { "no" }
        ))?;
    }
    Ok(0)
}
