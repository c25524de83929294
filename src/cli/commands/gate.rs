//! `gate`: decide whether the manifest version is new and claim its tag.

use super::shared;
use crate::builder::CargoBackend;
use crate::cli::RuntimeConfig;
use crate::cli::args::GateArgs;
use crate::error::{ErrorExt, Result};
use crate::pipeline::{Admission, Pipeline};
use std::io::Write;
use std::path::Path;

/// Step outputs file set by GitHub Actions.
const STEP_OUTPUT_VAR: &str = "GITHUB_OUTPUT";

pub async fn execute(args: &GateArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let config = shared::resolve_config(&args.release)?;
    if config.dry_run {
        runtime_config.warn("Dry run: the tag will not be created")?;
    }

    let vcs = shared::version_control(&config);
    let host = shared::release_host(&config, args.release.token.as_deref(), runtime_config)?;
    let backend = CargoBackend::new(config.build_timeout);
    let pipeline = Pipeline::new(config, vcs, backend, host);

    let outputs = match pipeline.admit().await? {
        Admission::Open(decision) => {
            runtime_config.success(&decision.describe())?;
            step_outputs(true, decision.descriptor.tag())
        }
        Admission::Closed { reason } => {
            runtime_config.success(&format!("Nothing to release: {reason}"))?;
            step_outputs(false, "")
        }
    };

    for line in outputs.lines() {
        runtime_config.indent(line)?;
    }
    if let Some(path) = std::env::var_os(STEP_OUTPUT_VAR) {
        append_outputs(Path::new(&path), &outputs)?;
    }
    Ok(0)
}

/// `key=value` lines for the downstream build and publish jobs.
fn step_outputs(should_release: bool, tag: &str) -> String {
    format!("should_release={should_release}\ntag={tag}\n")
}

fn append_outputs(path: &Path, outputs: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .fs_context("opening step outputs", path)?;
    file.write_all(outputs.as_bytes())
        .fs_context("writing step outputs", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_append_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output");
        std::fs::write(&path, "earlier=1\n").unwrap();

        append_outputs(&path, &step_outputs(true, "v1.2.0")).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "earlier=1\nshould_release=true\ntag=v1.2.0\n"
        );
    }
}
