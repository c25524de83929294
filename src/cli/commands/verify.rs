//! `verify`: re-hash archives against their `checksums.txt`.

use crate::cli::RuntimeConfig;
use crate::cli::args::VerifyArgs;
use crate::error::Result;
use crate::packager::checksum;

pub async fn execute(args: &VerifyArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let report = checksum::verify_listing(&args.dir).await?;

    for name in &report.verified {
        runtime_config.success(name)?;
    }
    for mismatch in &report.mismatched {
        runtime_config.error(&format!(
            "{}: checksum mismatch (listed {}, actual {})",
            mismatch.file_name, mismatch.expected, mismatch.actual
        ))?;
    }
    for name in &report.missing {
        runtime_config.error(&format!("{name}: file not found"))?;
    }

    if report.is_ok() {
        runtime_config.success(&format!("{} archives verified", report.verified.len()))?;
        Ok(0)
    } else {
        runtime_config.error(&format!(
            "{} mismatched, {} missing",
            report.mismatched.len(),
            report.missing.len()
        ))?;
        Ok(1)
    }
}
