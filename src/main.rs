//! Release pipeline - builds, packages and publishes a multi-platform release.
//!
//! Exit code 0 means the release is published, or there was nothing to release.

use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Run CLI and get exit code
    let exit_code = match release_pipeline::cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_transient() {
                eprintln!("This looks transient; re-running the pipeline is safe.");
            }
            1
        }
    };

    process::exit(exit_code);
}
