//! Tracing setup shared by the CLI and worker processes
//!
//! Everything goes to stderr: stdout carries the run summary, and in worker
//! processes it carries the reply protocol.

use tracing_subscriber::EnvFilter;

/// Default filter for the given verbosity flags
pub fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (_, true) => "error",
        (true, false) => "debug,ignore=warn",
        (false, false) => "warn",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the flags.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
