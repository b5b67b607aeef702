//! Logging for the step binaries, powered by tracing-subscriber.
//!
//! Events go to stderr so stdout only carries what a step prints on purpose.

use std::error::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Noisy dependencies held at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: [&str; 5] = ["hyper", "hyper_util", "reqwest", "rustls", "h2"];

pub(crate) fn build_env_filter(rust_log: Option<&str>) -> EnvFilter {
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => {
            let mut directives = vec![DEFAULT_LEVEL.to_string()];
            directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
            EnvFilter::new(directives.join(","))
        }
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// `error: cause: root cause`, for the last log line before a failing exit.
pub fn error_chain(error: &dyn Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        // wrappers print their kind and also return it as the source
        let cause_text = cause.to_string();
        if !chain.ends_with(&cause_text) {
            chain.push_str(": ");
            chain.push_str(&cause_text);
        }
        source = cause.source();
    }
    chain
}
