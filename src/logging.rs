//! Logging setup. Everything goes to stderr so hook stdout stays a clean
//! JSON channel for the Assistant.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "HAIL_MARY_LOG";
const DEFAULT_FILTER: &str = "warn";

/// Pick the filter directive: the `--log-level` flag, then `HAIL_MARY_LOG`,
/// then `warn`.
pub fn filter_directive(flag: Option<&str>, env: Option<String>) -> String {
    flag.map(str::to_string)
        .or(env)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn init(flag: Option<&str>) {
    let directive = filter_directive(flag, std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("hail-mary: ignoring invalid log filter {directive:?}: {e}");
        EnvFilter::new(DEFAULT_FILTER)
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}
