//! Tracing subscriber setup for the `rust_scan` binary.
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Builds the filter: `RUST_LOG` when set, `level` otherwise.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|err| anyhow!("invalid log level '{level}': {err}")),
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays free for
/// scan output; `json` switches to one JSON object per line.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level)?)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_filter_from_level() {
        std::env::remove_var("RUST_LOG");
        let filter = env_filter("debug").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_wins() {
        std::env::set_var("RUST_LOG", "rust_scan=trace");
        let filter = env_filter("info").unwrap();
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.to_string(), "rust_scan=trace");
    }
}
