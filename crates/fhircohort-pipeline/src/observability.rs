// Tracing initialization for the CLI. Runs once, after the configuration is
// loaded, so the configured level applies from the first event.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. `RUST_LOG` wins over `level` when it parses.
pub fn init_tracing(level: &str) {
    let filter = build_filter(level, std::env::var("RUST_LOG").ok().as_deref());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

fn build_filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_without_rust_log() {
        assert_eq!(build_filter("debug", None).to_string(), "debug");
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        assert_eq!(build_filter("debug", Some("warn")).to_string(), "warn");
    }
}
