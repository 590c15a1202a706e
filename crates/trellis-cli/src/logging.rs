//! Subscriber setup
//!
//! `RUST_LOG` wins over everything; then `--verbose`/`--log-level`; then the config file.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use trellis_config::{LogFormat, LoggingConfig};

/// Env-filter directive for the given config and command-line override
pub fn filter_directive(config: &LoggingConfig, requested: Option<LevelFilter>) -> String {
    match requested {
        Some(level) => LoggingConfig {
            level: level.to_string().to_lowercase(),
            ..config.clone()
        }
        .filter_directive(),
        None => config.filter_directive(),
    }
}

pub fn init(config: &LoggingConfig, requested: Option<LevelFilter>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, requested)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_config_level() {
        let config = LoggingConfig::default();
        let directive = filter_directive(&config, Some(LevelFilter::DEBUG));
        assert!(directive.contains("trellis_core=debug"));
        assert!(!directive.contains("=info"));
    }

    #[test]
    fn test_off_level_is_kept() {
        let directive = filter_directive(&LoggingConfig::default(), Some(LevelFilter::OFF));
        assert!(directive.contains("trellis_cli=off"));
    }

    #[test]
    fn test_config_level_used_without_override() {
        let config = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };
        assert!(filter_directive(&config, None).contains("trellis_sqlite=warn"));
    }
}
