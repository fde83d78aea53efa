//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crisscross_core::{CoordError, CoordResult};

use crate::RuntimeConfig;

/// Build the filter: `RUST_LOG` when set, else `default_directive`
pub fn env_filter(default_directive: &str) -> CoordResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| CoordError::Config(format!("log filter {:?}: {}", default_directive, e))),
    }
}

/// Install the global fmt subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str, json: bool) -> CoordResult<()> {
    let filter = env_filter(default_directive)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CoordError::Config(e.to_string()))
}

pub fn init_from_config(config: &RuntimeConfig) -> CoordResult<()> {
    init_tracing(&config.log_filter, config.json_logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parsing() {
        assert!(env_filter("crisscross_session=debug,info").is_ok());
    }

    #[test]
    fn test_second_install_fails() {
        let _ = init_tracing("warn", false);
        assert!(init_tracing("warn", true).is_err());
    }
}
