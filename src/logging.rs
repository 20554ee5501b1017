use crate::config::{AppConfig, ConfigError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. Keep the guard alive for the lifetime of
/// the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> Result<WorkerGuard, ConfigError> {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true) // Keep target in JSON for structured queries
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).try_init()
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).try_init()
    };
    installed.map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    #[test]
    fn test_second_init_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            log_level: "debug".to_string(),
            log_dir: dir.path().to_string_lossy().into_owned(),
            log_file: "tubes.log".to_string(),
            use_json: true,
            rotation: "never".to_string(),
            store: StoreConfig::default(),
        };

        let guard = init_logging(&config).unwrap();
        tracing::info!(group_id = 1, "Transfer committed");
        drop(guard);
        assert!(dir.path().join("tubes.log").exists());

        assert!(matches!(
            init_logging(&config),
            Err(ConfigError::Logging(_))
        ));
    }
}
