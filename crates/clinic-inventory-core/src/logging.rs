//! Logging setup.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set. Output goes to a daily rolling
/// file when `log_dir` exists, otherwise to stdout. Returns `false` when a
/// subscriber was already installed.
pub fn init_logging(level: &str, json: bool, log_dir: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.is_dir() {
            let file_appender = tracing_appender::rolling::daily(log_path, "clinic-inventory");
            let builder = builder.with_writer(file_appender).with_ansi(false);
            return if json {
                builder.json().try_init().is_ok()
            } else {
                builder.try_init().is_ok()
            };
        }
    }

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Install logging from a loaded configuration.
pub fn init_from_config(config: &crate::config::Config) -> bool {
    init_logging(&config.log_level, config.log_json, config.log_dir.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init_logging("debug", false, None);
        assert!(!init_logging("info", true, None));
    }
}
