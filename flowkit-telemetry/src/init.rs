//! Telemetry initialization and configuration

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Output format of the console subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryFormat {
    #[default]
    Pretty,
    Json,
}

/// Initialize console logging with human-readable output.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
///
/// # Example
/// ```
/// use flowkit_telemetry::init_telemetry;
/// init_telemetry("my-pipeline").expect("Failed to initialize telemetry");
/// ```
pub fn init_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    init_with_filter(service_name, None, TelemetryFormat::Pretty)
}

/// Initialize console logging with one JSON object per line.
pub fn init_json_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    init_with_filter(service_name, None, TelemetryFormat::Json)
}

/// Initialize logging with an explicit filter directive.
///
/// `RUST_LOG` wins over `filter` when set. Only the first call in a process
/// installs a subscriber; later calls are no-ops.
pub fn init_with_filter(
    service_name: &str,
    filter: Option<&str>,
    format: TelemetryFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter.unwrap_or("info"))?,
    };

    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter);
        let installed = match format {
            TelemetryFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true),
                )
                .try_init(),
            TelemetryFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
                .try_init(),
        };

        match installed {
            Ok(()) => tracing::info!(service.name = service_name, ?format, "Telemetry initialized"),
            // Another subscriber (e.g. a test harness) got there first.
            Err(e) => eprintln!("flowkit-telemetry: subscriber not installed: {e}"),
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        assert!(init_telemetry("test-service").is_ok());
        assert!(init_json_telemetry("test-service").is_ok());
    }
}
