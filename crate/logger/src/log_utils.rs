use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_INIT: Once = Once::new();

/// Default filter used when neither `RUST_LOG` nor an explicit value is set
const DEFAULT_FILTER: &str = "info,cosmian_jwks_client=debug";

/// Initialise the global tracing subscriber once per process.
///
/// `RUST_LOG` wins when it is set in the environment; otherwise `rust_log`
/// is used, then [`DEFAULT_FILTER`].
/// Calling it again is a no-op, so every test may call it.
pub fn log_init(rust_log: Option<&str>) {
    LOG_INIT.call_once(|| {
        if std::env::var("RUST_BACKTRACE").is_err() {
            unsafe {
                std::env::set_var("RUST_BACKTRACE", "1");
            }
        }

        let filter = std::env::var("RUST_LOG")
            .ok()
            .or_else(|| rust_log.map(ToOwned::to_owned))
            .unwrap_or_else(|| DEFAULT_FILTER.to_owned());

        tracing_setup(&filter);
    });
}

fn tracing_setup(filter: &str) {
    let format = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .compact();

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // a subscriber may already be installed by the embedding application
    if tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .is_err()
    {
        tracing::debug!("a global tracing subscriber is already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::log_init;

    #[test]
    fn test_log_init_is_idempotent() {
        log_init(Some("debug"));
        log_init(None);
        tracing::info!("logger initialised twice without panicking");
    }
}
