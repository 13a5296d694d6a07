//! Logging setup.
//!
//! The library only emits `tracing` events. Binaries call [`init_tracing`]
//! once at startup to print them.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set. Otherwise the level is `info`, or
/// `debug` when `debug` is true. Subsequent calls are ignored.
pub fn init_tracing(debug: bool) {
    INIT.call_once(|| {
        let default_level = if debug { "windows_sign=debug,info" } else { "info" };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        // A subscriber installed by the embedding application wins.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(true);
        init_tracing(false);
        tracing::debug!("still fine");
    }
}
