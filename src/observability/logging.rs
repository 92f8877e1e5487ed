//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Switch between info and debug once the configuration is known

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Handle for adjusting the log level after startup.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogHandle {
    /// Apply the debug flag, unless `RUST_LOG` chose the level.
    pub fn set_debug(&self, debug: bool) {
        if self.from_env {
            return;
        }
        if let Err(e) = self.filter.reload(default_filter(debug)) {
            tracing::warn!(error = %e, "Failed to update log level");
        }
    }
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "plg_sdk=debug" } else { "plg_sdk=info" })
}

/// Install the global subscriber.
pub fn init(debug: bool) -> LogHandle {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (default_filter(debug), false),
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    LogHandle {
        filter: handle,
        from_env,
    }
}
