//! Logging bootstrap: stderr by default, idempotent per process.

use flexi_logger::{Logger, LoggerHandle};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Option<LoggerHandle>> = OnceCell::new();

/// Initialize logging once. The level spec comes from `RUST_LOG` when
/// set, else `info`. Repeated calls are no-ops; initialization never
/// panics.
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let spec = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        match Logger::try_with_str(&spec).and_then(|logger| logger.start()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                eprintln!("logging setup failed, continuing without: {err}");
                None
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging();
        init_logging();
        log::info!("logging alive");
    }
}
