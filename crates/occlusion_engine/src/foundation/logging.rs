//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system at the `info` level
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init() {
    init_with_level("info");
}

/// Initialize the logging system with a default filter
///
/// Safe to call more than once; later calls are ignored so that tests and
/// applications can both request initialization.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env)
        .is_test(cfg!(test))
        .try_init();
}
