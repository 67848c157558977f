//! Logging setup for binaries and tests embedding the crate

use env_logger::{Builder, Env};
pub use log::{debug, info, warn};

/// Install an `env_logger` configured from `RUST_LOG`, `info` when unset.
/// Calling it twice is harmless.
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .is_test(cfg!(test))
        .try_init();
}
