//! Shared test setup.
//!
//! Build with `--features tracing` and set `RUST_LOG` (e.g.
//! `splitmap=debug,splitmap_epoch=trace`) to see bucket splits and epoch
//! advancement while a test runs.

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a console subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
