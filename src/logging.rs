//! Logging setup
//!
//! Deployments call [`init`] once at startup; everything else in the crate
//! emits through `tracing` macros and inherits whatever subscriber is
//! installed.

use tracing::Level;

/// Install the default fmt subscriber at the given level.
///
/// Safe to call once per process; later calls are ignored so embedding
/// applications that installed their own subscriber keep it.
pub fn init(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}
