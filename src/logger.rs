//! Logging setup for headless use.
//!
//! The plugin runs without `bevy_log`, so binaries and tests that want to see
//! tracking diagnostics install a `tracing` subscriber here.

use tracing::Level;

/// Installs a formatted `tracing` subscriber at `INFO`.
///
/// Overridable through `RUST_LOG`, e.g. `RUST_LOG=bevy_ren_tracker=debug`.
/// Calling it more than once is harmless.
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Like [`init_logger`] with a custom default level.
pub fn init_logger_with_level(default_level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .try_init();
}
