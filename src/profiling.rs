//! # Profiling
//!
//! With the `profiling` feature the load, unload and reload units, the
//! staleness scan and the dependency walks open `tracing` spans. This
//! module installs a subscriber that writes them to a file.
//!
//! ```toml
//! [dependencies]
//! archetype_asset_db = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! ```ignore
//! let _guard = archetype_asset_db::profiling::init_file_subscriber("trace.json")?;
//! // ... register, reload, pump ...
//! // Spans are flushed when the guard drops.
//! ```
//!
//! Profile in release mode; set `RUST_LOG=debug` to also see per-asset events.

#[cfg(feature = "profiling")]
pub use self::subscriber::init_file_subscriber;

#[cfg(feature = "profiling")]
mod subscriber {
    use std::fs::File;
    use std::path::Path;

    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    use crate::error::{AssetError, Result};

    /// Install a global subscriber writing JSON lines to `path`. Keep the
    /// returned guard alive for as long as spans should be flushed.
    pub fn init_file_subscriber(path: impl AsRef<Path>) -> Result<WorkerGuard> {
        let file = File::create(path.as_ref())?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| AssetError::Config(format!("tracing subscriber: {err}")))?;
        Ok(guard)
    }
}
