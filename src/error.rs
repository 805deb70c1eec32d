//! Error types for the plugin subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a plugin could not be loaded or registered
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("failed to open plugin library {path}: {source}")]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("plugin library {path} does not export `{symbol}`: {source}")]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("plugin factory in {path} returned no instance")]
    NullInstance { path: PathBuf },

    #[error("plugin library {path} was built against plugin ABI {found}, host expects {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("failed to initialize plugin: {name}")]
    InitializationFailed { name: String },
}

/// Result type for plugin operations
pub type PluginResult<T> = std::result::Result<T, PluginError>;
