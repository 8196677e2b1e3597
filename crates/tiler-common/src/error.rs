//! Error types for the tiling pipeline.

use thiserror::Error;

/// Result type alias using TilerError.
pub type TilerResult<T> = Result<T, TilerError>;

/// Primary error type for tiling operations.
///
/// `Configuration`, `IndexBuild` and `PyramidConsistency` are fatal for a
/// run. `TileIo` is scoped to a single tile and is collected by callers
/// that process tiles independently.
#[derive(Debug, Error)]
pub enum TilerError {
    // === Fatal ===
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("index build error: {0}")]
    IndexBuild(String),

    #[error("pyramid consistency error at level {level}: {message}")]
    PyramidConsistency { level: u32, message: String },

    // === Per-tile ===
    #[error("tile {level}/{x}/{y}: {message}")]
    TileIo {
        level: u32,
        x: u32,
        y: u32,
        message: String,
    },

    // === Storage plumbing ===
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TilerError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an IndexBuild error.
    pub fn index_build(msg: impl Into<String>) -> Self {
        Self::IndexBuild(msg.into())
    }

    /// Create a PyramidConsistency error.
    pub fn pyramid_consistency(level: u32, msg: impl Into<String>) -> Self {
        Self::PyramidConsistency {
            level,
            message: msg.into(),
        }
    }

    /// Create a TileIo error.
    pub fn tile_io(level: u32, x: u32, y: u32, msg: impl Into<String>) -> Self {
        Self::TileIo {
            level,
            x,
            y,
            message: msg.into(),
        }
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TileIo { .. })
    }
}
