//! Configuration for tile storage and pyramid generation.

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleMethod;

/// Configuration for raw tile storage and pyramid reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    /// Tiles per chunk along each tile axis. Chunks always hold whole tiles.
    pub tiles_per_chunk: u32,

    /// Compression codec for Zarr files.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,

    /// How 2x2 pixel blocks are combined between levels.
    pub downsample: DownsampleMethod,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            tiles_per_chunk: 4,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
            downsample: DownsampleMethod::Mean,
        }
    }
}

impl PyramidConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables that are set.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("TILER_TILES_PER_CHUNK") {
            if let Ok(n) = val.parse() {
                self.tiles_per_chunk = n;
            }
        }

        if let Ok(val) = std::env::var("TILER_COMPRESSION") {
            self.compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("TILER_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                self.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("TILER_SHUFFLE") {
            self.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("TILER_DOWNSAMPLE_METHOD") {
            self.downsample = DownsampleMethod::from_str(&val);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.tiles_per_chunk == 0 {
            return Err("tiles_per_chunk must be > 0".to_string());
        }

        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err("compression_level must be 1-9".to_string());
        }

        Ok(())
    }

    /// Chunk edge in tiles for a level with `num_tiles` tiles per axis.
    pub fn chunk_tiles(&self, num_tiles: u32) -> u32 {
        self.tiles_per_chunk.clamp(1, num_tiles.max(1))
    }
}

/// Compression codec for Zarr files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd (recommended).
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PyramidConfig::default();
        assert_eq!(config.tiles_per_chunk, 4);
        assert_eq!(config.compression, ZarrCompression::BloscZstd);
        assert_eq!(config.compression_level, 1);
        assert!(config.shuffle);
        assert_eq!(config.downsample, DownsampleMethod::Mean);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PyramidConfig::default();
        assert!(config.validate().is_ok());

        config.tiles_per_chunk = 0;
        assert!(config.validate().is_err());

        config = PyramidConfig::default();
        config.compression_level = 10;
        assert!(config.validate().is_err());

        config.compression = ZarrCompression::None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_tiles_clamped_to_level() {
        let config = PyramidConfig::default();
        assert_eq!(config.chunk_tiles(1), 1);
        assert_eq!(config.chunk_tiles(2), 2);
        assert_eq!(config.chunk_tiles(64), 4);
    }

    #[test]
    fn test_zarr_compression_from_str() {
        assert_eq!(ZarrCompression::from_str("none"), ZarrCompression::None);
        assert_eq!(ZarrCompression::from_str("lz4"), ZarrCompression::BloscLz4);
        assert_eq!(
            ZarrCompression::from_str("BLOSC_ZSTD"),
            ZarrCompression::BloscZstd
        );
        assert_eq!(
            ZarrCompression::from_str("invalid"),
            ZarrCompression::BloscZstd
        );
    }
}
