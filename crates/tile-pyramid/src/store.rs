//! Zarr V3 storage for tile arrays.
//!
//! Each level is its own array at `<root>/<level>.zarr` with shape
//! `[n, n, S, S]` and chunks of `[c, c, S, S]`, so a chunk always holds
//! whole tiles and reading one tile never touches another chunk. Chunks of a
//! level are written in parallel; they are disjoint so no locking is needed.
//!
//! A level is only readable once its `complete` attribute is true. The
//! attribute is written last, so an interrupted write leaves a level that
//! [`RawTileStore::has_level`] reports as absent.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use tiler_common::{num_tiles, TilerError, TilerResult};

use crate::config::{PyramidConfig, ZarrCompression};
use crate::mesh::ElementKind;
use crate::types::{TileArray, TileIndex};

const COMPLETE_ATTR: &str = "complete";

/// Element types that can be stored as tile arrays.
pub trait TileElement: Copy + Send + Sync + 'static {
    const DATA_TYPE_NAME: &'static str;

    fn data_type() -> DataType;

    fn fill_value() -> FillValue;

    fn store_subset(
        array: &Array<FilesystemStore>,
        subset: &ArraySubset,
        data: &[Self],
    ) -> TilerResult<()>;

    fn retrieve_subset(
        array: &Array<FilesystemStore>,
        subset: &ArraySubset,
    ) -> TilerResult<Vec<Self>>;
}

impl TileElement for f32 {
    const DATA_TYPE_NAME: &'static str = "float32";

    fn data_type() -> DataType {
        DataType::Float32
    }

    fn fill_value() -> FillValue {
        FillValue::from(f32::NAN)
    }

    fn store_subset(
        array: &Array<FilesystemStore>,
        subset: &ArraySubset,
        data: &[Self],
    ) -> TilerResult<()> {
        array
            .store_array_subset_elements::<f32>(subset, data)
            .map_err(|e| TilerError::storage(e.to_string()))
    }

    fn retrieve_subset(
        array: &Array<FilesystemStore>,
        subset: &ArraySubset,
    ) -> TilerResult<Vec<Self>> {
        array
            .retrieve_array_subset_elements::<f32>(subset)
            .map_err(|e| TilerError::storage(e.to_string()))
    }
}

impl TileElement for u32 {
    const DATA_TYPE_NAME: &'static str = "uint32";

    fn data_type() -> DataType {
        DataType::UInt32
    }

    fn fill_value() -> FillValue {
        FillValue::from(0u32)
    }

    fn store_subset(
        array: &Array<FilesystemStore>,
        subset: &ArraySubset,
        data: &[Self],
    ) -> TilerResult<()> {
        array
            .store_array_subset_elements::<u32>(subset, data)
            .map_err(|e| TilerError::storage(e.to_string()))
    }

    fn retrieve_subset(
        array: &Array<FilesystemStore>,
        subset: &ArraySubset,
    ) -> TilerResult<Vec<Self>> {
        array
            .retrieve_array_subset_elements::<u32>(subset)
            .map_err(|e| TilerError::storage(e.to_string()))
    }
}

/// Shape and attributes of a persisted level.
#[derive(Debug, Clone)]
pub struct LevelInfo {
    pub level: u32,
    pub tilesize: u32,
    pub num_tiles: u32,
    pub attributes: Map<String, Value>,
}

/// Handle on one stored level, shareable across threads.
pub struct LevelReader {
    level: u32,
    tilesize: u32,
    array: Array<FilesystemStore>,
}

impl LevelReader {
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn tilesize(&self) -> u32 {
        self.tilesize
    }

    pub fn num_tiles(&self) -> u32 {
        num_tiles(self.level)
    }

    /// Read tile (tx, ty). Only the chunk holding it is decoded.
    pub fn read_tile(&self, tx: u32, ty: u32) -> TilerResult<Vec<f32>> {
        let level = self.level;
        let n = self.num_tiles();
        if tx >= n || ty >= n {
            return Err(TilerError::tile_io(level, tx, ty, "tile outside level"));
        }
        let s = self.tilesize as u64;
        let subset = ArraySubset::new_with_start_shape(
            vec![tx as u64, ty as u64, 0, 0],
            vec![1, 1, s, s],
        )
        .map_err(|e| TilerError::tile_io(level, tx, ty, e.to_string()))?;
        f32::retrieve_subset(&self.array, &subset)
            .map_err(|e| TilerError::tile_io(level, tx, ty, e.to_string()))
    }
}

/// Persisted raw tile pyramid, one Zarr array per level.
pub struct RawTileStore {
    root: PathBuf,
    config: PyramidConfig,
    attributes: Map<String, Value>,
}

impl RawTileStore {
    /// Create a store rooted at `root`. Nothing is touched until a write.
    pub fn new(root: impl Into<PathBuf>, config: PyramidConfig) -> Self {
        Self {
            root: root.into(),
            config,
            attributes: Map::new(),
        }
    }

    /// Attributes written onto every level (typically the variable's).
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PyramidConfig {
        &self.config
    }

    /// Directory of a level's array.
    pub fn level_path(&self, level: u32) -> PathBuf {
        self.root.join(format!("{}.zarr", level))
    }

    /// Persist a level, replacing anything previously stored there.
    pub fn write_level(&self, level: u32, data: &TileArray<f32>) -> TilerResult<()> {
        if data.level() != level {
            return Err(TilerError::configuration(format!(
                "write_level({}) given data for level {}",
                level,
                data.level()
            )));
        }
        let mut attrs = self.attributes.clone();
        attrs.insert("tile_level".to_string(), json!(level));
        attrs.insert("tilesize".to_string(), json!(data.tilesize()));
        write_tiles(&self.level_path(level), data, attrs, &self.config)?;
        info!(level, path = %self.level_path(level).display(), "Stored raw level");
        Ok(())
    }

    /// Read a whole level back.
    pub fn read_level(&self, level: u32) -> TilerResult<TileArray<f32>> {
        let array = self.open_level(level)?;
        read_tiles::<f32>(&array, level)
    }

    /// Read a single tile's `S * S` pixels, row-major.
    ///
    /// Failures are reported as per-tile errors.
    pub fn read_tile(&self, level: u32, tx: u32, ty: u32) -> TilerResult<Vec<f32>> {
        self.open_reader(level)?.read_tile(tx, ty)
    }

    /// Open a complete level for repeated tile reads.
    pub fn open_reader(&self, level: u32) -> TilerResult<LevelReader> {
        let array = self.open_level(level)?;
        let tilesize = array.shape()[2] as u32;
        Ok(LevelReader {
            level,
            tilesize,
            array,
        })
    }

    /// Whether a complete level is stored.
    pub fn has_level(&self, level: u32) -> bool {
        self.open_level(level).is_ok()
    }

    /// All complete levels, ascending.
    pub fn levels(&self) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut levels: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(".zarr"))
                    .and_then(|stem| stem.parse().ok())
            })
            .filter(|&level| self.has_level(level))
            .collect();
        levels.sort_unstable();
        levels
    }

    /// Finest complete level, if any.
    pub fn finest_level(&self) -> Option<u32> {
        self.levels().last().copied()
    }

    /// Shape and attributes of a stored level.
    pub fn level_info(&self, level: u32) -> TilerResult<LevelInfo> {
        let array = self.open_level(level)?;
        let shape = array.shape();
        Ok(LevelInfo {
            level,
            tilesize: shape[2] as u32,
            num_tiles: shape[0] as u32,
            attributes: array.attributes().clone(),
        })
    }

    fn open_level(&self, level: u32) -> TilerResult<Array<FilesystemStore>> {
        let path = self.level_path(level);
        let array = open_tiles(&path).map_err(|e| {
            TilerError::pyramid_consistency(level, format!("level not available: {}", e))
        })?;
        let complete = array
            .attributes()
            .get(COMPLETE_ATTR)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !complete {
            return Err(TilerError::pyramid_consistency(
                level,
                format!("{} is incomplete", path.display()),
            ));
        }
        Ok(array)
    }
}

/// Persist a tile index with its `tile_level`/`tilesize` attributes.
pub fn write_index(path: impl AsRef<Path>, index: &TileIndex, config: &PyramidConfig) -> TilerResult<()> {
    let tiles = &index.tiles;
    let mut attrs = Map::new();
    attrs.insert("tile_level".to_string(), json!(tiles.level()));
    attrs.insert("tilesize".to_string(), json!(tiles.tilesize()));
    attrs.insert("name".to_string(), json!(index.array_name()));
    attrs.insert(
        "element_type".to_string(),
        json!(index.element_kind.as_str()),
    );
    attrs.insert("start_index".to_string(), json!(0));
    attrs.insert(
        "long_name".to_string(),
        json!(format!(
            "0-based index of nearest neighbor grid {} to map tile",
            index.element_kind.as_str()
        )),
    );
    write_tiles(path.as_ref(), tiles, attrs, config)?;
    info!(
        level = tiles.level(),
        path = %path.as_ref().display(),
        "Stored tile index"
    );
    Ok(())
}

/// Read a tile index written by [`write_index`].
pub fn read_index(path: impl AsRef<Path>) -> TilerResult<TileIndex> {
    let path = path.as_ref();
    let array = open_tiles(path)?;
    let attrs = array.attributes();
    if !attrs
        .get(COMPLETE_ATTR)
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Err(TilerError::storage(format!(
            "tile index {} is incomplete",
            path.display()
        )));
    }
    let level = attrs
        .get("tile_level")
        .and_then(Value::as_u64)
        .ok_or_else(|| TilerError::storage("tile index has no tile_level attribute"))?
        as u32;
    let element_kind = attrs
        .get("element_type")
        .and_then(Value::as_str)
        .and_then(ElementKind::from_str)
        .unwrap_or_default();
    let tiles = read_tiles::<u32>(&array, level)?;
    Ok(TileIndex {
        tiles,
        element_kind,
    })
}

fn open_tiles(path: &Path) -> TilerResult<Array<FilesystemStore>> {
    if !path.join("zarr.json").is_file() {
        return Err(TilerError::storage(format!("{} does not exist", path.display())));
    }
    let store = FilesystemStore::new(path)
        .map_err(|e| TilerError::storage(format!("{}: {}", path.display(), e)))?;
    Array::open(Arc::new(store), "/").map_err(|e| TilerError::storage(e.to_string()))
}

fn read_tiles<T: TileElement>(
    array: &Array<FilesystemStore>,
    level: u32,
) -> TilerResult<TileArray<T>> {
    let shape = array.shape().to_vec();
    let n = num_tiles(level) as u64;
    if shape.len() != 4 || shape[0] != n || shape[1] != n || shape[2] != shape[3] {
        return Err(TilerError::pyramid_consistency(
            level,
            format!("stored shape {:?} does not match level {}", shape, level),
        ));
    }
    let tilesize = shape[2] as u32;
    let subset = ArraySubset::new_with_start_shape(vec![0; 4], shape)
        .map_err(|e| TilerError::storage(e.to_string()))?;
    let data = T::retrieve_subset(array, &subset)?;
    debug!(level, tilesize, dtype = T::DATA_TYPE_NAME, "Read tile array");
    TileArray::new(level, tilesize, data)
}

fn write_tiles<T: TileElement>(
    path: &Path,
    tiles: &TileArray<T>,
    mut attrs: Map<String, Value>,
    config: &PyramidConfig,
) -> TilerResult<()> {
    config.validate().map_err(TilerError::configuration)?;

    if path.exists() {
        warn!(path = %path.display(), "Replacing existing tile array");
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)?;
    let store = Arc::new(
        FilesystemStore::new(path)
            .map_err(|e| TilerError::storage(format!("{}: {}", path.display(), e)))?,
    );

    let n = tiles.num_tiles();
    let s = tiles.tilesize() as u64;
    let c = config.chunk_tiles(n);

    attrs.insert(COMPLETE_ATTR.to_string(), json!(false));
    attrs.insert(
        "compression".to_string(),
        json!(config.compression.as_str()),
    );

    let chunk_grid: zarrs::array::ChunkGrid = vec![c as u64, c as u64, s, s]
        .try_into()
        .map_err(|e| TilerError::configuration(format!("{:?}", e)))?;

    let mut binding = ArrayBuilder::new(
        vec![n as u64, n as u64, s, s],
        T::data_type(),
        chunk_grid,
        T::fill_value(),
    );
    let mut builder = binding.attributes(attrs.clone());

    if config.compression != ZarrCompression::None {
        let codec = create_compression_codec(config)?;
        builder = builder.bytes_to_bytes_codecs(vec![codec]);
    }

    let mut array = builder
        .build(store, "/")
        .map_err(|e| TilerError::storage(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| TilerError::storage(e.to_string()))?;

    // One job per chunk.
    let chunks_per_axis = n.div_ceil(c);
    let jobs: Vec<(u32, u32)> = (0..chunks_per_axis)
        .flat_map(|cx| (0..chunks_per_axis).map(move |cy| (cx, cy)))
        .collect();

    jobs.par_iter().try_for_each(|&(cx, cy)| {
        let x0 = cx * c;
        let y0 = cy * c;
        let x1 = (x0 + c).min(n);
        let y1 = (y0 + c).min(n);
        let mut buf = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize * tiles.tile_len());
        for tx in x0..x1 {
            for ty in y0..y1 {
                buf.extend_from_slice(tiles.tile(tx, ty));
            }
        }
        let subset = ArraySubset::new_with_start_shape(
            vec![x0 as u64, y0 as u64, 0, 0],
            vec![(x1 - x0) as u64, (y1 - y0) as u64, s, s],
        )
        .map_err(|e| TilerError::storage(e.to_string()))?;
        T::store_subset(&array, &subset, &buf)
    })?;

    attrs.insert(COMPLETE_ATTR.to_string(), json!(true));
    *array.attributes_mut() = attrs;
    array
        .store_metadata()
        .map_err(|e| TilerError::storage(e.to_string()))?;

    debug!(
        path = %path.display(),
        chunks = jobs.len(),
        chunk_tiles = c,
        dtype = T::DATA_TYPE_NAME,
        "Wrote tile array"
    );
    Ok(())
}

/// Create the compression codec based on configuration.
fn create_compression_codec(
    config: &PyramidConfig,
) -> TilerResult<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
    let level = BloscCompressionLevel::try_from(config.compression_level)
        .map_err(|_| TilerError::configuration("Invalid compression level"))?;

    let shuffle = if config.shuffle {
        BloscShuffleMode::Shuffle
    } else {
        BloscShuffleMode::NoShuffle
    };

    // typesize is required when shuffle is enabled; both element types are 4 bytes
    let typesize = if config.shuffle { Some(4) } else { None };

    let compressor = match config.compression {
        ZarrCompression::None => {
            return Err(TilerError::configuration("No compression configured"));
        }
        ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
        ZarrCompression::BloscZstd => BloscCompressor::Zstd,
    };

    let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
        .map_err(|e| TilerError::configuration(e.to_string()))?;

    Ok(Arc::new(codec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uncompressed() -> PyramidConfig {
        PyramidConfig {
            compression: ZarrCompression::None,
            tiles_per_chunk: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_level_is_consistency_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = RawTileStore::new(dir.path(), uncompressed());
        assert!(!store.has_level(3));
        assert!(matches!(
            store.read_level(3),
            Err(TilerError::PyramidConsistency { level: 3, .. })
        ));
        assert!(store.levels().is_empty());
    }

    #[test]
    fn test_write_level_checks_level() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = RawTileStore::new(dir.path(), uncompressed());
        let tiles = TileArray::filled(1, 2, 0.0f32).unwrap();
        assert!(store.write_level(2, &tiles).is_err());
    }

    #[test]
    fn test_read_tile() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = RawTileStore::new(dir.path(), uncompressed());
        let data: Vec<f32> = (0..16 * 4).map(|i| i as f32).collect();
        let tiles = TileArray::new(2, 2, data).unwrap();
        store.write_level(2, &tiles).unwrap();

        assert_eq!(store.read_tile(2, 3, 1).unwrap(), tiles.tile(3, 1).to_vec());
        assert!(matches!(
            store.read_tile(2, 4, 0),
            Err(TilerError::TileIo { .. })
        ));
    }

    #[test]
    fn test_incomplete_level_is_hidden() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = RawTileStore::new(dir.path(), uncompressed());
        let tiles = TileArray::filled(1, 2, 5.0f32).unwrap();
        store.write_level(1, &tiles).unwrap();
        assert!(store.has_level(1));

        // Simulate an interrupted write by flipping the marker back.
        let meta_path = store.level_path(1).join("zarr.json");
        let meta = std::fs::read_to_string(&meta_path).unwrap();
        let mut meta: Value = serde_json::from_str(&meta).unwrap();
        meta["attributes"][COMPLETE_ATTR] = json!(false);
        std::fs::write(&meta_path, serde_json::to_string(&meta).unwrap()).unwrap();

        assert!(!store.has_level(1));
        assert!(store.read_level(1).is_err());
    }
}
