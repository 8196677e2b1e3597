//! Mesh geometry and the on-disk mesh source.
//!
//! A mesh source is a directory holding one 1-D Zarr V3 array per field:
//! `lat`/`lon` in degrees (or `x`/`y`/`z` unit-sphere coordinates) plus one
//! array per scalar variable, all of length N.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use spatial_index::NearestIndex;
use tiler_common::{latlon_to_xyz_many, TilerError, TilerResult, Xyz};

/// What the mesh elements are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Cell centroids / circumcentres
    #[default]
    Cell,
    /// Mesh vertices
    Node,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cell => "cell",
            Self::Node => "node",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cell" => Some(Self::Cell),
            "node" => Some(Self::Node),
            _ => None,
        }
    }
}

/// Unit-sphere positions of every mesh element.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    kind: ElementKind,
    positions: Vec<Xyz>,
}

impl MeshGeometry {
    /// Build from element centroids in degrees.
    pub fn from_latlon(kind: ElementKind, lats: &[f64], lons: &[f64]) -> TilerResult<Self> {
        Ok(Self {
            kind,
            positions: latlon_to_xyz_many(lats, lons)?,
        })
    }

    /// Build from precomputed unit-sphere coordinates.
    pub fn from_cartesian(kind: ElementKind, positions: Vec<Xyz>) -> Self {
        Self { kind, positions }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn positions(&self) -> &[Xyz] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Build a nearest-neighbour index over the element positions.
    pub fn build_index<I: NearestIndex>(&self) -> TilerResult<I> {
        let start = std::time::Instant::now();
        let index = I::build(&self.positions)?;
        info!(
            elements = self.len(),
            kind = self.kind.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Built spatial index"
        );
        Ok(index)
    }
}

/// A scalar field aligned with the mesh elements.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub values: Vec<f32>,
    /// Attributes copied onto every raw pyramid level.
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Reader for a mesh directory of 1-D Zarr arrays.
pub struct MeshSource {
    root: PathBuf,
    store: Arc<FilesystemStore>,
}

impl MeshSource {
    /// Open a mesh directory.
    pub fn open(root: impl AsRef<Path>) -> TilerResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TilerError::configuration(format!(
                "mesh source {} is not a directory",
                root.display()
            )));
        }
        let store = FilesystemStore::new(&root)
            .map_err(|e| TilerError::storage(format!("{}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            store: Arc::new(store),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether an array named `name` exists.
    pub fn has_array(&self, name: &str) -> bool {
        self.root.join(name).join("zarr.json").is_file()
    }

    /// Element positions from `lat`/`lon`, falling back to `x`/`y`/`z`.
    pub fn geometry(&self, kind: ElementKind) -> TilerResult<MeshGeometry> {
        if self.has_array("lat") && self.has_array("lon") {
            let lats = self.read_f64("lat")?;
            let lons = self.read_f64("lon")?;
            debug!(elements = lats.len(), "Read lat/lon mesh geometry");
            return MeshGeometry::from_latlon(kind, &lats, &lons);
        }

        if self.has_array("x") && self.has_array("y") && self.has_array("z") {
            let x = self.read_f64("x")?;
            let y = self.read_f64("y")?;
            let z = self.read_f64("z")?;
            if x.len() != y.len() || x.len() != z.len() {
                return Err(TilerError::configuration(format!(
                    "cartesian arrays differ in length: {}, {}, {}",
                    x.len(),
                    y.len(),
                    z.len()
                )));
            }
            let positions = x
                .iter()
                .zip(&y)
                .zip(&z)
                .map(|((&x, &y), &z)| [x, y, z])
                .collect();
            debug!(elements = x.len(), "Read cartesian mesh geometry");
            return Ok(MeshGeometry::from_cartesian(kind, positions));
        }

        Err(TilerError::configuration(format!(
            "mesh source {} has neither lat/lon nor x/y/z arrays",
            self.root.display()
        )))
    }

    /// Read a scalar variable with its attributes.
    pub fn variable(&self, name: &str) -> TilerResult<Variable> {
        let array = self.open_array(name)?;
        let values: Vec<f32> = read_all_f64(&array, name)?
            .into_iter()
            .map(|v| v as f32)
            .collect();
        Ok(Variable {
            name: name.to_string(),
            values,
            attributes: array.attributes().clone(),
        })
    }

    /// Read a 1-D numeric array as f64.
    pub fn read_f64(&self, name: &str) -> TilerResult<Vec<f64>> {
        let array = self.open_array(name)?;
        read_all_f64(&array, name)
    }

    fn open_array(&self, name: &str) -> TilerResult<Array<FilesystemStore>> {
        if !self.has_array(name) {
            return Err(TilerError::configuration(format!(
                "array '{}' not found in {}",
                name,
                self.root.display()
            )));
        }
        Array::open(self.store.clone(), &format!("/{}", name))
            .map_err(|e| TilerError::storage(format!("open '{}': {}", name, e)))
    }
}

fn read_all_f64(array: &Array<FilesystemStore>, name: &str) -> TilerResult<Vec<f64>> {
    let shape = array.shape().to_vec();
    if shape.len() != 1 {
        return Err(TilerError::configuration(format!(
            "array '{}' must be 1-D, has shape {:?}",
            name, shape
        )));
    }
    let subset = ArraySubset::new_with_start_shape(vec![0], shape)
        .map_err(|e| TilerError::storage(e.to_string()))?;

    match array.data_type() {
        DataType::Float64 => array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(|e| TilerError::storage(format!("read '{}': {}", name, e))),
        DataType::Float32 => array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map(|v| v.into_iter().map(f64::from).collect())
            .map_err(|e| TilerError::storage(format!("read '{}': {}", name, e))),
        other => Err(TilerError::configuration(format!(
            "array '{}' has unsupported data type {:?}",
            name, other
        ))),
    }
}

/// Write a 1-D Float64 array into a mesh directory.
///
/// Used to assemble mesh sources from loaders outside this crate.
pub fn write_mesh_array(
    root: impl AsRef<Path>,
    name: &str,
    data: &[f64],
    attributes: serde_json::Map<String, serde_json::Value>,
) -> TilerResult<()> {
    let root = root.as_ref();
    std::fs::create_dir_all(root)?;
    let store = Arc::new(
        FilesystemStore::new(root).map_err(|e| TilerError::storage(e.to_string()))?,
    );

    let len = data.len() as u64;
    let chunk_grid: zarrs::array::ChunkGrid = vec![len.max(1)]
        .try_into()
        .map_err(|e| TilerError::configuration(format!("{:?}", e)))?;

    let mut binding = ArrayBuilder::new(
        vec![len],
        DataType::Float64,
        chunk_grid,
        FillValue::from(f64::NAN),
    );
    let array = binding
        .attributes(attributes)
        .build(store, &format!("/{}", name))
        .map_err(|e| TilerError::storage(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| TilerError::storage(e.to_string()))?;

    if !data.is_empty() {
        let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])
            .map_err(|e| TilerError::storage(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, data)
            .map_err(|e| TilerError::storage(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_index::RTreeIndex;

    #[test]
    fn test_element_kind_names() {
        assert_eq!(ElementKind::Cell.as_str(), "cell");
        assert_eq!(ElementKind::from_str("NODE"), Some(ElementKind::Node));
        assert_eq!(ElementKind::from_str("edge"), None);
    }

    #[test]
    fn test_geometry_from_latlon() {
        let mesh = MeshGeometry::from_latlon(ElementKind::Cell, &[0.0, 90.0], &[0.0, 0.0]).unwrap();
        assert_eq!(mesh.len(), 2);
        assert!((mesh.positions()[1][2] - 1.0).abs() < 1e-12);
        let index: RTreeIndex = mesh.build_index().unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_geometry_fails_to_index() {
        let mesh = MeshGeometry::from_cartesian(ElementKind::Node, vec![]);
        assert!(mesh.build_index::<RTreeIndex>().is_err());
    }

    #[test]
    fn test_mesh_source_roundtrip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path().join("mesh.zarr");
        let mut attrs = serde_json::Map::new();
        attrs.insert("units".to_string(), serde_json::json!("K"));

        write_mesh_array(&root, "lat", &[0.0, 10.0], Default::default()).unwrap();
        write_mesh_array(&root, "lon", &[20.0, 30.0], Default::default()).unwrap();
        write_mesh_array(&root, "tas", &[280.5, 290.25], attrs).unwrap();

        let source = MeshSource::open(&root).unwrap();
        let mesh = source.geometry(ElementKind::Cell).unwrap();
        assert_eq!(mesh.len(), 2);

        let tas = source.variable("tas").unwrap();
        assert_eq!(tas.values, vec![280.5, 290.25]);
        assert_eq!(tas.attributes.get("units"), Some(&serde_json::json!("K")));

        assert!(source.variable("missing").is_err());
    }

    #[test]
    fn test_mesh_source_without_coordinates() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        write_mesh_array(dir.path(), "tas", &[1.0], Default::default()).unwrap();
        let source = MeshSource::open(dir.path()).unwrap();
        assert!(matches!(
            source.geometry(ElementKind::Cell),
            Err(TilerError::Configuration(_))
        ));
    }
}
