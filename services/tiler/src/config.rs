//! Tiler configuration.
//!
//! Values are resolved in order: built-in defaults, the YAML file (with
//! `${VAR}` / `${VAR:-default}` substitution), `TILER_*` environment
//! variables, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use renderer::{Color, ColorMap, Normalization, StyleConfig};
use tile_pyramid::{ElementKind, PyramidConfig};
use tiler_common::{validate_tiling, EquirectangularProjector, PixelProjector, WebMercatorProjector};

/// Map projection of the output tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    #[default]
    WebMercator,
    Equirectangular,
}

impl Projection {
    pub fn projector(&self) -> Box<dyn PixelProjector> {
        match self {
            Projection::WebMercator => Box::new(WebMercatorProjector),
            Projection::Equirectangular => Box::new(EquirectangularProjector),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "web_mercator" | "webmercator" | "mercator" => Some(Projection::WebMercator),
            "equirectangular" | "platecarree" | "plate_carree" => Some(Projection::Equirectangular),
            _ => None,
        }
    }
}

/// Image tile styling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Built-in colour map, used when no style file is given.
    pub colormap: String,

    /// JSON style file with colour stops.
    pub style_file: Option<PathBuf>,

    /// Style to pick from `style_file`; optional when it holds only one.
    pub style: Option<String>,

    /// Value range; overrides whatever the style implies.
    pub normalization: Option<Normalization>,

    /// Colour for missing values, `#RRGGBB` or `#RRGGBBAA`.
    pub bad_color: Option<String>,

    /// Extra attempts for a failing tile.
    pub retries: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            colormap: "viridis".to_string(),
            style_file: None,
            style: None,
            normalization: None,
            bad_color: None,
            retries: renderer::DEFAULT_RETRIES,
        }
    }
}

impl RenderConfig {
    /// Colour map and normalization to render with.
    pub fn resolve(&self) -> Result<(ColorMap, Normalization)> {
        let (mut cmap, implied) = match &self.style_file {
            Some(path) => {
                let styles = StyleConfig::from_file(path)?;
                let style = match &self.style {
                    Some(name) => styles
                        .get_style(name)
                        .with_context(|| format!("style '{}' not in {}", name, path.display()))?,
                    None if styles.styles.len() == 1 => styles
                        .styles
                        .values()
                        .next()
                        .context("style file is empty")?,
                    None => bail!(
                        "{} defines {} styles; set render.style",
                        path.display(),
                        styles.styles.len()
                    ),
                };
                let (cmap, norm) = ColorMap::from_style(style)?;
                (cmap, Some(norm))
            }
            None => {
                let cmap = ColorMap::builtin(&self.colormap)
                    .with_context(|| format!("unknown colour map '{}'", self.colormap))?;
                (cmap, None)
            }
        };

        if let Some(hex) = &self.bad_color {
            let bad = Color::from_hex(hex).with_context(|| format!("invalid bad_color '{}'", hex))?;
            cmap = cmap.with_bad(bad);
        }

        let norm = self
            .normalization
            .or(implied)
            .context("render.normalization is required with a built-in colour map")?;
        norm.validate()?;
        Ok((cmap, norm))
    }
}

/// Top-level tiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    /// Mesh directory with `lat`/`lon` (or `x`/`y`/`z`) and variable arrays.
    pub mesh_path: PathBuf,

    /// Whether mesh positions are cell centres or nodes.
    pub element_kind: ElementKind,

    pub projection: Projection,

    /// Finest zoom level.
    pub level: u32,

    /// Tile edge length in pixels.
    pub tilesize: u32,

    /// Deepest level to render as images; defaults to `level`.
    pub max_level: Option<u32>,

    /// Variable to tile.
    pub variable: Option<String>,

    pub index_path: PathBuf,
    pub raw_dir: PathBuf,
    pub image_dir: PathBuf,

    pub pyramid: PyramidConfig,
    pub render: RenderConfig,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            mesh_path: PathBuf::from("mesh.zarr"),
            element_kind: ElementKind::Cell,
            projection: Projection::WebMercator,
            level: 4,
            tilesize: 256,
            max_level: None,
            variable: None,
            index_path: PathBuf::from("tiles/index.zarr"),
            raw_dir: PathBuf::from("tiles/raw"),
            image_dir: PathBuf::from("tiles/images"),
            pyramid: PyramidConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Finest zoom level
    #[arg(long)]
    pub level: Option<u32>,

    /// Tile edge length in pixels
    #[arg(long)]
    pub tilesize: Option<u32>,

    /// Deepest level to render as images
    #[arg(long)]
    pub max_level: Option<u32>,

    /// Variable to tile
    #[arg(long)]
    pub variable: Option<String>,

    /// Mesh directory
    #[arg(long)]
    pub mesh: Option<PathBuf>,
}

impl TilerConfig {
    /// Load a YAML file with environment substitution.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tiler config from {:?}", path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load tiler config from {:?}", path))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = shellexpand::env(content).context("Failed to expand environment variables")?;
        serde_yaml::from_str(&expanded).context("Failed to parse tiler config YAML")
    }

    /// File (if any), then environment, then flags. Validated.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `TILER_*` environment variables that are set.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
        self.pyramid.apply_env();
    }

    /// Like [`apply_env`](Self::apply_env) with an explicit lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TILER_LEVEL").and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        if let Some(tilesize) = lookup("TILER_TILESIZE").and_then(|v| v.parse().ok()) {
            self.tilesize = tilesize;
        }
        if let Some(max_level) = lookup("TILER_MAX_LEVEL").and_then(|v| v.parse().ok()) {
            self.max_level = Some(max_level);
        }
        if let Some(variable) = lookup("TILER_VARIABLE").filter(|v| !v.is_empty()) {
            self.variable = Some(variable);
        }
        if let Some(projection) = lookup("TILER_PROJECTION").and_then(|v| Projection::from_str(&v)) {
            self.projection = projection;
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.level {
            self.level = level;
        }
        if let Some(tilesize) = overrides.tilesize {
            self.tilesize = tilesize;
        }
        if let Some(max_level) = overrides.max_level {
            self.max_level = Some(max_level);
        }
        if let Some(ref variable) = overrides.variable {
            self.variable = Some(variable.clone());
        }
        if let Some(ref mesh) = overrides.mesh {
            self.mesh_path = mesh.clone();
        }
    }

    /// Deepest level that gets image tiles.
    pub fn render_max_level(&self) -> u32 {
        self.max_level.unwrap_or(self.level)
    }

    pub fn validate(&self) -> Result<()> {
        validate_tiling(self.level, self.tilesize)?;
        if self.render_max_level() > self.level {
            bail!(
                "max_level {} is finer than the tiled level {}",
                self.render_max_level(),
                self.level
            );
        }
        self.pyramid
            .validate()
            .map_err(|e| anyhow::anyhow!("pyramid: {}", e))?;
        Ok(())
    }
}
