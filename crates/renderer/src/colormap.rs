//! Colour ramps for normalized values.

use tiler_common::{TilerError, TilerResult};

use crate::style::{hex_to_rgba, Normalization, StyleDefinition};

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        hex_to_rgba(hex).map(|(r, g, b, a)| Self::new(r, g, b, a))
    }
}

/// Linear color interpolation
fn interpolate_color(color1: Color, color2: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let t_inv = 1.0 - t;
    let mix = |a: u8, b: u8| ((a as f32 * t_inv) + (b as f32 * t)).round() as u8;

    Color::new(
        mix(color1.r, color2.r),
        mix(color1.g, color2.g),
        mix(color1.b, color2.b),
        mix(color1.a, color2.a),
    )
}

const VIRIDIS: [(f32, &str); 9] = [
    (0.0, "#440154"),
    (0.125, "#482878"),
    (0.25, "#3e4989"),
    (0.375, "#31688e"),
    (0.5, "#26828e"),
    (0.625, "#1f9e89"),
    (0.75, "#35b779"),
    (0.875, "#6ece58"),
    (1.0, "#fde725"),
];

const GREYS: [(f32, &str); 2] = [(0.0, "#ffffff"), (1.0, "#000000")];

/// Piecewise-linear gradient over `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    stops: Vec<(f32, Color)>,
    bad: Color,
}

impl ColorMap {
    /// Build from `(position, colour)` stops; positions must lie in `[0, 1]`.
    pub fn new(mut stops: Vec<(f32, Color)>) -> TilerResult<Self> {
        if stops.is_empty() {
            return Err(TilerError::configuration("colour map needs at least one stop"));
        }
        if let Some((pos, _)) = stops
            .iter()
            .find(|(pos, _)| !(0.0..=1.0).contains(pos))
        {
            return Err(TilerError::configuration(format!(
                "colour stop position {} outside [0, 1]",
                pos
            )));
        }
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            stops,
            bad: Color::transparent(),
        })
    }

    /// Built-in ramp by name: `viridis` or `greys`.
    pub fn builtin(name: &str) -> Option<Self> {
        let table: &[(f32, &str)] = match name.to_lowercase().as_str() {
            "viridis" => &VIRIDIS,
            "greys" | "grays" => &GREYS,
            _ => return None,
        };
        let stops = table
            .iter()
            .filter_map(|&(pos, hex)| Color::from_hex(hex).map(|c| (pos, c)))
            .collect();
        Self::new(stops).ok()
    }

    pub fn viridis() -> Self {
        Self::builtin("viridis").unwrap_or_else(Self::fallback)
    }

    pub fn greys() -> Self {
        Self::builtin("greys").unwrap_or_else(Self::fallback)
    }

    fn fallback() -> Self {
        Self {
            stops: vec![(0.0, Color::rgb(0, 0, 0)), (1.0, Color::rgb(255, 255, 255))],
            bad: Color::transparent(),
        }
    }

    /// Colour map from a style file, stop values rescaled onto `[0, 1]`.
    ///
    /// Returns the map with the normalization the style implies.
    pub fn from_style(style: &StyleDefinition) -> TilerResult<(Self, Normalization)> {
        let norm = style.normalization()?;
        let (lo, hi) = style.value_range().ok_or_else(|| {
            TilerError::configuration(format!("style '{}' has no stops", style.name))
        })?;
        let span = hi - lo;

        let mut stops = Vec::with_capacity(style.stops.len());
        for stop in &style.stops {
            let color = Color::from_hex(&stop.color).ok_or_else(|| {
                TilerError::configuration(format!(
                    "style '{}': bad colour '{}'",
                    style.name, stop.color
                ))
            })?;
            let pos = if span > 0.0 { (stop.value - lo) / span } else { 0.0 };
            stops.push((pos, color));
        }

        let mut map = Self::new(stops)?;
        if let Some(ref hex) = style.bad_color {
            let bad = Color::from_hex(hex).ok_or_else(|| {
                TilerError::configuration(format!("style '{}': bad colour '{}'", style.name, hex))
            })?;
            map = map.with_bad(bad);
        }
        Ok((map, norm))
    }

    /// Colour used for missing values.
    pub fn with_bad(mut self, bad: Color) -> Self {
        self.bad = bad;
        self
    }

    pub fn bad(&self) -> Color {
        self.bad
    }

    pub fn stops(&self) -> &[(f32, Color)] {
        &self.stops
    }

    /// Colour at normalized position `t`; `None` gives the bad colour.
    pub fn color_at(&self, t: Option<f32>) -> Color {
        let Some(t) = t else {
            return self.bad;
        };
        let first = self.stops[0];
        if t <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (p0, c0) = pair[0];
            let (p1, c1) = pair[1];
            if t <= p1 {
                let span = p1 - p0;
                let local = if span > 0.0 { (t - p0) / span } else { 1.0 };
                return interpolate_color(c0, c1, local);
            }
        }
        self.stops[self.stops.len() - 1].1
    }
}

/// Render values as RGBA bytes, one pixel per value.
pub fn colorize(data: &[f32], norm: &Normalization, cmap: &ColorMap) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(data.len() * 4);
    for &value in data {
        let color = cmap.color_at(norm.apply(value));
        pixels.extend_from_slice(&[color.r, color.g, color.b, color.a]);
    }
    pixels
}
