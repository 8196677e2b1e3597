//! Style files and value normalization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use tiler_common::{TilerError, TilerResult};

/// Style configuration loaded from JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleConfig {
    pub version: String,
    pub styles: HashMap<String, StyleDefinition>,
}

/// A single colour ramp definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleDefinition {
    pub name: String,
    pub description: Option<String>,
    pub units: Option<String>,
    /// Value range mapping; defaults to linear over the first and last stop.
    pub normalization: Option<Normalization>,
    pub stops: Vec<ColorStop>,
    /// Colour for missing values, `#RRGGBB` or `#RRGGBBAA`.
    pub bad_color: Option<String>,
}

/// Color stop for gradient
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorStop {
    pub value: f32,
    pub color: String,
    pub label: Option<String>,
}

impl StyleConfig {
    /// Load style configuration from JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Load style configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> TilerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| {
            TilerError::configuration(format!("style file {}: {}", path.display(), e))
        })
    }

    /// Get a specific style definition
    pub fn get_style(&self, name: &str) -> Option<&StyleDefinition> {
        self.styles.get(name)
    }
}

impl StyleDefinition {
    /// Explicit normalization, or linear over the stop values.
    pub fn normalization(&self) -> TilerResult<Normalization> {
        if let Some(norm) = self.normalization {
            return Ok(norm);
        }
        let (first, last) = self
            .value_range()
            .ok_or_else(|| TilerError::configuration(format!("style '{}' has no stops", self.name)))?;
        Ok(Normalization::Linear {
            vmin: first,
            vmax: last,
        })
    }

    /// Smallest and largest stop value.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.stops.iter().map(|s| s.value).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Maps raw values onto `[0, 1]` before colouring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Normalization {
    Linear { vmin: f32, vmax: f32 },
    Log { vmin: f32, vmax: f32 },
}

impl Normalization {
    pub fn validate(&self) -> TilerResult<()> {
        let (vmin, vmax) = match *self {
            Normalization::Linear { vmin, vmax } => (vmin, vmax),
            Normalization::Log { vmin, vmax } => {
                if vmin <= 0.0 {
                    return Err(TilerError::configuration(format!(
                        "log normalization needs vmin > 0, got {}",
                        vmin
                    )));
                }
                (vmin, vmax)
            }
        };
        if !vmin.is_finite() || !vmax.is_finite() || vmin > vmax {
            return Err(TilerError::configuration(format!(
                "invalid normalization range [{}, {}]",
                vmin, vmax
            )));
        }
        Ok(())
    }

    /// Position of `value` in `[0, 1]`, clipped.
    ///
    /// `None` for values that have no position: NaN, and non-positive values
    /// under log scaling.
    pub fn apply(&self, value: f32) -> Option<f32> {
        if value.is_nan() {
            return None;
        }
        let t = match *self {
            Normalization::Linear { vmin, vmax } => {
                let range = vmax - vmin;
                if range <= 0.0 {
                    0.0
                } else {
                    (value - vmin) / range
                }
            }
            Normalization::Log { vmin, vmax } => {
                if value <= 0.0 {
                    return None;
                }
                let lo = vmin.ln();
                let range = vmax.ln() - lo;
                if range <= 0.0 {
                    0.0
                } else {
                    (value.ln() - lo) / range
                }
            }
        };
        Some(t.clamp(0.0, 1.0))
    }
}

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}

/// Parse `#RRGGBB` (opaque) or `#RRGGBBAA`.
pub fn hex_to_rgba(hex: &str) -> Option<(u8, u8, u8, u8)> {
    let digits = hex.trim_start_matches('#');
    match digits.len() {
        6 => hex_to_rgb(digits).map(|(r, g, b)| (r, g, b, 255)),
        8 => {
            let (r, g, b) = hex_to_rgb(&digits[0..6])?;
            let a = u8::from_str_radix(&digits[6..8], 16).ok()?;
            Some((r, g, b, a))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#FF0000"), Some((255, 0, 0)));
        assert_eq!(hex_to_rgb("#00FF00"), Some((0, 255, 0)));
        assert_eq!(hex_to_rgb("#0000FF"), Some((0, 0, 255)));
        assert_eq!(hex_to_rgb("FF0000"), Some((255, 0, 0)));
        assert_eq!(hex_to_rgb("#GGGGGG"), None);
    }

    #[test]
    fn test_hex_to_rgba() {
        assert_eq!(hex_to_rgba("#102030"), Some((16, 32, 48, 255)));
        assert_eq!(hex_to_rgba("#10203080"), Some((16, 32, 48, 128)));
        assert_eq!(hex_to_rgba("#1020"), None);
    }

    #[test]
    fn test_linear_normalization() {
        let norm = Normalization::Linear {
            vmin: 0.0,
            vmax: 10.0,
        };
        assert_eq!(norm.apply(5.0), Some(0.5));
        assert_eq!(norm.apply(-3.0), Some(0.0));
        assert_eq!(norm.apply(30.0), Some(1.0));
        assert_eq!(norm.apply(f32::NAN), None);
    }

    #[test]
    fn test_log_normalization() {
        let norm = Normalization::Log {
            vmin: 1.0,
            vmax: 100.0,
        };
        let t = norm.apply(10.0).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        assert_eq!(norm.apply(0.0), None);
        assert!(norm.validate().is_ok());
        assert!(Normalization::Log {
            vmin: 0.0,
            vmax: 1.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_degenerate_range() {
        let norm = Normalization::Linear {
            vmin: 2.0,
            vmax: 2.0,
        };
        assert!(norm.validate().is_ok());
        assert_eq!(norm.apply(2.0), Some(0.0));
        assert!(Normalization::Linear {
            vmin: 3.0,
            vmax: 2.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_normalization_serde() {
        let norm: Normalization =
            serde_json::from_str(r#"{"type": "log", "vmin": 0.1, "vmax": 10.0}"#).unwrap();
        assert_eq!(
            norm,
            Normalization::Log {
                vmin: 0.1,
                vmax: 10.0
            }
        );
    }
}
