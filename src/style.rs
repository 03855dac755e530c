//! Style configuration: the one value that parameterizes every render.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use crate::foundation::core::{Canvas, FigureSize, Rgba8};
use crate::foundation::error::{MapError, MapResult};

/// Name of the preset used when none is selected.
pub const DEFAULT_STYLE: &str = "black";

/// Visual options passed through to the rendering primitive.
///
/// `line_width`, `title_size` and `title_pad` are in points and `pad_inches` in inches; all of
/// them scale with `dpi`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleConfig {
    pub fill_color: Rgba8,
    pub edge_color: Rgba8,
    pub background_color: Rgba8,
    pub line_width: f64,
    pub dpi: u32,
    pub figure_size: FigureSize,
    #[serde(default = "default_pad_inches")]
    pub pad_inches: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default = "default_title_color")]
    pub title_color: Rgba8,
    #[serde(default = "default_title_size")]
    pub title_size: f64,
    /// Gap between the title and the drawing.
    #[serde(default = "default_title_pad")]
    pub title_pad: f64,
}

fn default_pad_inches() -> f64 {
    0.1
}

fn default_alpha() -> f32 {
    1.0
}

fn default_title_color() -> Rgba8 {
    Rgba8::BLACK
}

fn default_title_size() -> f64 {
    16.0
}

fn default_title_pad() -> f64 {
    15.0
}

impl StyleConfig {
    fn scheme(fill: Rgba8, edge: Rgba8) -> Self {
        Self {
            fill_color: fill,
            edge_color: edge,
            background_color: Rgba8::WHITE,
            line_width: 2.0,
            dpi: 300,
            figure_size: FigureSize(10.0, 8.0),
            pad_inches: default_pad_inches(),
            alpha: default_alpha(),
            title_color: default_title_color(),
            title_size: default_title_size(),
            title_pad: default_title_pad(),
        }
    }

    /// Check ranges and return the output canvas.
    pub fn validate(&self) -> MapResult<Canvas> {
        if !(self.line_width.is_finite() && self.line_width >= 0.0) {
            return Err(MapError::validation(format!(
                "line width must be >= 0, got {}",
                self.line_width
            )));
        }
        if !(self.pad_inches.is_finite() && self.pad_inches >= 0.0) {
            return Err(MapError::validation(format!(
                "pad must be >= 0, got {}",
                self.pad_inches
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(MapError::validation(format!(
                "alpha must be within 0..=1, got {}",
                self.alpha
            )));
        }
        if !(self.title_size.is_finite() && self.title_size > 0.0) {
            return Err(MapError::validation(format!(
                "title size must be > 0, got {}",
                self.title_size
            )));
        }
        if !(self.title_pad.is_finite() && self.title_pad >= 0.0) {
            return Err(MapError::validation(format!(
                "title pad must be >= 0, got {}",
                self.title_pad
            )));
        }
        let canvas = self.figure_size.canvas(self.dpi)?;
        let pad = self.pad_px();
        if 2.0 * pad >= f64::from(canvas.width.min(canvas.height)) {
            return Err(MapError::validation("pad leaves no room to draw"));
        }
        Ok(canvas)
    }

    /// Stroke width in pixels (points are 1/72 inch).
    pub fn line_width_px(&self) -> f64 {
        self.line_width * f64::from(self.dpi) / 72.0
    }

    pub fn pad_px(&self) -> f64 {
        self.pad_inches * f64::from(self.dpi)
    }

    pub fn title_size_px(&self) -> f64 {
        self.title_size * f64::from(self.dpi) / 72.0
    }

    pub fn title_pad_px(&self) -> f64 {
        self.title_pad * f64::from(self.dpi) / 72.0
    }

    pub fn fill_paint(&self) -> Rgba8 {
        self.fill_color.with_opacity(self.alpha)
    }

    pub fn edge_paint(&self) -> Rgba8 {
        self.edge_color.with_opacity(self.alpha)
    }

    /// Variant for the overview image: thinner borders, slight transparency, larger figure
    /// and title.
    pub fn overview(&self) -> Self {
        Self {
            line_width: self.line_width * 0.15,
            alpha: self.alpha.min(0.9),
            figure_size: self.figure_size.scaled(2.4),
            pad_inches: self.pad_inches * 4.0,
            title_size: self.title_size * 1.5,
            title_pad: self.title_pad * 2.5,
            ..self.clone()
        }
    }

    /// Same style at another resolution.
    pub fn with_dpi(&self, dpi: u32) -> Self {
        Self {
            dpi,
            ..self.clone()
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self::scheme(Rgba8::BLACK, Rgba8::WHITE)
    }
}

/// Named style presets.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleBook {
    styles: BTreeMap<String, StyleConfig>,
}

impl StyleBook {
    /// The built-in presets.
    pub fn builtin() -> Self {
        let hex = |s: &str| Rgba8::parse(s).unwrap_or(Rgba8::BLACK);
        let mut styles = BTreeMap::new();
        styles.insert("black".into(), StyleConfig::default());
        styles.insert(
            "charcoal".into(),
            StyleConfig::scheme(hex("#2F2F2F"), Rgba8::WHITE),
        );
        styles.insert(
            "navy".into(),
            StyleConfig::scheme(hex("#1a1a2e"), hex("#16213e")),
        );
        styles.insert(
            "dark_green".into(),
            StyleConfig::scheme(hex("#1b4332"), hex("#2d6a4f")),
        );
        styles.insert(
            "dark_purple".into(),
            StyleConfig::scheme(hex("#301934"), hex("#512b58")),
        );
        styles.insert(
            "classic".into(),
            StyleConfig {
                line_width: 1.0,
                figure_size: FigureSize(6.0, 6.0),
                pad_inches: 0.0,
                ..StyleConfig::scheme(hex("skyblue"), Rgba8::BLACK)
            },
        );
        styles.insert(
            "coral".into(),
            StyleConfig {
                background_color: hex("lightsteelblue"),
                line_width: 3.0,
                pad_inches: 0.2,
                ..StyleConfig::scheme(hex("lightcoral"), hex("darkred"))
            },
        );
        Self { styles }
    }

    /// Parse a JSON object of `{ "<name>": StyleConfig }`.
    pub fn from_json(json: &str) -> MapResult<Self> {
        let styles: BTreeMap<String, StyleConfig> = serde_json::from_str(json)
            .map_err(|e| MapError::validation(format!("parse style file: {e}")))?;
        Ok(Self { styles })
    }

    pub fn from_path(path: &Path) -> MapResult<Self> {
        let f = File::open(path).map_err(|e| {
            MapError::validation(format!("open style file '{}': {e}", path.display()))
        })?;
        let styles: BTreeMap<String, StyleConfig> = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| {
                MapError::validation(format!("parse style file '{}': {e}", path.display()))
            })?;
        Ok(Self { styles })
    }

    /// Add `other`'s presets, replacing same-named ones.
    pub fn merge(mut self, other: StyleBook) -> Self {
        self.styles.extend(other.styles);
        self
    }

    /// Look up and validate a preset.
    pub fn get(&self, name: &str) -> MapResult<&StyleConfig> {
        let style = self.styles.get(name).ok_or_else(|| {
            MapError::validation(format!(
                "unknown style '{name}'; available: {}",
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        style.validate()?;
        Ok(style)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StyleConfig)> {
        self.styles.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for StyleBook {
    fn default() -> Self {
        Self::builtin()
    }
}
