use std::fmt;

use crate::foundation::error::{MapError, MapResult};

pub use kurbo::{BezPath, Point, Rect};

/// Straight-alpha RGBA8 color.
///
/// Serialized as `#rrggbb` / `#rrggbbaa`; deserializes from either form or from a named color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("skyblue", [135, 206, 235]),
    ("lightblue", [173, 216, 230]),
    ("lightsteelblue", [176, 196, 222]),
    ("navy", [0, 0, 128]),
    ("lightcoral", [240, 128, 128]),
    ("darkred", [139, 0, 0]),
    ("lightgreen", [144, 238, 144]),
    ("darkgreen", [0, 100, 0]),
    ("gold", [255, 215, 0]),
    ("orange", [255, 165, 0]),
    ("darkorange", [255, 140, 0]),
    ("plum", [221, 160, 221]),
    ("purple", [128, 0, 128]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
];

impl Rgba8 {
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const WHITE: Self = Self::opaque(255, 255, 255);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, or a named color (case-insensitive).
    pub fn parse(s: &str) -> MapResult<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return Self::parse_hex(hex)
                .ok_or_else(|| MapError::validation(format!("invalid hex color '{s}'")));
        }
        let lower = s.to_ascii_lowercase();
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, [r, g, b])| Self::opaque(*r, *g, *b))
            .ok_or_else(|| MapError::validation(format!("unknown color '{s}'")))
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => {
                let nib = |i: usize| {
                    u8::from_str_radix(hex.get(i..i + 1)?, 16)
                        .ok()
                        .map(|v| v * 17)
                };
                Some(Self::opaque(nib(0)?, nib(1)?, nib(2)?))
            }
            6 => Some(Self::opaque(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => None,
        }
    }

    /// Scale alpha by `opacity` (clamped to `[0, 1]`).
    pub fn with_opacity(self, opacity: f32) -> Self {
        let o = opacity.clamp(0.0, 1.0);
        Self {
            a: (f32::from(self.a) * o).round() as u8,
            ..self
        }
    }
}

impl fmt::Display for Rgba8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl TryFrom<String> for Rgba8 {
    type Error = MapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rgba8> for String {
    fn from(value: Rgba8) -> Self {
        value.to_string()
    }
}

/// Physical figure size in inches, as `[width, height]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FigureSize(pub f64, pub f64);

impl FigureSize {
    /// Output canvas for this figure at `dpi`.
    pub fn canvas(self, dpi: u32) -> MapResult<Canvas> {
        let FigureSize(w_in, h_in) = self;
        if !(w_in.is_finite() && h_in.is_finite() && w_in > 0.0 && h_in > 0.0) {
            return Err(MapError::validation(format!(
                "figure size must be positive, got {w_in} x {h_in}"
            )));
        }
        if dpi == 0 {
            return Err(MapError::validation("dpi must be > 0"));
        }
        let px = |inches: f64| (inches * f64::from(dpi)).round();
        let (w, h) = (px(w_in), px(h_in));
        let max = f64::from(Canvas::MAX_SIDE);
        if w < 1.0 || h < 1.0 || w > max || h > max {
            return Err(MapError::validation(format!(
                "figure {w_in} x {h_in} in at {dpi} dpi is {w} x {h} px; each side must be 1..={max}"
            )));
        }
        Ok(Canvas {
            width: w as u32,
            height: h as u32,
        })
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self(self.0 * factor, self.1 * factor)
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// Largest side the CPU rasterizer accepts.
    pub const MAX_SIDE: u32 = u16::MAX as u32;
}
