//! Title text: font lookup and line layout with `parley`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::foundation::error::{RenderError, RenderResult};

/// Environment variable naming a TrueType/OpenType font file for titles.
pub const FONT_ENV: &str = "MAPBATCH_FONT";

/// Bold sans faces tried in order when `MAPBATCH_FONT` is unset.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// A font loaded once and shared by every surface that draws titles.
#[derive(Clone)]
pub struct TitleFont {
    path: PathBuf,
    blob: parley::fontique::Blob<u8>,
    data: vello_cpu::peniko::FontData,
}

impl std::fmt::Debug for TitleFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleFont")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TitleFont {
    /// Load a font file. Fails if the file cannot be read or holds no usable face.
    pub fn from_path(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RenderError::surface(format!("read font '{}': {e}", path.display()))
        })?;
        let font = Self {
            path: path.to_path_buf(),
            blob: parley::fontique::Blob::from(bytes.clone()),
            data: vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0),
        };
        let mut font_ctx = parley::FontContext::default();
        font.family_name(&mut font_ctx)?;
        Ok(font)
    }

    /// The first usable font from `MAPBATCH_FONT` or the usual system locations.
    ///
    /// Looked up once per process.
    pub fn system() -> Option<Self> {
        static FONT: OnceLock<Option<TitleFont>> = OnceLock::new();
        FONT.get_or_init(discover).clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn data(&self) -> &vello_cpu::peniko::FontData {
        &self.data
    }

    fn family_name(&self, font_ctx: &mut parley::FontContext) -> RenderResult<String> {
        let families = font_ctx.collection.register_fonts(self.blob.clone(), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            RenderError::surface(format!("no font families in '{}'", self.path.display()))
        })?;
        Ok(font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| RenderError::surface("registered font family has no name"))?
            .to_string())
    }

    /// Shape `text` at `size_px`, breaking lines at `max_width_px`.
    pub(crate) fn layout(
        &self,
        text: &str,
        size_px: f32,
        max_width_px: f32,
    ) -> RenderResult<parley::Layout<()>> {
        if !(size_px.is_finite() && size_px > 0.0) {
            return Err(RenderError::surface(format!(
                "title size must be > 0, got {size_px}"
            )));
        }

        let mut font_ctx = parley::FontContext::default();
        let mut layout_ctx: parley::LayoutContext<()> = parley::LayoutContext::new();
        let family_name = self.family_name(&mut font_ctx)?;

        let mut builder = layout_ctx.ranged_builder(&mut font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));

        let mut layout: parley::Layout<()> = builder.build(text);
        layout.break_all_lines(Some(max_width_px));
        layout.align(
            Some(max_width_px),
            parley::Alignment::Start,
            parley::AlignmentOptions::default(),
        );
        Ok(layout)
    }
}

fn discover() -> Option<TitleFont> {
    let from_env = std::env::var_os(FONT_ENV).map(PathBuf::from);
    let candidates = from_env
        .into_iter()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from));
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match TitleFont::from_path(&path) {
            Ok(font) => {
                tracing::debug!(path = %path.display(), "title font");
                return Some(font);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "unusable title font"),
        }
    }
    tracing::warn!("no title font found; titles are kept in image metadata only");
    None
}
