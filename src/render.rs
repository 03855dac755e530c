//! The rasterization primitive and the per-figure driver built on it.

pub mod backend;
pub mod cpu;
pub mod figure;
pub mod png;
pub mod text;

pub use backend::{BackendKind, FrameRGBA, RenderBackend, Surface, create_backend};
pub use cpu::CpuBackend;
pub use figure::{FigureReport, InvalidGeometry, render_figure};
pub use text::TitleFont;
