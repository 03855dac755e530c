//! PNG encoding with figure metadata.
//!
//! Pixels go through `image`'s PNG encoder. The figure title is stored as an `iTXt` chunk with
//! keyword `Title` (UTF-8, so any label survives) and the resolution as a `pHYs` chunk; both are
//! spliced in right after `IHDR`.

use std::io::Cursor;

use crate::foundation::error::{RenderError, RenderResult};
use crate::render::backend::FrameRGBA;

const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const IHDR_END: usize = 8 + 4 + 4 + 13 + 4;
const TITLE_KEYWORD: &str = "Title";
const METERS_PER_INCH: f64 = 0.0254;

/// Encode a straight-alpha frame as PNG bytes.
pub fn encode_png(frame: &FrameRGBA, title: &str, dpi: u32) -> RenderResult<Vec<u8>> {
    if frame.premultiplied {
        return Err(RenderError::encode("frame must be unpremultiplied before encoding"));
    }
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| RenderError::encode("invalid rgba buffer size"))?;

    let mut encoded = Vec::new();
    img.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
        .map_err(|e| RenderError::encode(e.to_string()))?;

    if encoded.len() < IHDR_END || &encoded[..8] != SIGNATURE || &encoded[12..16] != b"IHDR" {
        return Err(RenderError::encode("encoder produced an unexpected PNG layout"));
    }

    let mut out = Vec::with_capacity(encoded.len() + title.len() + 64);
    out.extend_from_slice(&encoded[..IHDR_END]);
    write_chunk(&mut out, b"pHYs", &phys_data(dpi));
    write_chunk(&mut out, b"iTXt", &itxt_data(TITLE_KEYWORD, title));
    out.extend_from_slice(&encoded[IHDR_END..]);
    Ok(out)
}

fn phys_data(dpi: u32) -> [u8; 9] {
    let ppm = (f64::from(dpi) / METERS_PER_INCH).round() as u32;
    let mut data = [0u8; 9];
    data[..4].copy_from_slice(&ppm.to_be_bytes());
    data[4..8].copy_from_slice(&ppm.to_be_bytes());
    data[8] = 1; // unit: meter
    data
}

fn itxt_data(keyword: &str, text: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(keyword.len() + text.len() + 5);
    data.extend_from_slice(keyword.as_bytes());
    // keyword NUL, compression flag, compression method, empty language tag NUL,
    // empty translated keyword NUL
    data.extend_from_slice(&[0, 0, 0, 0, 0]);
    data.extend(text.bytes().filter(|&b| b != 0));
    data
}

/// Write a PNG chunk.
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Iterate `(type, data)` over the chunks of a PNG, stopping at the first truncated one.
fn chunks(png: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut pos = if png.starts_with(SIGNATURE) { 8 } else { png.len() };
    std::iter::from_fn(move || {
        let header = png.get(pos..pos + 8)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];
        let data = png.get(pos + 8..pos + 8 + len)?;
        pos += 8 + len + 4;
        Some((kind, data))
    })
}

/// The `Title` stored by [`encode_png`], if present.
pub fn read_title(png: &[u8]) -> Option<String> {
    chunks(png)
        .filter(|(kind, _)| kind == b"iTXt")
        .find_map(|(_, data)| {
            let rest = data.strip_prefix(TITLE_KEYWORD.as_bytes())?.strip_prefix(&[0u8])?;
            let rest = rest.get(2..)?;
            let lang_end = rest.iter().position(|&b| b == 0)?;
            let rest = &rest[lang_end + 1..];
            let tkw_end = rest.iter().position(|&b| b == 0)?;
            String::from_utf8(rest[tkw_end + 1..].to_vec()).ok()
        })
}

/// Resolution from the `pHYs` chunk, rounded to whole dots per inch.
pub fn read_dpi(png: &[u8]) -> Option<u32> {
    chunks(png).find(|(kind, _)| kind == b"pHYs").and_then(|(_, data)| {
        if data.len() != 9 || data[8] != 1 {
            return None;
        }
        let ppm = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Some((f64::from(ppm) * METERS_PER_INCH).round() as u32)
    })
}
