//! Geometry Compositor — places an uploaded photo on the fixed-aspect cover canvas.
//!
//! # No-crop contract
//! The source sampling rectangle is always the full source image. The photo is scaled
//! to "contain" the canvas, then zoomed by `CanvasSpec::zoom` to shrink letterbox
//! margins. Whatever overshoots the canvas on one axis is outside the visible area; it is
//! never removed from the logical source, so a face near an edge is never cut by us.
//!
//! After placement the drawn rectangle (and only it) gets a uniform multiply darkening
//! and a multi-stop vertical gradient. Letterbox margins stay fully transparent. The
//! result is one flattened RGBA PNG.
//!
//! CPU-bound: callers run `compose_cover` inside `tokio::task::spawn_blocking`.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use thiserror::Error;

/// Multiply tint and its opacity for the uniform darkening pass.
const DARKEN_TINT: [f64; 3] = [20.0, 16.0, 32.0];
const DARKEN_OPACITY: f64 = 0.18;

/// (offset within drawn rect 0..1, black overlay alpha)
const GRADIENT_STOPS: [(f64, f64); 4] = [(0.0, 0.30), (0.35, 0.0), (0.65, 0.0), (1.0, 0.55)];

#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("image has zero width or height ({width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Target canvas. 16:10 at 1536×960 with a 1.2× zoom unless configured otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    /// Empirical multiplier on the contain scale; tunable, not load-bearing.
    pub zoom: f64,
}

impl Default for CanvasSpec {
    fn default() -> Self {
        Self {
            width: 1536,
            height: 960,
            zoom: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where the source lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Always `(0, 0, src_w, src_h)`.
    pub source: Rect,
    /// May extend past the canvas on one axis when zoom > 1.
    pub dest: Rect,
    pub scale: f64,
}

#[derive(Debug, Clone)]
pub struct ComposedCover {
    pub png: Vec<u8>,
    pub placement: Placement,
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

pub fn compute_placement(
    src_width: u32,
    src_height: u32,
    canvas: CanvasSpec,
) -> Result<Placement, CompositorError> {
    ensure_non_empty(src_width, src_height)?;
    ensure_non_empty(canvas.width, canvas.height)?;

    let (sw, sh) = (src_width as f64, src_height as f64);
    let (tw, th) = (canvas.width as f64, canvas.height as f64);

    let contain = (tw / sw).min(th / sh);
    let scale = contain * canvas.zoom;
    let width = sw * scale;
    let height = sh * scale;

    Ok(Placement {
        source: Rect {
            x: 0.0,
            y: 0.0,
            width: sw,
            height: sh,
        },
        dest: Rect {
            x: (tw - width) / 2.0,
            y: (th - height) / 2.0,
            width,
            height,
        },
        scale,
    })
}

/// Black overlay alpha at `t` (0 = top of drawn rect, 1 = bottom), linear between stops.
pub fn gradient_alpha(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    for pair in GRADIENT_STOPS.windows(2) {
        let (start, a0) = pair[0];
        let (end, a1) = pair[1];
        if t <= end {
            let span = end - start;
            if span <= f64::EPSILON {
                return a1;
            }
            return a0 + (a1 - a0) * (t - start) / span;
        }
    }
    GRADIENT_STOPS[GRADIENT_STOPS.len() - 1].1
}

// ────────────────────────────────────────────────────────────────────────────
// Raster
// ────────────────────────────────────────────────────────────────────────────

/// Decodes an upload and applies its EXIF orientation, so a phone photo taken in
/// portrait is placed as the user saw it.
pub fn decode_upright(bytes: &[u8]) -> Result<DynamicImage, CompositorError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Decodes `source_bytes`, places it per `compute_placement`, applies the overlays and
/// encodes a PNG the size of the canvas.
pub fn compose_cover(
    source_bytes: &[u8],
    canvas: CanvasSpec,
) -> Result<ComposedCover, CompositorError> {
    let source = decode_upright(source_bytes)?.to_rgba8();
    let placement = compute_placement(source.width(), source.height(), canvas)?;

    let drawn_w = placement.dest.width.round().max(1.0) as u32;
    let drawn_h = placement.dest.height.round().max(1.0) as u32;
    let drawn_x = placement.dest.x.round() as i64;
    let drawn_y = placement.dest.y.round() as i64;

    // Full source in, scaled whole. No sub-rectangle is ever sampled.
    let scaled = imageops::resize(&source, drawn_w, drawn_h, FilterType::CatmullRom);

    let mut target = RgbaImage::new(canvas.width, canvas.height);
    imageops::overlay(&mut target, &scaled, drawn_x, drawn_y);

    apply_overlays(&mut target, drawn_x, drawn_y, drawn_w, drawn_h);

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(target).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(ComposedCover { png, placement })
}

/// Darkening then gradient, restricted to the drawn rectangle clipped to the canvas.
fn apply_overlays(target: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32) {
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (x + w as i64).clamp(0, target.width() as i64) as u32;
    let y1 = (y + h as i64).clamp(0, target.height() as i64) as u32;

    for py in y0..y1 {
        let t = (py as i64 - y) as f64 / h as f64;
        let shade = 1.0 - gradient_alpha(t);

        for px in x0..x1 {
            let pixel = target.get_pixel_mut(px, py);
            for (channel, tint) in pixel.0.iter_mut().take(3).zip(DARKEN_TINT) {
                let c = *channel as f64;
                let multiplied = c * tint / 255.0;
                let darkened = c * (1.0 - DARKEN_OPACITY) + multiplied * DARKEN_OPACITY;
                *channel = (darkened * shade).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn ensure_non_empty(width: u32, height: u32) -> Result<(), CompositorError> {
    if width == 0 || height == 0 {
        return Err(CompositorError::EmptyDimensions { width, height });
    }
    Ok(())
}
