//! Rendering drawn regions over the image, as the canvas shows them.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;
use std::io::Cursor;
use crate::error::{AnnotatorError, Result};
use crate::region::{Rect, RegionManifest};

/// Outline colour of a region
pub const OUTLINE_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Outline width in pixels, drawn inward from the region edge
pub const OUTLINE_WIDTH: u32 = 2;

fn outline(canvas: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32) {
    for inset in 0..OUTLINE_WIDTH {
        let (w, h) = (
            width.saturating_sub(2 * inset),
            height.saturating_sub(2 * inset),
        );
        if w == 0 || h == 0 {
            break;
        }
        let rect = DrawRect::at(x + inset as i32, y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, OUTLINE_COLOR);
    }
}

/// Copy of `image` with each rectangle outlined. Parts outside the image are
/// clipped.
pub fn render_regions(image: &DynamicImage, rects: &[Rect]) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    let (width, height) = canvas.dimensions();
    for rect in rects {
        if let Some(px) = rect.to_pixels(width, height) {
            outline(&mut canvas, px.x as i32, px.y as i32, px.width, px.height);
        }
    }
    canvas
}

/// Same as [`render_regions`] for regions read from a manifest.
pub fn render_manifest(image: &DynamicImage, manifest: &RegionManifest) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    for region in manifest {
        outline(
            &mut canvas,
            region.x as i32,
            region.y as i32,
            region.width,
            region.height,
        );
    }
    canvas
}

/// Encode image as PNG bytes (for preview/transfer without file I/O)
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| AnnotatorError::Processing(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer.into_inner())
}
