//! Pasting edited crops back into the original image.
//!
//! For every region in the manifest the compositor looks for `<id>.png` in the
//! edited directory, resizes it to the recorded size if it drifted, and
//! composites it over the original at the recorded offset using its alpha
//! channel.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use crate::error::{AnnotatorError, Result};
use crate::loader::open_image;
use crate::region::{Region, RegionManifest};

#[derive(Debug, Serialize)]
pub struct PasteOutcome {
    pub region: String,
    /// `true` when the edited crop had to be resized to fit
    pub result: std::result::Result<bool, AnnotatorError>,
}

#[derive(Debug)]
pub struct PasteReport {
    pub image: RgbaImage,
    pub outcomes: Vec<PasteOutcome>,
}

impl PasteReport {
    pub fn pasted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &PasteOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

fn paste_one(canvas: &mut RgbaImage, region: &Region, edited_dir: &Path) -> Result<bool> {
    region.ensure_not_empty()?;
    let path = edited_dir.join(region.file_name());
    if !path.is_file() {
        return Err(AnnotatorError::MissingRegionAsset {
            region: region.id.clone(),
            path,
        });
    }

    let mut edited = open_image(&path)?.to_rgba8();

    let resized = edited.dimensions() != (region.width, region.height);
    if resized {
        edited = imageops::resize(&edited, region.width, region.height, FilterType::CatmullRom);
    }

    paste_masked(canvas, &edited, region.x, region.y);
    Ok(resized)
}

/// Paste `top` onto `canvas` at (`x`, `y`) using `top`'s alpha as the mask.
///
/// Every channel, alpha included, is mixed as
/// `(top * a + canvas * (255 - a)) / 255`, so opaque pixels replace the
/// canvas exactly and fully transparent ones leave it untouched. Whatever
/// falls outside the canvas is clipped.
fn paste_masked(canvas: &mut RgbaImage, top: &RgbaImage, x: u32, y: u32) {
    let (canvas_w, canvas_h) = canvas.dimensions();
    for (tx, ty, src) in top.enumerate_pixels() {
        let (cx, cy) = (x as u64 + tx as u64, y as u64 + ty as u64);
        if cx >= canvas_w as u64 || cy >= canvas_h as u64 {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
        let alpha = src[3] as u32;
        for c in 0..4 {
            let mixed = src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha);
            dst[c] = ((mixed + 127) / 255) as u8;
        }
    }
}

/// Composite the edited crops over `original`.
///
/// Missing or unreadable crops are reported per region and skipped.
pub fn paste_regions(
    original: &DynamicImage,
    manifest: &RegionManifest,
    edited_dir: &Path,
) -> PasteReport {
    let mut canvas = original.to_rgba8();
    let outcomes = manifest
        .iter()
        .map(|region| {
            let result = paste_one(&mut canvas, region, edited_dir);
            match &result {
                Ok(true) => info!(region = %region.id, "Pasted resized crop"),
                Ok(false) => info!(region = %region.id, "Pasted crop"),
                Err(e) => warn!(region = %region.id, error = %e, "Skipped region"),
            }
            PasteOutcome {
                region: region.id.clone(),
                result,
            }
        })
        .collect();

    PasteReport {
        image: canvas,
        outcomes,
    }
}

/// File-driven paste: load the manifest and original, composite, and save
/// the result to `output_path`.
pub fn paste_files(
    manifest_path: &Path,
    image_path: &Path,
    edited_dir: &Path,
    output_path: &Path,
) -> Result<PasteReport> {
    let manifest = RegionManifest::load(manifest_path)?;
    let original = open_image(image_path)?;

    let report = paste_regions(&original, &manifest, edited_dir);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AnnotatorError::write_io(parent, e))?;
    }
    report
        .image
        .save(output_path)
        .map_err(|e| AnnotatorError::write(output_path, e))?;

    info!(
        output = %output_path.display(),
        pasted = report.pasted(),
        regions = manifest.len(),
        "Saved composited image"
    );
    Ok(report)
}

/// Where a composited image is written when no explicit path is given.
pub fn default_output_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    image_path.with_file_name(format!("{}_pasted.png", stem))
}
