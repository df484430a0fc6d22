//! Cropping regions out of an image.
//!
//! Each region becomes `<id>.png` in the output directory, and the manifest
//! describing all regions is written beside them as `coordinates.json` so the
//! crops can later be pasted back.

use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use crate::error::{AnnotatorError, Result};
use crate::loader::open_image;
use crate::region::{RegionManifest, MANIFEST_FILE_NAME};
use crate::session::EditorSession;

/// Directory the editor crops into when none is given
pub const DEFAULT_CROPS_DIR: &str = "crops";

#[derive(Debug, Serialize)]
pub struct RegionOutcome {
    pub region: String,
    pub result: std::result::Result<PathBuf, AnnotatorError>,
}

#[derive(Debug, Serialize)]
pub struct CropReport {
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub outcomes: Vec<RegionOutcome>,
}

impl CropReport {
    pub fn saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
}

/// Save every region of `image` as its own PNG and write the manifest.
///
/// Regions overhanging the image edge are cropped to the part inside it. The
/// manifest keeps the recorded boxes unchanged.
pub fn crop_regions(
    image: &DynamicImage,
    manifest: &RegionManifest,
    output_dir: &Path,
) -> Result<CropReport> {
    fs::create_dir_all(output_dir).map_err(|e| AnnotatorError::write_io(output_dir, e))?;
    let (width, height) = image.dimensions();

    let mut outcomes = Vec::with_capacity(manifest.len());
    for region in manifest {
        let result = region.clip_to(width, height).and_then(|bounds| {
            let cropped = image.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height);
            let path = output_dir.join(region.file_name());
            cropped
                .save(&path)
                .map_err(|e| AnnotatorError::write(&path, e))?;
            Ok(path)
        });

        match &result {
            Ok(path) => info!(region = %region.id, path = %path.display(), "Saved crop"),
            Err(e) => warn!(region = %region.id, error = %e, "Skipped crop"),
        }
        outcomes.push(RegionOutcome {
            region: region.id.clone(),
            result,
        });
    }

    let manifest_path = output_dir.join(MANIFEST_FILE_NAME);
    manifest.save(&manifest_path)?;

    Ok(CropReport {
        output_dir: output_dir.to_path_buf(),
        manifest_path,
        outcomes,
    })
}

/// Crop the rectangles drawn in `session` out of its image.
pub fn crop_session(session: &EditorSession, output_dir: &Path) -> Result<CropReport> {
    let loaded = session.image().ok_or(AnnotatorError::NoImageLoaded)?;
    let manifest = session.manifest()?;
    let image = open_image(&loaded.path)?;
    crop_regions(&image, &manifest, output_dir)
}

/// Crop `image_path` using a manifest file.
pub fn crop_image_by_manifest(
    image_path: &Path,
    manifest_path: &Path,
    output_dir: &Path,
) -> Result<CropReport> {
    let image = open_image(image_path)?;
    let manifest = RegionManifest::load(manifest_path)?;
    crop_regions(&image, &manifest, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{PixelRect, Region};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_crop_writes_regions_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_fn(20, 10, |x, y| Rgb([x as u8, y as u8, 7]));
        let image = DynamicImage::ImageRgb8(img);

        let mut manifest = RegionManifest::new();
        manifest
            .push(Region::new("1", PixelRect { x: 2, y: 3, width: 4, height: 5 }))
            .unwrap();
        manifest
            .push(Region::new("2", PixelRect { x: 18, y: 0, width: 5, height: 5 }))
            .unwrap();
        manifest
            .push(Region::new("3", PixelRect { x: 25, y: 0, width: 5, height: 5 }))
            .unwrap();

        let report = crop_regions(&image, &manifest, dir.path()).unwrap();
        assert_eq!(report.saved(), 2);
        assert!(matches!(
            report.outcomes[2].result,
            Err(AnnotatorError::InvalidRegion { .. })
        ));

        let crop = image::open(dir.path().join("1.png")).unwrap().to_rgb8();
        assert_eq!(crop.dimensions(), (4, 5));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([2, 3, 7]));
        assert!(!dir.path().join("3.png").exists());

        let reloaded = RegionManifest::load(&report.manifest_path).unwrap();
        assert_eq!(reloaded, manifest);
    }

    #[test]
    fn test_overhanging_region_is_clipped() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_fn(20, 10, |x, y| Rgb([x as u8, y as u8, 7]));
        let image = DynamicImage::ImageRgb8(img);

        let mut manifest = RegionManifest::new();
        manifest
            .push(Region::new("edge", PixelRect { x: 18, y: 7, width: 5, height: 5 }))
            .unwrap();

        let report = crop_regions(&image, &manifest, dir.path()).unwrap();
        assert_eq!(report.saved(), 1);

        let crop = image::open(dir.path().join("edge.png")).unwrap().to_rgb8();
        assert_eq!(crop.dimensions(), (2, 3));
        assert_eq!(crop.get_pixel(1, 2), &Rgb([19, 9, 7]));

        // the manifest still records the box as drawn
        let reloaded = RegionManifest::load(&report.manifest_path).unwrap();
        assert_eq!(reloaded.get("edge").unwrap().width, 5);
    }
}
