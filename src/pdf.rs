//! Single-page PDF export.
//!
//! The image fills the whole page: the media box is the image size with one
//! point per pixel. Pixels are embedded as RGB, Flate-compressed.

use image::DynamicImage;
use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use crate::error::{AnnotatorError, Result};
use crate::loader::open_image;

/// zlib level used for the image stream
const COMPRESSION_LEVEL: u8 = 6;

/// Encode `image` as a one-page PDF.
pub fn write_pdf_mem(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(AnnotatorError::Processing("cannot export an empty image".to_string()));
    }

    let catalog_id = Ref::new(1);
    let pages_id = Ref::new(2);
    let page_id = Ref::new(3);
    let contents_id = Ref::new(4);
    let image_id = Ref::new(5);
    let image_name = Name(b"Im0");

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id).kids([page_id]).count(1);

    let compressed = compress_to_vec_zlib(rgb.as_raw(), COMPRESSION_LEVEL);
    let mut xobject = pdf.image_xobject(image_id, &compressed);
    xobject.filter(Filter::FlateDecode);
    xobject.width(width as i32);
    xobject.height(height as i32);
    xobject.color_space().device_rgb();
    xobject.bits_per_component(8);
    xobject.finish();

    let (width_pt, height_pt) = (width as f32, height as f32);

    // Unit square scaled to the page, origin bottom-left
    let mut content = Content::new();
    content.save_state();
    content.transform([width_pt, 0.0, 0.0, height_pt, 0.0, 0.0]);
    content.x_object(image_name);
    content.restore_state();
    let content_data = content.finish();
    pdf.stream(contents_id, &content_data);

    let mut page = pdf.page(page_id);
    page.parent(pages_id);
    page.media_box(Rect::new(0.0, 0.0, width_pt, height_pt));
    page.contents(contents_id);
    page.resources().x_objects().pair(image_name, image_id);
    page.finish();

    Ok(pdf.finish())
}

/// `<name>.pdf`, unless `name` already ends in `.pdf`.
pub fn pdf_path_for_name(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    let has_pdf_ext = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if has_pdf_ext {
        path
    } else {
        PathBuf::from(format!("{}.pdf", name))
    }
}

/// Convert an image file (normally a PNG) into a one-page PDF.
pub fn png_to_pdf(png_path: &Path, pdf_path: &Path) -> Result<()> {
    let image = open_image(png_path)?;
    let bytes = write_pdf_mem(&image)?;

    if let Some(parent) = pdf_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AnnotatorError::write_io(parent, e))?;
    }
    fs::write(pdf_path, &bytes).map_err(|e| AnnotatorError::write_io(pdf_path, e))?;

    info!(pdf = %pdf_path.display(), bytes = bytes.len(), "PDF saved");
    Ok(())
}
