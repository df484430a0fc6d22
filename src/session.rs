//! Editor session: the image being annotated and the rectangles drawn on it.
//!
//! The session is owned by whichever shell drives it (the desktop window keeps
//! one in managed state) and is passed by reference to the operations that
//! need it.

use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::error::{AnnotatorError, Result};
use crate::loader::open_image;
use crate::region::{Point, Rect, Region, RegionManifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Dragging scrolls and zooms the view
    #[default]
    Pan,
    /// Dragging draws a new rectangle
    Draw,
    /// The next click removes the rectangle under the pointer
    Erase,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EditorSession {
    image: Option<LoadedImage>,
    rects: Vec<Rect>,
    mode: Mode,
    drag_start: Option<Point>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an image, discarding any rectangles drawn on the previous one.
    pub fn load_image(&mut self, path: &Path) -> Result<&LoadedImage> {
        let img = open_image(path)?;
        let (width, height) = img.dimensions();
        self.rects.clear();
        self.drag_start = None;
        self.mode = Mode::Pan;
        debug!(path = %path.display(), width, height, "Image loaded into session");
        Ok(&*self.image.insert(LoadedImage {
            path: path.to_path_buf(),
            width,
            height,
        }))
    }

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    fn require_image(&self) -> Result<&LoadedImage> {
        self.image.as_ref().ok_or(AnnotatorError::NoImageLoaded)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch modes. Draw and erase exclude each other; leaving draw mode
    /// abandons nothing already drawn but ends any drag in progress.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != Mode::Draw {
            self.drag_start = None;
        }
        self.mode = mode;
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Pointer pressed in draw mode: start a new, zero-sized rectangle.
    ///
    /// Returns `false` (and does nothing) outside draw mode.
    pub fn begin_draw(&mut self, at: Point) -> Result<bool> {
        self.require_image()?;
        if self.mode != Mode::Draw {
            return Ok(false);
        }
        self.drag_start = Some(at);
        self.rects.push(Rect::from_corners(at, at));
        Ok(true)
    }

    /// Pointer moved while drawing: stretch the rectangle being drawn.
    pub fn update_draw(&mut self, to: Point) -> bool {
        match (self.drag_start, self.rects.last_mut()) {
            (Some(start), Some(last)) if self.mode == Mode::Draw => {
                *last = Rect::from_corners(start, to);
                true
            }
            _ => false,
        }
    }

    /// Pointer released: finish the drag and return the completed rectangle.
    pub fn end_draw(&mut self) -> Option<Rect> {
        self.drag_start.take()?;
        self.rects.last().copied()
    }

    /// Click in erase mode: remove the first rectangle containing `at`.
    ///
    /// Erasing is one-shot; the session goes back to pan mode after a
    /// rectangle is removed.
    pub fn erase_at(&mut self, at: Point) -> Result<Option<Rect>> {
        self.require_image()?;
        if self.mode != Mode::Erase {
            return Ok(None);
        }
        let Some(index) = self.rects.iter().position(|r| r.contains(at)) else {
            return Ok(None);
        };
        let removed = self.rects.remove(index);
        self.mode = Mode::Pan;
        Ok(Some(removed))
    }

    /// Move a rectangle by an offset in image coordinates.
    pub fn move_region(&mut self, index: usize, dx: f32, dy: f32) -> Result<()> {
        let rect = self.rects.get_mut(index).ok_or_else(|| AnnotatorError::InvalidRegion {
            region: (index + 1).to_string(),
            reason: "no such region".to_string(),
        })?;
        rect.translate(dx, dy);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rects.clear();
        self.drag_start = None;
    }

    /// Current rectangles as a manifest, numbered from "1" in drawing order.
    ///
    /// Rectangles are rounded to pixels and clipped to the image; those left
    /// empty are skipped without taking a number.
    pub fn manifest(&self) -> Result<RegionManifest> {
        let image = self.require_image()?;
        let mut manifest = RegionManifest::new();
        for rect in &self.rects {
            if let Some(px) = rect.to_pixels(image.width, image.height) {
                let id = (manifest.len() + 1).to_string();
                manifest.push(Region::new(id, px))?;
            }
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_image(width: u32, height: u32) -> EditorSession {
        EditorSession {
            image: Some(LoadedImage {
                path: PathBuf::from("test.png"),
                width,
                height,
            }),
            ..EditorSession::default()
        }
    }

    fn draw(session: &mut EditorSession, from: (f32, f32), to: (f32, f32)) {
        session.set_mode(Mode::Draw);
        assert!(session.begin_draw(Point::new(from.0, from.1)).unwrap());
        session.update_draw(Point::new((from.0 + to.0) / 2.0, from.1));
        session.update_draw(Point::new(to.0, to.1));
        session.end_draw().unwrap();
    }

    #[test]
    fn test_draw_creates_normalised_rect() {
        let mut s = session_with_image(100, 100);
        draw(&mut s, (40.0, 30.0), (10.0, 5.0));
        assert_eq!(
            s.rects(),
            &[Rect { left: 10.0, top: 5.0, width: 30.0, height: 25.0 }]
        );
    }

    #[test]
    fn test_pan_mode_does_not_draw() {
        let mut s = session_with_image(100, 100);
        assert!(!s.begin_draw(Point::new(1.0, 1.0)).unwrap());
        assert!(!s.update_draw(Point::new(5.0, 5.0)));
        assert!(s.end_draw().is_none());
        assert!(s.rects().is_empty());
    }

    #[test]
    fn test_requires_loaded_image() {
        let mut s = EditorSession::new();
        s.set_mode(Mode::Draw);
        assert!(matches!(
            s.begin_draw(Point::new(0.0, 0.0)),
            Err(AnnotatorError::NoImageLoaded)
        ));
        assert!(matches!(s.manifest(), Err(AnnotatorError::NoImageLoaded)));
    }

    #[test]
    fn test_erase_removes_first_hit_and_returns_to_pan() {
        let mut s = session_with_image(100, 100);
        draw(&mut s, (0.0, 0.0), (50.0, 50.0));
        draw(&mut s, (20.0, 20.0), (80.0, 80.0));

        s.set_mode(Mode::Erase);
        let removed = s.erase_at(Point::new(30.0, 30.0)).unwrap().unwrap();
        assert_eq!(removed.left, 0.0);
        assert_eq!(s.rects().len(), 1);
        assert_eq!(s.mode(), Mode::Pan);

        // back in pan mode, further clicks do nothing
        assert!(s.erase_at(Point::new(30.0, 30.0)).unwrap().is_none());
        assert_eq!(s.rects().len(), 1);
    }

    #[test]
    fn test_erase_miss_stays_in_erase_mode() {
        let mut s = session_with_image(100, 100);
        draw(&mut s, (0.0, 0.0), (10.0, 10.0));
        s.set_mode(Mode::Erase);
        assert!(s.erase_at(Point::new(90.0, 90.0)).unwrap().is_none());
        assert_eq!(s.mode(), Mode::Erase);
    }

    #[test]
    fn test_manifest_numbers_in_drawing_order_and_clips() {
        let mut s = session_with_image(100, 50);
        draw(&mut s, (10.0, 10.0), (20.0, 20.0));
        draw(&mut s, (200.0, 200.0), (210.0, 210.0)); // entirely outside
        draw(&mut s, (90.4, 40.0), (120.0, 60.0));

        let manifest = s.manifest().unwrap();
        let regions: Vec<&Region> = manifest.iter().collect();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].id, "1");
        assert_eq!((regions[0].x, regions[0].y, regions[0].width, regions[0].height), (10, 10, 10, 10));
        assert_eq!(regions[1].id, "2");
        assert_eq!((regions[1].x, regions[1].y, regions[1].width, regions[1].height), (90, 40, 10, 10));
    }

    #[test]
    fn test_move_region() {
        let mut s = session_with_image(100, 100);
        draw(&mut s, (10.0, 10.0), (20.0, 20.0));
        s.move_region(0, 5.0, -3.0).unwrap();
        assert_eq!(s.rects()[0].left, 15.0);
        assert_eq!(s.rects()[0].top, 7.0);
        assert!(s.move_region(3, 1.0, 1.0).is_err());
    }
}
