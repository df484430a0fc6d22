//! Rectangles and the region manifest.
//!
//! The manifest is written next to the crops as `coordinates.json`, a JSON
//! object keyed by region id:
//!
//! ```json
//! {
//!     "1": { "x": 10, "y": 20, "width": 64, "height": 32 }
//! }
//! ```
//!
//! In memory it is an ordered list; key order in the file is kept on load and
//! reproduced on save.

use serde::de::{Error as _, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::Path;
use crate::error::{AnnotatorError, Result};

/// File name the cropper writes the manifest to
pub const MANIFEST_FILE_NAME: &str = "coordinates.json";

// ============================================================================
// SCENE GEOMETRY
// ============================================================================

/// Point in image coordinates, fractional while the pointer is dragged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Normalised rectangle (non-negative width and height) in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Rectangle spanned by two opposite corners, in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            left: a.x.min(b.x),
            top: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Edges count as inside.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.top += dy;
    }

    /// Round to whole pixels and clip to a `image_width`x`image_height` image.
    ///
    /// Position and size are rounded independently. Returns `None` when
    /// nothing of the rectangle is left inside the image.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> Option<PixelRect> {
        let x = self.left.round() as i64;
        let y = self.top.round() as i64;
        let w = self.width.round() as i64;
        let h = self.height.round() as i64;

        let left = x.max(0);
        let top = y.max(0);
        let right = (x + w).min(image_width as i64);
        let bottom = (y + h).min(image_height as i64);
        if right <= left || bottom <= top {
            return None;
        }

        Some(PixelRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

// ============================================================================
// REGIONS
// ============================================================================

/// Integer pixel rectangle as stored in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(id: impl Into<String>, rect: PixelRect) -> Self {
        Self {
            id: id.into(),
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// File name of this region's crop (`<id>.png`)
    pub fn file_name(&self) -> String {
        format!("{}.png", self.id)
    }

    fn invalid(&self, reason: String) -> AnnotatorError {
        AnnotatorError::InvalidRegion {
            region: self.id.clone(),
            reason,
        }
    }

    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(self.invalid("region is empty".to_string()));
        }
        Ok(())
    }

    /// Part of the region inside a `image_width`x`image_height` image.
    ///
    /// Overhanging edges are cut off; a region that is empty or lies wholly
    /// outside the image is an error.
    pub fn clip_to(&self, image_width: u32, image_height: u32) -> Result<PixelRect> {
        self.ensure_not_empty()?;
        let right = (self.x as u64 + self.width as u64).min(image_width as u64);
        let bottom = (self.y as u64 + self.height as u64).min(image_height as u64);
        if right <= self.x as u64 || bottom <= self.y as u64 {
            return Err(self.invalid(format!(
                "{}x{} at ({}, {}) lies outside the {}x{} image",
                self.width, self.height, self.x, self.y, image_width, image_height
            )));
        }
        Ok(PixelRect {
            x: self.x,
            y: self.y,
            width: (right - self.x as u64) as u32,
            height: (bottom - self.y as u64) as u32,
        })
    }
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionManifest {
    regions: Vec<Region>,
}

impl RegionManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region. Ids must be unique.
    pub fn push(&mut self, region: Region) -> Result<()> {
        if self.get(&region.id).is_some() {
            return Err(AnnotatorError::InvalidRegion {
                region: region.id,
                reason: "duplicate region id".to_string(),
            });
        }
        self.regions.push(region);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        String::from_utf8(buf).map_err(|e| AnnotatorError::Processing(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| AnnotatorError::write_io(path, e))
    }
}

impl<'a> IntoIterator for &'a RegionManifest {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl Serialize for RegionManifest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.regions.len()))?;
        for region in &self.regions {
            map.serialize_entry(&region.id, &region.bounds())?;
        }
        map.end()
    }
}

struct ManifestVisitor;

impl<'de> Visitor<'de> for ManifestVisitor {
    type Value = RegionManifest;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object mapping region ids to {x, y, width, height}")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut manifest = RegionManifest::new();
        while let Some((id, bounds)) = access.next_entry::<String, PixelRect>()? {
            manifest
                .push(Region::new(id, bounds))
                .map_err(A::Error::custom)?;
        }
        Ok(manifest)
    }
}

impl<'de> Deserialize<'de> for RegionManifest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ManifestVisitor)
    }
}
