use std::collections::HashMap;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct ManifestEntry {
    pub id: String,
    pub path: String, // archive-relative, already resolved against the package directory
    pub media_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpineItem {
    pub id: String,
}

#[derive(Clone, Debug, Default)]
pub struct Package {
    pub manifest: HashMap<String, ManifestEntry>,
    pub spine: Vec<SpineItem>,
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    Heading { level: u8, text: String },
    Paragraph { text: String, bold: bool, italic: bool },
    Image { source_ref: String },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImageFormat {
    Jpeg,
    /// Anything `image` can decode; re-encoded as Flate RGB on embedding.
    Raster,
}

#[derive(Clone)]
pub struct EmbeddedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub display_width: f32,  // points
    pub display_height: f32, // points
}

/// Page range covered by one spine item in the output. Pages are 1-based.
#[derive(Clone, Debug, PartialEq)]
pub struct ChapterMark {
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
}

#[derive(Clone, Debug)]
pub struct ConversionResult {
    pub document: Vec<u8>,
    pub page_count: usize,
    pub title: Option<String>,
    pub chapters: Vec<ChapterMark>,
}

/// Fixed page geometry and type scale, in points.
#[derive(Clone, Debug, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub line_height: f32,
    pub heading_sizes: [f32; 4], // h1..h4
    pub fallback_heading_size: f32,
    pub max_image_height: f32,
    pub heading_gap: f32,
    pub paragraph_gap: f32,
    pub image_gap: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_width: 612.0,
            page_height: 792.0,
            margin: 50.0,
            font_size: 11.0,
            line_height: 16.0,
            heading_sizes: [22.0, 18.0, 15.0, 13.0],
            fallback_heading_size: 13.0,
            max_image_height: 400.0,
            heading_gap: 6.0,
            paragraph_gap: 8.0,
            image_gap: 10.0,
        }
    }
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    pub fn content_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }

    /// Font size for a display heading level. Levels outside 1..=4 get the
    /// fallback size.
    pub fn heading_size(&self, level: u8) -> f32 {
        match level {
            1..=4 => self.heading_sizes[level as usize - 1],
            _ => self.fallback_heading_size,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let scalars = [
            ("page width", self.page_width),
            ("page height", self.page_height),
            ("margin", self.margin),
            ("font size", self.font_size),
            ("line height", self.line_height),
            ("fallback heading size", self.fallback_heading_size),
            ("max image height", self.max_image_height),
            ("heading gap", self.heading_gap),
            ("paragraph gap", self.paragraph_gap),
            ("image gap", self.image_gap),
        ];
        let headings = self.heading_sizes.map(|size| ("heading size", size));
        for (name, value) in scalars.into_iter().chain(headings) {
            if !value.is_finite() {
                return Err(Error::InvalidGeometry(format!("{name} must be finite, got {value}")));
            }
        }
        let spacing = [
            ("margin", self.margin),
            ("heading gap", self.heading_gap),
            ("paragraph gap", self.paragraph_gap),
            ("image gap", self.image_gap),
        ];
        if let Some((name, value)) = spacing.into_iter().find(|&(_, v)| v < 0.0) {
            return Err(Error::InvalidGeometry(format!("{name} must not be negative, got {value}")));
        }
        if self.content_width() <= 0.0 || self.content_height() <= 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "margin {} leaves no content area on a {}x{} page",
                self.margin, self.page_width, self.page_height
            )));
        }
        if self.font_size <= 0.0 || self.line_height < self.font_size {
            return Err(Error::InvalidGeometry(format!(
                "line height {} must be at least the font size {}",
                self.line_height, self.font_size
            )));
        }
        let smallest_heading = self
            .heading_sizes
            .iter()
            .copied()
            .fold(self.fallback_heading_size, f32::min);
        if smallest_heading <= self.font_size {
            return Err(Error::InvalidGeometry(format!(
                "heading size {smallest_heading} must be larger than the font size {}",
                self.font_size
            )));
        }
        if self.max_image_height <= 0.0 {
            return Err(Error::InvalidGeometry("max image height must be positive".into()));
        }
        Ok(())
    }
}
