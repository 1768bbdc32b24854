use std::io::Cursor;

use crate::epub::{Archive, resolve_href};
use crate::error::Error;
use crate::model::{EmbeddedImage, ImageFormat, PageGeometry};

/// Box used when an image's pixel size cannot be determined.
const FALLBACK_WIDTH: f32 = 200.0;
const FALLBACK_HEIGHT: f32 = 150.0;

/// Resolves image references of one chapter against the archive.
pub(crate) struct ImageResolver<'r, 'a> {
    archive: &'r mut Archive<'a>,
    chapter_dir: &'r str,
    max_width: f32,
    max_height: f32,
}

impl<'r, 'a> ImageResolver<'r, 'a> {
    pub(crate) fn new(
        archive: &'r mut Archive<'a>,
        chapter_dir: &'r str,
        geometry: &PageGeometry,
    ) -> Self {
        Self {
            archive,
            chapter_dir,
            max_width: geometry.content_width(),
            max_height: geometry.max_image_height,
        }
    }

    pub(crate) fn resolve(&mut self, source_ref: &str) -> Result<EmbeddedImage, Error> {
        let href = source_ref.split(['#', '?']).next().unwrap_or(source_ref);
        let path = resolve_href(self.chapter_dir, href);
        let data = self.archive.read_binary(&path)?;

        let format = if data.starts_with(&[0xFF, 0xD8]) {
            ImageFormat::Jpeg
        } else {
            ImageFormat::Raster
        };
        let (width, height) = match pixel_size(&data) {
            Some((w, h)) => (w as f32, h as f32),
            None => {
                log::debug!("Cannot read dimensions of {path}; using fallback box");
                (FALLBACK_WIDTH, FALLBACK_HEIGHT)
            }
        };
        let (display_width, display_height) = fit_box(width, height, self.max_width, self.max_height);

        Ok(EmbeddedImage {
            data,
            format,
            display_width,
            display_height,
        })
    }
}

fn pixel_size(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
        .filter(|&(w, h)| w > 0 && h > 0)
}

/// Scale (1 px = 1 pt) to fit the content width first, then the maximum
/// height, preserving the aspect ratio.
pub(crate) fn fit_box(width: f32, height: f32, max_width: f32, max_height: f32) -> (f32, f32) {
    let (mut w, mut h) = (width, height);
    if w > max_width {
        h *= max_width / w;
        w = max_width;
    }
    if h > max_height {
        w *= max_height / h;
        h = max_height;
    }
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_keep_native_size() {
        assert_eq!(fit_box(120.0, 80.0, 512.0, 400.0), (120.0, 80.0));
    }

    #[test]
    fn wide_image_scales_to_content_width() {
        let (w, h) = fit_box(1024.0, 256.0, 512.0, 400.0);
        assert_eq!(w, 512.0);
        assert!((h - 128.0).abs() < 1e-3);
    }

    #[test]
    fn huge_image_honors_both_limits_and_aspect() {
        let (w, h) = fit_box(3000.0, 4000.0, 512.0, 400.0);
        assert!(w <= 512.0 + 1e-3 && h <= 400.0 + 1e-3);
        assert!((w / h - 0.75).abs() < 1e-3);
    }

    #[test]
    fn tall_image_scales_on_height_only() {
        let (w, h) = fit_box(200.0, 1000.0, 512.0, 400.0);
        assert_eq!(h, 400.0);
        assert!((w - 80.0).abs() < 1e-3);
    }
}
