mod epub;
mod error;
mod fonts;
mod images;
mod model;
mod pdf;

pub use error::Error;
pub use model::{ChapterMark, ConversionResult, PageGeometry};

use std::path::Path;
use std::time::Instant;

use epub::Archive;
use images::ImageResolver;
use model::ContentBlock;
use pdf::Renderer;

/// Convert an in-memory EPUB with the default letter-size geometry.
pub fn convert_epub_bytes(input: &[u8]) -> Result<ConversionResult, Error> {
    convert_epub_bytes_with(input, &PageGeometry::default())
}

/// Convert an in-memory EPUB. Only an unreadable archive, container or package
/// document fails the conversion; broken chapters and images are skipped.
pub fn convert_epub_bytes_with(
    input: &[u8],
    geometry: &PageGeometry,
) -> Result<ConversionResult, Error> {
    let t0 = Instant::now();
    geometry.validate()?;

    let mut archive = Archive::open(input)?;
    let package = epub::read_package(&mut archive)?;
    let t_parse = t0.elapsed();

    let mut renderer = Renderer::new(geometry);
    for item in &package.spine {
        let Some(entry) = package.manifest.get(&item.id) else {
            log::warn!("Spine item {} has no manifest entry, skipping", item.id);
            continue;
        };

        let blocks = if entry.media_type.starts_with("image/") {
            vec![ContentBlock::Image {
                source_ref: format!("/{}", entry.path),
            }]
        } else {
            match archive.read_text(&entry.path) {
                Ok(markup) => epub::segment_chapter(&markup),
                Err(e) => {
                    log::warn!("Chapter {} is unreadable ({e}), skipping", entry.id);
                    continue;
                }
            }
        };

        let mut resolver =
            ImageResolver::new(&mut archive, epub::dir_prefix(&entry.path), geometry);
        renderer.render_chapter(&entry.id, &blocks, &mut resolver);
    }
    let t_layout = t0.elapsed();

    let result = renderer.finish(package.title);
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms, layout={:.1}ms, assemble={:.1}ms, total={:.1}ms ({} pages, {} chapters, output {} bytes)",
        t_parse.as_secs_f64() * 1000.0,
        (t_layout - t_parse).as_secs_f64() * 1000.0,
        (t_total - t_layout).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        result.page_count,
        result.chapters.len(),
        result.document.len(),
    );

    Ok(result)
}

/// Convert the EPUB at `input` and write the PDF to `output`.
pub fn convert_epub_to_pdf(input: &Path, output: &Path) -> Result<ConversionResult, Error> {
    let bytes = std::fs::read(input)?;
    let result = convert_epub_bytes(&bytes)?;
    std::fs::write(output, &result.document)?;
    Ok(result)
}
