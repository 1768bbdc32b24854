#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Zip the given entries in order, `mimetype` first when present.
pub fn zip_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, stored).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn xhtml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>t</title><style>p {{ color: red; }}</style></head>
<body>
{body}
</body>
</html>"#
    )
}

/// In-memory EPUB laid out as `OEBPS/content.opf` + `OEBPS/text/<id>.xhtml`.
pub struct EpubBuilder {
    title: Option<String>,
    chapters: Vec<(String, String)>,
    spine: Option<Vec<String>>,
    extra_manifest: Vec<(String, String, String)>,
    files: Vec<(String, Vec<u8>)>,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            title: None,
            chapters: Vec::new(),
            spine: None,
            extra_manifest: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Add a chapter; `body` is the inner markup of `<body>`.
    pub fn chapter(mut self, id: &str, body: &str) -> Self {
        self.chapters.push((id.to_string(), body.to_string()));
        self
    }

    /// Override the spine (defaults to chapter insertion order).
    pub fn spine(mut self, ids: &[&str]) -> Self {
        self.spine = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Extra manifest item; `href` is relative to `OEBPS/`.
    pub fn manifest_item(mut self, id: &str, href: &str, media_type: &str) -> Self {
        self.extra_manifest
            .push((id.to_string(), href.to_string(), media_type.to_string()));
        self
    }

    /// Arbitrary archive entry at an absolute archive path.
    pub fn file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.files.push((path.to_string(), data));
        self
    }

    pub fn opf(&self) -> String {
        let mut manifest = String::new();
        for (id, _) in &self.chapters {
            manifest.push_str(&format!(
                "    <item id=\"{id}\" href=\"text/{id}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
            ));
        }
        for (id, href, media_type) in &self.extra_manifest {
            manifest.push_str(&format!(
                "    <item id=\"{id}\" href=\"{href}\" media-type=\"{media_type}\"/>\n"
            ));
        }
        let spine_ids: Vec<String> = match &self.spine {
            Some(ids) => ids.clone(),
            None => self.chapters.iter().map(|(id, _)| id.clone()).collect(),
        };
        let spine: String = spine_ids
            .iter()
            .map(|id| format!("    <itemref idref=\"{id}\"/>\n"))
            .collect();
        let title = self
            .title
            .as_deref()
            .map(|t| format!("<dc:title>{t}</dc:title>"))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{title}</metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>"#
        )
    }

    pub fn build(self) -> Vec<u8> {
        let opf = self.opf();
        let mut owned: Vec<(String, Vec<u8>)> = vec![
            ("mimetype".into(), b"application/epub+zip".to_vec()),
            ("META-INF/container.xml".into(), CONTAINER.as_bytes().to_vec()),
            ("OEBPS/content.opf".into(), opf.into_bytes()),
        ];
        for (id, body) in &self.chapters {
            owned.push((format!("OEBPS/text/{id}.xhtml"), xhtml(body).into_bytes()));
        }
        owned.extend(self.files);
        let entries: Vec<(&str, &[u8])> = owned
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        zip_entries(&entries)
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut data = Vec::new();
    img.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
        .unwrap();
    data
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 40, 200]));
    let mut data = Vec::new();
    img.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Jpeg)
        .unwrap();
    data
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Inflated page content streams, in page order. Image XObject streams are
/// skipped.
pub fn page_contents(pdf: &[u8]) -> Vec<String> {
    let mut contents = Vec::new();
    let mut pos = 0;
    while let Some(start) = find(pdf, b">>\nstream\n", pos) {
        let data_start = start + b">>\nstream\n".len();
        let dict_start = pdf[..start]
            .windows(3)
            .rposition(|w| w == b"obj")
            .unwrap_or(0);
        let dict = String::from_utf8_lossy(&pdf[dict_start..start]);
        let len: usize = dict
            .split("/Length ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse().ok())
            .expect("stream without /Length");
        pos = data_start + len;
        if dict.contains("/Subtype /Image") {
            continue;
        }
        let raw = &pdf[data_start..data_start + len];
        let inflated = miniz_oxide::inflate::decompress_to_vec_zlib(raw).expect("inflate content");
        contents.push(String::from_utf8_lossy(&inflated).into_owned());
    }
    contents
}

#[derive(Debug, Clone)]
pub struct Shown {
    pub font: String,
    pub size: f32,
    pub x: f32,
    pub y: f32,
    pub text: String,
}

fn decode_pdf_string(token: &str) -> String {
    if let Some(hex) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        let bytes: Vec<u8> = (0..hex.len() / 2)
            .filter_map(|i| u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).ok())
            .collect();
        return bytes.iter().map(|&b| b as char).collect();
    }
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(token);
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Text-showing operations of one content stream.
pub fn shown_text(content: &str) -> Vec<Shown> {
    let mut shown = Vec::new();
    let (mut font, mut size, mut x, mut y) = (String::new(), 0.0_f32, 0.0_f32, 0.0_f32);
    for line in content.lines() {
        let line = line.trim();
        if let Some(args) = line.strip_suffix(" Tf") {
            let mut parts = args.split_whitespace();
            font = parts.next().unwrap_or_default().trim_start_matches('/').to_string();
            size = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        } else if let Some(args) = line.strip_suffix(" Td") {
            let nums: Vec<f32> = args.split_whitespace().filter_map(|s| s.parse().ok()).collect();
            if let [dx, dy] = nums[..] {
                x = dx;
                y = dy;
            }
        } else if let Some(arg) = line.strip_suffix(" Tj") {
            shown.push(Shown {
                font: font.clone(),
                size,
                x,
                y,
                text: decode_pdf_string(arg),
            });
        }
    }
    shown
}

/// All text of one page joined with spaces.
pub fn page_text(content: &str) -> String {
    shown_text(content)
        .into_iter()
        .map(|s| s.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `(width, height, x, y)` of every image drawn on a page.
pub fn drawn_images(content: &str) -> Vec<(f32, f32, f32, f32)> {
    let mut images = Vec::new();
    let mut matrix: Option<(f32, f32, f32, f32)> = None;
    for line in content.lines() {
        let line = line.trim();
        if let Some(args) = line.strip_suffix(" cm") {
            let nums: Vec<f32> = args.split_whitespace().filter_map(|s| s.parse().ok()).collect();
            if let [a, _, _, d, e, f] = nums[..] {
                matrix = Some((a, d, e, f));
            }
        } else if line.ends_with(" Do")
            && let Some(m) = matrix.take()
        {
            images.push(m);
        }
    }
    images
}

/// MediaBox `(width, height)` of every page object.
pub fn media_boxes(pdf: &[u8]) -> Vec<(f32, f32)> {
    let text = String::from_utf8_lossy(pdf);
    text.split("/MediaBox [")
        .skip(1)
        .filter_map(|rest| {
            let nums: Vec<f32> = rest
                .split(']')
                .next()?
                .split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect();
            match nums[..] {
                [x0, y0, x1, y1] => Some((x1 - x0, y1 - y0)),
                _ => None,
            }
        })
        .collect()
}

pub fn count_occurrences(pdf: &[u8], needle: &str) -> usize {
    String::from_utf8_lossy(pdf).matches(needle).count()
}
