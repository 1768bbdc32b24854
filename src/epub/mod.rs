mod html;
mod package;

use std::io::{Cursor, Read};

use percent_encoding::percent_decode_str;

use crate::error::Error;
use crate::model::Package;

pub(crate) use html::segment_chapter;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Upper bound on the buffer reserved up front for an entry. The declared
/// size comes from the archive and may be arbitrarily large.
const MAX_PREALLOC: u64 = 64 << 20;

fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// An EPUB held entirely in memory, addressable by entry path.
pub(crate) struct Archive<'a> {
    zip: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Archive<'a> {
    pub(crate) fn open(bytes: &'a [u8]) -> Result<Self, Error> {
        let zip = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| Error::InvalidEpub("file is not a ZIP archive".into()))?;
        Ok(Self { zip })
    }

    /// Read an entry's bytes. Producers are inconsistent about percent-encoding
    /// hrefs, so a miss on the exact path is retried with the decoded path.
    pub(crate) fn read_binary(&mut self, path: &str) -> Result<Vec<u8>, Error> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if let Some(data) = self.read_entry(path) {
            return Ok(data);
        }
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        if decoded != path
            && let Some(data) = self.read_entry(&decoded)
        {
            return Ok(data);
        }
        Err(Error::MissingEntry(path.to_string()))
    }

    pub(crate) fn read_text(&mut self, path: &str) -> Result<String, Error> {
        let data = self.read_binary(path)?;
        let body = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&data);
        Ok(String::from_utf8_lossy(body).into_owned())
    }

    fn read_entry(&mut self, name: &str) -> Option<Vec<u8>> {
        let mut entry = self.zip.by_name(name).ok()?;
        let mut data = Vec::with_capacity(prealloc_len(entry.size()));
        if let Err(e) = entry.read_to_end(&mut data) {
            log::warn!("Archive entry {name} is unreadable: {e}");
            return None;
        }
        Some(data)
    }
}

/// Locate and parse the package document. Failing to find either the
/// container descriptor or the package document is fatal.
pub(crate) fn read_package(archive: &mut Archive) -> Result<Package, Error> {
    let container = archive.read_text(CONTAINER_PATH)?;
    let opf_path = package::package_path(&container)?;
    let opf = archive.read_text(&opf_path)?;
    Ok(package::parse_package(&opf, &opf_path))
}

/// Directory part of an archive path, including the trailing slash.
pub(crate) fn dir_prefix(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

/// Resolve `href` against `base_dir`, normalizing `.` and `..` segments.
/// A leading slash refers to the archive root.
pub(crate) fn resolve_href(base_dir: &str, href: &str) -> String {
    let joined = match href.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}{href}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

pub(crate) fn strip_fragment(href: &str) -> &str {
    href.split('#').next().unwrap_or(href)
}
