use std::collections::HashMap;

use crate::error::Error;
use crate::model::{ManifestEntry, Package, SpineItem};

use super::html::{Tags, decode_entities};
use super::{dir_prefix, resolve_href, strip_fragment};

fn parse_xml(text: &str) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    roxmltree::Document::parse_with_options(text, options)
}

/// Elements are matched by local name so that prefixed (`opf:item`) and
/// default-namespace documents are treated alike.
fn is_element(node: roxmltree::Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn text_of(node: roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn collapse(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Package document path from `META-INF/container.xml`: the `full-path` of
/// the first `rootfile`.
pub(super) fn package_path(container_xml: &str) -> Result<String, Error> {
    let full_path = match parse_xml(container_xml) {
        Ok(xml) => xml
            .descendants()
            .find(|n| is_element(*n, "rootfile"))
            .ok_or_else(|| Error::MalformedContainer("no rootfile element".into()))?
            .attribute("full-path")
            .map(String::from),
        Err(e) => {
            log::warn!("{} is not well-formed ({e}); scanning for rootfile", super::CONTAINER_PATH);
            Tags::new(container_xml)
                .find(|t| t.opens(&["rootfile"]))
                .ok_or_else(|| Error::MalformedContainer(format!("not well-formed XML: {e}")))?
                .attribute("full-path")
        }
    };
    full_path
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::MalformedContainer("rootfile has no full-path".into()))
}

struct RawItem {
    id: String,
    href: String,
    media_type: String,
}

/// What the package document declares, before hrefs are resolved.
#[derive(Default)]
struct Listing {
    items: Vec<RawItem>,
    spine: Vec<String>,
    title: Option<String>,
}

fn read_tree(xml: &roxmltree::Document) -> Listing {
    let items = xml
        .descendants()
        .filter(|n| is_element(*n, "manifest"))
        .flat_map(|m| m.children())
        .filter(|n| is_element(*n, "item"))
        .filter_map(|item| match (item.attribute("id"), item.attribute("href")) {
            (Some(id), Some(href)) => Some(RawItem {
                id: id.to_string(),
                href: href.to_string(),
                media_type: item.attribute("media-type").unwrap_or_default().to_string(),
            }),
            _ => {
                log::debug!("Skipping manifest item without id/href");
                None
            }
        })
        .collect();

    let spine = xml
        .descendants()
        .filter(|n| is_element(*n, "spine"))
        .flat_map(|s| s.children())
        .filter(|n| is_element(*n, "itemref"))
        .filter_map(|n| n.attribute("idref"))
        .map(String::from)
        .collect();

    let title = xml
        .descendants()
        .find(|n| is_element(*n, "title"))
        .and_then(|n| collapse(&text_of(n)));

    Listing { items, spine, title }
}

/// Tag-level reading for package documents that are not well-formed XML
/// (undeclared `dc:` prefix, HTML entities, bare `&`).
fn scan_markup(opf: &str) -> Listing {
    let mut listing = Listing::default();
    let mut in_manifest = false;
    let mut in_spine = false;
    let mut title_start: Option<usize> = None;

    for tag in Tags::new(opf) {
        let opening = !tag.closing && !tag.self_closing;
        match tag.name.as_str() {
            "manifest" => in_manifest = opening,
            "spine" => in_spine = opening,
            "item" if in_manifest && !tag.closing => {
                let (Some(id), Some(href)) = (tag.attribute("id"), tag.attribute("href")) else {
                    log::debug!("Skipping manifest item without id/href");
                    continue;
                };
                listing.items.push(RawItem {
                    id,
                    href,
                    media_type: tag.attribute("media-type").unwrap_or_default(),
                });
            }
            "itemref" if in_spine && !tag.closing => {
                if let Some(idref) = tag.attribute("idref") {
                    listing.spine.push(idref);
                }
            }
            "title" if listing.title.is_none() => {
                if opening {
                    title_start = Some(tag.end);
                } else if tag.closing
                    && let Some(start) = title_start.take()
                {
                    listing.title = collapse(&decode_entities(&opf[start..tag.start]));
                }
            }
            _ => {}
        }
    }
    listing
}

/// Parse the OPF package document. Documents that are not well-formed XML
/// are read tag by tag instead; one with no readable manifest or spine yields
/// an empty package, so the conversion degrades to zero chapters.
pub(super) fn parse_package(opf: &str, opf_path: &str) -> Package {
    let listing = match parse_xml(opf) {
        Ok(xml) => read_tree(&xml),
        Err(e) => {
            log::warn!("Package document {opf_path} is not well-formed ({e}); reading it leniently");
            scan_markup(opf)
        }
    };
    let base_dir = dir_prefix(opf_path);

    let mut manifest: HashMap<String, ManifestEntry> = HashMap::new();
    for item in listing.items {
        let entry = ManifestEntry {
            path: resolve_href(base_dir, strip_fragment(&item.href)),
            id: item.id,
            media_type: item.media_type,
        };
        // Duplicate ids: the last declaration wins.
        manifest.insert(entry.id.clone(), entry);
    }

    let spine: Vec<SpineItem> = listing
        .spine
        .into_iter()
        .map(|id| SpineItem { id })
        .collect();

    if manifest.is_empty() || spine.is_empty() {
        log::warn!(
            "Package document {opf_path} has {} manifest items and {} spine entries",
            manifest.len(),
            spine.len()
        );
    }

    Package {
        manifest,
        spine,
        title: listing.title,
    }
}
