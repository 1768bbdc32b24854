//! Chapter markup to content blocks.
//!
//! Real-world EPUB chapters are frequently not well-formed, so this is a
//! forgiving tag scanner rather than an XML parser: unmatched tags are
//! ignored, unknown entities are kept verbatim, and nothing here can fail.

use std::collections::HashMap;

use crate::model::ContentBlock;

const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "tr", "dt", "dd",
];

/// Elements dropped together with their content.
const DISCARDED_TAGS: &[&str] = &["script", "style", "head"];

/// Tags that separate words when stripped out of a block's text.
const SPACING_TAGS: &[&str] = &[
    "p", "div", "li", "tr", "td", "th", "dt", "dd", "blockquote", "h1", "h2", "h3", "h4", "h5",
    "h6",
];

pub(super) struct Tag<'a> {
    pub(super) start: usize,
    pub(super) end: usize, // one past '>'
    /// Lowercase local name; `!` for comments, doctypes and processing instructions.
    pub(super) name: String,
    pub(super) closing: bool,
    pub(super) self_closing: bool,
    attrs: &'a str,
}

impl Tag<'_> {
    pub(super) fn opens(&self, names: &[&str]) -> bool {
        !self.closing && names.contains(&self.name.as_str())
    }
}

fn is_name_end(b: u8) -> bool {
    b == b'>' || b == b'/' || b.is_ascii_whitespace()
}

/// Iterator over the tags of a markup string.
pub(super) struct Tags<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tags<'a> {
    pub(super) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Position of the `>` closing the tag body starting at `from`, honoring quotes.
    fn tag_end(&self, from: usize) -> Option<usize> {
        let bytes = self.src.as_bytes();
        let mut quote: Option<u8> = None;
        for (i, &b) in bytes.iter().enumerate().skip(from) {
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'\'' => quote = Some(b),
                None if b == b'>' => return Some(i),
                None => {}
            }
        }
        None
    }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        let bytes = self.src.as_bytes();
        loop {
            let start = self.pos + self.src.get(self.pos..)?.find('<')?;
            let rest = &self.src[start..];

            if rest.starts_with("<!--") {
                let end = rest.find("-->").map_or(self.src.len(), |i| start + i + 3);
                self.pos = end;
                return Some(Tag::other(start, end));
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest.find('>').map_or(self.src.len(), |i| start + i + 1);
                self.pos = end;
                return Some(Tag::other(start, end));
            }

            let closing = bytes.get(start + 1) == Some(&b'/');
            let name_start = start + if closing { 2 } else { 1 };
            let mut name_end = name_start;
            while name_end < bytes.len()
                && (bytes[name_end].is_ascii_alphanumeric()
                    || matches!(bytes[name_end], b':' | b'-' | b'_' | b'.'))
            {
                name_end += 1;
            }
            if name_end == name_start
                || !bytes[name_start].is_ascii_alphabetic()
                || bytes.get(name_end).is_some_and(|b| !is_name_end(*b))
            {
                // A stray '<' in text.
                self.pos = start + 1;
                continue;
            }

            let Some(gt) = self.tag_end(name_end) else {
                self.pos = self.src.len();
                return None;
            };
            let raw_name = &self.src[name_start..name_end];
            let local = raw_name.rsplit(':').next().unwrap_or(raw_name);
            let attrs = &self.src[name_end..gt];
            self.pos = gt + 1;
            return Some(Tag {
                start,
                end: gt + 1,
                name: local.to_ascii_lowercase(),
                closing,
                self_closing: attrs.trim_end().ends_with('/'),
                attrs,
            });
        }
    }
}

impl Tag<'_> {
    fn other(start: usize, end: usize) -> Tag<'static> {
        Tag {
            start,
            end,
            name: "!".into(),
            closing: false,
            self_closing: true,
            attrs: "",
        }
    }

    /// Value of an attribute, matched case-insensitively, entity-decoded.
    pub(super) fn attribute(&self, key: &str) -> Option<String> {
        let bytes = self.attrs.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
                i += 1;
            }
            let name_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'/') {
                i += 1;
            }
            let name = &self.attrs[name_start..i];
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let value = if bytes.get(i) == Some(&b'=') {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                match bytes.get(i) {
                    Some(&q) if q == b'"' || q == b'\'' => {
                        let value_start = i + 1;
                        let value_end = self.attrs[value_start..]
                            .find(q as char)
                            .map_or(bytes.len(), |e| value_start + e);
                        i = value_end + 1;
                        &self.attrs[value_start..value_end]
                    }
                    _ => {
                        let value_start = i;
                        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                            i += 1;
                        }
                        &self.attrs[value_start..i]
                    }
                }
            } else {
                ""
            };
            if !name.is_empty() && name.eq_ignore_ascii_case(key) {
                return Some(decode_entities(value));
            }
            if name.is_empty() && i == name_start {
                i += 1;
            }
        }
        None
    }
}

/// First `</name ...>` at or after `from`, case-insensitive. Raw substring
/// search, so script bodies containing `<` cannot derail it.
fn find_close_tag(src: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = src.as_bytes();
    let mut i = from;
    while let Some(off) = src.get(i..)?.find("</") {
        let start = i + off;
        let name_start = start + 2;
        let name_end = name_start + name.len();
        if bytes
            .get(name_start..name_end)
            .is_some_and(|n| n.eq_ignore_ascii_case(name.as_bytes()))
            && bytes.get(name_end).is_none_or(|b| is_name_end(*b))
        {
            let end = src[name_end..]
                .find('>')
                .map_or(src.len(), |g| name_end + g + 1);
            return Some((start, end));
        }
        i = start + 2;
    }
    None
}

/// Remove comments, doctypes and discarded elements with their content. An
/// unterminated discarded element swallows the rest of the document.
fn strip_discarded(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut copied = 0;
    let mut tags = Tags::new(markup);
    while let Some(tag) = tags.next() {
        if tag.name == "!" {
            out.push_str(&markup[copied..tag.start]);
            copied = tag.end;
            continue;
        }
        if !tag.opens(DISCARDED_TAGS) {
            continue;
        }
        out.push_str(&markup[copied..tag.start]);
        if tag.self_closing {
            copied = tag.end;
            continue;
        }
        match find_close_tag(markup, tag.end, &tag.name) {
            Some((_, close_end)) => {
                copied = close_end;
                tags.seek(close_end);
            }
            None => {
                copied = markup.len();
                break;
            }
        }
    }
    out.push_str(&markup[copied..]);
    out
}

fn image_source(tag: &Tag) -> Option<String> {
    let src = match tag.name.as_str() {
        "img" => tag.attribute("src"),
        "image" => tag.attribute("href").or_else(|| tag.attribute("xlink:href")),
        _ => None,
    }?;
    let src = src.trim();
    (!src.is_empty()).then(|| src.to_string())
}

/// Visible text of a markup fragment: tags stripped, `<br>` as newline,
/// entities decoded, whitespace normalized.
fn text_content(fragment: &str) -> String {
    let mut raw = String::with_capacity(fragment.len());
    let mut copied = 0;
    for tag in Tags::new(fragment) {
        push_source_text(&mut raw, &fragment[copied..tag.start]);
        if tag.name == "br" && !tag.closing {
            raw.push('\n');
        } else if SPACING_TAGS.contains(&tag.name.as_str()) {
            raw.push(' ');
        }
        copied = tag.end;
    }
    push_source_text(&mut raw, &fragment[copied..]);
    normalize_whitespace(&decode_entities(&raw))
}

/// Newlines in the source are formatting, not line breaks.
fn push_source_text(out: &mut String, text: &str) {
    out.extend(text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
}

/// Collapse whitespace within lines, trim around newlines, allow at most one
/// blank line in a row, and trim the ends.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let joined = text
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let mut out = String::with_capacity(joined.len());
    let mut newlines = 0;
    for ch in joined.trim_matches('\n').chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

pub(crate) fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail[1..]
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 32)
            .and_then(|semi| decode_entity(&tail[1..=semi]).map(|ch| (ch, semi + 2)));
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "laquo" => '\u{AB}',
        "raquo" => '\u{BB}',
        "bull" => '\u{2022}',
        "middot" => '\u{B7}',
        "copy" => '\u{A9}',
        "reg" => '\u{AE}',
        "trade" => '\u{2122}',
        "deg" => '\u{B0}',
        "euro" => '\u{20AC}',
        "aacute" => '\u{E1}',
        "agrave" => '\u{E0}',
        "acirc" => '\u{E2}',
        "auml" => '\u{E4}',
        "ccedil" => '\u{E7}',
        "eacute" => '\u{E9}',
        "egrave" => '\u{E8}',
        "ecirc" => '\u{EA}',
        "iacute" => '\u{ED}',
        "iuml" => '\u{EF}',
        "ntilde" => '\u{F1}',
        "oacute" => '\u{F3}',
        "ouml" => '\u{F6}',
        "uacute" => '\u{FA}',
        "uuml" => '\u{FC}',
        "szlig" => '\u{DF}',
        _ => return None,
    })
}

struct BlockSpan {
    name: String,
    start: usize,
    inner_start: usize,
    inner_end: usize,
    end: usize,
}

/// Split one chapter's markup into content blocks in reading order.
pub(crate) fn segment_chapter(markup: &str) -> Vec<ContentBlock> {
    let clean = strip_discarded(markup);

    let images: Vec<(usize, String)> = Tags::new(&clean)
        .filter(|t| !t.closing)
        .filter_map(|t| image_source(&t).map(|src| (t.start, src)))
        .collect();

    let mut spans: Vec<BlockSpan> = Vec::new();
    // Per name, the offset from which no close tag follows.
    let mut unclosed: HashMap<String, usize> = HashMap::new();
    let mut tags = Tags::new(&clean);
    while let Some(tag) = tags.next() {
        if !tag.opens(BLOCK_TAGS) || tag.self_closing {
            continue;
        }
        if unclosed.get(&tag.name).is_some_and(|&from| tag.end >= from) {
            continue;
        }
        let Some((close_start, close_end)) = find_close_tag(&clean, tag.end, &tag.name) else {
            unclosed.insert(tag.name, tag.end);
            continue;
        };
        spans.push(BlockSpan {
            name: tag.name,
            start: tag.start,
            inner_start: tag.end,
            inner_end: close_start,
            end: close_end,
        });
        tags.seek(close_end);
    }

    // (position, block); blocks sharing a position keep insertion order.
    let mut positioned: Vec<(usize, ContentBlock)> = Vec::new();

    if spans.is_empty() {
        let text = text_content(&clean);
        if !text.is_empty() {
            positioned.push((
                0,
                ContentBlock::Paragraph {
                    text,
                    bold: false,
                    italic: false,
                },
            ));
        }
    }

    for span in &spans {
        for (_, src) in images.iter().filter(|(pos, _)| (span.start..span.end).contains(pos)) {
            positioned.push((
                span.start,
                ContentBlock::Image {
                    source_ref: src.clone(),
                },
            ));
        }
        let inner = &clean[span.inner_start..span.inner_end];
        let text = text_content(inner);
        if text.is_empty() {
            continue;
        }
        let block = match heading_level(&span.name) {
            Some(level) => ContentBlock::Heading { level, text },
            None => {
                let (bold, italic) = inline_emphasis(inner);
                ContentBlock::Paragraph { text, bold, italic }
            }
        };
        positioned.push((span.start, block));
    }

    for (pos, src) in &images {
        let enclosed = spans.iter().any(|s| (s.start..s.end).contains(pos));
        if !enclosed {
            positioned.push((
                *pos,
                ContentBlock::Image {
                    source_ref: src.clone(),
                },
            ));
        }
    }

    positioned.sort_by_key(|(pos, _)| *pos);
    positioned.into_iter().map(|(_, block)| block).collect()
}

/// `h1`..`h6` capped to display levels 1..=4.
fn heading_level(name: &str) -> Option<u8> {
    let digit = name.strip_prefix('h')?;
    let level: u8 = digit.parse().ok()?;
    (1..=6).contains(&level).then(|| level.min(4))
}

fn inline_emphasis(inner: &str) -> (bool, bool) {
    let mut bold = false;
    let mut italic = false;
    for tag in Tags::new(inner).filter(|t| !t.closing) {
        match tag.name.as_str() {
            "b" | "strong" => bold = true,
            "i" | "em" => italic = true,
            _ => {}
        }
    }
    (bold, italic)
}
