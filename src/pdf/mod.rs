mod layout;
mod xobject;

use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, TextStr};

use crate::fonts::{FontStyle, register_standard_fonts};
use crate::images::ImageResolver;
use crate::model::{ChapterMark, ContentBlock, ConversionResult, PageGeometry};

use layout::{render_line, wrap_text};
use xobject::embed_image;

/// Baseline sits this fraction of the font size below the line top.
const ASCENT_RATIO: f32 = 0.75;

const HEADING_ADVANCE_RATIO: f32 = 1.25;

const PRODUCER: &str = concat!("epub-pdf ", env!("CARGO_PKG_VERSION"));

struct RefAlloc {
    next_id: i32,
}

impl RefAlloc {
    fn bump(&mut self) -> Ref {
        let r = Ref::new(self.next_id);
        self.next_id += 1;
        r
    }
}

/// Position of the next unit of content. `vertical_offset` is measured from
/// the top edge of the page.
struct PageCursor {
    vertical_offset: f32,
    page_index: usize,
}

struct OpenChapter {
    id: String,
    title: Option<String>,
    start_page: usize,
    placed: bool,
}

/// Lays content blocks onto pages and assembles the PDF. One instance per
/// conversion.
pub(crate) struct Renderer {
    pdf: Pdf,
    ids: RefAlloc,
    catalog_id: Ref,
    pages_id: Ref,
    fonts: Vec<(FontStyle, Ref)>,
    images: Vec<(String, Ref)>,
    geometry: PageGeometry,
    pages: Vec<Content>,
    current: Content,
    cursor: PageCursor,
    chapters_started: usize,
    chapter: Option<OpenChapter>,
    chapters: Vec<ChapterMark>,
}

impl Renderer {
    pub(crate) fn new(geometry: &PageGeometry) -> Self {
        let mut pdf = Pdf::new();
        let mut ids = RefAlloc { next_id: 1 };
        let catalog_id = ids.bump();
        let pages_id = ids.bump();
        let fonts = register_standard_fonts(&mut pdf, &mut || ids.bump());

        Self {
            pdf,
            ids,
            catalog_id,
            pages_id,
            fonts,
            images: Vec::new(),
            geometry: geometry.clone(),
            pages: Vec::new(),
            current: Content::new(),
            cursor: PageCursor {
                vertical_offset: geometry.margin,
                page_index: 0,
            },
            chapters_started: 0,
            chapter: None,
            chapters: Vec::new(),
        }
    }

    /// Lay out one spine item. Every chapter after the first starts on a fresh
    /// page, whether or not it places anything.
    pub(crate) fn render_chapter(
        &mut self,
        id: &str,
        blocks: &[ContentBlock],
        resolver: &mut ImageResolver,
    ) {
        if self.chapters_started > 0 {
            self.new_page();
        }
        self.chapters_started += 1;
        self.chapter = Some(OpenChapter {
            id: id.to_string(),
            title: None,
            start_page: self.cursor.page_index + 1,
            placed: false,
        });

        for block in blocks {
            match block {
                ContentBlock::Heading { level, text } => self.place_heading(*level, text),
                ContentBlock::Paragraph { text, bold, italic } => {
                    self.place_paragraph(text, FontStyle::from_flags(*bold, *italic))
                }
                ContentBlock::Image { source_ref } => self.place_image(source_ref, resolver),
            }
        }

        if let Some(chapter) = self.chapter.take()
            && chapter.placed
        {
            self.chapters.push(ChapterMark {
                title: chapter.title.unwrap_or(chapter.id),
                start_page: chapter.start_page,
                end_page: self.cursor.page_index + 1,
            });
        } else {
            log::debug!("Chapter {id} placed no content");
        }
    }

    fn place_heading(&mut self, level: u8, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let size = self.geometry.heading_size(level);
        let advance = size * HEADING_ADVANCE_RATIO;

        self.start_content();
        if let Some(chapter) = self.chapter.as_mut()
            && chapter.title.is_none()
        {
            chapter.title = Some(text.to_string());
        }

        self.ensure_space(size + self.geometry.line_height);
        self.cursor.vertical_offset += size / 2.0;

        let lines = wrap_text(text, FontStyle::Bold, size, self.geometry.content_width());
        for line in &lines {
            self.ensure_space(advance);
            let baseline = self.baseline(size);
            render_line(&mut self.current, line, FontStyle::Bold, size, self.geometry.margin, baseline);
            self.cursor.vertical_offset += advance;
        }
        self.cursor.vertical_offset += self.geometry.heading_gap;
    }

    fn place_paragraph(&mut self, text: &str, style: FontStyle) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let size = self.geometry.font_size;
        let line_height = self.geometry.line_height;

        self.start_content();
        let lines = wrap_text(text, style, size, self.geometry.content_width());
        for line in &lines {
            self.ensure_space(line_height);
            let baseline = self.baseline(size);
            render_line(&mut self.current, line, style, size, self.geometry.margin, baseline);
            self.cursor.vertical_offset += line_height;
        }
        self.cursor.vertical_offset += self.geometry.paragraph_gap;
    }

    fn place_image(&mut self, source_ref: &str, resolver: &mut ImageResolver) {
        let img = match resolver.resolve(source_ref) {
            Ok(img) => img,
            Err(e) => {
                log::debug!("Skipping image {source_ref}: {e}");
                return;
            }
        };
        let xobj_ref = match embed_image(&mut self.pdf, &mut || self.ids.bump(), &img) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping image {source_ref}: {e}");
                return;
            }
        };
        let pdf_name = format!("Im{}", self.images.len() + 1);
        self.images.push((pdf_name.clone(), xobj_ref));

        self.start_content();
        self.ensure_space(img.display_height + self.geometry.image_gap);
        let y_bottom =
            self.geometry.page_height - self.cursor.vertical_offset - img.display_height;
        self.current.save_state();
        self.current.transform([
            img.display_width,
            0.0,
            0.0,
            img.display_height,
            self.geometry.margin,
            y_bottom,
        ]);
        self.current.x_object(Name(pdf_name.as_bytes()));
        self.current.restore_state();
        self.cursor.vertical_offset += img.display_height + self.geometry.image_gap;
    }

    /// Called before the first unit of any block is placed.
    fn start_content(&mut self) {
        if let Some(chapter) = self.chapter.as_mut() {
            chapter.placed = true;
        }
    }

    fn at_page_top(&self) -> bool {
        (self.cursor.vertical_offset - self.geometry.margin).abs() < 0.5
    }

    /// Break to a new page when `height` would cross the bottom margin. A unit
    /// taller than the whole content area stays on an empty page.
    fn ensure_space(&mut self, height: f32) {
        let bottom = self.geometry.page_height - self.geometry.margin;
        if self.cursor.vertical_offset + height > bottom && !self.at_page_top() {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        let finished = std::mem::replace(&mut self.current, Content::new());
        self.pages.push(finished);
        self.cursor.page_index += 1;
        self.cursor.vertical_offset = self.geometry.margin;
        log::debug!("Page break, now on page {}", self.cursor.page_index + 1);
    }

    fn baseline(&self, font_size: f32) -> f32 {
        self.geometry.page_height - (self.cursor.vertical_offset + font_size * ASCENT_RATIO)
    }

    /// Assemble the page tree, document info and outline.
    pub(crate) fn finish(self, title: Option<String>) -> ConversionResult {
        let Renderer {
            mut pdf,
            mut ids,
            catalog_id,
            pages_id,
            fonts,
            images,
            geometry,
            mut pages,
            current,
            chapters,
            ..
        } = self;
        pages.push(current);

        let n = pages.len();
        let page_ids: Vec<Ref> = (0..n).map(|_| ids.bump()).collect();
        let content_ids: Vec<Ref> = (0..n).map(|_| ids.bump()).collect();

        for (i, c) in pages.into_iter().enumerate() {
            let raw = c.finish();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
            pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);
        }

        for i in 0..n {
            let mut page = pdf.page(page_ids[i]);
            page.media_box(Rect::new(0.0, 0.0, geometry.page_width, geometry.page_height))
                .parent(pages_id)
                .contents(content_ids[i]);
            let mut resources = page.resources();
            {
                let mut font_dict = resources.fonts();
                for (style, font_ref) in &fonts {
                    font_dict.pair(Name(style.pdf_name().as_bytes()), *font_ref);
                }
            }
            if !images.is_empty() {
                let mut xobjects = resources.x_objects();
                for (name, xobj_ref) in &images {
                    xobjects.pair(Name(name.as_bytes()), *xobj_ref);
                }
            }
        }

        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(n as i32);

        let outline_id = if chapters.is_empty() {
            None
        } else {
            Some(write_outline(&mut pdf, &mut ids, &chapters, &page_ids, geometry.page_height))
        };

        {
            let mut catalog = pdf.catalog(catalog_id);
            catalog.pages(pages_id);
            if let Some(outline_id) = outline_id {
                catalog.outlines(outline_id);
            }
        }

        let info_id = ids.bump();
        {
            let mut info = pdf.document_info(info_id);
            if let Some(title) = &title {
                info.title(TextStr(title));
            }
            info.producer(TextStr(PRODUCER));
        }

        ConversionResult {
            document: pdf.finish(),
            page_count: n,
            title,
            chapters,
        }
    }
}

/// One flat bookmark per chapter, each pointing at the top of its first page.
fn write_outline(
    pdf: &mut Pdf,
    ids: &mut RefAlloc,
    chapters: &[ChapterMark],
    page_ids: &[Ref],
    page_height: f32,
) -> Ref {
    let outline_id = ids.bump();
    let item_ids: Vec<Ref> = chapters.iter().map(|_| ids.bump()).collect();

    for (i, chapter) in chapters.iter().enumerate() {
        let mut item = pdf.outline_item(item_ids[i]);
        item.title(TextStr(&chapter.title));
        item.parent(outline_id);
        if i > 0 {
            item.prev(item_ids[i - 1]);
        }
        if let Some(next) = item_ids.get(i + 1) {
            item.next(*next);
        }
        let page_ref = page_ids[chapter.start_page.saturating_sub(1).min(page_ids.len() - 1)];
        item.dest().page(page_ref).xyz(0.0, page_height, None);
    }

    let mut outline = pdf.outline(outline_id);
    if let (Some(first), Some(last)) = (item_ids.first(), item_ids.last()) {
        outline.first(*first);
        outline.last(*last);
    }
    outline.count(item_ids.len() as i32);
    outline_id
}
