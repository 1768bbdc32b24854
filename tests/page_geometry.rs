mod common;

use common::{EpubBuilder, media_boxes, page_contents, shown_text};
use epub_pdf::{Error, PageGeometry, convert_epub_bytes, convert_epub_bytes_with};

fn long_book() -> Vec<u8> {
    let body: String = (1..=60)
        .map(|i| {
            format!(
                "<p>Paragraph {i}: the quick brown fox jumps over the lazy dog, again and \
                 again, until the line is long enough to wrap at least once.</p>"
            )
        })
        .collect();
    EpubBuilder::new().chapter("c", &body).build()
}

#[test]
fn every_page_is_us_letter() {
    let result = convert_epub_bytes(&long_book()).unwrap();
    let boxes = media_boxes(&result.document);
    assert_eq!(boxes.len(), result.page_count);
    assert!(boxes.iter().all(|&b| b == (612.0, 792.0)), "{boxes:?}");
}

#[test]
fn custom_page_size_is_honored() {
    let a4 = PageGeometry {
        page_width: 595.0,
        page_height: 842.0,
        ..PageGeometry::default()
    };
    let result = convert_epub_bytes_with(&long_book(), &a4).unwrap();
    assert!(media_boxes(&result.document).iter().all(|&b| b == (595.0, 842.0)));
}

#[test]
fn text_stays_inside_the_margins() {
    let geometry = PageGeometry::default();
    let result = convert_epub_bytes(&long_book()).unwrap();
    assert!(result.page_count > 1);
    for page in page_contents(&result.document) {
        for shown in shown_text(&page) {
            assert_eq!(shown.x, geometry.margin);
            assert!(shown.y >= geometry.margin, "{shown:?}");
            assert!(shown.y <= geometry.page_height - geometry.margin, "{shown:?}");
        }
    }
}

#[test]
fn wider_margins_need_more_pages() {
    let narrow = convert_epub_bytes(&long_book()).unwrap().page_count;
    let wide = PageGeometry {
        margin: 120.0,
        ..PageGeometry::default()
    };
    let wider = convert_epub_bytes_with(&long_book(), &wide).unwrap().page_count;
    assert!(wider > narrow, "{wider} <= {narrow}");
}

#[test]
fn invalid_geometry_is_rejected_before_parsing() {
    let bad = PageGeometry {
        font_size: 30.0,
        line_height: 36.0,
        ..PageGeometry::default()
    };
    let err = convert_epub_bytes_with(b"not even a zip", &bad).unwrap_err();
    assert!(matches!(err, Error::InvalidGeometry(_)), "{err}");
    assert!(!err.is_fatal_read());
}

#[test]
fn non_finite_geometry_is_rejected() {
    let epub = EpubBuilder::new().chapter("c", "<p>text</p>").build();
    for bad in [
        PageGeometry {
            margin: f32::NAN,
            ..PageGeometry::default()
        },
        PageGeometry {
            max_image_height: f32::INFINITY,
            ..PageGeometry::default()
        },
    ] {
        let err = convert_epub_bytes_with(&epub, &bad).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)), "{err}");
    }
}

#[test]
fn oversized_heading_still_lands_on_a_page() {
    let geometry = PageGeometry {
        page_height: 200.0,
        margin: 20.0,
        ..PageGeometry::default()
    };
    let words = "Enormous ".repeat(80);
    let epub = EpubBuilder::new()
        .chapter("c", &format!("<h1>{words}</h1><p>tail</p>"))
        .build();
    let result = convert_epub_bytes_with(&epub, &geometry).unwrap();
    let pages = page_contents(&result.document);
    assert_eq!(pages.len(), result.page_count);
    assert!(pages.iter().all(|p| !shown_text(p).is_empty()), "no blank pages");
}
