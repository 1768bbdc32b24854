use pdf_writer::{Content, Name, Str};

use crate::fonts::{FontStyle, to_winansi_bytes};

pub(super) struct TextLine {
    pub(super) text: String,
    pub(super) width: f32,
}

fn flush(lines: &mut Vec<TextLine>, text: &mut String, width: &mut f32) {
    lines.push(TextLine {
        text: std::mem::take(text),
        width: *width,
    });
    *width = 0.0;
}

/// Greedy word wrap. Each `\n` starts a new line (blank lines are kept), and
/// a word wider than `max_width` is broken between characters.
pub(super) fn wrap_text(
    text: &str,
    style: FontStyle,
    font_size: f32,
    max_width: f32,
) -> Vec<TextLine> {
    let space_w = style.text_width(" ", font_size);
    let mut lines: Vec<TextLine> = Vec::new();

    for hard_line in text.split('\n') {
        let mut current = String::new();
        let mut current_w = 0.0_f32;
        let mut words = hard_line.split_whitespace().peekable();

        if words.peek().is_none() {
            lines.push(TextLine {
                text: String::new(),
                width: 0.0,
            });
            continue;
        }

        for word in words {
            let word_w = style.text_width(word, font_size);

            if word_w > max_width {
                if !current.is_empty() {
                    flush(&mut lines, &mut current, &mut current_w);
                }
                for ch in word.chars() {
                    let ch_w = style.text_width(ch.encode_utf8(&mut [0; 4]), font_size);
                    if !current.is_empty() && current_w + ch_w > max_width {
                        flush(&mut lines, &mut current, &mut current_w);
                    }
                    current.push(ch);
                    current_w += ch_w;
                }
                continue;
            }

            if current.is_empty() {
                current.push_str(word);
                current_w = word_w;
            } else if current_w + space_w + word_w <= max_width {
                current.push(' ');
                current.push_str(word);
                current_w += space_w + word_w;
            } else {
                flush(&mut lines, &mut current, &mut current_w);
                current.push_str(word);
                current_w = word_w;
            }
        }

        if !current.is_empty() {
            flush(&mut lines, &mut current, &mut current_w);
        }
    }

    lines
}

/// Emit one line of text with its baseline at `baseline_y`.
pub(super) fn render_line(
    content: &mut Content,
    line: &TextLine,
    style: FontStyle,
    font_size: f32,
    x: f32,
    baseline_y: f32,
) {
    let bytes = to_winansi_bytes(&line.text);
    if bytes.is_empty() {
        return;
    }
    content.begin_text();
    content.set_font(Name(style.pdf_name().as_bytes()), font_size);
    content.next_line(x, baseline_y);
    content.show(Str(&bytes));
    content.end_text();
}
