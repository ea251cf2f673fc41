use std::sync::LazyLock;

use regex::Regex;

use super::dom::{Document, NodeId, NodeKind};
use super::{ChapterCtx, OutputFormat, Problem, ProblemKind, Verse};

static INDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^indent-(\d+)$").unwrap());
static BREAKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^indent-(\d+)-breaks$").unwrap());

const INDENT_MD: &str = "    ";
const INDENT_HTML: &str = "&nbsp;&nbsp;&nbsp;&nbsp;";

/// Rebuild each verse's text from its matched spans, in document order.
/// A verse that comes out empty is recorded as a problem and kept.
pub fn reconstruct(
    ctx: &ChapterCtx,
    doc: &Document,
    verses: &mut [Verse],
    problems: &mut Vec<Problem>,
) {
    for verse in verses.iter_mut() {
        let text = reconstruct_verse(ctx.config.format, doc, &verse.class_token);
        if text.is_empty() {
            problems.push(ctx.problem(Some(verse.verse_id), ProblemKind::EmptyVerseText));
        }
        verse.text = text;
    }
}

fn reconstruct_verse(format: OutputFormat, doc: &Document, token: &str) -> String {
    let spans =
        doc.find_all(|el| el.name == "span" && el.has_class("text") && el.has_class(token));

    let mut acc = String::new();
    let mut poetry_lines = 0usize;

    for span in spans {
        // Section headings, and verse numbers acting as heading parents.
        if let Some(parent) = doc.parent(span) {
            let parent_el = doc.element(parent);
            if parent_el.is_some_and(|el| el.name == "h3" || el.name == "versenum") {
                emit_heading(
                    format,
                    &mut acc,
                    &doc.text_of(span),
                    doc.prev_sibling(parent).is_some(),
                );
                continue;
            }
        }

        if let Some(level) = poetry_indent_level(doc, span) {
            emit_poetry_lead(format, doc, span, level, poetry_lines, &mut acc);
            fold(format, doc, span, &mut acc);
            acc.push('\n');
            poetry_lines += 1;
        } else {
            // A span opening a new paragraph unit.
            if doc.prev_sibling(span).is_none() {
                acc.push_str("¶ ");
            }
            fold(format, doc, span, &mut acc);
        }
    }

    // A heading emitted at the very start of a chapter still carries its
    // sibling-derived newline; drop it.
    if acc.starts_with('\n') {
        acc.remove(0);
    }
    acc
}

/// Indent level for a span inside a poetry block, from the nearest
/// "indent-N" ancestor. None when the span is not inside poetry.
fn poetry_indent_level(doc: &Document, span: NodeId) -> Option<usize> {
    let in_poetry = doc
        .ancestors(span)
        .filter_map(|id| doc.element(id))
        .any(|el| el.name == "div" && el.has_class("poetry"));
    if !in_poetry {
        return None;
    }

    let level = doc
        .ancestors(span)
        .filter_map(|id| doc.element(id))
        .filter(|el| el.name == "span")
        .find_map(|el| {
            el.classes
                .iter()
                .find_map(|c| INDENT_RE.captures(c).and_then(|m| m[1].parse().ok()))
        })
        .unwrap_or(1);
    Some(level)
}

/// What goes in front of a poetry line. The first line of a block, and any
/// line without a spacer before it, gets N indent units; a line preceded by
/// an "indent-N-breaks" spacer keeps that spacer's leading whitespace.
fn emit_poetry_lead(
    format: OutputFormat,
    doc: &Document,
    span: NodeId,
    level: usize,
    poetry_lines: usize,
    acc: &mut String,
) {
    if poetry_lines > 0 {
        if let Some(prev) = doc.prev_sibling(span) {
            let is_spacer = doc
                .element(prev)
                .is_some_and(|el| el.classes.iter().any(|c| BREAKS_RE.is_match(c)));
            if is_spacer {
                acc.push_str(&convert_spacer(format, &doc.text_of(prev)));
                return;
            }
        }
    }
    let unit = match format {
        OutputFormat::Markdown => INDENT_MD,
        OutputFormat::Html => INDENT_HTML,
    };
    acc.push_str(&unit.repeat(level));
}

/// Leading whitespace of a spacer span, rendered per output mode.
fn convert_spacer(format: OutputFormat, spacer_text: &str) -> String {
    spacer_text
        .chars()
        .take_while(|c| *c == ' ' || *c == '\u{a0}')
        .map(|c| match format {
            OutputFormat::Markdown => " ".to_string(),
            OutputFormat::Html if c == '\u{a0}' => "&nbsp;".to_string(),
            OutputFormat::Html => c.to_string(),
        })
        .collect()
}

fn emit_heading(format: OutputFormat, acc: &mut String, text: &str, has_prev_sibling: bool) {
    if has_prev_sibling {
        acc.push('\n');
    }
    match format {
        OutputFormat::Markdown => {
            acc.push_str("**");
            acc.push_str(text);
            acc.push_str("**\n");
        }
        OutputFormat::Html => {
            acc.push_str("<b>");
            acc.push_str(text);
            acc.push_str("</b>\n");
        }
    }
}

/// Depth-first fold of one matched span into the accumulator.
fn fold(format: OutputFormat, doc: &Document, id: NodeId, acc: &mut String) {
    match doc.kind(id) {
        NodeKind::Text(t) => acc.push_str(t),
        NodeKind::Element(el) => {
            if el.has_class("chapternum") || el.has_class("versenum") || el.name == "versenum" {
                // The glyph precedes anything already accumulated; the
                // number itself is dropped.
                if el.has_class("opening") {
                    acc.clear();
                    acc.push_str("¶ ");
                }
            } else if el.name == "sup"
                && (el.has_class("footnote") || el.has_class("crossreference"))
            {
                let marker = doc.text_of(id);
                acc.push_str(&wrap_marker(format, &marker));
                // Marker placement is inconsistent between versions; the
                // wrap above can produce a double space.
                *acc = acc.replace("  ", " ");
            } else if el.has_class("small-caps") {
                acc.push_str(match format {
                    OutputFormat::Markdown => "**LORD**",
                    OutputFormat::Html => "<b>LORD</b>",
                });
            } else {
                for &child in doc.children(id) {
                    fold(format, doc, child, acc);
                }
            }
        }
    }
}

fn wrap_marker(format: OutputFormat, marker: &str) -> String {
    match format {
        OutputFormat::Markdown => marker
            .replace('[', " __[")
            .replace(']', "]__")
            .replace('(', " __(")
            .replace(')', ")__"),
        OutputFormat::Html => marker
            .replace('[', " <i>[")
            .replace(']', "]</i>")
            .replace('(', " <i>(")
            .replace(')', ")</i>"),
    }
}

// ── Tests ──
