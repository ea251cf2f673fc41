use std::sync::LazyLock;

use regex::Regex;

use super::dom::{Document, NodeId, NodeKind};
use super::{resolve_locator, Annotation, ChapterCtx, OutputFormat, Problem, ProblemKind, Verse};

/// Entry ids look like "fen-NRSVUE-30261a"; the trailing lowercase run is
/// the letter code distinguishing multiple footnotes on one verse.
static LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+-[A-Za-z]+-\d+([a-z]+)").unwrap());

/// Attach the chapter's out-of-line footnotes to the verses they annotate.
pub fn link(
    ctx: &ChapterCtx,
    doc: &Document,
    verses: &mut [Verse],
    problems: &mut Vec<Problem>,
) {
    let Some(container) = doc.find_first(|el| el.name == "div" && el.has_class("footnotes"))
    else {
        return;
    };

    for li in doc.find_all_in(container, |el| el.name == "li") {
        let el = doc.element(li).unwrap();
        let id_attr = el.id.clone().unwrap_or_default();
        let Some(letter) = LETTER_RE
            .captures(&id_attr)
            .map(|caps| caps[1].to_string())
        else {
            problems.push(ctx.problem(None, ProblemKind::MalformedIdentifier(id_attr)));
            continue;
        };

        let Some(anchor) = doc.find_first_in(li, |el| el.name == "a") else {
            problems.push(ctx.problem(None, ProblemKind::MalformedIdentifier(id_attr)));
            continue;
        };
        let locator = doc.text_of(anchor);

        let mut body = String::new();
        if let Some(text_span) =
            doc.find_first_in(li, |el| el.name == "span" && el.has_class("footnote-text"))
        {
            for &child in doc.children(text_span) {
                format_note(ctx.config.format, doc, child, &mut body);
            }
        }

        match resolve_locator(ctx, &locator) {
            Ok(ranges) => {
                for verse in verses.iter_mut() {
                    if ranges.iter().any(|r| r.contains(verse.verse_id)) {
                        verse.footnotes.push(Annotation {
                            letter: letter.clone(),
                            text: body.clone(),
                        });
                    }
                }
            }
            Err(_) => {
                problems.push(ctx.problem(None, ProblemKind::UnresolvedReference(locator)));
            }
        }
    }
}

/// Fold a footnote body node: italics are emphasis-wrapped, small-caps
/// become LORD, anchors become double-bracket reference literals, plain
/// text passes through.
fn format_note(format: OutputFormat, doc: &Document, id: NodeId, acc: &mut String) {
    match doc.kind(id) {
        NodeKind::Text(t) => acc.push_str(t),
        NodeKind::Element(el) => {
            if el.name == "i" {
                let inner = doc.text_of(id);
                match format {
                    OutputFormat::Markdown => {
                        acc.push_str("__");
                        acc.push_str(&inner);
                        acc.push_str("__");
                    }
                    OutputFormat::Html => {
                        acc.push_str("<i>");
                        acc.push_str(&inner);
                        acc.push_str("</i>");
                    }
                }
            } else if el.has_class("small-caps") {
                acc.push_str(match format {
                    OutputFormat::Markdown => "**LORD**",
                    OutputFormat::Html => "<b>LORD</b>",
                });
            } else if el.name == "a" {
                acc.push_str("[[");
                acc.push_str(&doc.text_of(id));
                acc.push_str("]]");
            } else {
                for &child in doc.children(id) {
                    format_note(format, doc, child, acc);
                }
            }
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{OutputFormat, ParseConfig};

    fn run(html: &str, version: &str, verses: &mut [Verse]) -> Vec<Problem> {
        let config = ParseConfig::new(version, OutputFormat::Markdown);
        let ctx = ChapterCtx {
            config: &config,
            book_id: 1,
            chapter: 1,
        };
        let doc = Document::parse(html).unwrap();
        let mut problems = Vec::new();
        link(&ctx, &doc, verses, &mut problems);
        problems
    }

    #[test]
    fn dotted_pair_locator_attaches_by_letter() {
        let html = r##"<div class="footnotes"><ol>
            <li id="fen-NRSVUE-30261a"><a href="#">1.1</a> <span class="footnote-text">Or <i>when God began to create</i></span></li>
        </ol></div>"##;
        let mut verses = vec![Verse::new(1001001, "NRSVUE", "Gen-1-1")];
        let problems = run(html, "NRSVUE", &mut verses);
        assert!(problems.is_empty());
        assert_eq!(
            verses[0].footnotes,
            [Annotation {
                letter: "a".to_string(),
                text: "Or __when God began to create__".to_string(),
            }]
        );
    }

    #[test]
    fn qualified_locator_resolves_directly() {
        let html = r##"<div class="footnotes"><ol>
            <li id="fen-ASV-1b"><a href="#">Genesis 1:2</a> <span class="footnote-text">Or: Spirit</span></li>
        </ol></div>"##;
        let mut verses = vec![
            Verse::new(1001001, "ASV", "Gen-1-1"),
            Verse::new(1001002, "ASV", "Gen-1-2"),
        ];
        let problems = run(html, "ASV", &mut verses);
        assert!(problems.is_empty());
        assert!(verses[0].footnotes.is_empty());
        assert_eq!(verses[1].footnotes[0].letter, "b");
        assert_eq!(verses[1].footnotes[0].text, "Or: Spirit");
    }

    #[test]
    fn qualified_falls_back_to_short_title() {
        // A bare "1:2" is not resolvable on its own.
        let html = r##"<div class="footnotes"><ol>
            <li id="fen-ASV-1a"><a href="#">1:2</a> <span class="footnote-text">note</span></li>
        </ol></div>"##;
        let mut verses = vec![Verse::new(1001002, "ASV", "Gen-1-2")];
        let problems = run(html, "ASV", &mut verses);
        assert!(problems.is_empty());
        assert_eq!(verses[0].footnotes.len(), 1);
    }

    #[test]
    fn range_locator_attaches_to_every_verse_in_range() {
        let html = r##"<div class="footnotes"><ol>
            <li id="fen-NRSVUE-1a"><a href="#">1.2-3</a> <span class="footnote-text">spans two</span></li>
        </ol></div>"##;
        let mut verses = vec![
            Verse::new(1001001, "NRSVUE", "Gen-1-1"),
            Verse::new(1001002, "NRSVUE", "Gen-1-2"),
            Verse::new(1001003, "NRSVUE", "Gen-1-3"),
        ];
        run(html, "NRSVUE", &mut verses);
        assert!(verses[0].footnotes.is_empty());
        assert_eq!(verses[1].footnotes.len(), 1);
        assert_eq!(verses[2].footnotes.len(), 1);
    }

    #[test]
    fn small_caps_and_anchor_in_body() {
        let html = r##"<div class="footnotes"><ol>
            <li id="fen-NRSVUE-1a"><a href="#">1.1</a> <span class="footnote-text">See <a href="#x">Exod 3:15</a>, <span class="small-caps">Lord</span></span></li>
        </ol></div>"##;
        let mut verses = vec![Verse::new(1001001, "NRSVUE", "Gen-1-1")];
        run(html, "NRSVUE", &mut verses);
        assert_eq!(verses[0].footnotes[0].text, "See [[Exod 3:15]], **LORD**");
    }

    #[test]
    fn unresolvable_locator_is_a_problem() {
        let html = r##"<div class="footnotes"><ol>
            <li id="fen-NRSVUE-1a"><a href="#">banana</a> <span class="footnote-text">x</span></li>
        </ol></div>"##;
        let mut verses = vec![Verse::new(1001001, "NRSVUE", "Gen-1-1")];
        let problems = run(html, "NRSVUE", &mut verses);
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            problems[0].kind,
            ProblemKind::UnresolvedReference(_)
        ));
        assert!(verses[0].footnotes.is_empty());
    }

    #[test]
    fn malformed_entry_id_is_a_problem() {
        let html = r##"<div class="footnotes"><ol>
            <li id="nonsense"><a href="#">1.1</a> <span class="footnote-text">x</span></li>
        </ol></div>"##;
        let mut verses = vec![Verse::new(1001001, "NRSVUE", "Gen-1-1")];
        let problems = run(html, "NRSVUE", &mut verses);
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            problems[0].kind,
            ProblemKind::MalformedIdentifier(_)
        ));
    }

    #[test]
    fn no_footnote_container_is_fine() {
        let mut verses = vec![Verse::new(1001001, "NRSVUE", "Gen-1-1")];
        let problems = run("<div><p>nothing here</p></div>", "NRSVUE", &mut verses);
        assert!(problems.is_empty());
    }
}
