use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::dom::Document;
use super::{ChapterCtx, Verse};
use crate::canon;

/// Verse class tokens encode book-chapter-verse, e.g. "Gen-1-1".
static CLASS_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)-(\d+)-(\d+)$").unwrap());

/// Scan the chapter for verse-classed elements and build the ordered,
/// deduplicated list of empty verse records. Tokens that don't match the
/// grammar are skipped silently; tokens whose book part doesn't resolve
/// are logged and skipped.
pub fn segment(ctx: &ChapterCtx, doc: &Document) -> Vec<Verse> {
    let mut seen: HashSet<u32> = HashSet::new();
    let mut verses = Vec::new();

    for id in doc.find_all(|el| el.has_class("text")) {
        let el = doc.element(id).unwrap();
        for token in &el.classes {
            let Some((book_name, chapter, verse)) = parse_class_token(token) else {
                continue;
            };
            let Some(book) = canon::book_id_for(book_name) else {
                debug!("skipping class token with unknown book: {}", token);
                continue;
            };
            let verse_id = canon::verse_id(book, chapter, verse);
            if seen.insert(verse_id) {
                verses.push(Verse::new(verse_id, &ctx.config.version, token));
            }
            break;
        }
    }

    verses
}

/// Split a class token into (book name, chapter, verse).
pub fn parse_class_token(token: &str) -> Option<(&str, u32, u32)> {
    let caps = CLASS_TOKEN_RE.captures(token)?;
    let book = caps.get(1).unwrap().as_str();
    let chapter = caps[2].parse().ok()?;
    let verse = caps[3].parse().ok()?;
    Some((book, chapter, verse))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{OutputFormat, ParseConfig};

    fn ctx(config: &ParseConfig) -> ChapterCtx {
        ChapterCtx {
            config,
            book_id: 1,
            chapter: 1,
        }
    }

    #[test]
    fn class_token_grammar() {
        assert_eq!(parse_class_token("Gen-1-1"), Some(("Gen", 1, 1)));
        assert_eq!(parse_class_token("1Cor-13-4"), Some(("1Cor", 13, 4)));
        assert_eq!(parse_class_token("text"), None);
        assert_eq!(parse_class_token("indent-1-breaks"), None);
    }

    #[test]
    fn dedupes_preserving_first_occurrence() {
        let html = r#"
            <p>
              <span class="text Gen-1-2">second</span>
              <span class="text Gen-1-1">first</span>
              <span class="text Gen-1-2">second again</span>
            </p>"#;
        let config = ParseConfig::new("NRSVUE", OutputFormat::Markdown);
        let doc = Document::parse(html).unwrap();
        let verses = segment(&ctx(&config), &doc);
        let ids: Vec<u32> = verses.iter().map(|v| v.verse_id).collect();
        assert_eq!(ids, [1001002, 1001001]);
        assert_eq!(verses[0].class_token, "Gen-1-2");
        assert!(verses.iter().all(|v| v.text.is_empty()));
    }

    #[test]
    fn malformed_and_unknown_tokens_skipped() {
        let html = r#"
            <p>
              <span class="text">no token</span>
              <span class="text Frob-1-1">unknown book</span>
              <span class="text Gen-2-3">good</span>
            </p>"#;
        let config = ParseConfig::new("NRSVUE", OutputFormat::Markdown);
        let doc = Document::parse(html).unwrap();
        let verses = segment(&ctx(&config), &doc);
        assert_eq!(verses.len(), 1);
        assert_eq!(verses[0].verse_id, 1002003);
    }

    #[test]
    fn no_verse_elements_no_verses() {
        let config = ParseConfig::new("NRSVUE", OutputFormat::Markdown);
        let doc = Document::parse("<div><p>plain prose</p></div>").unwrap();
        assert!(segment(&ctx(&config), &doc).is_empty());
    }
}
