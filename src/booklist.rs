use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::canon;
use crate::db::BookRow;
use crate::parser::dom::Document;
use crate::scraper;

/// Chapter page, print interface (no site chrome around the passage).
pub fn chapter_url(version: &str, short_title: &str, chapter: u32) -> String {
    format!(
        "https://www.biblegateway.com/passage/?search={}%20{}&version={}&interface=print",
        short_title.replace(' ', "%20"),
        chapter,
        version
    )
}

pub fn booklist_url(human_name: &str, version: &str) -> String {
    format!(
        "https://www.biblegateway.com/versions/{}-{}-Bible/#booklist",
        human_name, version
    )
}

/// Fetch the version's booklist page and derive the ordered book manifest.
pub async fn fetch_manifest(human_name: &str, version: &str) -> Result<Vec<BookRow>> {
    let url = booklist_url(human_name, version);
    info!("Fetching booklist: {}", url);
    let html = scraper::fetch_single_page(&url).await?;
    let books = parse_booklist(&html)?;
    info!("Books in manifest: {}", books.len());
    Ok(books)
}

/// Parse the chapterlinks table: one row per book, one titled link per
/// chapter. Books whose titles don't resolve (apocrypha on some versions)
/// are logged and skipped.
pub fn parse_booklist(html: &str) -> Result<Vec<BookRow>> {
    let doc = Document::parse(html)?;
    let table = doc
        .find_first(|el| el.name == "table" && el.has_class("chapterlinks"))
        .context("no chapterlinks table in booklist page")?;

    let mut books = Vec::new();
    for row in doc.find_all_in(table, |el| el.name == "tr") {
        let links = doc.find_all_in(row, |el| el.name == "a" && el.attr("title").is_some());
        let Some(&first) = links.first() else {
            continue;
        };
        let title = doc.element(first).unwrap().attr("title").unwrap().to_string();

        let book_id = match canon::resolve(&title) {
            Ok(ranges) => ranges[0].book,
            Err(_) => {
                warn!("Skipping unrecognized book: {}", title);
                continue;
            }
        };
        let (long_title, short_title) = canon::titles_for(book_id).unwrap();
        books.push(BookRow {
            book_id,
            short_title: short_title.to_string(),
            long_title: long_title.to_string(),
            chapters: links.len() as u32,
        });
    }

    Ok(books)
}

#[derive(Deserialize)]
struct ManifestFile {
    version: String,
    books: Vec<ManifestBook>,
}

#[derive(Deserialize)]
struct ManifestBook {
    name: String,
    chapters: u32,
}

/// Load a previously saved manifest ({"version": .., "books": [{name,
/// chapters}]}) instead of scraping the booklist page.
pub fn load_manifest(path: &Path, version: &str) -> Result<Vec<BookRow>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    parse_manifest_json(&raw, version)
}

fn parse_manifest_json(raw: &str, version: &str) -> Result<Vec<BookRow>> {
    let manifest: ManifestFile = serde_json::from_str(raw).context("invalid manifest JSON")?;
    if manifest.version != version {
        warn!(
            "Manifest is for {}, configured version is {}",
            manifest.version, version
        );
    }

    let mut books = Vec::new();
    for book in manifest.books {
        let Some(book_id) = canon::book_id_for(&book.name) else {
            warn!("Skipping unrecognized book: {}", book.name);
            continue;
        };
        let (long_title, short_title) = canon::titles_for(book_id).unwrap();
        books.push(BookRow {
            book_id,
            short_title: short_title.to_string(),
            long_title: long_title.to_string(),
            chapters: book.chapters,
        });
    }
    Ok(books)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_urls() {
        assert_eq!(
            chapter_url("NRSVUE", "Gen", 1),
            "https://www.biblegateway.com/passage/?search=Gen%201&version=NRSVUE&interface=print"
        );
        assert_eq!(
            chapter_url("ASV", "1 Sam", 2),
            "https://www.biblegateway.com/passage/?search=1%20Sam%202&version=ASV&interface=print"
        );
    }

    #[test]
    fn booklist_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/booklist.html").unwrap();
        let books = parse_booklist(&html).unwrap();
        assert_eq!(books.len(), 3);
        assert_eq!(books[0].book_id, 1);
        assert_eq!(books[0].short_title, "Gen");
        assert_eq!(books[0].chapters, 3);
        // The apocryphal row is skipped, later books survive.
        assert_eq!(books[1].long_title, "Psalms");
        assert_eq!(books[2].short_title, "Matt");
    }

    #[test]
    fn manifest_json() {
        let raw = r#"{
            "version": "NRSVUE",
            "books": [
                {"name": "Genesis", "chapters": 50},
                {"name": "Bel and the Dragon", "chapters": 1},
                {"name": "Exodus", "chapters": 40}
            ]
        }"#;
        let books = parse_manifest_json(raw, "NRSVUE").unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].book_id, 1);
        assert_eq!(books[0].chapters, 50);
        assert_eq!(books[1].short_title, "Exod");
    }

    #[test]
    fn manifest_rejects_garbage() {
        assert!(parse_manifest_json("not json", "NRSVUE").is_err());
    }
}
