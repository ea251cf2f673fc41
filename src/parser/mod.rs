pub mod crossrefs;
pub mod dom;
pub mod footnotes;
pub mod segment;
pub mod text;

use anyhow::Result;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Html,
}

/// How a version's footnote/crossref locators are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStyle {
    /// Bare dotted numeric pairs ("10.15"); the book's short title has to
    /// be prepended before resolution. NRSVUE writes these.
    DottedPair,
    /// Fully qualified references ("Genesis 1:1"), resolvable directly.
    /// ASV writes these.
    Qualified,
}

#[derive(Debug, Clone, Copy)]
pub struct VersionProfile {
    pub locator_style: LocatorStyle,
    /// Whether the version keeps a single crossref letter group per page;
    /// a mid-list change is then an anomaly worth recording.
    pub single_crossref_group: bool,
}

impl VersionProfile {
    pub fn for_version(abbrev: &str) -> VersionProfile {
        match abbrev {
            "NRSVUE" | "NRSV" => VersionProfile {
                locator_style: LocatorStyle::DottedPair,
                single_crossref_group: false,
            },
            "ASV" => VersionProfile {
                locator_style: LocatorStyle::Qualified,
                single_crossref_group: true,
            },
            _ => VersionProfile {
                locator_style: LocatorStyle::Qualified,
                single_crossref_group: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseConfig {
    pub version: String,
    pub format: OutputFormat,
    pub profile: VersionProfile,
}

impl ParseConfig {
    pub fn new(version: &str, format: OutputFormat) -> ParseConfig {
        ParseConfig {
            version: version.to_string(),
            format,
            profile: VersionProfile::for_version(version),
        }
    }
}

/// A lettered footnote or cross-reference attached to a verse.
/// Serializes as a single-key map: {"a": "Or: Spirit"}.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub letter: String,
    pub text: String,
}

impl Serialize for Annotation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.letter, &self.text)?;
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verse {
    pub verse_id: u32,
    pub version: String,
    pub class_token: String,
    pub text: String,
    pub footnotes: Vec<Annotation>,
    pub crossrefs: Vec<Annotation>,
}

impl Verse {
    pub fn new(verse_id: u32, version: &str, class_token: &str) -> Verse {
        Verse {
            verse_id,
            version: version.to_string(),
            class_token: class_token.to_string(),
            text: String::new(),
            footnotes: Vec::new(),
            crossrefs: Vec::new(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProblemKind {
    #[error("unresolved reference `{0}`")]
    UnresolvedReference(String),
    #[error("empty verse text")]
    EmptyVerseText,
    #[error("letter group changed mid-list: had `{had}`, found `{found}`")]
    AnomalousLetterGroup { had: String, found: String },
    #[error("malformed identifier `{0}`")]
    MalformedIdentifier(String),
}

impl ProblemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProblemKind::UnresolvedReference(_) => "unresolved_reference",
            ProblemKind::EmptyVerseText => "empty_verse_text",
            ProblemKind::AnomalousLetterGroup { .. } => "anomalous_letter_group",
            ProblemKind::MalformedIdentifier(_) => "malformed_identifier",
        }
    }
}

/// A non-fatal per-item failure, tagged with where it happened.
#[derive(Debug, Clone)]
pub struct Problem {
    pub version: String,
    pub book_id: u32,
    pub chapter: u32,
    pub verse_id: Option<u32>,
    pub kind: ProblemKind,
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let book = crate::canon::titles_for(self.book_id)
            .map(|(_, short)| short)
            .unwrap_or("?");
        match self.verse_id {
            Some(id) => write!(
                f,
                "{} {} {}:{}: {}",
                self.version,
                book,
                crate::canon::chapter_of(id),
                crate::canon::verse_number_of(id),
                self.kind
            ),
            None => write!(f, "{} {} {}: {}", self.version, book, self.chapter, self.kind),
        }
    }
}

/// Per-chapter parsing context shared by the pipeline stages.
pub struct ChapterCtx<'a> {
    pub config: &'a ParseConfig,
    pub book_id: u32,
    pub chapter: u32,
}

impl ChapterCtx<'_> {
    pub fn problem(&self, verse_id: Option<u32>, kind: ProblemKind) -> Problem {
        Problem {
            version: self.config.version.clone(),
            book_id: self.book_id,
            chapter: self.chapter,
            verse_id,
            kind,
        }
    }

    pub fn short_title(&self) -> &'static str {
        crate::canon::titles_for(self.book_id)
            .map(|(_, short)| short)
            .unwrap_or("")
    }
}

/// Resolve a footnote/crossref locator per the version's grammar. Dotted
/// pairs only make sense recomposed with the book's short title; qualified
/// references resolve directly, with the recomposed form as a fallback.
pub(crate) fn resolve_locator(
    ctx: &ChapterCtx,
    raw: &str,
) -> Result<Vec<crate::canon::VerseRange>, crate::canon::ResolveError> {
    let recomposed = format!("{} {}", ctx.short_title(), raw);
    match ctx.config.profile.locator_style {
        LocatorStyle::DottedPair => crate::canon::resolve(&recomposed),
        LocatorStyle::Qualified => {
            crate::canon::resolve(raw).or_else(|_| crate::canon::resolve(&recomposed))
        }
    }
}

pub struct ChapterData {
    pub book_id: u32,
    pub chapter: u32,
    pub verses: Vec<Verse>,
    pub problems: Vec<Problem>,
}

/// Four-pass pipeline over one chapter's markup: node tree → verse
/// skeletons → reconstructed text → footnote/crossref annotations.
/// Per-item failures land in `problems`; only an unparsable document
/// is an error.
pub fn process_chapter(
    config: &ParseConfig,
    book_id: u32,
    chapter: u32,
    raw: &str,
) -> Result<ChapterData> {
    let doc = dom::Document::parse(raw)?;
    let ctx = ChapterCtx {
        config,
        book_id,
        chapter,
    };

    let mut verses = segment::segment(&ctx, &doc);
    let mut problems = Vec::new();
    text::reconstruct(&ctx, &doc, &mut verses, &mut problems);
    footnotes::link(&ctx, &doc, &mut verses, &mut problems);
    crossrefs::link(&ctx, &doc, &mut verses, &mut problems);

    Ok(ChapterData {
        book_id,
        chapter,
        verses,
        problems,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ParseConfig {
        ParseConfig::new("NRSVUE", OutputFormat::Markdown)
    }

    #[test]
    fn annotation_serializes_as_single_key_map() {
        let a = Annotation {
            letter: "a".to_string(),
            text: "Or: Spirit".to_string(),
        };
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"a":"Or: Spirit"}"#);
    }

    #[test]
    fn profiles() {
        assert_eq!(
            VersionProfile::for_version("NRSVUE").locator_style,
            LocatorStyle::DottedPair
        );
        let asv = VersionProfile::for_version("ASV");
        assert_eq!(asv.locator_style, LocatorStyle::Qualified);
        assert!(asv.single_crossref_group);
        // Unknown abbreviations degrade to qualified locators.
        assert_eq!(
            VersionProfile::for_version("XYZ").locator_style,
            LocatorStyle::Qualified
        );
    }

    #[test]
    fn chapter_with_no_verse_elements() {
        let raw = std::fs::read_to_string("tests/fixtures/empty.html").unwrap();
        let data = process_chapter(&config(), 1, 1, &raw).unwrap();
        assert!(data.verses.is_empty());
        assert!(data.problems.is_empty());
    }

    #[test]
    fn genesis_fixture_end_to_end() {
        let raw = std::fs::read_to_string("tests/fixtures/Gen-1.html").unwrap();
        let data = process_chapter(&config(), 1, 1, &raw).unwrap();

        // Unique ids, document order of first occurrence.
        let ids: Vec<u32> = data.verses.iter().map(|v| v.verse_id).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let first = &data.verses[0];
        assert_eq!(first.verse_id, 1001001);
        assert!(first.text.starts_with("¶ In the beginning"));
        assert_eq!(first.footnotes.len(), 1);
        assert_eq!(first.footnotes[0].letter, "a");
        assert_eq!(first.footnotes[0].text, "Or __when God began to create__");
        let targets: Vec<&str> = first.crossrefs.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(targets, ["Job 38:4-7", "Ps 33:6"]);

        assert!(data.verses.iter().all(|v| !v.text.is_empty()));
        assert!(data.problems.is_empty());
    }

    #[test]
    fn genesis_heading_and_poetry() {
        let raw = std::fs::read_to_string("tests/fixtures/Gen-1.html").unwrap();
        let data = process_chapter(&config(), 1, 1, &raw).unwrap();

        let v3 = data.verses.iter().find(|v| v.verse_id == 1001003).unwrap();
        assert_eq!(
            v3.text,
            "**Let There Be Light**\n¶ Then God said, “Let there be light”; and there was light."
        );

        let v4 = data.verses.iter().find(|v| v.verse_id == 1001004).unwrap();
        assert_eq!(
            v4.text,
            "    So God saw that the light was good,\n  and God separated the light from the darkness.\n"
        );
    }

    #[test]
    fn psalm_fixture_asv_profile() {
        let config = ParseConfig::new("ASV", OutputFormat::Markdown);
        let raw = std::fs::read_to_string("tests/fixtures/Ps-23.html").unwrap();
        let data = process_chapter(&config, 19, 23, &raw).unwrap();
        assert!(data.problems.is_empty());

        let v1 = data.verses.iter().find(|v| v.verse_id == 19023001).unwrap();
        assert!(v1.text.contains("**LORD**"));
        assert_eq!(v1.footnotes.len(), 1);
        assert_eq!(v1.footnotes[0].letter, "a");
        assert_eq!(v1.footnotes[0].text, "Or, __Jehovah__");
        assert_eq!(v1.crossrefs.len(), 1);
        assert_eq!(v1.crossrefs[0].text, "Isa 40:11");

        let v2 = data.verses.iter().find(|v| v.verse_id == 19023002).unwrap();
        assert_eq!(
            v2.text,
            "    He maketh me to lie down in green pastures;\n    He leadeth me beside still waters.\n"
        );
        assert_eq!(v2.crossrefs[0].letter, "A");
    }

    #[test]
    fn reprocessing_is_deterministic() {
        let raw = std::fs::read_to_string("tests/fixtures/Gen-1.html").unwrap();
        let a = process_chapter(&config(), 1, 1, &raw).unwrap();
        let b = process_chapter(&config(), 1, 1, &raw).unwrap();
        for (va, vb) in a.verses.iter().zip(&b.verses) {
            assert_eq!(va.text, vb.text);
            assert_eq!(va.footnotes, vb.footnotes);
            assert_eq!(va.crossrefs, vb.crossrefs);
        }
    }
}
