use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Locator grammar: "Book C", "Book C:V", "Book C:V-V2", "Book C:V-C2:V2".
/// Dots and colons are interchangeable as chapter/verse separators.
static LOCATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.+?)\s+(\d+)(?:[.:](\d+))?(?:\s*[-–]\s*(?:(\d+)[.:])?(\d+))?\s*$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown book in `{0}`")]
    UnknownBook(String),
    #[error("`{0}` is not a verse reference")]
    BadReference(String),
}

/// One contiguous span of verses within a single book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerseRange {
    pub book: u32,
    pub start_chapter: u32,
    pub start_verse: u32,
    pub end_chapter: u32,
    pub end_verse: u32,
}

impl VerseRange {
    pub fn contains(&self, id: u32) -> bool {
        id >= verse_id(self.book, self.start_chapter, self.start_verse)
            && id <= verse_id(self.book, self.end_chapter, self.end_verse)
    }

    pub fn first_id(&self) -> u32 {
        verse_id(self.book, self.start_chapter, self.start_verse)
    }
}

/// Canonical verse id: book * 1_000_000 + chapter * 1_000 + verse.
/// Genesis 1:1 = 1001001. Monotonic in canon order.
pub fn verse_id(book: u32, chapter: u32, verse: u32) -> u32 {
    book * 1_000_000 + chapter * 1_000 + verse
}

pub fn book_of(id: u32) -> u32 {
    id / 1_000_000
}

pub fn chapter_of(id: u32) -> u32 {
    (id / 1_000) % 1_000
}

pub fn verse_number_of(id: u32) -> u32 {
    id % 1_000
}

/// Resolve locator text to an ordered list of verse ranges.
///
/// A reference without a verse ("Psalm 23") covers the whole chapter; a
/// dash without a second chapter ("Gen 1:1-3") stays within the start
/// chapter; "Gen 1-2" with no verse at all spans whole chapters.
pub fn resolve(locator: &str) -> Result<Vec<VerseRange>, ResolveError> {
    let caps = LOCATOR_RE
        .captures(locator)
        .ok_or_else(|| ResolveError::BadReference(locator.to_string()))?;

    let book_name = caps.get(1).unwrap().as_str();
    let book =
        book_id_for(book_name).ok_or_else(|| ResolveError::UnknownBook(locator.to_string()))?;

    let chapter: u32 = caps[2].parse().unwrap();
    let verse: Option<u32> = caps.get(3).map(|m| m.as_str().parse().unwrap());
    let end_chapter: Option<u32> = caps.get(4).map(|m| m.as_str().parse().unwrap());
    let end_num: Option<u32> = caps.get(5).map(|m| m.as_str().parse().unwrap());

    let range = match (verse, end_chapter, end_num) {
        // Book C
        (None, None, None) => VerseRange {
            book,
            start_chapter: chapter,
            start_verse: 1,
            end_chapter: chapter,
            end_verse: MAX_VERSE,
        },
        // Book C1-C2 (whole chapters)
        (None, None, Some(ec)) => VerseRange {
            book,
            start_chapter: chapter,
            start_verse: 1,
            end_chapter: ec,
            end_verse: MAX_VERSE,
        },
        // Book C:V
        (Some(v), None, None) => VerseRange {
            book,
            start_chapter: chapter,
            start_verse: v,
            end_chapter: chapter,
            end_verse: v,
        },
        // Book C:V1-V2
        (Some(v), None, Some(ev)) => VerseRange {
            book,
            start_chapter: chapter,
            start_verse: v,
            end_chapter: chapter,
            end_verse: ev,
        },
        // Book C1:V1-C2:V2
        (Some(v), Some(ec), Some(ev)) => VerseRange {
            book,
            start_chapter: chapter,
            start_verse: v,
            end_chapter: ec,
            end_verse: ev,
        },
        // C2: without V2 can't come out of the regex
        _ => return Err(ResolveError::BadReference(locator.to_string())),
    };

    Ok(vec![range])
}

const MAX_VERSE: u32 = 999;

/// Titles for a canonical book id (1-based, Genesis..Revelation).
pub fn titles_for(book: u32) -> Option<(&'static str, &'static str)> {
    BOOKS
        .get(book.checked_sub(1)? as usize)
        .map(|b| (b.0, b.1))
}

/// Match a book name (long title, short title, or alias) to its id.
/// Comparison ignores case, spaces, and periods, so the space-less class
/// token forms ("1Cor", "Song") match their short titles.
pub fn book_id_for(name: &str) -> Option<u32> {
    let needle = normalize(name);
    if needle.is_empty() {
        return None;
    }
    BOOKS.iter().position(|(long, short, aliases)| {
        normalize(long) == needle
            || normalize(short) == needle
            || aliases.iter().any(|a| normalize(a) == needle)
    })
    .map(|i| i as u32 + 1)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// The Protestant canon: (long title, short title, aliases).
/// Short titles follow the abbreviations Bible Gateway uses in verse class
/// tokens and footnote references.
static BOOKS: &[(&str, &str, &[&str])] = &[
    ("Genesis", "Gen", &["Ge", "Gn"]),
    ("Exodus", "Exod", &["Ex"]),
    ("Leviticus", "Lev", &["Lv"]),
    ("Numbers", "Num", &["Nm"]),
    ("Deuteronomy", "Deut", &["Dt"]),
    ("Joshua", "Josh", &[]),
    ("Judges", "Judg", &["Jdg"]),
    ("Ruth", "Ruth", &["Ru"]),
    ("1 Samuel", "1 Sam", &["1Sa"]),
    ("2 Samuel", "2 Sam", &["2Sa"]),
    ("1 Kings", "1 Kgs", &["1Ki"]),
    ("2 Kings", "2 Kgs", &["2Ki"]),
    ("1 Chronicles", "1 Chr", &["1Ch"]),
    ("2 Chronicles", "2 Chr", &["2Ch"]),
    ("Ezra", "Ezra", &[]),
    ("Nehemiah", "Neh", &[]),
    ("Esther", "Esth", &["Est"]),
    ("Job", "Job", &[]),
    ("Psalms", "Ps", &["Psalm", "Psa"]),
    ("Proverbs", "Prov", &["Pr"]),
    ("Ecclesiastes", "Eccl", &["Ecc"]),
    ("Song of Solomon", "Song", &["Song of Songs", "SS"]),
    ("Isaiah", "Isa", &[]),
    ("Jeremiah", "Jer", &[]),
    ("Lamentations", "Lam", &[]),
    ("Ezekiel", "Ezek", &["Eze"]),
    ("Daniel", "Dan", &["Dn"]),
    ("Hosea", "Hos", &[]),
    ("Joel", "Joel", &["Jl"]),
    ("Amos", "Amos", &["Am"]),
    ("Obadiah", "Obad", &["Ob"]),
    ("Jonah", "Jonah", &["Jon"]),
    ("Micah", "Mic", &[]),
    ("Nahum", "Nah", &["Na"]),
    ("Habakkuk", "Hab", &[]),
    ("Zephaniah", "Zeph", &["Zep"]),
    ("Haggai", "Hag", &[]),
    ("Zechariah", "Zech", &["Zec"]),
    ("Malachi", "Mal", &[]),
    ("Matthew", "Matt", &["Mt"]),
    ("Mark", "Mark", &["Mk"]),
    ("Luke", "Luke", &["Lk"]),
    ("John", "John", &["Jn"]),
    ("Acts", "Acts", &["Ac"]),
    ("Romans", "Rom", &["Ro"]),
    ("1 Corinthians", "1 Cor", &["1Co"]),
    ("2 Corinthians", "2 Cor", &["2Co"]),
    ("Galatians", "Gal", &[]),
    ("Ephesians", "Eph", &[]),
    ("Philippians", "Phil", &["Php"]),
    ("Colossians", "Col", &[]),
    ("1 Thessalonians", "1 Thess", &["1Th"]),
    ("2 Thessalonians", "2 Thess", &["2Th"]),
    ("1 Timothy", "1 Tim", &["1Ti"]),
    ("2 Timothy", "2 Tim", &["2Ti"]),
    ("Titus", "Titus", &["Tit"]),
    ("Philemon", "Phlm", &["Phm"]),
    ("Hebrews", "Heb", &[]),
    ("James", "Jas", &["Jm"]),
    ("1 Peter", "1 Pet", &["1Pe"]),
    ("2 Peter", "2 Pet", &["2Pe"]),
    ("1 John", "1 John", &["1Jn"]),
    ("2 John", "2 John", &["2Jn"]),
    ("3 John", "3 John", &["3Jn"]),
    ("Jude", "Jude", &[]),
    ("Revelation", "Rev", &["Re"]),
];

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verse_id_arithmetic() {
        let id = verse_id(1, 1, 1);
        assert_eq!(id, 1001001);
        assert_eq!(book_of(id), 1);
        assert_eq!(chapter_of(id), 1);
        assert_eq!(verse_number_of(id), 1);

        let id = verse_id(19, 119, 176);
        assert_eq!(book_of(id), 19);
        assert_eq!(chapter_of(id), 119);
        assert_eq!(verse_number_of(id), 176);
    }

    #[test]
    fn book_lookup() {
        assert_eq!(book_id_for("Genesis"), Some(1));
        assert_eq!(book_id_for("Gen"), Some(1));
        assert_eq!(book_id_for("gen"), Some(1));
        assert_eq!(book_id_for("1 Cor"), Some(46));
        assert_eq!(book_id_for("1Cor"), Some(46)); // class-token form
        assert_eq!(book_id_for("Psalm"), Some(19));
        assert_eq!(book_id_for("Ps"), Some(19));
        assert_eq!(book_id_for("Revelation"), Some(66));
        assert_eq!(book_id_for("Tobit"), None);
    }

    #[test]
    fn single_verse() {
        let ranges = resolve("Genesis 1:1").unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].contains(1001001));
        assert!(!ranges[0].contains(1001002));
        assert_eq!(ranges[0].first_id(), 1001001);
    }

    #[test]
    fn dotted_equals_colon() {
        assert_eq!(resolve("Gen 1.2").unwrap(), resolve("Gen 1:2").unwrap());
    }

    #[test]
    fn verse_range() {
        let r = resolve("Gen 1:1-3").unwrap()[0];
        assert!(r.contains(1001001));
        assert!(r.contains(1001003));
        assert!(!r.contains(1001004));
    }

    #[test]
    fn cross_chapter_range() {
        // Isa 34:17-35:2
        let r = resolve("Isa 34.17-35.2").unwrap()[0];
        assert!(r.contains(verse_id(23, 34, 17)));
        assert!(r.contains(verse_id(23, 35, 2)));
        assert!(!r.contains(verse_id(23, 34, 16)));
        assert!(!r.contains(verse_id(23, 35, 3)));
    }

    #[test]
    fn whole_chapter() {
        let r = resolve("Psalm 23").unwrap()[0];
        assert!(r.contains(verse_id(19, 23, 1)));
        assert!(r.contains(verse_id(19, 23, 6)));
        assert!(!r.contains(verse_id(19, 24, 1)));
    }

    #[test]
    fn numbered_book() {
        let r = resolve("1 Sam 2:31-32").unwrap()[0];
        assert_eq!(r.book, 9);
        assert!(r.contains(verse_id(9, 2, 31)));
        assert!(r.contains(verse_id(9, 2, 32)));
    }

    #[test]
    fn unknown_book() {
        assert!(matches!(
            resolve("Maccabees 1:1"),
            Err(ResolveError::UnknownBook(_))
        ));
    }

    #[test]
    fn not_a_reference() {
        assert!(matches!(resolve("hello"), Err(ResolveError::BadReference(_))));
        assert!(matches!(resolve(""), Err(ResolveError::BadReference(_))));
    }

    #[test]
    fn titles() {
        assert_eq!(titles_for(1), Some(("Genesis", "Gen")));
        assert_eq!(titles_for(66), Some(("Revelation", "Rev")));
        assert_eq!(titles_for(0), None);
        assert_eq!(titles_for(67), None);
    }
}
