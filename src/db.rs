use anyhow::Result;
use rusqlite::Connection;

use crate::canon;
use crate::parser::{Annotation, ChapterData, Verse};

const DB_PATH: &str = "data/bible.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS books (
            version     TEXT NOT NULL,
            book_id     INTEGER NOT NULL,
            short_title TEXT NOT NULL,
            long_title  TEXT NOT NULL,
            chapters    INTEGER NOT NULL,
            position    INTEGER NOT NULL,
            PRIMARY KEY (version, book_id)
        );

        CREATE TABLE IF NOT EXISTS chapters (
            id         INTEGER PRIMARY KEY,
            version    TEXT NOT NULL,
            book_id    INTEGER NOT NULL,
            chapter    INTEGER NOT NULL,
            url        TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            processed  BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE(version, book_id, chapter)
        );
        CREATE INDEX IF NOT EXISTS idx_chapters_visited ON chapters(visited);
        CREATE INDEX IF NOT EXISTS idx_chapters_processed ON chapters(processed);

        CREATE TABLE IF NOT EXISTS chapter_html (
            id         INTEGER PRIMARY KEY,
            chapter_id INTEGER NOT NULL REFERENCES chapters(id),
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_chapter_html_chapter ON chapter_html(chapter_id);

        CREATE TABLE IF NOT EXISTS verses (
            version     TEXT NOT NULL,
            verse_id    INTEGER NOT NULL,
            book_id     INTEGER NOT NULL,
            chapter     INTEGER NOT NULL,
            class_token TEXT NOT NULL,
            text        TEXT NOT NULL,
            PRIMARY KEY (version, verse_id)
        );
        CREATE INDEX IF NOT EXISTS idx_verses_chapter ON verses(version, book_id, chapter);

        CREATE TABLE IF NOT EXISTS verse_footnotes (
            id       INTEGER PRIMARY KEY,
            version  TEXT NOT NULL,
            verse_id INTEGER NOT NULL,
            letter   TEXT NOT NULL,
            body     TEXT NOT NULL,
            seq      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_footnotes_verse ON verse_footnotes(version, verse_id);

        CREATE TABLE IF NOT EXISTS verse_crossrefs (
            id       INTEGER PRIMARY KEY,
            version  TEXT NOT NULL,
            verse_id INTEGER NOT NULL,
            letter   TEXT NOT NULL,
            target   TEXT NOT NULL,
            seq      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_crossrefs_verse ON verse_crossrefs(version, verse_id);

        CREATE TABLE IF NOT EXISTS problems (
            id          INTEGER PRIMARY KEY,
            version     TEXT NOT NULL,
            book_id     INTEGER NOT NULL,
            chapter     INTEGER NOT NULL,
            verse_id    INTEGER,
            kind        TEXT NOT NULL,
            detail      TEXT NOT NULL,
            recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_problems_version ON problems(version);
        ",
    )?;
    Ok(())
}

// ── Manifest ──

pub struct BookRow {
    pub book_id: u32,
    pub short_title: String,
    pub long_title: String,
    pub chapters: u32,
}

/// Insert manifest books and their chapter queue rows. Existing rows are
/// left alone so re-running init is harmless.
pub fn insert_manifest(
    conn: &Connection,
    version: &str,
    books: &[BookRow],
    chapter_url: impl Fn(&BookRow, u32) -> String,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    {
        let mut book_stmt = tx.prepare(
            "INSERT OR IGNORE INTO books (version, book_id, short_title, long_title, chapters, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut chapter_stmt = tx.prepare(
            "INSERT OR IGNORE INTO chapters (version, book_id, chapter, url)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, book) in books.iter().enumerate() {
            book_stmt.execute(rusqlite::params![
                version,
                book.book_id,
                book.short_title,
                book.long_title,
                book.chapters,
                position as i64,
            ])?;
            for chapter in 1..=book.chapters {
                inserted += chapter_stmt.execute(rusqlite::params![
                    version,
                    book.book_id,
                    chapter,
                    chapter_url(book, chapter),
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(inserted)
}

// ── Fetching ──

pub struct PendingChapter {
    pub chapter_id: i64,
    pub book_id: u32,
    pub chapter: u32,
    pub url: String,
}

pub fn fetch_unvisited(
    conn: &Connection,
    version: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingChapter>> {
    let sql = format!(
        "SELECT c.id, c.book_id, c.chapter, c.url
         FROM chapters c
         JOIN books b ON b.version = c.version AND b.book_id = c.book_id
         WHERE c.version = ?1 AND c.visited = 0
         ORDER BY b.position, c.chapter{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([version], |row| {
            Ok(PendingChapter {
                chapter_id: row.get(0)?,
                book_id: row.get(1)?,
                chapter: row.get(2)?,
                url: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct FetchRow {
    pub chapter_id: i64,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub const INSERT_FETCH_SQL: &str =
    "INSERT INTO chapter_html (chapter_id, html, status, error, latency_ms)
     VALUES (?1, ?2, ?3, ?4, ?5)";

pub const MARK_VISITED_SQL: &str =
    "UPDATE chapters SET visited = 1, visited_at = datetime('now') WHERE id = ?1";

/// Save a single fetch result using pre-prepared statements.
pub fn save_fetch(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &FetchRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.chapter_id,
        row.html,
        row.status,
        row.error,
        row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.chapter_id])?;
    Ok(())
}

// ── Processing ──

pub struct FetchedChapter {
    pub chapter_id: i64,
    pub book_id: u32,
    pub chapter: u32,
    pub html: String,
}

pub fn fetch_unprocessed(
    conn: &Connection,
    version: &str,
    limit: Option<usize>,
) -> Result<Vec<FetchedChapter>> {
    let sql = format!(
        "SELECT c.id, c.book_id, c.chapter, h.html
         FROM chapters c
         JOIN books b ON b.version = c.version AND b.book_id = c.book_id
         JOIN chapter_html h ON h.chapter_id = c.id
         WHERE c.version = ?1 AND c.processed = 0 AND h.html IS NOT NULL
         ORDER BY b.position, c.chapter{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([version], |row| {
            Ok(FetchedChapter {
                chapter_id: row.get(0)?,
                book_id: row.get(1)?,
                chapter: row.get(2)?,
                html: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Persist one processed chapter: verses, annotations, problems, and the
/// processed flag, in one transaction.
pub fn save_chapter(
    conn: &Connection,
    version: &str,
    chapter_id: i64,
    data: &ChapterData,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut verse_stmt = tx.prepare(
            "INSERT OR REPLACE INTO verses (version, verse_id, book_id, chapter, class_token, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut del_fn =
            tx.prepare("DELETE FROM verse_footnotes WHERE version = ?1 AND verse_id = ?2")?;
        let mut del_cr =
            tx.prepare("DELETE FROM verse_crossrefs WHERE version = ?1 AND verse_id = ?2")?;
        let mut fn_stmt = tx.prepare(
            "INSERT INTO verse_footnotes (version, verse_id, letter, body, seq)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut cr_stmt = tx.prepare(
            "INSERT INTO verse_crossrefs (version, verse_id, letter, target, seq)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for verse in &data.verses {
            verse_stmt.execute(rusqlite::params![
                version,
                verse.verse_id,
                data.book_id,
                data.chapter,
                verse.class_token,
                verse.text,
            ])?;
            del_fn.execute(rusqlite::params![version, verse.verse_id])?;
            del_cr.execute(rusqlite::params![version, verse.verse_id])?;
            for (seq, note) in verse.footnotes.iter().enumerate() {
                fn_stmt.execute(rusqlite::params![
                    version,
                    verse.verse_id,
                    note.letter,
                    note.text,
                    seq as i64,
                ])?;
            }
            for (seq, xref) in verse.crossrefs.iter().enumerate() {
                cr_stmt.execute(rusqlite::params![
                    version,
                    verse.verse_id,
                    xref.letter,
                    xref.text,
                    seq as i64,
                ])?;
            }
        }

        let mut problem_stmt = tx.prepare(
            "INSERT INTO problems (version, book_id, chapter, verse_id, kind, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for problem in &data.problems {
            problem_stmt.execute(rusqlite::params![
                problem.version,
                problem.book_id,
                problem.chapter,
                problem.verse_id,
                problem.kind.name(),
                problem.to_string(),
            ])?;
        }

        tx.execute(
            "UPDATE chapters SET processed = 1 WHERE id = ?1",
            rusqlite::params![chapter_id],
        )?;
    }
    tx.commit()?;
    Ok(())
}

// ── Export ──

pub struct ProcessedChapter {
    pub book_id: u32,
    pub chapter: u32,
    pub short_title: String,
}

pub fn fetch_processed_chapters(conn: &Connection, version: &str) -> Result<Vec<ProcessedChapter>> {
    let mut stmt = conn.prepare(
        "SELECT c.book_id, c.chapter, b.short_title
         FROM chapters c
         JOIN books b ON b.version = c.version AND b.book_id = c.book_id
         WHERE c.version = ?1 AND c.processed = 1
         ORDER BY b.position, c.chapter",
    )?;
    let rows = stmt
        .query_map([version], |row| {
            Ok(ProcessedChapter {
                book_id: row.get(0)?,
                chapter: row.get(1)?,
                short_title: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Reassemble a chapter's verses with their annotations in stored order.
pub fn fetch_verses(
    conn: &Connection,
    version: &str,
    book_id: u32,
    chapter: u32,
) -> Result<Vec<Verse>> {
    let mut stmt = conn.prepare(
        "SELECT verse_id, class_token, text FROM verses
         WHERE version = ?1 AND book_id = ?2 AND chapter = ?3
         ORDER BY verse_id",
    )?;
    let mut verses = stmt
        .query_map(rusqlite::params![version, book_id, chapter], |row| {
            let verse_id: u32 = row.get(0)?;
            let class_token: String = row.get(1)?;
            let text: String = row.get(2)?;
            Ok((verse_id, class_token, text))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(verse_id, class_token, text)| {
            let mut verse = Verse::new(verse_id, version, &class_token);
            verse.text = text;
            verse
        })
        .collect::<Vec<_>>();

    let mut fn_stmt = conn.prepare(
        "SELECT letter, body FROM verse_footnotes
         WHERE version = ?1 AND verse_id = ?2 ORDER BY seq",
    )?;
    let mut cr_stmt = conn.prepare(
        "SELECT letter, target FROM verse_crossrefs
         WHERE version = ?1 AND verse_id = ?2 ORDER BY seq",
    )?;
    for verse in &mut verses {
        verse.footnotes = fn_stmt
            .query_map(rusqlite::params![version, verse.verse_id], |row| {
                Ok(Annotation {
                    letter: row.get(0)?,
                    text: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        verse.crossrefs = cr_stmt
            .query_map(rusqlite::params![version, verse.verse_id], |row| {
                Ok(Annotation {
                    letter: row.get(0)?,
                    text: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(verses)
}

// ── Problems & stats ──

pub fn fetch_problems(conn: &Connection, version: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT detail FROM problems WHERE version = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map([version], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub chapters: i64,
    pub visited: i64,
    pub unvisited: i64,
    pub fetched_ok: i64,
    pub fetch_errors: i64,
    pub processed: i64,
    pub verses: i64,
    pub problems: i64,
}

pub fn get_stats(conn: &Connection, version: &str) -> Result<Stats> {
    let count =
        |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [version], |row| row.get(0))?) };
    Ok(Stats {
        chapters: count("SELECT COUNT(*) FROM chapters WHERE version = ?1")?,
        visited: count("SELECT COUNT(*) FROM chapters WHERE version = ?1 AND visited = 1")?,
        unvisited: count("SELECT COUNT(*) FROM chapters WHERE version = ?1 AND visited = 0")?,
        fetched_ok: count(
            "SELECT COUNT(*) FROM chapter_html h
             JOIN chapters c ON c.id = h.chapter_id
             WHERE c.version = ?1 AND h.html IS NOT NULL",
        )?,
        fetch_errors: count(
            "SELECT COUNT(*) FROM chapter_html h
             JOIN chapters c ON c.id = h.chapter_id
             WHERE c.version = ?1 AND h.error IS NOT NULL",
        )?,
        processed: count("SELECT COUNT(*) FROM chapters WHERE version = ?1 AND processed = 1")?,
        verses: count("SELECT COUNT(*) FROM verses WHERE version = ?1")?,
        problems: count("SELECT COUNT(*) FROM problems WHERE version = ?1")?,
    })
}

/// Short "Gen 3" style label for progress output.
pub fn chapter_label(book_id: u32, chapter: u32) -> String {
    let short = canon::titles_for(book_id).map(|(_, s)| s).unwrap_or("?");
    format!("{} {}", short, chapter)
}

// ── Tests ──
