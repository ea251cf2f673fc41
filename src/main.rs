mod booklist;
mod canon;
mod db;
mod parser;
mod scraper;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

#[derive(Parser)]
#[command(name = "gateway_scraper", about = "Bible Gateway chapter scraper and verse parser")]
struct Cli {
    /// Version abbreviation (selects the footnote/crossref locator grammar)
    #[arg(long = "bible-version", default_value = "NRSVUE", global = true)]
    bible_version: String,

    /// Rendering of emphasis and indentation in verse text
    #[arg(long, value_enum, default_value = "markdown", global = true)]
    output_format: FormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Markdown,
    Html,
}

impl From<FormatArg> for parser::OutputFormat {
    fn from(arg: FormatArg) -> parser::OutputFormat {
        match arg {
            FormatArg::Markdown => parser::OutputFormat::Markdown,
            FormatArg::Html => parser::OutputFormat::Html,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load the book manifest and populate the chapter queue
    Init {
        /// Local manifest JSON ({"version": .., "books": [{name, chapters}]})
        /// instead of scraping the booklist page
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Version name as it appears in the booklist URL
        #[arg(long, default_value = "New-Revised-Standard-Version-Updated-Edition")]
        human_name: String,
    },
    /// Fetch unvisited chapter pages
    Fetch {
        /// Max chapters to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse fetched chapters into verses
    Process {
        /// Max chapters to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one pipeline
    Run {
        /// Max chapters to fetch+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Write one JSON document per processed chapter
    Export {
        #[arg(long, default_value = "data/out")]
        out: PathBuf,
    },
    /// Show pipeline statistics
    Stats,
    /// Print the accumulated problem report
    Problems,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let version = cli.bible_version.clone();
    let config = parser::ParseConfig::new(&version, cli.output_format.into());

    let result = match cli.command {
        Commands::Init { manifest, human_name } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let books = match manifest {
                Some(path) => booklist::load_manifest(&path, &version)?,
                None => booklist::fetch_manifest(&human_name, &version).await?,
            };
            let inserted = db::insert_manifest(&conn, &version, &books, |book, chapter| {
                booklist::chapter_url(&version, &book.short_title, chapter)
            })?;
            println!(
                "Inserted {} new chapter URLs across {} books",
                inserted,
                books.len()
            );
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let chapters = db::fetch_unvisited(&conn, &version, limit)?;
            if chapters.is_empty() {
                println!("No unvisited chapters. Run 'init' first or all chapters are fetched.");
                return Ok(());
            }
            println!("Fetching {} chapters (streaming to DB)...", chapters.len());
            let stats = scraper::fetch_chapters_streaming(&conn, chapters).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let chapters = db::fetch_unprocessed(&conn, &version, limit)?;
            if chapters.is_empty() {
                println!("No unprocessed chapters. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} chapters...", chapters.len());
            let counts = process_chapters(&conn, &config, &chapters)?;
            counts.print();
            print_problem_report(&conn, &version)?;
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let chapters = db::fetch_unvisited(&conn, &version, limit)?;
            if chapters.is_empty() {
                println!("No unvisited chapters. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: Fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} chapters (streaming to DB)...", chapters.len());
            let stats = scraper::fetch_chapters_streaming(&conn, chapters).await?;
            println!(
                "Fetched {} chapters ({} ok, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: Process, in canon order
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, &version, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetches failed).");
                return Ok(());
            }
            println!("Processing {} chapters...", unprocessed.len());
            let counts = process_chapters(&conn, &config, &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            print_problem_report(&conn, &version)?;
            Ok(())
        }
        Commands::Export { out } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let chapters = db::fetch_processed_chapters(&conn, &version)?;
            if chapters.is_empty() {
                println!("No processed chapters. Run 'process' first.");
                return Ok(());
            }
            std::fs::create_dir_all(&out)?;
            for chapter in &chapters {
                let verses = db::fetch_verses(&conn, &version, chapter.book_id, chapter.chapter)?;
                let doc = ChapterDoc {
                    book: &chapter.short_title,
                    version: &version,
                    chapter: chapter.chapter,
                    verses: &verses,
                };
                let path = out.join(format!(
                    "{}-{}.json",
                    chapter.short_title.replace(' ', "_"),
                    chapter.chapter
                ));
                std::fs::write(&path, serde_json::to_string_pretty(&doc)?)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            println!("Exported {} chapter documents to {}", chapters.len(), out.display());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn, &version)?;
            println!("Chapters:  {}", s.chapters);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched_ok);
            println!("Errors:    {}", s.fetch_errors);
            println!("Processed: {}", s.processed);
            println!("Verses:    {}", s.verses);
            println!("Problems:  {}", s.problems);
            Ok(())
        }
        Commands::Problems => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            print_problem_report(&conn, &version)?;
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ProcessCounts {
    chapters: usize,
    verses: usize,
    footnotes: usize,
    crossrefs: usize,
    problems: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} chapters, {} verses, {} footnotes, {} crossrefs ({} problems).",
            self.chapters, self.verses, self.footnotes, self.crossrefs, self.problems,
        );
    }
}

/// Parse and save chapters strictly in queue (canon) order. A chapter
/// whose markup can't be parsed aborts the run; per-verse trouble is
/// recorded in the problem list instead.
fn process_chapters(
    conn: &rusqlite::Connection,
    config: &parser::ParseConfig,
    chapters: &[db::FetchedChapter],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(chapters.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        chapters: 0,
        verses: 0,
        footnotes: 0,
        crossrefs: 0,
        problems: 0,
    };

    for chapter in chapters {
        let label = db::chapter_label(chapter.book_id, chapter.chapter);
        let data = parser::process_chapter(config, chapter.book_id, chapter.chapter, &chapter.html)
            .with_context(|| format!("parsing {}", label))?;

        counts.chapters += 1;
        counts.verses += data.verses.len();
        counts.footnotes += data.verses.iter().map(|v| v.footnotes.len()).sum::<usize>();
        counts.crossrefs += data.verses.iter().map(|v| v.crossrefs.len()).sum::<usize>();
        counts.problems += data.problems.len();

        db::save_chapter(conn, &config.version, chapter.chapter_id, &data)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Processed {} chapters", counts.chapters);
    Ok(counts)
}

fn print_problem_report(conn: &rusqlite::Connection, version: &str) -> anyhow::Result<()> {
    let problems = db::fetch_problems(conn, version)?;
    if problems.is_empty() {
        println!("No problems recorded.");
        return Ok(());
    }
    println!("\n--- Problems ({}) ---", problems.len());
    for problem in &problems {
        println!("  {}", problem);
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ChapterDoc<'a> {
    book: &'a str,
    version: &'a str,
    chapter: u32,
    verses: &'a [parser::Verse],
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
