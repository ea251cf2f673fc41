use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, FetchRow, PendingChapter};

const CONCURRENCY: usize = 4;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!("gateway_scraper/", env!("CARGO_PKG_VERSION"));

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch chapter pages concurrently, saving each result to DB as it
/// arrives. Failed fetches are recorded too, so the queue drains either
/// way and a later run can retry just the failures.
pub async fn fetch_chapters_streaming(
    conn: &Connection,
    chapters: Vec<PendingChapter>,
) -> Result<FetchStats> {
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = chapters.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(CONCURRENCY * 2);

    for chapter in chapters {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let label = db::chapter_label(chapter.book_id, chapter.chapter);
            let row = fetch_with_retry(&client, chapter.chapter_id, &chapter.url, &label).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    // Prepare statements once, reuse for each row
    let mut insert_stmt = conn.prepare(db::INSERT_FETCH_SQL)?;
    let mut update_stmt = conn.prepare(db::MARK_VISITED_SQL)?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        db::save_fetch(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} chapters ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

async fn fetch_with_retry(
    client: &reqwest::Client,
    chapter_id: i64,
    url: &str,
    label: &str,
) -> FetchRow {
    for attempt in 0..=MAX_RETRIES {
        let row = fetch_one(client, chapter_id, url).await;

        let should_retry = matches!(row.status, Some(429 | 500 | 502 | 503));
        if !should_retry || attempt == MAX_RETRIES {
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Got {} on {} (attempt {}/{}), backing off {:.1}s",
            row.status.unwrap_or_default(),
            label,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    fetch_one(client, chapter_id, url).await
}

async fn fetch_one(client: &reqwest::Client, chapter_id: i64, url: &str) -> FetchRow {
    let start = Instant::now();
    let response = client.get(url).send().await;
    let elapsed = start.elapsed().as_millis() as i64;

    match response {
        Ok(resp) => {
            let status = resp.status();
            match resp.text().await {
                Ok(body) if status.is_success() => FetchRow {
                    chapter_id,
                    html: Some(body),
                    status: Some(status.as_u16() as i32),
                    error: None,
                    latency_ms: Some(elapsed),
                },
                Ok(_) => FetchRow {
                    chapter_id,
                    html: None,
                    status: Some(status.as_u16() as i32),
                    error: Some(format!("HTTP {}", status)),
                    latency_ms: Some(elapsed),
                },
                Err(e) => FetchRow {
                    chapter_id,
                    html: None,
                    status: Some(status.as_u16() as i32),
                    error: Some(e.to_string()),
                    latency_ms: Some(elapsed),
                },
            }
        }
        Err(e) => FetchRow {
            chapter_id,
            html: None,
            status: None,
            error: Some(e.to_string()),
            latency_ms: Some(elapsed),
        },
    }
}

/// Fetch a single URL and return its HTML body.
pub async fn fetch_single_page(url: &str) -> Result<String> {
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.text().await?)
}
