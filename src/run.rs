use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::db::{self, IngestionOutcome, JobPosting};
use crate::fetcher::{self, FetchedPage};
use crate::normalize::canonicalize;
use crate::parser;
use crate::search::SearchClient;
use crate::settings::Settings;

/// Canonical URLs already handled in this run.
#[derive(Debug, Default)]
pub struct SeenUrls {
    urls: HashSet<String>,
}

impl SeenUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of `raw` if it has not been seen yet in this run.
    pub fn admit(&mut self, raw: &str) -> Option<String> {
        let canon = canonicalize(raw);
        self.urls.insert(canon.clone()).then_some(canon)
    }

    pub fn admit_all(&mut self, links: impl IntoIterator<Item = String>) -> Vec<String> {
        links.into_iter().filter_map(|l| self.admit(&l)).collect()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }
}

/// Run-level counters.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub queries: usize,
    pub new_links: usize,
    pub pages_parsed: usize,
    pub fetch_errors: usize,
    pub inserted: usize,
    pub updated: usize,
    pub store_errors: usize,
}

impl RunStats {
    fn record(&mut self, outcome: IngestionOutcome) {
        match outcome {
            IngestionOutcome::Inserted => self.inserted += 1,
            IngestionOutcome::Updated => self.updated += 1,
        }
    }

    fn store(&mut self, conn: &Connection, posting: &JobPosting) {
        match db::upsert_posting(conn, posting) {
            Ok(outcome) => {
                debug!(url = %posting.url, ?outcome, "posting stored");
                self.record(outcome);
            }
            Err(e) => {
                self.store_errors += 1;
                warn!("store {}: {:#}", posting.url, e);
            }
        }
    }
}

/// Assemble one fetched page and store it.
pub fn ingest_page(conn: &Connection, canonical_url: &str, html: &str, stats: &mut RunStats) {
    let posting = parser::assemble(canonical_url, html, &parser::host_of(canonical_url));
    stats.pages_parsed += 1;
    stats.store(conn, &posting);
}

/// Drain fetch results, storing each page as it arrives.
pub async fn ingest_stream(
    conn: &Connection,
    mut rx: mpsc::Receiver<FetchedPage>,
    total: usize,
    stats: &mut RunStats,
) -> Result<()> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    while let Some(page) = rx.recv().await {
        match page.body {
            Ok(html) => {
                debug!(url = %page.url, latency_ms = page.latency_ms, bytes = html.len(), "parsing");
                ingest_page(conn, &page.url, &html, stats);
            }
            Err(e) => {
                stats.fetch_errors += 1;
                warn!("fetch {}: {}", page.url, e);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(())
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// Search every query, fetch the links not seen yet this run, and store them.
/// A failed query or page is logged and skipped.
pub async fn run_daily(conn: &Connection, settings: &Settings) -> Result<RunStats> {
    let queries = settings.search_queries();
    let search = SearchClient::new(settings.serper_api_key.as_deref(), settings.fetch_timeout())
        .context("Search client unavailable")?;
    let http = fetcher::client(settings.fetch_timeout()).context("Failed to build HTTP client")?;

    let run_id = new_run_id();
    db::start_run(conn, &run_id, &Utc::now().to_rfc3339(), queries.len())?;
    info!("Using {} search queries ({})", queries.len(), run_id);

    let mut seen = SeenUrls::new();
    let mut stats = RunStats::default();

    for (i, query) in queries.iter().enumerate() {
        info!("Query {}/{}: {}", i + 1, queries.len(), query);
        stats.queries += 1;

        let mut links = Vec::new();
        for page in 0..settings.pages_per_query.max(1) {
            let offset = page * settings.results_per_query;
            match search.search(query, settings.results_per_query, offset).await {
                Ok(found) if found.is_last() => break,
                Ok(found) => {
                    debug!(page, kept = found.links.len(), raw = found.raw_results, "search page");
                    links.extend(found.links);
                }
                Err(e) => {
                    warn!("search error on query {}: {}", i + 1, e);
                    break;
                }
            }
        }

        let found = links.len();
        let fresh = seen.admit_all(links);
        info!("Found {} links from query {} ({} new this run)", found, i + 1, fresh.len());
        if fresh.is_empty() {
            continue;
        }
        stats.new_links += fresh.len();

        let total = fresh.len();
        let rx = fetcher::fetch_streaming(http.clone(), fresh, settings.concurrency);
        ingest_stream(conn, rx, total, &mut stats).await?;
    }

    info!("{} distinct links seen this run", seen.len());
    db::finish_run(conn, &run_id, &Utc::now().to_rfc3339(), stats.new_links, stats.pages_parsed)?;
    Ok(stats)
}

/// Upsert postings from a JSON seed file. URLs are canonicalized and a missing
/// discovery date becomes today.
pub fn load_seed(conn: &Connection, path: &Path) -> Result<RunStats> {
    let file = File::open(path).with_context(|| format!("Failed to open seed file {:?}", path))?;
    let postings: Vec<JobPosting> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid seed file {:?}", path))?;

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let mut stats = RunStats::default();
    for mut posting in postings {
        if posting.url.trim().is_empty() {
            warn!("seed entry without url skipped: {:?}", posting.title);
            continue;
        }
        posting.url = canonicalize(posting.url.trim());
        if posting.discovered_date.is_empty() {
            posting.discovered_date = today.clone();
        }
        stats.store(conn, &posting);
    }
    Ok(stats)
}
