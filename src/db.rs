use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

// ── Model ──

/// Applicant tracking system a posting is hosted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Greenhouse,
    Ashby,
    Lever,
    Workday,
    SmartRecruiters,
    Workable,
    #[default]
    Ats,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Greenhouse => "Greenhouse",
            Source::Ashby => "Ashby",
            Source::Lever => "Lever",
            Source::Workday => "Workday",
            Source::SmartRecruiters => "SmartRecruiters",
            Source::Workable => "Workable",
            Source::Ats => "ATS",
        }
    }

    /// Unknown labels collapse to the generic `ATS` source.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Greenhouse" => Source::Greenhouse,
            "Ashby" => Source::Ashby,
            "Lever" => Source::Lever,
            "Workday" => Source::Workday,
            "SmartRecruiters" => Source::SmartRecruiters,
            "Workable" => Source::Workable,
            _ => Source::Ats,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Source::from_label(&s)
    }
}

impl From<Source> for String {
    fn from(s: Source) -> Self {
        s.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPosting {
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_raw: String,
    pub salary_min_usd: Option<i64>,
    pub salary_max_usd: Option<i64>,
    pub source: Source,
    pub posted_date: String,
    pub discovered_date: String,
    pub is_remote_us: bool,
    pub tags: String,
}

/// How a single upsert landed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOutcome {
    Inserted,
    Updated,
}

// ── Connection ──

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
    )?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id              INTEGER PRIMARY KEY,
            url             TEXT UNIQUE NOT NULL,
            title           TEXT NOT NULL DEFAULT '',
            company         TEXT NOT NULL DEFAULT '',
            location        TEXT NOT NULL DEFAULT '',
            salary_raw      TEXT NOT NULL DEFAULT '',
            salary_min_usd  INTEGER,
            salary_max_usd  INTEGER,
            source          TEXT NOT NULL DEFAULT 'ATS',
            posted_date     TEXT NOT NULL DEFAULT '',
            discovered_date TEXT NOT NULL,
            is_remote_us    BOOLEAN NOT NULL DEFAULT 0,
            tags            TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_discovered ON jobs(discovered_date);

        CREATE TABLE IF NOT EXISTS runs (
            run_id          TEXT PRIMARY KEY,
            started_at_utc  TEXT NOT NULL,
            finished_at_utc TEXT,
            query_count     INTEGER NOT NULL DEFAULT 0,
            new_links       INTEGER NOT NULL DEFAULT 0,
            pages_parsed    INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}

// ── Postings ──

/// Insert or update a posting keyed by its canonical URL.
///
/// The existence check and the write share one immediate transaction, so the
/// returned outcome cannot be raced by another writer. An update rewrites
/// every column except `discovered_date`.
pub fn upsert_posting(conn: &Connection, p: &JobPosting) -> Result<IngestionOutcome> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM jobs WHERE url = ?1)",
        [&p.url],
        |r| r.get(0),
    )?;

    let outcome = if exists {
        tx.execute(
            "UPDATE jobs SET
                title = ?2, company = ?3, location = ?4, salary_raw = ?5,
                salary_min_usd = ?6, salary_max_usd = ?7, source = ?8,
                posted_date = ?9, is_remote_us = ?10, tags = ?11
             WHERE url = ?1",
            params![
                p.url, p.title, p.company, p.location, p.salary_raw,
                p.salary_min_usd, p.salary_max_usd, p.source.as_str(),
                p.posted_date, p.is_remote_us, p.tags,
            ],
        )?;
        IngestionOutcome::Updated
    } else {
        tx.execute(
            "INSERT INTO jobs
             (url, title, company, location, salary_raw, salary_min_usd, salary_max_usd,
              source, posted_date, discovered_date, is_remote_us, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                p.url, p.title, p.company, p.location, p.salary_raw,
                p.salary_min_usd, p.salary_max_usd, p.source.as_str(),
                p.posted_date, p.discovered_date, p.is_remote_us, p.tags,
            ],
        )?;
        IngestionOutcome::Inserted
    };

    tx.commit()?;
    Ok(outcome)
}

const POSTING_COLUMNS: &str = "url, title, company, location, salary_raw, salary_min_usd,
    salary_max_usd, source, posted_date, discovered_date, is_remote_us, tags";

fn posting_from_row(row: &Row) -> rusqlite::Result<JobPosting> {
    let source: String = row.get(7)?;
    Ok(JobPosting {
        url: row.get(0)?,
        title: row.get(1)?,
        company: row.get(2)?,
        location: row.get(3)?,
        salary_raw: row.get(4)?,
        salary_min_usd: row.get(5)?,
        salary_max_usd: row.get(6)?,
        source: Source::from_label(&source),
        posted_date: row.get(8)?,
        discovered_date: row.get(9)?,
        is_remote_us: row.get(10)?,
        tags: row.get(11)?,
    })
}

/// Postings discovered within the last `days` calendar days, today included.
pub fn fetch_window(conn: &Connection, days: u32) -> Result<Vec<JobPosting>> {
    fetch_window_at(conn, days, Utc::now().date_naive())
}

/// Same as [`fetch_window`] with an explicit "today". Newest first, ties by url.
pub fn fetch_window_at(conn: &Connection, days: u32, today: NaiveDate) -> Result<Vec<JobPosting>> {
    if days == 0 {
        return Ok(Vec::new());
    }
    // A window reaching past the earliest representable date has no lower bound.
    let from = today
        .checked_sub_signed(Duration::days(i64::from(days) - 1))
        .map(|d| d.format("%Y-%m-%d").to_string());
    let sql = format!(
        "SELECT {POSTING_COLUMNS}
         FROM jobs
         WHERE (?1 IS NULL OR date(discovered_date) >= ?1)
           AND date(discovered_date) <= ?2
         ORDER BY discovered_date DESC, url ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![from, today.format("%Y-%m-%d").to_string()],
            posting_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_posting(conn: &Connection, url: &str) -> Result<Option<JobPosting>> {
    let sql = format!("SELECT {POSTING_COLUMNS} FROM jobs WHERE url = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map([url], posting_from_row)?;
    Ok(rows.next().transpose()?)
}

// ── Runs ──

pub fn start_run(conn: &Connection, run_id: &str, started_at: &str, query_count: usize) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO runs (run_id, started_at_utc, query_count) VALUES (?1, ?2, ?3)",
        params![run_id, started_at, query_count as i64],
    )?;
    Ok(())
}

pub fn finish_run(
    conn: &Connection,
    run_id: &str,
    finished_at: &str,
    new_links: usize,
    pages_parsed: usize,
) -> Result<()> {
    conn.execute(
        "UPDATE runs SET finished_at_utc = ?2, new_links = ?3, pages_parsed = ?4 WHERE run_id = ?1",
        params![run_id, finished_at, new_links as i64, pages_parsed as i64],
    )?;
    Ok(())
}

pub struct RunRow {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub query_count: usize,
    pub new_links: usize,
    pub pages_parsed: usize,
}

pub fn last_run(conn: &Connection) -> Result<Option<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at_utc, finished_at_utc, query_count, new_links, pages_parsed
         FROM runs ORDER BY started_at_utc DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok(RunRow {
            run_id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            query_count: row.get(3)?,
            new_links: row.get(4)?,
            pages_parsed: row.get(5)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub remote_us: usize,
    pub salaried: usize,
    pub in_window: usize,
}

pub fn get_stats(conn: &Connection, window_days: u32) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
    let remote_us: usize =
        conn.query_row("SELECT COUNT(*) FROM jobs WHERE is_remote_us = 1", [], |r| r.get(0))?;
    let salaried: usize = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE salary_min_usd IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let in_window = fetch_window(conn, window_days)?.len();
    Ok(Stats {
        total,
        remote_us,
        salaried,
        in_window,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn posting(url: &str, title: &str, discovered: &str) -> JobPosting {
        JobPosting {
            url: url.to_string(),
            title: title.to_string(),
            company: "Acme".to_string(),
            source: Source::Greenhouse,
            discovered_date: discovered.to_string(),
            tags: "appium".to_string(),
            ..Default::default()
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn second_upsert_updates_and_keeps_discovery_date() {
        let conn = memory_db();
        let url = "https://boards.greenhouse.io/acme/jobs/1";

        let first = posting(url, "QA Engineer", "2024-03-01");
        assert_eq!(upsert_posting(&conn, &first).unwrap(), IngestionOutcome::Inserted);

        let mut second = posting(url, "Senior QA Engineer", "2024-03-05");
        second.salary_min_usd = Some(120_000);
        second.salary_max_usd = Some(150_000);
        second.is_remote_us = true;
        assert_eq!(upsert_posting(&conn, &second).unwrap(), IngestionOutcome::Updated);

        let stored = fetch_posting(&conn, url).unwrap().unwrap();
        assert_eq!(stored.title, "Senior QA Engineer");
        assert_eq!(stored.salary_min_usd, Some(120_000));
        assert!(stored.is_remote_us);
        assert_eq!(stored.discovered_date, "2024-03-01");

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn update_can_clear_salary() {
        let conn = memory_db();
        let url = "https://jobs.lever.co/acme/2";
        let mut p = posting(url, "SDET", "2024-03-01");
        p.salary_min_usd = Some(90_000);
        p.salary_max_usd = Some(90_000);
        upsert_posting(&conn, &p).unwrap();

        p.salary_min_usd = None;
        p.salary_max_usd = None;
        upsert_posting(&conn, &p).unwrap();

        let stored = fetch_posting(&conn, url).unwrap().unwrap();
        assert_eq!(stored.salary_min_usd, None);
        assert_eq!(stored.salary_max_usd, None);
    }

    #[test]
    fn window_is_inclusive_of_six_days_back() {
        let conn = memory_db();
        let today = day("2024-03-10");
        for (url, d) in [
            ("https://a.example/1", "2024-03-10"),
            ("https://a.example/2", "2024-03-04"),
            ("https://a.example/3", "2024-03-03"),
            ("https://a.example/4", "2024-02-01"),
        ] {
            upsert_posting(&conn, &posting(url, "t", d)).unwrap();
        }

        let rows = fetch_window_at(&conn, 7, today).unwrap();
        let urls: Vec<&str> = rows.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/1", "https://a.example/2"]);
    }

    #[test]
    fn window_orders_by_date_then_url() {
        let conn = memory_db();
        let today = day("2024-03-10");
        upsert_posting(&conn, &posting("https://b.example/x", "t", "2024-03-09")).unwrap();
        upsert_posting(&conn, &posting("https://a.example/y", "t", "2024-03-09")).unwrap();
        upsert_posting(&conn, &posting("https://c.example/z", "t", "2024-03-10")).unwrap();

        let rows = fetch_window_at(&conn, 7, today).unwrap();
        let urls: Vec<&str> = rows.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://c.example/z", "https://a.example/y", "https://b.example/x"]
        );
    }

    #[test]
    fn oversized_window_has_no_lower_bound() {
        let conn = memory_db();
        upsert_posting(&conn, &posting("https://jobs.lever.co/acme/old", "Old", "1999-01-01")).unwrap();
        upsert_posting(&conn, &posting("https://jobs.lever.co/acme/new", "New", "2024-03-10")).unwrap();
        upsert_posting(&conn, &posting("https://jobs.lever.co/acme/next", "Next", "2024-03-11")).unwrap();

        let rows = fetch_window_at(&conn, 200_000_000, day("2024-03-10")).unwrap();
        let urls: Vec<_> = rows.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, ["https://jobs.lever.co/acme/new", "https://jobs.lever.co/acme/old"]);
        assert_eq!(fetch_window_at(&conn, u32::MAX, day("2024-03-10")).unwrap().len(), 2);
    }

    #[test]
    fn zero_day_window_is_empty() {
        let conn = memory_db();
        upsert_posting(&conn, &posting("https://a.example/1", "t", "2024-03-10")).unwrap();
        assert!(fetch_window_at(&conn, 0, day("2024-03-10")).unwrap().is_empty());
        assert_eq!(fetch_window_at(&conn, 1, day("2024-03-10")).unwrap().len(), 1);
    }

    #[test]
    fn source_round_trips_through_store() {
        let conn = memory_db();
        let mut p = posting("https://acme.wd5.myworkdayjobs.com/job/1", "t", "2024-03-10");
        p.source = Source::Workday;
        upsert_posting(&conn, &p).unwrap();
        let stored = fetch_posting(&conn, &p.url).unwrap().unwrap();
        assert_eq!(stored.source, Source::Workday);
    }

    #[test]
    fn run_metadata_is_recorded() {
        let conn = memory_db();
        start_run(&conn, "run-1", "2024-03-10T08:00:00Z", 5).unwrap();
        finish_run(&conn, "run-1", "2024-03-10T08:05:00Z", 42, 40).unwrap();
        let run = last_run(&conn).unwrap().unwrap();
        assert_eq!(run.run_id, "run-1");
        assert_eq!(run.query_count, 5);
        assert_eq!(run.new_links, 42);
        assert_eq!(run.pages_parsed, 40);
        assert_eq!(run.finished_at.as_deref(), Some("2024-03-10T08:05:00Z"));
    }

    #[test]
    fn posting_json_uses_labels_and_nulls() {
        let p = posting("https://a.example/1", "t", "2024-03-10");
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["source"], "Greenhouse");
        assert!(v["salary_min_usd"].is_null());

        let back: JobPosting =
            serde_json::from_str(r#"{"url":"https://x.example","source":"Somewhere"}"#).unwrap();
        assert_eq!(back.source, Source::Ats);
        assert_eq!(back.title, "");
    }
}
