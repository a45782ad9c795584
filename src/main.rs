mod db;
mod fetcher;
mod lock;
mod normalize;
mod parser;
mod render;
mod run;
mod search;
mod settings;

use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::lock::RunLock;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "jobsite", version, about = "Remote QA/SDET job postings from ATS boards")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory receiving the dated exports
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,
    /// PID file guarding daily/weekly runs
    #[arg(long, global = true)]
    lock_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search, fetch and store new postings, then export the window
    Daily,
    /// Export the window without searching
    Weekly,
    /// Load postings from the seed file, then export the window
    Seed {
        /// Seed JSON file (default: settings seed_path)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Show store statistics
    Stats,
    /// Print one stored posting as JSON
    Show {
        /// Posting URL (canonicalized before lookup)
        url: String,
    },
    /// Postings in the window as a table
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Only remote-US postings
        #[arg(long)]
        remote: bool,
    },
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

    let mut settings = Settings::load()?;
    settings.apply_overrides(cli.db, cli.out_dir, cli.lock_file);

    let result = match cli.command {
        Commands::Daily => {
            let lock = RunLock::acquire(&settings.lock_file).context("Could not take run lock")?;
            let conn = open_store(&settings)?;
            let stats = run::run_daily(&conn, &settings).await?;
            println!(
                "Queries: {} | new links: {} | parsed: {} | fetch errors: {} | store errors: {}",
                stats.queries, stats.new_links, stats.pages_parsed, stats.fetch_errors, stats.store_errors
            );
            println!("Inserted {} new postings, updated {}.", stats.inserted, stats.updated);
            export_window(&conn, &settings)?;
            lock.release()?;
            Ok(())
        }
        Commands::Weekly => {
            let lock = RunLock::acquire(&settings.lock_file).context("Could not take run lock")?;
            let conn = open_store(&settings)?;
            export_window(&conn, &settings)?;
            lock.release()?;
            Ok(())
        }
        Commands::Seed { file } => {
            let conn = open_store(&settings)?;
            let path = file.unwrap_or_else(|| settings.seed_path.clone());
            let stats = run::load_seed(&conn, &path)?;
            println!(
                "Seeded from {:?}: {} inserted, {} updated, {} errors.",
                path, stats.inserted, stats.updated, stats.store_errors
            );
            export_window(&conn, &settings)?;
            Ok(())
        }
        Commands::Stats => {
            let conn = open_store(&settings)?;
            let s = db::get_stats(&conn, settings.window_days)?;
            println!("Total:     {}", s.total);
            println!("Remote US: {}", s.remote_us);
            println!("Salaried:  {}", s.salaried);
            println!("Last {}d:  {}", settings.window_days, s.in_window);
            match db::last_run(&conn)? {
                Some(r) => println!(
                    "Last run:  {} (started {}, {} queries, {} new links, {} parsed, finished {})",
                    r.run_id,
                    r.started_at,
                    r.query_count,
                    r.new_links,
                    r.pages_parsed,
                    r.finished_at.as_deref().unwrap_or("never")
                ),
                None => println!("Last run:  none"),
            }
            if let Some((pid, since)) = lock::lock_info(&settings.lock_file) {
                let state = if lock::process_exists(pid) { "running" } else { "stale" };
                println!("Lock:      PID {} ({}, since {})", pid, state, format_time(since));
            }
            Ok(())
        }
        Commands::Show { url } => {
            let conn = open_store(&settings)?;
            let canon = normalize::canonicalize(&url);
            match db::fetch_posting(&conn, &canon)? {
                Some(p) => println!("{}", serde_json::to_string_pretty(&p)?),
                None => println!("No posting stored for {}", canon),
            }
            Ok(())
        }
        Commands::List { limit, remote } => {
            let conn = open_store(&settings)?;
            let rows: Vec<_> = db::fetch_window(&conn, settings.window_days)?
                .into_iter()
                .filter(|p| !remote || p.is_remote_us)
                .take(limit)
                .collect();
            if rows.is_empty() {
                println!("No postings in the last {} days.", settings.window_days);
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:<20} | {:<20} | {:<15} | {:<10}",
                "#", "Title", "Company", "Location", "Salary", "Date"
            );
            println!("{}", "-".repeat(114));

            for (i, p) in rows.iter().enumerate() {
                let salary = match (p.salary_min_usd, p.salary_max_usd) {
                    (Some(min), Some(max)) if min == max => format!("${}k", min / 1000),
                    (Some(min), Some(max)) => format!("${}k-{}k", min / 1000, max / 1000),
                    _ => "-".into(),
                };
                println!(
                    "{:>3} | {:<32} | {:<20} | {:<20} | {:<15} | {:<10}",
                    i + 1,
                    truncate(&p.title, 32),
                    truncate(&p.company, 20),
                    truncate(&p.location, 20),
                    salary,
                    p.discovered_date
                );
            }

            println!("\n{} postings | source: {}", rows.len(), settings.db_path.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Export the retention window under today's UTC date.
fn export_window(conn: &Connection, settings: &Settings) -> anyhow::Result<()> {
    let postings = db::fetch_window(conn, settings.window_days)?;
    let day = Utc::now().format("%Y-%m-%d").to_string();
    let dir = render::write_daily(&settings.public_dir, &day, &postings)?;
    println!(
        "{} postings in the last {} days -> {}",
        postings.len(),
        settings.window_days,
        dir.display()
    );
    Ok(())
}

fn format_time(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Cut a table cell to `max` characters, marking the cut.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("Senior SDET", 20), "Senior SDET");
        assert_eq!(truncate("Ingénieur qualité logiciel", 9), "Ingénieur...");
        assert_eq!(truncate("Ingénieur", 9), "Ingénieur");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3605)), "1h 0m 5s");
    }

    #[test]
    fn cli_accepts_global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from(["jobsite", "list", "-n", "5", "--remote", "--db", "x.sqlite"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.sqlite")));
        assert!(matches!(cli.command, Commands::List { limit: 5, remote: true }));
    }
}
