use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::db::JobPosting;

const CSV_HEADER: [&str; 7] = [
    "title",
    "company",
    "location",
    "salary_range",
    "url",
    "source",
    "discovered_date",
];

/// Write `jobs.csv` and `jobs.json` under `<out_dir>/<day>/`, then replace
/// `<out_dir>/latest/` with a copy of that directory.
pub fn write_daily(out_dir: &Path, day: &str, postings: &[JobPosting]) -> Result<PathBuf> {
    let day_dir = out_dir.join(day);
    fs::create_dir_all(&day_dir).with_context(|| format!("Failed to create {:?}", day_dir))?;

    write_csv(&day_dir.join("jobs.csv"), postings)?;
    write_json(&day_dir.join("jobs.json"), postings)?;

    let latest = out_dir.join("latest");
    if latest.exists() {
        fs::remove_dir_all(&latest).with_context(|| format!("Failed to clear {:?}", latest))?;
    }
    copy_dir(&day_dir, &latest)?;

    info!("Wrote {} postings to {:?}", postings.len(), day_dir);
    Ok(day_dir)
}

fn write_csv(path: &Path, postings: &[JobPosting]) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    w.write_record(CSV_HEADER)?;
    for p in postings {
        w.write_record([
            p.title.as_str(),
            p.company.as_str(),
            p.location.as_str(),
            p.salary_raw.as_str(),
            p.url.as_str(),
            p.source.as_str(),
            p.discovered_date.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

fn write_json(path: &Path, postings: &[JobPosting]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, postings)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {:?}", dst))?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {:?}", entry.path()))?;
        }
    }
    Ok(())
}
