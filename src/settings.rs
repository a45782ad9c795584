use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

/// Optional settings file in the working directory (`jobsite.toml`).
const CONFIG_FILE: &str = "jobsite";
const ENV_PREFIX: &str = "JOBSITE";

const ATS_SITES: &str = "(site:boards.greenhouse.io OR site:jobs.ashbyhq.com OR site:jobs.lever.co OR site:myworkdayjobs.com OR site:jobs.smartrecruiters.com OR site:apply.workable.com)";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub public_dir: PathBuf,
    pub lock_file: PathBuf,
    pub seed_path: PathBuf,
    pub serper_api_key: Option<String>,
    #[serde(default)]
    pub queries: Vec<String>,
    pub results_per_query: usize,
    pub pages_per_query: usize,
    pub concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub window_days: u32,
}

impl Settings {
    /// Defaults, then `jobsite.toml`, then `JOBSITE_*` environment variables.
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment());
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .set_default("db_path", "data/jobs.sqlite")?
            .set_default("public_dir", "public")?
            .set_default("lock_file", "jobsite.lock")?
            .set_default("seed_path", "data/seed.json")?
            .set_default("results_per_query", 20_i64)?
            .set_default("pages_per_query", 1_i64)?
            .set_default("concurrency", 4_i64)?
            .set_default("fetch_timeout_secs", 25_i64)?
            .set_default("window_days", 7_i64)?
            .build()?
            .try_deserialize()
            .context("Invalid jobsite settings")
    }

    /// Command-line flags win over every other source.
    pub fn apply_overrides(
        &mut self,
        db: Option<PathBuf>,
        out_dir: Option<PathBuf>,
        lock_file: Option<PathBuf>,
    ) {
        if let Some(p) = db {
            self.db_path = p;
        }
        if let Some(p) = out_dir {
            self.public_dir = p;
        }
        if let Some(p) = lock_file {
            self.lock_file = p;
        }
    }

    /// Configured search queries, or the built-in set when none are given.
    pub fn search_queries(&self) -> Vec<String> {
        let queries: Vec<String> = self
            .queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            default_queries()
        } else {
            queries
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// `JOBSITE_*` variables; `JOBSITE_QUERIES` is a comma-separated list.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("queries")
}

pub fn default_queries() -> Vec<String> {
    [
        r#"("Senior Quality Engineer" OR SDET OR "QA Automation" OR "Software Development Engineer in Test" OR "Test Automation Engineer") (Appium OR Playwright OR "GitHub Actions" OR macOS OR iOS OR Android OR Golang) ("Remote" OR "United States" OR "US") -intern -internship -contract -temporary -freelance -agency"#,
        r#"(Appium OR "Mobile QA" OR "iOS QA" OR "Android QA" OR "mobile test automation") ("Senior" OR Lead OR Staff OR "Quality Engineer" OR SDET) ("Remote" OR "United States" OR "US") -intern -contract -temporary"#,
        r#"("QA Automation" OR SDET OR "Quality Engineer") ("CI/CD" OR "continuous integration" OR "GitHub Actions" OR "release readiness" OR "risk-based testing") ("Remote" OR "United States" OR "US") -intern -contract -temporary"#,
        r#"(macOS OR "desktop client" OR "endpoint agent" OR "device management") (QA OR "Quality Engineer" OR SDET OR "Test Automation") ("Remote" OR "United States" OR "US") -intern -contract -temporary"#,
        r#"("Quality Engineer" OR SDET OR "QA Automation" OR "Test Engineer") ("Wichita" OR "KS" OR "Kansas") -intern -internship -contract -temporary"#,
    ]
    .iter()
    .map(|q| format!("{} {}", ATS_SITES, q))
    .collect()
}
