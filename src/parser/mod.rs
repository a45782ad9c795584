pub mod fields;

use chrono::{NaiveDate, Utc};

use crate::db::{JobPosting, Source};
use crate::normalize::{is_remote_us, parse_salary};

/// Static descriptive labels attached to every posting.
pub const TAGS: &str = "appium,playwright,ci-cd,macos,ios,android";

/// Host fragments checked in order; the first hit names the source.
const SOURCE_HOSTS: &[(&str, Source)] = &[
    ("greenhouse.io", Source::Greenhouse),
    ("ashbyhq.com", Source::Ashby),
    ("lever.co", Source::Lever),
    ("myworkdayjobs", Source::Workday),
    ("smartrecruiters", Source::SmartRecruiters),
    ("workable.com", Source::Workable),
];

pub fn source_from_host(host: &str) -> Source {
    let host = host.to_lowercase();
    SOURCE_HOSTS
        .iter()
        .find(|(fragment, _)| host.contains(fragment))
        .map(|(_, source)| *source)
        .unwrap_or(Source::Ats)
}

/// Host part of a canonical URL, or the whole string when it does not parse.
pub fn host_of(canonical_url: &str) -> String {
    url::Url::parse(canonical_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| canonical_url.to_string())
}

/// Two-step pipeline: html → fields → posting, discovered today (UTC).
pub fn assemble(canonical_url: &str, raw_html: &str, source_host: &str) -> JobPosting {
    assemble_on(canonical_url, raw_html, source_host, Utc::now().date_naive())
}

/// [`assemble`] with an explicit discovery date.
pub fn assemble_on(
    canonical_url: &str,
    raw_html: &str,
    source_host: &str,
    discovered: NaiveDate,
) -> JobPosting {
    let f = fields::extract(raw_html);

    let location = f.location.trim().to_string();
    let salary_raw = f.salary_text.trim().to_string();
    let (salary_min_usd, salary_max_usd) = parse_salary(&salary_raw);
    let is_remote_us = is_remote_us(&location, raw_html);

    JobPosting {
        url: canonical_url.to_string(),
        title: f.title.trim().to_string(),
        company: f.company.trim().to_string(),
        location,
        salary_raw,
        salary_min_usd,
        salary_max_usd,
        source: source_from_host(source_host),
        posted_date: f.posted_date.trim().to_string(),
        discovered_date: discovered.format("%Y-%m-%d").to_string(),
        is_remote_us,
        tags: TAGS.to_string(),
    }
}
