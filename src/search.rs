use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Hosts that serve postings directly.
const ALLOWED_HOSTS: &[&str] = &[
    "boards.greenhouse.io",
    "jobs.ashbyhq.com",
    "jobs.lever.co",
    "myworkdayjobs.com",
    "jobs.smartrecruiters.com",
    "apply.workable.com",
    "recruiting.adp.com",
    "recruiting2.ultipro.com",
    "jobs.jobvite.com",
];

/// Tenant-subdomain ATS platforms.
const ALLOWED_SUFFIXES: &[&str] = &[
    ".icims.com",
    ".bamboohr.com",
    ".recruitee.com",
    ".breezy.hr",
    ".myworkdayjobs.com",
];

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search API key is not configured (set JOBSITE_SERPER_API_KEY)")]
    MissingApiKey,
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search API returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
    start: usize,
}

#[derive(Deserialize, Default)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: String,
}

/// One page of search results.
#[derive(Debug, Default)]
pub struct SearchPage {
    /// Allow-listed links, in result order.
    pub links: Vec<String>,
    /// Results the API returned before filtering; zero means no further pages.
    pub raw_results: usize,
}

impl SearchPage {
    fn from_response(body: SerperResponse, page_size: usize) -> Self {
        let raw_results = body.organic.len();
        let links = filter_links(body.organic.into_iter().map(|r| r.link), page_size);
        Self { links, raw_results }
    }

    pub fn is_last(&self) -> bool {
        self.raw_results == 0
    }
}

/// Web search restricted to applicant tracking system hosts.
pub struct SearchClient {
    http: reqwest::Client,
    api_key: String,
}

impl SearchClient {
    pub fn new(api_key: Option<&str>, timeout: Duration) -> Result<Self, SearchError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SearchError::MissingApiKey)?
            .to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, api_key })
    }

    /// One page of results for `query`, at most `page_size` allowed links.
    pub async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<SearchPage, SearchError> {
        let response = self
            .http
            .post(SERPER_URL)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: query,
                num: page_size,
                start: offset,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status()));
        }

        let body: SerperResponse = response.json().await?;
        debug!(results = body.organic.len(), offset, "search page received");
        Ok(SearchPage::from_response(body, page_size))
    }
}

pub fn host_allowed(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    ALLOWED_HOSTS.contains(&host) || ALLOWED_SUFFIXES.iter().any(|s| host.ends_with(s))
}

/// Keep unique, parseable, allow-listed links in their original order.
pub fn filter_links(links: impl IntoIterator<Item = String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| !link.is_empty())
        .filter(|link| Url::parse(link).map(|u| host_allowed(&u)).unwrap_or(false))
        .filter(|link| seen.insert(link.clone()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_only_ats_hosts() {
        let out = filter_links(
            links(&[
                "https://boards.greenhouse.io/acme/jobs/1",
                "https://www.linkedin.com/jobs/view/2",
                "https://acme.icims.com/jobs/3/job",
                "https://acme.wd5.myworkdayjobs.com/en-US/careers/job/4",
                "https://evil-icims.com/jobs/5",
            ]),
            20,
        );
        assert_eq!(
            out,
            links(&[
                "https://boards.greenhouse.io/acme/jobs/1",
                "https://acme.icims.com/jobs/3/job",
                "https://acme.wd5.myworkdayjobs.com/en-US/careers/job/4",
            ])
        );
    }

    #[test]
    fn drops_blanks_duplicates_and_garbage() {
        let out = filter_links(
            links(&[
                "",
                "not a url",
                "https://jobs.lever.co/acme/1",
                "https://jobs.lever.co/acme/1",
            ]),
            20,
        );
        assert_eq!(out, links(&["https://jobs.lever.co/acme/1"]));
    }

    #[test]
    fn caps_at_page_size() {
        let all: Vec<String> = (0..10)
            .map(|i| format!("https://jobs.ashbyhq.com/acme/{i}"))
            .collect();
        assert_eq!(filter_links(all, 3).len(), 3);
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = SearchClient::new(None, Duration::from_secs(5)).err().unwrap();
        assert!(matches!(err, SearchError::MissingApiKey));
        assert!(SearchClient::new(Some("  "), Duration::from_secs(5)).is_err());
    }

    #[test]
    fn response_without_organic_results_parses() {
        let body: SerperResponse = serde_json::from_str(r#"{"searchParameters":{}}"#).unwrap();
        assert!(body.organic.is_empty());
        assert!(SearchPage::from_response(body, 20).is_last());
    }

    #[test]
    fn page_of_disallowed_hosts_is_not_the_last() {
        let body: SerperResponse = serde_json::from_str(
            r#"{"organic":[{"link":"https://www.linkedin.com/jobs/view/1"},
                           {"link":"https://www.indeed.com/viewjob?jk=2"}]}"#,
        )
        .unwrap();
        let page = SearchPage::from_response(body, 20);
        assert!(page.links.is_empty());
        assert_eq!(page.raw_results, 2);
        assert!(!page.is_last());
    }
}
