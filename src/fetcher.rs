use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; JobsiteBot/1.0)";
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
}

impl FetchError {
    /// Rate limits, server errors and timeouts are worth another try.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(s) => *s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
            FetchError::Http(e) => e.is_timeout(),
        }
    }
}

/// One fetch result, successful or not.
pub struct FetchedPage {
    pub url: String,
    pub body: Result<String, FetchError>,
    pub latency_ms: u64,
}

pub fn client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// GET a page body. Non-2xx responses are errors.
pub async fn get(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    Ok(response.text().await?)
}

async fn get_with_retry(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let mut attempt = 0;
    loop {
        match get(client, url).await {
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "{} on {} (attempt {}/{}), backing off {:.1}s",
                    e,
                    url,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Fetch pages on up to `concurrency` workers, streaming each result back as
/// it completes. The receiver closes once every page has been reported.
pub fn fetch_streaming(
    client: reqwest::Client,
    urls: Vec<String>,
    concurrency: usize,
) -> mpsc::Receiver<FetchedPage> {
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let (tx, rx) = mpsc::channel::<FetchedPage>(concurrency * 2);

    for url in urls {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let start = Instant::now();
            let body = get_with_retry(&client, &url).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            debug!(url = %url, latency_ms, ok = body.is_ok(), "page fetched");
            let _ = tx.send(FetchedPage { url, body, latency_ms }).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);
    rx
}
