use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const BROWSER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

static CLIENT: OnceCell<Client> = OnceCell::new();

/// The only network capability ingestion needs: the body of a URL as text.
pub trait PayloadFetcher: Sync {
    fn fetch_text(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct HttpFetcher {
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl PayloadFetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let client = http_client(self.timeout_secs)?;
        let resp = client
            .get(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .header(ACCEPT, "text/html,application/json,text/csv,*/*;q=0.8")
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            let snippet = body
                .trim()
                .replace(['\n', '\r'], " ")
                .chars()
                .take(200)
                .collect::<String>();
            return Err(anyhow!("http {status} for {url}: {snippet}"));
        }
        Ok(body)
    }
}

/// Shared client; the first caller's timeout wins for the rest of the process.
pub fn http_client(timeout_secs: u64) -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("failed to build http client")
    })
}
