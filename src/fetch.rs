//! Loading documents from URLs and local files.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::batch::DocumentSource;
use crate::constants::{
    ACCEPT as ACCEPT_VALUE, ACCEPT_LANGUAGE as ACCEPT_LANGUAGE_VALUE, CORS_PROXY_PREFIX,
    DEFAULT_FETCH_TIMEOUT_SECS, MIN_DOCUMENT_LENGTH, STEAM_AGE_COOKIES, STEAM_HOST,
    USER_AGENT as USER_AGENT_VALUE,
};

/// How documents are fetched.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Route requests through a public CORS proxy to get past naive bot blocking.
    pub proxy: bool,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            proxy: false,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

/// Loads documents from `http(s)` URLs or from the filesystem.
pub struct Fetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl Fetcher {
    /// Creates a fetcher with browser-like default headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(options: FetchOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .context("Unable to build HTTP client")?;

        Ok(Self { client, options })
    }

    /// Loads one document. Failures are captured in the returned source
    /// rather than propagated.
    pub async fn load(&self, source: &str) -> DocumentSource {
        let loaded = if is_url(source) {
            self.fetch_url(source).await
        } else {
            read_file(source).await
        };

        match loaded {
            Ok(html) => {
                info!("Loaded {source} ({} bytes)", html.len());
                DocumentSource::loaded(source, html)
            }
            Err(err) => {
                warn!("Unable to load {source}: {err:#}");
                DocumentSource::failed(source, format!("{err:#}"))
            }
        }
    }

    /// Loads many documents with up to `concurrency` requests in flight.
    ///
    /// Results keep the order of `sources`. Once `cancel` is raised no new
    /// document is taken and the documents loaded so far are returned.
    pub async fn load_all(
        &self,
        sources: &[String],
        concurrency: usize,
        cancel: &AtomicBool,
    ) -> Vec<DocumentSource> {
        let mut loaded = Vec::with_capacity(sources.len());
        let mut pending = stream::iter(sources)
            .map(|source| self.load(source))
            .buffered(concurrency.max(1));

        loop {
            if cancel.load(Ordering::Relaxed) {
                warn!("Loading cancelled after {}/{}", loaded.len(), sources.len());
                break;
            }
            let Some(document) = pending.next().await else {
                break;
            };
            loaded.push(document);
        }

        loaded
    }

    async fn fetch_url(&self, source: &str) -> Result<String> {
        let url = Url::parse(source).context("Invalid URL")?;
        let request_url = if self.options.proxy {
            format!("{CORS_PROXY_PREFIX}{url}")
        } else {
            url.to_string()
        };

        let mut request = self.client.get(&request_url);
        if url
            .host_str()
            .is_some_and(|host| host.ends_with(STEAM_HOST))
        {
            request = request.header(COOKIE, STEAM_AGE_COOKIES);
        }

        let response = request
            .send()
            .await
            .context("Request failed")?
            .error_for_status()?;
        let html = response.text().await.context("Unable to read body")?;

        if html.len() < MIN_DOCUMENT_LENGTH {
            bail!("Response too short or empty");
        }

        Ok(html)
    }
}

/// Reads a local path or a `file://` URL.
async fn read_file(source: &str) -> Result<String> {
    let path = match Url::parse(source) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| anyhow::anyhow!("Invalid file URL: {source}"))?,
        _ => PathBuf::from(source),
    };
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
