use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use encoding_rs::{Encoding, UTF_8};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::{Result, TrackerError};
use crate::http::{with_query, HttpClient, HttpRequest, HttpResponse};
use crate::page::{self, Page};

const PAGE_CACHE_SIZE: usize = 64;

/// Credentials attached to page requests.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth {
    pub cookies: BTreeMap<String, String>,
    /// Ready to append query string, e.g. `sid=abc`.
    pub query: Option<String>,
}

/// Page retrieval shared by all trackers: mirror pick, auth decoration, page
/// decoding and a page cache that lives for one torrent fetch.
pub struct TrackerCore {
    alias: String,
    mirrors: Vec<String>,
    http: HttpClient,
    /// Page and form charset when the server does not name one.
    encoding: &'static Encoding,
    mirror: OnceCell<String>,
    pages: Mutex<LruCache<String, Page>>,
}

impl TrackerCore {
    pub fn new(alias: impl Into<String>, mirrors: Vec<String>, http: HttpClient) -> Self {
        let capacity = NonZeroUsize::new(PAGE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            alias: alias.into(),
            mirrors,
            http,
            encoding: UTF_8,
            mirror: OnceCell::new(),
            pages: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Use the charset labelled `label` (e.g. `windows-1251`) for pages served
    /// without one and for submitted forms.
    pub fn with_encoding(mut self, label: &str) -> Self {
        self.encoding = Encoding::for_label(label.as_bytes()).unwrap_or(UTF_8);
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Forget every cached page.
    pub fn clear_pages(&self) {
        self.pages.lock().clear();
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Domain to use instead of the one in `url`. Picked once per instance: the
    /// first mirror whose test response stays on that mirror wins, otherwise
    /// the original domain is kept.
    pub async fn pick_mirror(&self, url: &str) -> Result<&str> {
        let original =
            page::domain(url).ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;
        let scheme = if url.starts_with("https") { "https" } else { "http" };

        let picked = self
            .mirror
            .get_or_init(|| async move {
                if self.mirrors.is_empty() {
                    return original;
                }
                tracing::debug!("Picking a mirror for {} ...", self.alias);

                for mirror in &self.mirrors {
                    let mirror_url = format!("{}://{}", scheme, mirror);
                    tracing::debug!("Probing mirror `{}` ...", mirror_url);

                    match self.http.execute(HttpRequest::get(&mirror_url)).await {
                        Ok(response) if response.url.starts_with(&mirror_url) => {
                            tracing::debug!("Mirror picked: {}", mirror);
                            return mirror.clone();
                        }
                        Ok(response) => {
                            tracing::debug!("Mirror {} redirects to {}", mirror, response.url)
                        }
                        Err(e) => tracing::debug!("Mirror {} is unavailable: {}", mirror, e),
                    }
                }

                tracing::debug!("No mirror available, using {}", original);
                original
            })
            .await;

        Ok(picked.as_str())
    }

    /// `url` with its domain replaced by the picked mirror.
    pub async fn mirrored_url(&self, url: &str) -> Result<String> {
        let original =
            page::domain(url).ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;
        let mirror = self.pick_mirror(url).await?;
        Ok(url.replacen(&original, mirror, 1))
    }

    /// Fetch a page, serving it from cache unless `drop_cache` is set.
    pub async fn fetch_page(&self, url: &str, auth: &RequestAuth, drop_cache: bool) -> Result<Page> {
        if drop_cache {
            self.pages.lock().pop(url);
        } else if let Some(page) = self.pages.lock().get(url) {
            tracing::debug!("Page cache hit: {}", url);
            return Ok(page.clone());
        }

        let response = self
            .request(HttpRequest::get(url).cookies(auth.cookies.clone()), auth.query.as_deref())
            .await?;
        let page = Page::new(response.url.clone(), response.decode(self.encoding));

        self.pages.lock().put(url.to_string(), page.clone());
        Ok(page)
    }

    /// Issue a request against the mirrored URL with an auth query appended.
    pub async fn request(&self, mut request: HttpRequest, query: Option<&str>) -> Result<HttpResponse> {
        let url = self.mirrored_url(&request.url).await?;
        request.url = with_query(&url, query);
        request.encoding.get_or_insert(self.encoding);
        self.http.execute(request).await
    }

    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.request(HttpRequest::get(url), None).await?;
        serde_json::from_slice(&response.body)
            .map_err(|e| TrackerError::Parse(format!("{}: {}", url, e)))
    }
}
