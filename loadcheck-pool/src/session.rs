//! Per-user session state: cookie jar, HTTP client and conditional cache

use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Settings applied to every user's HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Per-request timeout, subordinate to the run deadline
    pub timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Accept self-signed certificates on the target
    pub accept_invalid_certs: bool,

    /// Maximum idle connections kept per host
    pub max_idle_per_host: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("loadcheck/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_invalid_certs: false,
            max_idle_per_host: 4,
        }
    }
}

/// Conditional-request memo for one path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    /// `ETag` of the last full response
    pub etag: Option<String>,

    /// `Last-Modified` of the last full response
    pub last_modified: Option<String>,

    /// The cached behaviour of this path has been exercised successfully
    pub verified: bool,
}

impl CacheRecord {
    /// `If-None-Match` / `If-Modified-Since` headers for a revalidation
    pub fn conditional_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(etag) = &self.etag {
            headers.push(("If-None-Match", etag.clone()));
        }
        if let Some(last_modified) = &self.last_modified {
            headers.push(("If-Modified-Since", last_modified.clone()));
        }
        headers
    }
}

/// Cookie store whose underlying jar can be swapped out.
///
/// The client keeps a handle to this store for its whole life, so clearing
/// cookies never requires rebuilding the client.
#[derive(Debug, Default)]
struct SessionCookies {
    jar: RwLock<Arc<Jar>>,
}

impl SessionCookies {
    fn clear(&self) {
        *self.jar.write() = Arc::new(Jar::default());
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.jar.read().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.read().cookies(url)
    }
}

/// Isolated HTTP session of one virtual user
#[derive(Debug)]
pub struct Session {
    cookies: Arc<SessionCookies>,
    client: Client,
    cache: HashMap<String, CacheRecord>,
}

impl Session {
    /// Build a fresh session with an empty jar and cache.
    ///
    /// Redirects are never followed: redirect targets are expectations the
    /// player checks, not something to traverse silently.
    pub fn new(settings: &SessionSettings) -> Result<Self, reqwest::Error> {
        let cookies = Arc::new(SessionCookies::default());
        let client = Client::builder()
            .cookie_provider(cookies.clone())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.as_str())
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .build()?;

        Ok(Self {
            cookies,
            client,
            cache: HashMap::new(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// `Cookie` header value the session would send to `url`
    pub fn cookies_for(&self, url: &Url) -> Option<String> {
        self.cookies
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Drop every cookie; the conditional cache is kept, like a browser
    /// that logs out without clearing its cache
    pub fn clear_cookies(&mut self) {
        debug!("Clearing session cookies");
        self.cookies.clear();
    }

    pub fn cache_record(&self, key: &str) -> Option<&CacheRecord> {
        self.cache.get(key)
    }

    pub fn store_cache_record(&mut self, key: impl Into<String>, record: CacheRecord) {
        self.cache.insert(key.into(), record);
    }
}
