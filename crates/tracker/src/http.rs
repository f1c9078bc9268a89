use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER};
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy, StatusCode};
use url::form_urlencoded;

use crate::error::{Result, TrackerError};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Transport options shared by every tracker.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Proxy URL applied to all tracker traffic.
    pub tunnel: Option<String>,
    /// Directory to save every fetched page into.
    pub dump_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            tunnel: None,
            dump_dir: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A single tracker request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub url: String,
    /// POST form fields. `None` means GET.
    pub form: Option<Vec<(String, String)>>,
    pub cookies: BTreeMap<String, String>,
    pub referer: Option<String>,
    pub follow_redirects: bool,
    /// Charset of the form values; UTF-8 when unset.
    pub encoding: Option<&'static Encoding>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            follow_redirects: true,
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            form: Some(form),
            ..Self::get(url)
        }
    }

    pub fn cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

/// Response with the bits trackers care about.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: StatusCode,
    pub cookies: BTreeMap<String, String>,
    /// Charset named by the `Content-Type` header.
    pub charset: Option<&'static Encoding>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        self.decode(UTF_8)
    }

    /// Body decoded with the response charset, or `fallback` when the server
    /// names none.
    pub fn decode(&self, fallback: &'static Encoding) -> String {
        let (text, _, _) = self.charset.unwrap_or(fallback).decode(&self.body);
        text.into_owned()
    }
}

/// HTTP transport for trackers: browser user agent, fixed timeouts, optional
/// tunnel and a second client that never follows redirects (for logins).
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    no_redirect: Client,
    dump_dir: Option<PathBuf>,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Self::builder(&config, Policy::limited(10))?;
        let no_redirect = Self::builder(&config, Policy::none())?;

        if config.tunnel.is_some() {
            tracing::info!("Tracker traffic goes through the configured tunnel");
        }

        Ok(Self {
            client,
            no_redirect,
            dump_dir: config.dump_dir,
        })
    }

    fn builder(config: &HttpConfig, redirect: Policy) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(redirect);

        if let Some(tunnel) = &config.tunnel {
            let proxy = Proxy::all(tunnel)
                .map_err(|e| TrackerError::Configuration(format!("invalid tunnel: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }

    /// Perform a request. Non-success statuses other than redirects are errors.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect
        };

        let mut builder = match &request.form {
            Some(form) => client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_form(form, request.encoding.unwrap_or(UTF_8))),
            None => client.get(&request.url),
        };

        if !request.cookies.is_empty() {
            builder = builder.header(COOKIE, cookie_header(&request.cookies));
        }
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }

        tracing::debug!(
            "{} {}",
            if request.form.is_some() { "POST" } else { "GET" },
            request.url
        );

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset);

        if !status.is_success() && !status.is_redirection() {
            return Err(TrackerError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?.to_vec();
        self.dump(&url, &body).await;

        Ok(HttpResponse {
            url,
            status,
            cookies,
            charset,
            body,
        })
    }

    async fn dump(&self, url: &str, body: &[u8]) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let path = dir.join(dump_file_name(url));
        if let Err(e) = tokio::fs::write(&path, body).await {
            tracing::warn!("Failed to dump {} into {}: {}", url, path.display(), e);
        }
    }
}

/// `application/x-www-form-urlencoded` body with values in `encoding`.
fn encode_form(form: &[(String, String)], encoding: &'static Encoding) -> String {
    let encode: &dyn Fn(&str) -> Cow<'_, [u8]> = &|s| encoding.encode(s).0;
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.encoding_override(Some(encode));
    serializer.extend_pairs(form);
    serializer.finish()
}

/// Encoding named by the `charset` parameter of a `Content-Type` value.
fn charset(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches('"').as_bytes())
    })
}

fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

fn dump_file_name(url: &str) -> String {
    let name: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    format!("{}.html", name)
}

/// Append an auth query string (`sid=...`) to a URL.
pub fn with_query(url: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}", url, sep, q)
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut cookies = BTreeMap::new();
        cookies.insert("b".to_string(), "2".to_string());
        cookies.insert("a".to_string(), "1".to_string());
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
    }

    #[test]
    fn test_encode_form() {
        let form = vec![
            ("login".to_string(), "Вход".to_string()),
            ("user".to_string(), "a b&c".to_string()),
        ];
        assert_eq!(
            encode_form(&form, encoding_rs::WINDOWS_1251),
            "login=%C2%F5%EE%E4&user=a+b%26c"
        );
        assert_eq!(
            encode_form(&form[..1], UTF_8),
            "login=%D0%92%D1%85%D0%BE%D0%B4"
        );
    }

    #[test]
    fn test_charset() {
        assert_eq!(charset("text/html; charset=windows-1251"), Some(encoding_rs::WINDOWS_1251));
        assert_eq!(charset("text/html;Charset=\"UTF-8\""), Some(UTF_8));
        assert_eq!(charset("text/html"), None);
        assert_eq!(charset("text/html; charset=nonsense"), None);
    }

    #[test]
    fn test_with_query() {
        assert_eq!(with_query("http://a/x", Some("sid=1")), "http://a/x?sid=1");
        assert_eq!(with_query("http://a/x?t=5", Some("sid=1")), "http://a/x?t=5&sid=1");
        assert_eq!(with_query("http://a/x", None), "http://a/x");
        assert_eq!(with_query("http://a/x", Some("")), "http://a/x");
    }

    #[test]
    fn test_dump_file_name() {
        assert_eq!(
            dump_file_name("https://rutor.org/torrent/1?x=2"),
            "rutor.org_torrent_1_x_2.html"
        );
    }

    #[tokio::test]
    async fn test_pages_are_dumped() {
        let base = crate::test_support::serve(axum::Router::new().route(
            "/torrent/1",
            axum::routing::get(|| async { "<html>page</html>" }),
        ))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let http = HttpClient::new(HttpConfig {
            dump_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        let url = format!("{}/torrent/1", base);
        http.execute(HttpRequest::get(&url)).await.unwrap();

        let dumped = std::fs::read_to_string(dir.path().join(dump_file_name(&url))).unwrap();
        assert_eq!(dumped, "<html>page</html>");
    }

    #[tokio::test]
    async fn test_error_status() {
        let base = crate::test_support::serve(axum::Router::new()).await;
        let err = HttpClient::new(HttpConfig::default())
            .unwrap()
            .execute(HttpRequest::get(format!("{}/missing", base)))
            .await;
        assert!(matches!(err, Err(TrackerError::Status { status: 404, .. })));
    }
}
