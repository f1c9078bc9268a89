use model::PageData;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// A fetched tracker page.
///
/// Holds raw HTML; every helper parses on demand so a `Page` stays `Send` and
/// can be cached across awaits.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL the page was served from (after mirror substitution and redirects).
    pub url: String,
    pub html: String,
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::debug!("Bad selector `{}`: {}", css, e);
            None
        }
    }
}

impl Page {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// First `href` on the page matching `pattern`, expanded against the page URL.
    pub fn find_link(&self, pattern: &Regex) -> Option<String> {
        let document = Html::parse_document(&self.html);
        let any_href = selector("[href]")?;
        document
            .select(&any_href)
            .filter_map(|el| el.value().attr("href"))
            .find(|href| pattern.is_match(href))
            .map(|href| expand_link(&self.url, href))
    }

    /// All anchors on the page, expanded.
    pub fn links(&self) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        let Some(a) = selector("a[href]") else {
            return Vec::new();
        };
        document
            .select(&a)
            .filter_map(|el| el.value().attr("href"))
            .map(|href| expand_link(&self.url, href))
            .collect()
    }

    /// First anchor whose trimmed text equals `text`, expanded.
    pub fn link_by_text(&self, text: &str) -> Option<String> {
        let document = Html::parse_document(&self.html);
        let a = selector("a[href]")?;
        document
            .select(&a)
            .find(|el| el.text().collect::<String>().trim() == text)
            .and_then(|el| el.value().attr("href"))
            .map(|href| expand_link(&self.url, href))
    }

    pub fn exists(&self, css: &str) -> bool {
        let document = Html::parse_document(&self.html);
        selector(css).is_some_and(|s| document.select(&s).next().is_some())
    }

    pub fn select_attr(&self, css: &str, attr: &str) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        let Some(s) = selector(css) else {
            return Vec::new();
        };
        document
            .select(&s)
            .filter_map(|el| el.value().attr(attr))
            .map(str::to_string)
            .collect()
    }

    pub fn select_text(&self, css: &str) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        let Some(s) = selector(css) else {
            return Vec::new();
        };
        document
            .select(&s)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect()
    }

    /// Pairs of (text of `label_css`, `href` of `link_css`) for every `block_css`.
    pub fn select_pairs(
        &self,
        block_css: &str,
        label_css: &str,
        link_css: &str,
    ) -> Vec<(String, Option<String>)> {
        let document = Html::parse_document(&self.html);
        let (Some(block), Some(label), Some(link)) =
            (selector(block_css), selector(label_css), selector(link_css))
        else {
            return Vec::new();
        };
        document
            .select(&block)
            .map(|el| {
                let text = el
                    .select(&label)
                    .next()
                    .map(|l| l.text().collect::<String>().trim().to_string())
                    .unwrap_or_default();
                let href = el
                    .select(&link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| expand_link(&self.url, href));
                (text, href)
            })
            .collect()
    }

    pub fn meta(&self, property: &str) -> Option<String> {
        self.select_attr(&format!(r#"meta[property="{}"]"#, property), "content")
            .into_iter()
            .find(|v| !v.is_empty())
    }

    pub fn title(&self) -> String {
        self.meta("og:title")
            .or_else(|| self.select_text("title").into_iter().next())
            .unwrap_or_default()
    }

    /// Cover image: `og:image`, then the first image inside a post body.
    pub fn cover(&self) -> String {
        self.meta("og:image")
            .or_else(|| {
                self.select_attr(".postbody img, .post_body img", "src")
                    .into_iter()
                    .next()
                    .map(|src| expand_link(&self.url, &src))
            })
            .unwrap_or_default()
    }

    /// Title and cover extracted the generic way.
    pub fn default_data(&self) -> PageData {
        PageData {
            title: self.title(),
            cover: self.cover(),
            date_updated: None,
        }
    }
}

/// Resolve a possibly relative link against the page it was found on.
pub fn expand_link(base: &str, link: &str) -> String {
    if link.starts_with("http") {
        return link.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

/// `host[:port]` of a URL.
pub fn domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// `scheme://host[:port]` of a URL.
pub fn origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(format!("{}://{}", parsed.scheme(), domain(url)?))
}

/// Value of a query parameter.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
        <html><head>
          <title> Topic title </title>
          <meta property="og:image" content="https://img.example/cover.jpg">
        </head><body>
          <a href="/forum/profile.php?mode=register">Register</a>
          <a href="dl.php?t=42">Download</a>
          <div class="q"><span>Quality [720p]</span><a class="get" href="/t/720.torrent">get</a></div>
          <div class="q"><span>Quality [1080p]</span></div>
        </body></html>"#;

    fn page() -> Page {
        Page::new("https://rutracker.org/forum/viewtopic.php?t=42", HTML)
    }

    #[test]
    fn test_find_link_expands_relative() {
        let re = Regex::new(r"dl\.php").unwrap();
        assert_eq!(
            page().find_link(&re).as_deref(),
            Some("https://rutracker.org/forum/dl.php?t=42")
        );
        assert!(page().find_link(&Regex::new("nothing").unwrap()).is_none());
    }

    #[test]
    fn test_metadata() {
        let p = page();
        assert_eq!(p.title(), "Topic title");
        assert_eq!(p.cover(), "https://img.example/cover.jpg");
        assert!(p.exists("div.q span"));
        assert!(!p.exists("div.missing"));
        assert_eq!(p.links().len(), 3);
    }

    #[test]
    fn test_select_pairs() {
        let pairs = page().select_pairs("div.q", "span", "a.get");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "Quality [720p]");
        assert_eq!(
            pairs[0].1.as_deref(),
            Some("https://rutracker.org/t/720.torrent")
        );
        assert_eq!(pairs[1].1, None);
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(domain("http://127.0.0.1:8080/x").as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(domain("https://nnm-club.me/forum").as_deref(), Some("nnm-club.me"));
        assert_eq!(origin("https://nnm-club.me/forum").as_deref(), Some("https://nnm-club.me"));
        assert_eq!(
            query_param("https://x.y/index.php?sid=abc&t=1", "sid").as_deref(),
            Some("abc")
        );
        assert_eq!(query_param("https://x.y/", "sid"), None);
        assert_eq!(expand_link("https://a.b/c/d", "https://z/q"), "https://z/q");
    }
}
