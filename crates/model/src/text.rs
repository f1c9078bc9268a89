use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid url regex"));

/// First `http(s)://` URL found in free text, e.g. a torrent comment.
pub fn find_url(text: &str) -> Option<&str> {
    URL_RE.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_url() {
        assert_eq!(
            find_url("Source: https://rutracker.org/forum/viewtopic.php?t=1 enjoy"),
            Some("https://rutracker.org/forum/viewtopic.php?t=1")
        );
        assert_eq!(find_url("http://a.b/c"), Some("http://a.b/c"));
        assert_eq!(find_url("see <https://x.y/z>"), Some("https://x.y/z"));
        assert_eq!(find_url("no links here"), None);
        assert_eq!(find_url(""), None);
    }
}
