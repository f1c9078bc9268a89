use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::LoginSpec;
use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::{self, Page};
use crate::site::{DownloadRequest, LinkLookup, Site};

static DL_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"dl\.php").expect("valid regex"));
static REGISTER_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"register").expect("valid regex"));
static FORM_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"form_token\s*:\s*['"]([^'"]+)['"]"#).expect("valid regex"));

/// rutracker.org, private. Downloads are POSTed with the page's `form_token`
/// and a `bb_dl` cookie naming the topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rutracker {}

fn login_form(user: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("login_username".into(), user.into()),
        ("login_password".into(), password.into()),
        ("login".into(), "pushed".into()),
        ("redirect".into(), "index.php".into()),
    ]
}

pub(crate) fn form_token(page: &Page) -> Option<String> {
    FORM_TOKEN
        .captures(&page.html)
        .map(|c| c[1].to_string())
}

#[async_trait]
impl Site for Rutracker {
    const ALIAS: &'static str = "rutracker.org";
    const ENCODING: &'static str = "windows-1251";

    fn mirrors(&self) -> Vec<String> {
        ["rutracker.org", "rutracker.net", "maintracker.org"]
            .map(String::from)
            .to_vec()
    }

    fn login_spec() -> Option<LoginSpec> {
        Some(LoginSpec {
            url: "{origin}/forum/login.php",
            auth_cookie: Some("bb_session"),
            auth_qs_param: None,
            form: login_form,
            login_token: None,
        })
    }

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        if page.find_link(&REGISTER_LINK).is_some() {
            return Ok(LinkLookup::LoginRequired);
        }
        Ok(page
            .find_link(&DL_LINK)
            .map_or(LinkLookup::NotFound, LinkLookup::Found))
    }

    fn download_request(&self, page: &Page, link: String) -> DownloadRequest {
        let mut request = DownloadRequest::get(link);
        if let Some(topic) = page::query_param(&request.url, "t") {
            request.cookies.insert("bb_dl".into(), topic);
        }
        request.form = form_token(page).map(|token| vec![("form_token".into(), token)]);
        request
    }
}
