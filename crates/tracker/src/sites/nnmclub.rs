use std::sync::LazyLock;

use async_trait::async_trait;
use model::PageData;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::LoginSpec;
use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::Page;
use crate::site::{LinkLookup, Site};

static DL_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"download\.php").expect("valid regex"));

/// nnm-club.me, private. The session id travels in the `sid` query parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NnmClub {}

fn login_form(user: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("username".into(), user.into()),
        ("password".into(), password.into()),
        ("autologin".into(), "1".into()),
        ("redirect".into(), String::new()),
        ("login".into(), "pushed".into()),
    ]
}

#[async_trait]
impl Site for NnmClub {
    const ALIAS: &'static str = "nnm-club.me";

    fn mirrors(&self) -> Vec<String> {
        ["nnm-club.name", "nnmclub.to"].map(String::from).to_vec()
    }

    fn login_spec() -> Option<LoginSpec> {
        Some(LoginSpec {
            url: "{origin}/forum/login.php",
            auth_cookie: None,
            auth_qs_param: Some("sid"),
            form: login_form,
            login_token: None,
        })
    }

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        Ok(page
            .find_link(&DL_LINK)
            .map_or(LinkLookup::LoginRequired, LinkLookup::Found))
    }

    fn page_data(&self, page: &Page) -> PageData {
        let mut data = page.default_data();
        if let Some(title) = page.select_attr("var.postImg", "title").into_iter().next() {
            let (_, link) = title.split_once("link=").unwrap_or(("", title.as_str()));
            data.cover = link.to_string();
        }
        data.date_updated = page
            .select_text("span.postdata")
            .into_iter()
            .find(|s| !s.is_empty());
        data
    }
}
