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

static DL_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"dl\.php").expect("valid regex"));

/// eniahd.com, private.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EniaHd {}

fn login_form(user: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("login_username".into(), user.into()),
        ("login_password".into(), password.into()),
        ("autologin".into(), "1".into()),
        ("redirect".into(), String::new()),
        ("login".into(), "Вход".into()),
    ]
}

#[async_trait]
impl Site for EniaHd {
    const ALIAS: &'static str = "eniahd.com";

    fn mirrors(&self) -> Vec<String> {
        ["eniahd.com", "eniatv.com"].map(String::from).to_vec()
    }

    fn login_spec() -> Option<LoginSpec> {
        Some(LoginSpec {
            url: "{origin}/login.php",
            auth_cookie: Some("bb_data"),
            auth_qs_param: None,
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
        if let Some(cover) = page.select_attr("var.postImg", "title").into_iter().next() {
            data.cover = cover;
        }
        data
    }
}
