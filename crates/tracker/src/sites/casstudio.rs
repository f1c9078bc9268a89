use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::LoginSpec;
use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::Page;
use crate::site::{LinkLookup, Site};

static LOGIN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\./ucp\.php\?mode=login").expect("valid regex"));

const DOWNLOAD_TEXT: &str = "Скачать торрент";

/// casstudio.tv, a private phpBB board. The login form carries the board's `sid`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CasStudio {}

fn login_form(user: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("username".into(), user.into()),
        ("password".into(), password.into()),
        ("autologin".into(), "on".into()),
        ("redirect".into(), "index.php".into()),
        ("login".into(), "Вход".into()),
    ]
}

#[async_trait]
impl Site for CasStudio {
    const ALIAS: &'static str = "casstudio.tv";

    fn login_spec() -> Option<LoginSpec> {
        Some(LoginSpec {
            url: "{origin}/ucp.php?mode=login",
            auth_cookie: Some("phpbb3_lawmj_sid"),
            auth_qs_param: None,
            form: login_form,
            login_token: Some("sid"),
        })
    }

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        if page.find_link(&LOGIN_LINK).is_some() {
            return Ok(LinkLookup::LoginRequired);
        }
        Ok(page
            .link_by_text(DOWNLOAD_TEXT)
            .map_or(LinkLookup::NotFound, LinkLookup::Found))
    }
}
