use async_trait::async_trait;
use model::PageData;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::LoginSpec;
use crate::base::TrackerCore;
use crate::error::{Result, TrackerError};
use crate::page::{self, Page};
use crate::site::{LinkLookup, Site};

/// kinozal.tv, private.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Kinozal {}

fn login_form(user: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("username".into(), user.into()),
        ("password".into(), password.into()),
        ("returnto".into(), String::new()),
    ]
}

#[async_trait]
impl Site for Kinozal {
    const ALIAS: &'static str = "kinozal.tv";
    const ENCODING: &'static str = "windows-1251";

    fn mirrors(&self) -> Vec<String> {
        ["kinozal-tv.appspot.com", "kinozal.me"]
            .map(String::from)
            .to_vec()
    }

    fn login_spec() -> Option<LoginSpec> {
        Some(LoginSpec {
            url: "{origin}/takelogin.php",
            auth_cookie: Some("uid"),
            auth_qs_param: None,
            form: login_form,
            login_token: None,
        })
    }

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        let Some(id) = page::query_param(&page.url, "id") else {
            return Ok(LinkLookup::NotFound);
        };
        let pattern = Regex::new(&format!(r"/download.+={}", regex::escape(&id)))
            .map_err(|e| TrackerError::Parse(e.to_string()))?;

        if let Some(link) = page.find_link(&pattern) {
            return Ok(LinkLookup::Found(link));
        }
        if page.exists(r#"form[action*="takelogin"]"#) {
            return Ok(LinkLookup::LoginRequired);
        }
        Ok(LinkLookup::NotFound)
    }

    /// Update date is the `li` starting with "Обновлен", e.g. "вчера в 21:40".
    fn page_data(&self, page: &Page) -> PageData {
        let mut data = page.default_data();
        data.date_updated = page
            .select_text("li")
            .into_iter()
            .find_map(|li| li.strip_prefix("Обновлен").map(|rest| rest.trim().to_string()))
            .filter(|s| !s.is_empty());
        data
    }
}
