use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::LoginSpec;
use crate::base::TrackerCore;
use crate::error::Result;
use crate::page::Page;
use crate::site::{LinkLookup, Site};

/// tr.anidub.com, private. One page carries several encodes; the first
/// available one from `quality_prefs` is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AniDub {
    pub quality_prefs: Vec<String>,
}

impl Default for AniDub {
    fn default() -> Self {
        Self {
            quality_prefs: ["bd720", "tv720", "dvd480", "hwp", "psp"]
                .map(String::from)
                .to_vec(),
        }
    }
}

fn login_form(user: &str, password: &str) -> Vec<(String, String)> {
    vec![
        ("login_name".into(), user.into()),
        ("login_password".into(), password.into()),
        ("login".into(), "submit".into()),
    ]
}

#[async_trait]
impl Site for AniDub {
    const ALIAS: &'static str = "tr.anidub.com";

    fn login_spec() -> Option<LoginSpec> {
        Some(LoginSpec {
            url: "{origin}/",
            auth_cookie: Some("dle_user_id"),
            auth_qs_param: None,
            form: login_form,
            login_token: None,
        })
    }

    async fn download_link(&self, _core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        if page.exists(r#"form input[name="login"]"#) {
            return Ok(LinkLookup::LoginRequired);
        }

        let available = page.select_attr("div.torrent > div.torrent_c > div", "id");
        tracing::debug!("Available in qualities: {}", available.join(", "));

        let Some(quality) = self
            .quality_prefs
            .iter()
            .find(|q| available.contains(q))
        else {
            tracing::debug!(
                "Torrent is not available in preferred qualities: {}",
                self.quality_prefs.join(", ")
            );
            return Ok(LinkLookup::NotFound);
        };

        tracing::debug!("Trying to get torrent in `{}` quality ...", quality);
        Ok(page
            .select_attr(&format!("div#{} div.torrent_h a", quality), "href")
            .into_iter()
            .next()
            .map_or(LinkLookup::NotFound, |href| {
                LinkLookup::Found(crate::page::expand_link(&page.url, &href))
            }))
    }
}
