use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::base::TrackerCore;
use crate::error::{Result, TrackerError};
use crate::page::{self, Page};
use crate::site::{preferred, LinkLookup, Site};

/// yts.mx, public. The page only names the movie; links come from the JSON API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ytsmx {
    #[serde(deserialize_with = "sanitize_qualities")]
    pub quality_prefs: Vec<String>,
}

impl Default for Ytsmx {
    fn default() -> Self {
        Self {
            quality_prefs: vec!["1080P.WEB".into(), "720P.WEB".into()],
        }
    }
}

fn sanitize_qualities<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    let prefs = Vec::<String>::deserialize(deserializer)?;
    Ok(prefs.iter().map(|q| q.trim().to_uppercase()).collect())
}

/// `(QUALITY.TYPE, url)` for every torrent in a movie details response.
fn quality_links(details: &Value) -> Result<Vec<(String, String)>> {
    let torrents = details
        .pointer("/data/movie/torrents")
        .and_then(Value::as_array)
        .ok_or_else(|| TrackerError::Parse("movie details without torrents".into()))?;

    Ok(torrents
        .iter()
        .filter_map(|t| {
            let quality = t.get("quality")?.as_str()?;
            let kind = t.get("type")?.as_str()?;
            let url = t.get("url")?.as_str()?;
            Some((format!("{}.{}", quality, kind).to_uppercase(), url.to_string()))
        })
        .collect())
}

#[async_trait]
impl Site for Ytsmx {
    const ALIAS: &'static str = "yts.mx";

    async fn download_link(&self, core: &TrackerCore, page: &Page) -> Result<LinkLookup> {
        let Some(movie_id) = page
            .select_attr("div#movie-info", "data-movie-id")
            .into_iter()
            .next()
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        else {
            tracing::error!("Movie id not found at {}", page.url);
            return Ok(LinkLookup::NotFound);
        };

        let origin = page::origin(&page.url).ok_or_else(|| TrackerError::InvalidUrl(page.url.clone()))?;
        let details = core
            .fetch_json(&format!("{}/api/v2/movie_details.json?movie_id={}", origin, movie_id))
            .await?;
        let available = quality_links(&details)?;

        tracing::debug!(
            "Available in qualities: {}",
            available.iter().map(|(q, _)| q.as_str()).collect::<Vec<_>>().join(", ")
        );

        if let Some((_, link)) = preferred(&self.quality_prefs, &available) {
            return Ok(LinkLookup::Found(link.clone()));
        }

        tracing::info!(
            "Torrent is not available in preferred qualities: {}",
            self.quality_prefs.join(", ")
        );
        Ok(available
            .into_iter()
            .next()
            .map_or(LinkLookup::NotFound, |(quality, link)| {
                tracing::info!("Fallback to `{}` quality ...", quality);
                LinkLookup::Found(link)
            }))
    }
}
