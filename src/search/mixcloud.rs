//! Mixcloud public API adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pictures {
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixcloudUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub pictures: Pictures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub key: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub audio_length: u64,
    #[serde(default)]
    pub play_count: u64,
    pub user: Option<MixcloudUser>,
    #[serde(default)]
    pub pictures: Pictures,
}

/// A show as served to clients, with display-ready counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowSummary {
    #[serde(flatten)]
    pub show: Show,
    pub formatted_duration: String,
    pub formatted_play_count: String,
}

impl From<Show> for ShowSummary {
    fn from(show: Show) -> Self {
        ShowSummary {
            formatted_duration: format_duration(show.audio_length),
            formatted_play_count: format_play_count(show.play_count),
            show,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShowList {
    #[serde(default)]
    data: Vec<Show>,
}

#[async_trait]
pub trait ShowSearch: Send + Sync {
    /// Cloudcasts matching `query`. Failures yield an empty list.
    async fn search(&self, query: &str, limit: u32) -> Vec<Show>;

    async fn popular(&self, limit: u32) -> Vec<Show>;
}

pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

pub fn format_play_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

pub struct MixcloudClient {
    client: reqwest::Client,
    base_url: String,
}

impl MixcloudClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_shows(&self, path: &str, params: &[(&str, String)]) -> anyhow::Result<Vec<Show>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, params);
        let response = self.client.get(&url).query(params).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Mixcloud request failed with status {}", response.status());
        }
        Ok(response.json::<ShowList>().await?.data)
    }
}

#[async_trait]
impl ShowSearch for MixcloudClient {
    async fn search(&self, query: &str, limit: u32) -> Vec<Show> {
        let params = [
            ("q", query.to_string()),
            ("type", "cloudcast".to_string()),
            ("limit", limit.to_string()),
        ];
        self.fetch_shows("/search/", &params)
            .await
            .unwrap_or_else(|err| {
                error!("Error searching Mixcloud shows: {}", err);
                vec![]
            })
    }

    async fn popular(&self, limit: u32) -> Vec<Show> {
        self.fetch_shows("/discover/popular/", &[("limit", limit.to_string())])
            .await
            .unwrap_or_else(|err| {
                error!("Error fetching popular Mixcloud shows: {}", err);
                vec![]
            })
    }
}
