//! YouTube Data API v3 adapter.

use async_trait::async_trait;
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::YoutubeSettings;

/// Upper bound the API accepts for `maxResults`.
pub const MAX_RESULTS_LIMIT: u32 = 50;
const MUSIC_CATEGORY_ID: &str = "10";

lazy_static! {
    static ref ISO8601_DURATION: Regex =
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("YouTube API key is not configured")]
    NotConfigured,
    #[error("YouTube API quota exceeded or invalid API key")]
    QuotaOrKey,
    #[error("Invalid YouTube API request")]
    InvalidRequest,
    #[error("YouTube API error: {0}")]
    Status(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub channel_title: String,
    pub duration: String,
    pub view_count: String,
    pub published_at: String,
}

#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search_videos(&self, query: &str, max_results: u32)
        -> Result<Vec<Video>, UpstreamError>;

    /// Most viewed music videos.
    async fn popular_videos(&self, max_results: u32) -> Result<Vec<Video>, UpstreamError>;

    async fn video_details(&self, video_id: &str) -> Result<Option<Video>, UpstreamError>;
}

// Wire types, only the fields we read.

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
}

/// Formats `PT#H#M#S` as `H:MM:SS`, or `M:SS` when there are no hours.
pub fn parse_iso8601_duration(duration: &str) -> String {
    let Some(captures) = ISO8601_DURATION.captures(duration) else {
        return "0:00".to_string();
    };
    let part = |i: usize| captures.get(i).map(|m| m.as_str());
    let seconds = part(3).unwrap_or("0");
    match part(1) {
        Some(hours) => format!(
            "{}:{:0>2}:{:0>2}",
            hours,
            part(2).unwrap_or("0"),
            seconds
        ),
        None => format!("{}:{:0>2}", part(2).unwrap_or("0"), seconds),
    }
}

/// Groups digits by thousands: `1234567` -> `1,234,567`.
pub fn format_view_count(raw: Option<&str>) -> String {
    let count: u64 = raw.and_then(|s| s.parse().ok()).unwrap_or(0);
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_published_date(published_at: &str) -> String {
    DateTime::parse_from_rfc3339(published_at)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| published_at.to_string())
}

fn best_thumbnail(thumbnails: &HashMap<String, Thumbnail>) -> Option<String> {
    ["high", "medium", "default"]
        .iter()
        .find_map(|size| thumbnails.get(*size))
        .map(|t| t.url.clone())
}

fn build_video(id: String, snippet: &Snippet, details: &VideoItem) -> Video {
    Video {
        id,
        title: snippet.title.clone(),
        description: snippet.description.clone(),
        thumbnail: best_thumbnail(&snippet.thumbnails),
        channel_title: snippet.channel_title.clone(),
        duration: parse_iso8601_duration(
            details
                .content_details
                .as_ref()
                .map(|c| c.duration.as_str())
                .unwrap_or(""),
        ),
        view_count: format_view_count(
            details
                .statistics
                .as_ref()
                .and_then(|s| s.view_count.as_deref()),
        ),
        published_at: format_published_date(&snippet.published_at),
    }
}

pub struct YoutubeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl YoutubeClient {
    pub fn new(settings: &YoutubeSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let api_key = self.api_key.as_ref().ok_or(UpstreamError::NotConfigured)?;
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", api_key)])
            .send()
            .await
            .map_err(|e| UpstreamError::Status(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("YouTube API error on {}: {} {}", endpoint, status, body);
            return Err(match status.as_u16() {
                403 => UpstreamError::QuotaOrKey,
                400 => UpstreamError::InvalidRequest,
                _ => UpstreamError::Status(status.to_string()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Status(format!("Failed to parse response: {}", e)))
    }

    /// Runs a search and joins the hits with their duration and statistics.
    async fn search_with(
        &self,
        query: &str,
        order: &str,
        max_results: u32,
    ) -> Result<Vec<Video>, UpstreamError> {
        let search: ListResponse<SearchItem> = self
            .fetch(
                "search",
                &[
                    ("part", "snippet".to_string()),
                    ("maxResults", max_results.min(MAX_RESULTS_LIMIT).to_string()),
                    ("q", query.to_string()),
                    ("type", "video".to_string()),
                    ("videoCategoryId", MUSIC_CATEGORY_ID.to_string()),
                    ("order", order.to_string()),
                    ("videoDuration", "medium".to_string()),
                ],
            )
            .await?;

        let hits: Vec<(String, Snippet)> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id.map(|id| (id, item.snippet)))
            .collect();
        if hits.is_empty() {
            debug!("No search results for {:?}", query);
            return Ok(vec![]);
        }

        let ids = hits
            .iter()
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let details: ListResponse<VideoItem> = self
            .fetch(
                "videos",
                &[
                    ("part", "contentDetails,statistics".to_string()),
                    ("id", ids),
                ],
            )
            .await?;
        let details: HashMap<String, VideoItem> = details
            .items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        Ok(hits
            .into_iter()
            .filter_map(|(id, snippet)| {
                let Some(detail) = details.get(&id) else {
                    debug!("Missing details for video {}", id);
                    return None;
                };
                Some(build_video(id, &snippet, detail))
            })
            .collect())
    }
}

#[async_trait]
impl VideoSearch for YoutubeClient {
    async fn search_videos(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<Video>, UpstreamError> {
        self.search_with(query, "relevance", max_results).await
    }

    async fn popular_videos(&self, max_results: u32) -> Result<Vec<Video>, UpstreamError> {
        self.search_with("music", "viewCount", max_results).await
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<Video>, UpstreamError> {
        let response: ListResponse<VideoItem> = self
            .fetch(
                "videos",
                &[
                    ("part", "snippet,contentDetails,statistics".to_string()),
                    ("id", video_id.to_string()),
                ],
            )
            .await?;
        Ok(response.items.into_iter().next().and_then(|item| {
            let snippet = item.snippet.clone()?;
            Some(build_video(item.id.clone(), &snippet, &item))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), "4:13");
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), "1:02:03");
        assert_eq!(parse_iso8601_duration("PT1H"), "1:00:00");
        assert_eq!(parse_iso8601_duration("PT45S"), "0:45");
        assert_eq!(parse_iso8601_duration("PT3M"), "3:00");
        assert_eq!(parse_iso8601_duration("garbage"), "0:00");
    }

    #[test]
    fn groups_view_counts() {
        assert_eq!(format_view_count(Some("0")), "0");
        assert_eq!(format_view_count(Some("999")), "999");
        assert_eq!(format_view_count(Some("1000")), "1,000");
        assert_eq!(format_view_count(Some("1234567")), "1,234,567");
        assert_eq!(format_view_count(None), "0");
        assert_eq!(format_view_count(Some("nope")), "0");
    }

    #[test]
    fn prefers_larger_thumbnails() {
        let mut thumbnails = HashMap::new();
        thumbnails.insert(
            "default".to_string(),
            Thumbnail {
                url: "d".to_string(),
            },
        );
        assert_eq!(best_thumbnail(&thumbnails).as_deref(), Some("d"));
        thumbnails.insert(
            "high".to_string(),
            Thumbnail {
                url: "h".to_string(),
            },
        );
        assert_eq!(best_thumbnail(&thumbnails).as_deref(), Some("h"));
    }

    #[test]
    fn builds_video_from_wire_types() {
        let search: ListResponse<SearchItem> = serde_json::from_str(
            r#"{"items":[{"id":{"kind":"youtube#video","videoId":"dQw4w9WgXcQ"},
                "snippet":{"title":"Song Karaoke","description":"d","channelTitle":"Sing King",
                "publishedAt":"2020-05-01T10:00:00Z",
                "thumbnails":{"medium":{"url":"m.jpg"}}}}]}"#,
        )
        .unwrap();
        let details: ListResponse<VideoItem> = serde_json::from_str(
            r#"{"items":[{"id":"dQw4w9WgXcQ","contentDetails":{"duration":"PT3M5S"},
                "statistics":{"viewCount":"12345"}}]}"#,
        )
        .unwrap();

        let item = &search.items[0];
        let video = build_video(
            item.id.video_id.clone().unwrap(),
            &item.snippet,
            &details.items[0],
        );
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(video.thumbnail.as_deref(), Some("m.jpg"));
        assert_eq!(video.duration, "3:05");
        assert_eq!(video.view_count, "12,345");
        assert_eq!(video.published_at, "2020-05-01");
        assert_eq!(video.channel_title, "Sing King");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let client = YoutubeClient::new(&YoutubeSettings {
            api_key: None,
            api_base_url: "http://127.0.0.1:9".to_string(),
        })
        .unwrap();
        assert_eq!(
            client.search_videos("anything", 5).await,
            Err(UpstreamError::NotConfigured)
        );
    }
}
