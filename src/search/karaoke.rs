//! Karaoke track discovery on top of a [`VideoSearch`] backend.

use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use super::youtube::{UpstreamError, Video, VideoSearch};

const QUERY_SUFFIXES: [&str; 3] = ["karaoke", "instrumental", "minus one"];
const RESULTS_PER_QUERY: u32 = 5;
pub const MAX_KARAOKE_RESULTS: usize = 10;
const YOUTUBE_ID_LEN: usize = 11;

const KARAOKE_KEYWORDS: [&str; 10] = [
    "karaoke",
    "instrumental",
    "minus one",
    "backing track",
    "no vocals",
    "karaoke version",
    "instrumental version",
    "accompaniment",
    "backing music",
    "karaoke track",
];

const EXCLUDE_KEYWORDS: [&str; 8] = [
    "official music video",
    "official video",
    "lyrics",
    "with lyrics",
    "original song",
    "live performance",
    "concert",
    "music video",
];

lazy_static! {
    static ref TITLE_NOISE: Vec<Regex> = [
        r"(?i)^karaoke\s*",
        r"(?i)^instrumental\s*",
        r"(?i)^minus one\s*",
        r"(?i)^backing track\s*",
        r"(?i)\s*karaoke\s*$",
        r"(?i)\s*instrumental\s*$",
        r"(?i)\s*minus one\s*$",
        r"(?i)\s*backing track\s*$",
        r"(?i)\s*\(karaoke\)\s*",
        r"(?i)\s*\(instrumental\)\s*",
        r"(?i)\s*\[karaoke\]\s*",
        r"(?i)\s*\[instrumental\]\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KaraokeTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration: String,
    pub thumbnail: Option<String>,
    pub view_count: String,
    pub published_at: String,
}

pub fn is_karaoke_video(video: &Video) -> bool {
    let title = video.title.to_lowercase();
    let description = video.description.to_lowercase();
    let mentions = |keyword: &&str| title.contains(*keyword) || description.contains(*keyword);
    KARAOKE_KEYWORDS.iter().any(mentions) && !EXCLUDE_KEYWORDS.iter().any(mentions)
}

/// Strips karaoke markers from a title, e.g. `"Karaoke Hello (Instrumental)"` -> `"Hello"`.
pub fn clean_title(title: &str) -> String {
    let mut cleaned = title.to_string();
    for pattern in TITLE_NOISE.iter() {
        // Tags between words leave a space: "Hello(Karaoke)World" -> "Hello World".
        cleaned = pattern.replace(&cleaned, " ").into_owned();
    }
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// Deduplicates, filters and shapes raw search hits.
pub fn select_karaoke_tracks(videos: Vec<Video>) -> Vec<KaraokeTrack> {
    let mut seen = HashSet::new();
    videos
        .into_iter()
        .filter(|video| seen.insert(video.id.clone()))
        .filter(is_karaoke_video)
        .filter(|video| video.id.len() == YOUTUBE_ID_LEN)
        .map(|video| KaraokeTrack {
            title: clean_title(&video.title),
            artist: video.channel_title,
            id: video.id,
            duration: video.duration,
            thumbnail: video.thumbnail,
            view_count: video.view_count,
            published_at: video.published_at,
        })
        .take(MAX_KARAOKE_RESULTS)
        .collect()
}

/// Searches for singable versions of `query`. Failing queries are logged and skipped,
/// so an unreachable backend yields no tracks.
pub async fn search_karaoke(backend: &dyn VideoSearch, query: &str) -> Vec<KaraokeTrack> {
    let queries: Vec<String> = QUERY_SUFFIXES
        .iter()
        .map(|suffix| format!("{} {}", query, suffix))
        .collect();
    let results = join_all(
        queries
            .iter()
            .map(|q| backend.search_videos(q, RESULTS_PER_QUERY)),
    )
    .await;

    let mut videos = vec![];
    for (q, result) in queries.iter().zip(results) {
        match result {
            Ok(found) => videos.extend(found),
            Err(err) => warn!("Karaoke search for {:?} failed: {}", q, err),
        }
    }

    let tracks = select_karaoke_tracks(videos);
    info!("Found {} karaoke videos for {:?}", tracks.len(), query);
    tracks
}
