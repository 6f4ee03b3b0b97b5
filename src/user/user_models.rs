//! User and music library data models.
//!
//! Timestamps are unix seconds in storage and RFC 3339 strings on the wire.

use serde::{Serialize, Serializer};

pub fn serialize_timestamp<S: Serializer>(secs: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    match chrono::DateTime::from_timestamp(*secs, 0) {
        Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        None => serializer.serialize_i64(*secs),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub is_premium: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    #[serde(skip)]
    pub token_version: i64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: i64,
}

/// Per-user entity counts.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub playlists: usize,
    pub liked_songs: usize,
    pub recently_played: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: String,
    pub thumbnail: Option<String>,
    pub source: String,
    pub source_url: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: String,
    pub thumbnail: Option<String>,
    pub source: String,
    pub source_url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistCount {
    pub songs: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    #[serde(flatten)]
    pub playlist: Playlist,
    #[serde(rename = "_count")]
    pub count: PlaylistCount,
}

/// A song as it appears inside a playlist.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PlaylistSongEntry {
    #[serde(flatten)]
    pub song: Song,
    pub position: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PlaylistWithSongs {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub songs: Vec<PlaylistSongEntry>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistOwner {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub is_premium: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PublicPlaylist {
    #[serde(flatten)]
    pub playlist: Playlist,
    #[serde(rename = "_count")]
    pub count: PlaylistCount,
    pub user: PlaylistOwner,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikedSong {
    pub id: String,
    pub user_id: String,
    pub song_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub liked_at: i64,
    pub song: Song,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalSong {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub artist: String,
    pub duration: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub uploaded_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewLocalSong {
    pub user_id: String,
    pub title: String,
    pub artist: String,
    pub duration: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentlyPlayedEntry {
    pub id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub played_at: i64,
    pub song: Song,
}
