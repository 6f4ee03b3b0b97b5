//! `/api/users` and `/api/library`

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use super::errors::{ApiError, ApiResult};
use super::session::Session;
use super::state::{GuardedUserManager, ServerState};
use crate::user::user_models::serialize_timestamp;

/// Maximum recently played entries in the library view.
pub const LIBRARY_RECENTLY_PLAYED_LIMIT: usize = 20;

/// Thumbnail shown for items without artwork.
pub fn placeholder_thumbnail(text: &str) -> String {
    format!(
        "https://placehold.co/400x400/1DB954/FFFFFF/png?text={}",
        urlencoding::encode(text)
    )
}

fn thumbnail_or_placeholder(thumbnail: Option<String>, title: &str) -> String {
    thumbnail
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| placeholder_thumbnail(title))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LibraryPlaylist {
    id: String,
    title: String,
    description: Option<String>,
    song_count: usize,
    thumbnail: String,
}

#[derive(Serialize, Debug)]
struct LibrarySong {
    id: String,
    title: String,
    artist: String,
    duration: String,
    thumbnail: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LibraryPlay {
    #[serde(flatten)]
    song: LibrarySong,
    #[serde(serialize_with = "serialize_timestamp")]
    played_at: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Library {
    playlists: Vec<LibraryPlaylist>,
    liked_songs: Vec<LibrarySong>,
    recently_played: Vec<LibraryPlay>,
}

fn library_song(song: crate::user::Song) -> LibrarySong {
    LibrarySong {
        thumbnail: thumbnail_or_placeholder(song.thumbnail, &song.title),
        id: song.id,
        title: song.title,
        artist: song.artist,
        duration: song.duration,
    }
}

async fn get_me(session: Session) -> Response {
    let user = session.user;
    Json(json!({
        "id": user.id,
        "email": user.email,
        "name": user.name,
        "isPremium": user.is_premium,
        "image": user.image,
    }))
    .into_response()
}

async fn get_user_stats(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    if session.user_id() != user_id {
        return Err(ApiError::forbidden("Forbidden"));
    }
    let stats = user_manager
        .store()
        .get_user_stats(&user_id)
        .map_err(|err| ApiError::internal("users/{id}/stats", "Internal Server Error", err))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({
        "id": session.user.id,
        "isPremium": session.user.is_premium,
        "_count": stats,
    }))
    .into_response())
}

async fn get_library(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    let store = user_manager.store();
    let user_id = session.user_id();
    let fail = |err: anyhow::Error| ApiError::internal("library", "Failed to fetch library data", err);

    let playlists = store
        .get_user_playlists(user_id)
        .map_err(fail)?
        .into_iter()
        .map(|summary| LibraryPlaylist {
            thumbnail: thumbnail_or_placeholder(
                summary.playlist.thumbnail,
                &summary.playlist.name,
            ),
            id: summary.playlist.id,
            title: summary.playlist.name,
            description: summary.playlist.description,
            song_count: summary.count.songs,
        })
        .collect();
    let liked_songs = store
        .get_liked_songs(user_id)
        .map_err(fail)?
        .into_iter()
        .map(|liked| library_song(liked.song))
        .collect();
    let recently_played = store
        .get_recently_played(user_id, LIBRARY_RECENTLY_PLAYED_LIMIT)
        .map_err(fail)?
        .into_iter()
        .map(|entry| LibraryPlay {
            played_at: entry.played_at,
            song: library_song(entry.song),
        })
        .collect();

    Ok(Json(Library {
        playlists,
        liked_songs,
        recently_played,
    })
    .into_response())
}

pub fn make_user_routes(state: ServerState) -> Router {
    Router::new()
        .route("/me", get(get_me))
        .route("/{id}/stats", get(get_user_stats))
        .with_state(state)
}

pub fn make_library_routes(state: ServerState) -> Router {
    Router::new()
        .route("/", get(get_library))
        .with_state(state)
}
