//! `/api/playlists`

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::errors::{non_empty, ApiError, ApiJson, ApiResult};
use super::session::Session;
use super::state::{GuardedUserManager, ServerState};
use crate::user::{
    Playlist, PlaylistCount, PlaylistSongEntry, PlaylistSummary, PlaylistUpdate, PlaylistWithSongs,
};

pub const DEFAULT_PLAYLIST_NAME: &str = "New Playlist";
/// Public playlists shown to free users.
pub const FREE_PUBLIC_PLAYLISTS: usize = 20;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct CreatePlaylistBody {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct UpdatePlaylistBody {
    name: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct PlaylistSongBody {
    song_id: Option<String>,
}

/// Loads a playlist and checks that the session owns it.
fn owned_playlist(
    user_manager: &GuardedUserManager,
    session: &Session,
    playlist_id: &str,
    endpoint: &str,
) -> ApiResult<Playlist> {
    let playlist = user_manager
        .store()
        .get_playlist(playlist_id)
        .map_err(|err| ApiError::internal(endpoint, "Failed to fetch playlist", err))?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    if playlist.user_id != session.user_id() {
        debug!(
            "User {} tried to access playlist {} of {}",
            session.user_id(),
            playlist.id,
            playlist.user_id
        );
        return Err(ApiError::forbidden("Unauthorized"));
    }
    Ok(playlist)
}

fn with_songs(
    user_manager: &GuardedUserManager,
    playlist: Playlist,
    endpoint: &str,
    message: &str,
) -> ApiResult<PlaylistWithSongs> {
    let songs = user_manager
        .store()
        .get_playlist_songs(&playlist.id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?;
    Ok(PlaylistWithSongs { playlist, songs })
}

async fn get_user_playlists(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    match user_manager.store().get_user_playlists(session.user_id()) {
        Ok(playlists) => Ok(Json(playlists).into_response()),
        Err(err) => Err(ApiError::internal("playlists", "Failed to fetch playlists", err)),
    }
}

async fn post_playlist(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<CreatePlaylistBody>,
) -> ApiResult<Response> {
    let name = non_empty(body.name).unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string());
    let description = non_empty(body.description);
    let playlist = user_manager
        .create_playlist_checked(&session.user, &name, description.as_deref())
        .map_err(|err| ApiError::from_store("playlists", "Failed to create playlist", err))?;
    info!("User {} created playlist {}", session.user_id(), playlist.id);
    Ok(Json(PlaylistSummary {
        playlist,
        count: PlaylistCount { songs: 0 },
    })
    .into_response())
}

async fn delete_duplicate_playlists(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    let deleted = user_manager
        .store()
        .delete_duplicate_playlists(session.user_id(), DEFAULT_PLAYLIST_NAME)
        .map_err(|err| {
            ApiError::internal("playlists", "Failed to delete duplicate playlists", err)
        })?;
    Ok(Json(json!({
        "message": format!("Deleted {} duplicate playlists", deleted),
        "deletedCount": deleted,
    }))
    .into_response())
}

async fn get_public_playlists(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    // Premium users browse everything, free users only what premium users share.
    let result = if session.is_premium() {
        user_manager.store().get_public_playlists(false, None)
    } else {
        user_manager
            .store()
            .get_public_playlists(true, Some(FREE_PUBLIC_PLAYLISTS))
    };
    match result {
        Ok(playlists) => Ok(Json(playlists).into_response()),
        Err(err) => Err(ApiError::internal(
            "playlists/public",
            "Failed to fetch playlists",
            err,
        )),
    }
}

async fn get_playlist(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let playlist = owned_playlist(&user_manager, &session, &id, "playlists/{id}")?;
    let playlist = with_songs(&user_manager, playlist, "playlists/{id}", "Failed to fetch playlist")?;
    Ok(Json(playlist).into_response())
}

async fn put_playlist(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdatePlaylistBody>,
) -> ApiResult<Response> {
    owned_playlist(&user_manager, &session, &id, "playlists/{id}")?;
    let update = PlaylistUpdate {
        name: non_empty(body.name),
        description: body.description,
        thumbnail: body.thumbnail,
    };
    let playlist = user_manager
        .store()
        .update_playlist(&id, &update)
        .map_err(|err| ApiError::internal("playlists/{id}", "Failed to update playlist", err))?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    let playlist = with_songs(&user_manager, playlist, "playlists/{id}", "Failed to update playlist")?;
    Ok(Json(playlist).into_response())
}

async fn delete_playlist(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    owned_playlist(&user_manager, &session, &id, "playlists/{id}")?;
    user_manager
        .store()
        .delete_playlist(&id)
        .map_err(|err| ApiError::internal("playlists/{id}", "Failed to delete playlist", err))?;
    info!("User {} deleted playlist {}", session.user_id(), id);
    Ok(Json(json!({ "success": true })).into_response())
}

async fn get_playlist_songs(
    _session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let endpoint = "playlists/{id}/songs";
    let message = "Failed to fetch playlist songs";
    let store = user_manager.store();
    if store
        .get_playlist(&id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?
        .is_none()
    {
        return Err(ApiError::not_found("Playlist not found"));
    }
    match store.get_playlist_songs(&id) {
        Ok(songs) => Ok(Json(songs).into_response()),
        Err(err) => Err(ApiError::internal(endpoint, message, err)),
    }
}

async fn add_playlist_song(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PlaylistSongBody>,
) -> ApiResult<Response> {
    let endpoint = "playlists/{id}/songs";
    let message = "Failed to add song to playlist";
    let Some(song_id) = non_empty(body.song_id) else {
        return Err(ApiError::bad_request("Song ID is required"));
    };
    owned_playlist(&user_manager, &session, &id, endpoint)?;

    let store = user_manager.store();
    let song = store
        .get_song(&song_id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?
        .ok_or_else(|| ApiError::not_found("Song not found"))?;
    let position = store
        .add_song_to_playlist(&id, &song_id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?
        .ok_or_else(|| ApiError::bad_request("Song already in playlist"))?;

    Ok(Json(PlaylistSongEntry { song, position }).into_response())
}

async fn remove_playlist_song(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PlaylistSongBody>,
) -> ApiResult<Response> {
    let endpoint = "playlists/{id}/songs";
    let Some(song_id) = non_empty(body.song_id) else {
        return Err(ApiError::bad_request("Song ID is required"));
    };
    owned_playlist(&user_manager, &session, &id, endpoint)?;
    let removed = user_manager
        .store()
        .remove_song_from_playlist(&id, &song_id)
        .map_err(|err| ApiError::internal(endpoint, "Failed to remove song from playlist", err))?;
    if !removed {
        debug!("Song {} was not in playlist {}", song_id, id);
    }
    Ok(Json(json!({ "success": true })).into_response())
}

pub fn make_playlist_routes(state: ServerState) -> Router {
    Router::new()
        .route(
            "/",
            get(get_user_playlists)
                .post(post_playlist)
                .delete(delete_duplicate_playlists),
        )
        .route("/public", get(get_public_playlists))
        .route(
            "/{id}",
            get(get_playlist).put(put_playlist).delete(delete_playlist),
        )
        .route(
            "/{id}/songs",
            get(get_playlist_songs)
                .post(add_playlist_song)
                .delete(remove_playlist_song),
        )
        .with_state(state)
}
