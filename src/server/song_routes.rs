//! `/api/songs`: the shared song catalog, likes, local uploads and play history.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use rand_distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::errors::{non_empty, ApiError, ApiJson, ApiResult};
use super::session::Session;
use super::state::{GuardedConfig, GuardedUserManager, ServerState};
use crate::user::{NewLocalSong, NewSong, Song};

pub const ALLOWED_AUDIO_TYPES: [&str; 3] = ["audio/mpeg", "audio/wav", "audio/ogg"];
/// Prefix of stored local song paths, also the route the files are served from.
pub const UPLOADS_PATH_PREFIX: &str = "uploads";

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct CreateSongBody {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    duration: Option<String>,
    thumbnail: Option<String>,
    source: Option<String>,
    source_url: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct SongIdBody {
    song_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SongIdQuery {
    song_id: Option<String>,
}

/// Catalog listing entry.
#[derive(Serialize, Debug)]
struct SongListing {
    id: String,
    title: String,
    artist: String,
    album: Option<String>,
    duration: String,
    thumbnail: Option<String>,
    source: String,
}

impl From<Song> for SongListing {
    fn from(song: Song) -> Self {
        SongListing {
            id: song.id,
            title: song.title,
            artist: song.artist,
            album: song.album,
            duration: song.duration,
            thumbnail: song.thumbnail,
            source: song.source,
        }
    }
}

async fn post_song(
    _session: Session,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<CreateSongBody>,
) -> ApiResult<Response> {
    let (Some(title), Some(artist), Some(duration), Some(source), Some(source_url)) = (
        non_empty(body.title),
        non_empty(body.artist),
        non_empty(body.duration),
        non_empty(body.source),
        non_empty(body.source_url),
    ) else {
        warn!("Song creation with missing fields");
        return Err(ApiError::bad_request("Missing required fields"));
    };

    let store = user_manager.store();
    match store.get_song_by_source_url(&source_url) {
        Ok(Some(existing)) => {
            debug!("Found existing song {}", existing.id);
            return Ok(Json(existing).into_response());
        }
        Ok(None) => {}
        Err(err) => return Err(ApiError::internal("songs", "Failed to create song", err)),
    }

    let new_song = NewSong {
        title,
        artist,
        album: non_empty(body.album),
        duration,
        thumbnail: non_empty(body.thumbnail),
        source,
        source_url,
    };
    let song = store
        .create_song(&new_song)
        .map_err(|err| ApiError::from_store("songs", "Failed to create song", err))?;
    info!("Created song {}", song.id);
    Ok((StatusCode::CREATED, Json(song)).into_response())
}

async fn get_songs(
    _session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    match user_manager.store().get_songs() {
        Ok(songs) => {
            let songs: Vec<SongListing> = songs.into_iter().map(SongListing::from).collect();
            Ok(Json(songs).into_response())
        }
        Err(err) => Err(ApiError::internal("songs", "Failed to fetch songs", err)),
    }
}

async fn get_liked_songs(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    match user_manager.store().get_liked_songs(session.user_id()) {
        Ok(liked) => Ok(Json(liked).into_response()),
        Err(err) => Err(ApiError::internal(
            "songs/liked",
            "Failed to fetch liked songs",
            err,
        )),
    }
}

async fn like_song(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<SongIdBody>,
) -> ApiResult<Response> {
    let Some(song_id) = non_empty(body.song_id) else {
        return Err(ApiError::bad_request("Song ID is required"));
    };
    let store = user_manager.store();
    let message = "Failed to like song";
    if store
        .get_song(&song_id)
        .map_err(|err| ApiError::internal("songs/liked", message, err))?
        .is_none()
    {
        return Err(ApiError::not_found("Song not found"));
    }
    match store.like_song(session.user_id(), &song_id) {
        Ok(Some(liked)) => Ok(Json(liked).into_response()),
        Ok(None) => Err(ApiError::bad_request("Song already liked")),
        Err(err) => Err(ApiError::internal("songs/liked", message, err)),
    }
}

async fn unlike_song(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Query(query): Query<SongIdQuery>,
) -> ApiResult<Response> {
    let Some(song_id) = non_empty(query.song_id) else {
        return Err(ApiError::bad_request("Song ID is required"));
    };
    match user_manager.store().unlike_song(session.user_id(), &song_id) {
        Ok(true) => Ok(Json(json!({ "success": true })).into_response()),
        Ok(false) => Err(ApiError::not_found("Song not liked")),
        Err(err) => Err(ApiError::internal(
            "songs/liked",
            "Failed to unlike song",
            err,
        )),
    }
}

struct UploadedFile {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Audio type sniffed from the content, falling back to what the client declared.
pub fn detect_audio_type(bytes: &[u8], declared: Option<&str>) -> Option<String> {
    let sniffed = infer::get(bytes).map(|kind| match kind.mime_type() {
        "audio/x-wav" | "audio/wave" => "audio/wav",
        other => other,
    });
    sniffed
        .or(declared)
        .filter(|mime| ALLOWED_AUDIO_TYPES.contains(mime))
        .map(str::to_string)
}

fn extension_for(file_name: Option<&str>, mime_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match from_name {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => match mime_type {
            "audio/mpeg" => ".mp3".to_string(),
            "audio/wav" => ".wav".to_string(),
            "audio/ogg" => ".ogg".to_string(),
            _ => String::new(),
        },
    }
}

/// `<unix millis>-<random suffix><ext>`
pub fn upload_file_name(file_name: Option<&str>, mime_type: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        suffix,
        extension_for(file_name, mime_type)
    )
}

/// Writes through a temp file in the same directory, so readers never see partial files.
fn store_upload(dir: PathBuf, name: String, bytes: Vec<u8>) -> anyhow::Result<()> {
    std::fs::create_dir_all(&dir)?;
    let mut file = tempfile::NamedTempFile::new_in(&dir)?;
    file.write_all(&bytes)?;
    file.persist(dir.join(name))?;
    Ok(())
}

async fn upload_local_song(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    State(config): State<GuardedConfig>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let endpoint = "songs/local";
    user_manager
        .ensure_upload_allowed(&session.user)
        .map_err(|err| ApiError::from_store(endpoint, "Failed to upload song", err))?;

    let mut file: Option<UploadedFile> = None;
    let mut title: Option<String> = None;
    let mut artist: Option<String> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!("Malformed upload: {}", err);
                return Err(ApiError::bad_request("Invalid form data"));
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|err| {
                    warn!("Failed to read uploaded file: {}", err);
                    ApiError::bad_request("Invalid form data")
                })?;
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "title" | "artist" => {
                let value = field.text().await.ok();
                if name == "title" {
                    title = non_empty(value);
                } else {
                    artist = non_empty(value);
                }
            }
            other => debug!("Ignoring form field {}", other),
        }
    }

    let (Some(file), Some(title), Some(artist)) = (file, title, artist) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    if file.bytes.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    let Some(mime_type) = detect_audio_type(&file.bytes, file.content_type.as_deref()) else {
        debug!("Rejected upload declared as {:?}", file.content_type);
        return Err(ApiError::bad_request("Invalid file type."));
    };

    let stored_name = upload_file_name(file.file_name.as_deref(), &mime_type);
    let file_size = file.bytes.len() as i64;
    let uploads_dir = config.uploads_dir.clone();
    let name = stored_name.clone();
    tokio::task::spawn_blocking(move || store_upload(uploads_dir, name, file.bytes))
        .await
        .map_err(anyhow::Error::from)
        .and_then(|result| result)
        .map_err(|err| ApiError::internal(endpoint, "Failed to upload song", err))?;

    let local_song = user_manager
        .store()
        .create_local_song(&NewLocalSong {
            user_id: session.user_id().to_string(),
            title,
            artist,
            duration: String::new(),
            file_path: format!("{}/{}", UPLOADS_PATH_PREFIX, stored_name),
            file_size,
            mime_type,
        })
        .map_err(|err| ApiError::internal(endpoint, "Failed to upload song", err))?;
    info!(
        "User {} uploaded {} ({})",
        session.user_id(),
        local_song.file_path,
        byte_unit::Byte::from(file_size as u64)
    );
    Ok(Json(local_song).into_response())
}

async fn get_local_songs(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Response> {
    match user_manager.store().get_local_songs(session.user_id()) {
        Ok(songs) => Ok(Json(json!({ "songs": songs })).into_response()),
        Err(err) => Err(ApiError::internal("songs/local", "Failed to fetch songs", err)),
    }
}

async fn post_recently_played(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<SongIdBody>,
) -> ApiResult<Response> {
    let endpoint = "songs/recently-played";
    let message = "Failed to update recently played";
    let Some(song_id) = non_empty(body.song_id) else {
        return Err(ApiError::bad_request("Song ID is required"));
    };
    let store = user_manager.store();
    if store
        .get_song(&song_id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?
        .is_none()
    {
        return Err(ApiError::not_found("Song not found"));
    }
    store
        .record_recently_played(session.user_id(), &song_id)
        .map_err(|err| ApiError::internal(endpoint, message, err))?;
    Ok(Json(json!({ "success": true })).into_response())
}

pub fn make_song_routes(state: ServerState) -> Router {
    Router::new()
        .route("/", get(get_songs).post(post_song))
        .route(
            "/liked",
            get(get_liked_songs).post(like_song).delete(unlike_song),
        )
        .route("/local", get(get_local_songs).post(upload_local_song))
        .route("/recently-played", post(post_recently_played))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP3_HEADER: [u8; 4] = [0x49, 0x44, 0x33, 0x03];

    #[test]
    fn detects_audio_from_content_first() {
        assert_eq!(
            detect_audio_type(&MP3_HEADER, Some("text/plain")).as_deref(),
            Some("audio/mpeg")
        );
        assert_eq!(
            detect_audio_type(b"not really audio", Some("audio/ogg")).as_deref(),
            Some("audio/ogg")
        );
        assert_eq!(detect_audio_type(b"plain text", Some("text/plain")), None);
        assert_eq!(detect_audio_type(b"plain text", None), None);
    }

    #[test]
    fn upload_names_keep_a_safe_extension() {
        let name = upload_file_name(Some("My Song.MP3"), "audio/mpeg");
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert!(rest.ends_with(".mp3"));

        assert!(upload_file_name(Some("noext"), "audio/wav").ends_with(".wav"));
        assert!(upload_file_name(Some("bad.m/p3"), "audio/ogg").ends_with(".ogg"));
        assert!(upload_file_name(None, "audio/mpeg").ends_with(".mp3"));
    }

    #[test]
    fn uploads_are_written_whole() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("nested");
        store_upload(target.clone(), "a.mp3".to_string(), vec![1, 2, 3]).unwrap();
        assert_eq!(std::fs::read(target.join("a.mp3")).unwrap(), vec![1, 2, 3]);
    }
}
