//! Back-office endpoints, authenticated with the `x-admin-api-key` header.

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::errors::{non_empty, ApiError, ApiJson, ApiResult};
use super::state::{GuardedUserManager, ServerState};
use crate::user::user_models::serialize_timestamp;

pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";

/// Proof that the request carried the configured admin key.
pub struct AdminAccess;

impl FromRequestParts<ServerState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = ctx.config.admin_api_key.as_deref() else {
            return Err(ApiError::unauthorized("Unauthorized"));
        };
        let provided = parts
            .headers
            .get(ADMIN_API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        match provided {
            Some(key) if keys_match(key, expected) => Ok(AdminAccess),
            _ => {
                warn!("Rejected admin request to {}", parts.uri.path());
                Err(ApiError::unauthorized("Unauthorized"))
            }
        }
    }
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AdminUser {
    id: String,
    name: Option<String>,
    email: String,
    #[serde(serialize_with = "serialize_timestamp")]
    created_at: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AdminSong {
    id: String,
    title: String,
    artist: String,
    #[serde(serialize_with = "serialize_timestamp")]
    created_at: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AdminPlaylist {
    id: String,
    name: String,
    description: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    created_at: i64,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct CreateUserBody {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct UpdateUserBody {
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct DeleteUserBody {
    id: Option<String>,
}

async fn get_users(
    _: AdminAccess,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Json<Vec<AdminUser>>> {
    let users = user_manager
        .store()
        .get_all_users()
        .map_err(|err| ApiError::internal("admin-users", "Failed to fetch users", err))?;
    Ok(Json(
        users
            .into_iter()
            .map(|user| AdminUser {
                id: user.id,
                name: user.name,
                email: user.email,
                created_at: user.created_at,
            })
            .collect(),
    ))
}

async fn post_user(
    _: AdminAccess,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<CreateUserBody>,
) -> ApiResult<Response> {
    let (Some(name), Some(email)) = (non_empty(body.name), non_empty(body.email)) else {
        return Err(ApiError::bad_request("Name and email are required"));
    };
    let store = user_manager.store();
    let user = store
        .create_user(Some(&name), &email)
        .and_then(|id| user_manager.require_user(&id))
        .map_err(|err| ApiError::from_store("admin-users", "Failed to create user", err))?;
    info!("Admin created user {} <{}>", user.id, user.email);
    Ok(Json(user).into_response())
}

async fn put_user(
    _: AdminAccess,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<UpdateUserBody>,
) -> ApiResult<Response> {
    let Some(id) = non_empty(body.id) else {
        return Err(ApiError::bad_request("User ID is required"));
    };
    let name = non_empty(body.name);
    let email = non_empty(body.email);
    let user = user_manager
        .store()
        .update_user(&id, name.as_deref(), email.as_deref())
        .map_err(|err| ApiError::from_store("admin-users", "Failed to update user", err))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!("Admin updated user {}", user.id);
    Ok(Json(user).into_response())
}

async fn delete_user(
    _: AdminAccess,
    State(user_manager): State<GuardedUserManager>,
    ApiJson(body): ApiJson<DeleteUserBody>,
) -> ApiResult<Response> {
    let Some(id) = non_empty(body.id) else {
        return Err(ApiError::bad_request("User ID is required"));
    };
    let deleted = user_manager
        .store()
        .delete_user(&id)
        .map_err(|err| ApiError::internal("admin-users", "Failed to delete user", err))?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }
    info!("Admin deleted user {}", id);
    Ok(Json(json!({ "success": true })).into_response())
}

async fn get_songs(
    _: AdminAccess,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Json<Vec<AdminSong>>> {
    let songs = user_manager
        .store()
        .get_songs()
        .map_err(|err| ApiError::internal("admin-songs", "Failed to fetch songs", err))?;
    Ok(Json(
        songs
            .into_iter()
            .map(|song| AdminSong {
                id: song.id,
                title: song.title,
                artist: song.artist,
                created_at: song.created_at,
            })
            .collect(),
    ))
}

async fn get_playlists(
    _: AdminAccess,
    State(user_manager): State<GuardedUserManager>,
) -> ApiResult<Json<Vec<AdminPlaylist>>> {
    let playlists = user_manager
        .store()
        .get_public_playlists(false, None)
        .map_err(|err| ApiError::internal("admin-playlists", "Failed to fetch playlists", err))?;
    Ok(Json(
        playlists
            .into_iter()
            .map(|entry| AdminPlaylist {
                id: entry.playlist.id,
                name: entry.playlist.name,
                description: entry.playlist.description,
                created_at: entry.playlist.created_at,
            })
            .collect(),
    ))
}

/// Routes mounted directly under `/api`.
pub fn make_admin_routes(state: ServerState) -> Router {
    Router::new()
        .route(
            "/admin-users",
            get(get_users)
                .post(post_user)
                .put(put_user)
                .delete(delete_user),
        )
        .route("/admin-songs", get(get_songs))
        .route("/admin-playlists", get(get_playlists))
        .with_state(state)
}
