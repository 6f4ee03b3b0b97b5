//! Proxies for YouTube and Mixcloud searches.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::errors::{non_empty, ApiError, ApiResult};
use super::state::{GuardedShowSearch, GuardedVideoSearch, ServerState};
use crate::search::{search_karaoke, KaraokeTrack, ShowSummary, UpstreamError, Video};

const DEFAULT_MAX_RESULTS: u32 = 10;
const DEFAULT_SHOWS_LIMIT: u32 = 20;
const MAX_SHOWS_LIMIT: u32 = 100;

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
struct VideoSearchQuery {
    q: Option<String>,
    max_results: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ShowSearchQuery {
    q: Option<String>,
    limit: Option<u32>,
}

fn upstream_error(endpoint: &str, err: UpstreamError) -> ApiError {
    let message = err.to_string();
    ApiError::internal(endpoint, &message, err)
}

async fn karaoke(
    State(youtube): State<GuardedVideoSearch>,
    Query(query): Query<VideoSearchQuery>,
) -> ApiResult<Json<Vec<KaraokeTrack>>> {
    let Some(q) = non_empty(query.q) else {
        return Err(ApiError::bad_request("Search query is required"));
    };
    Ok(Json(search_karaoke(youtube.as_ref(), &q).await))
}

async fn video_details(
    State(youtube): State<GuardedVideoSearch>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<Video>> {
    youtube
        .video_details(&video_id)
        .await
        .map_err(|err| upstream_error("youtube/video", err))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Video not found"))
}

async fn search_videos(
    State(youtube): State<GuardedVideoSearch>,
    Query(query): Query<VideoSearchQuery>,
) -> ApiResult<Json<Vec<Video>>> {
    let Some(q) = non_empty(query.q) else {
        return Err(ApiError::bad_request("Search query is required"));
    };
    let max_results = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    youtube
        .search_videos(&q, max_results)
        .await
        .map(Json)
        .map_err(|err| upstream_error("youtube/search", err))
}

async fn popular_videos(
    State(youtube): State<GuardedVideoSearch>,
    Query(query): Query<VideoSearchQuery>,
) -> ApiResult<Json<Vec<Video>>> {
    let max_results = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    youtube
        .popular_videos(max_results)
        .await
        .map(Json)
        .map_err(|err| upstream_error("youtube/popular", err))
}

fn shows_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_SHOWS_LIMIT).clamp(1, MAX_SHOWS_LIMIT)
}

async fn search_shows(
    State(mixcloud): State<GuardedShowSearch>,
    Query(query): Query<ShowSearchQuery>,
) -> ApiResult<Json<Vec<ShowSummary>>> {
    let Some(q) = non_empty(query.q) else {
        return Err(ApiError::bad_request("Search query is required"));
    };
    let shows = mixcloud.search(&q, shows_limit(query.limit)).await;
    Ok(Json(shows.into_iter().map(ShowSummary::from).collect()))
}

async fn popular_shows(
    State(mixcloud): State<GuardedShowSearch>,
    Query(query): Query<ShowSearchQuery>,
) -> Json<Vec<ShowSummary>> {
    let shows = mixcloud.popular(shows_limit(query.limit)).await;
    Json(shows.into_iter().map(ShowSummary::from).collect())
}

/// Routes mounted directly under `/api`.
pub fn make_search_routes(state: ServerState) -> Router {
    Router::new()
        .route("/youtube/karaoke", get(karaoke))
        .route("/youtube/video/{id}", get(video_details))
        .route("/youtube/search", get(search_videos))
        .route("/youtube/popular", get(popular_videos))
        .route("/mixcloud/search", get(search_shows))
        .route("/mixcloud/popular", get(popular_shows))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_show_limit() {
        assert_eq!(shows_limit(None), DEFAULT_SHOWS_LIMIT);
        assert_eq!(shows_limit(Some(0)), 1);
        assert_eq!(shows_limit(Some(5)), 5);
        assert_eq!(shows_limit(Some(1000)), MAX_SHOWS_LIMIT);
    }
}
