//! End-to-end tests for song endpoints
//!
//! Tests the shared song catalog, liked songs, local uploads and the
//! recently played history.

mod common;

use common::{TestClient, TestServer, TEST_EMAIL, TEST_MP3_BYTES};
use reqwest::StatusCode;
use serde_json::{json, Value};

const SOURCE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

#[tokio::test]
async fn test_create_song_is_idempotent_per_source_url() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client.create_song("Hello", SOURCE_URL).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["sourceUrl"], SOURCE_URL);

    let response = client.create_song("Hello again", SOURCE_URL).await;
    assert_eq!(response.status(), StatusCode::OK);
    let existing: Value = response.json().await.unwrap();
    assert_eq!(existing["id"], created["id"]);
    assert_eq!(existing["title"], "Hello");

    let songs: Vec<Value> = client.get_songs().await.json().await.unwrap();
    assert_eq!(songs.len(), 1);
}

#[tokio::test]
async fn test_create_song_requires_fields() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .create_song_raw(json!({ "title": "Only a title" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing required fields");
}

#[tokio::test]
async fn test_songs_require_authentication() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_eq!(client.get_songs().await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        client.create_song("Hello", SOURCE_URL).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_like_and_unlike_song() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;
    let song_id = client.create_song_id("Hello", SOURCE_URL).await;

    let response = client.like_song(&song_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["songId"], song_id);
    assert_eq!(body["song"]["title"], "Hello");

    let response = client.like_song(&song_id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let liked: Vec<Value> = client.get_liked_songs().await.json().await.unwrap();
    assert_eq!(liked.len(), 1);

    let response = client.unlike_song(&song_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = client.unlike_song(&song_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let liked: Vec<Value> = client.get_liked_songs().await.json().await.unwrap();
    assert!(liked.is_empty());
}

#[tokio::test]
async fn test_like_unknown_song() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    assert_eq!(
        client.like_song("no-such-song").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(client.like_song("").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_local_song() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .upload_local_song("My Take", "Me", TEST_MP3_BYTES, "audio/mpeg")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let song: Value = response.json().await.unwrap();
    assert_eq!(song["title"], "My Take");
    assert_eq!(song["mimeType"], "audio/mpeg");
    assert_eq!(song["fileSize"], TEST_MP3_BYTES.len());
    assert_eq!(song["userId"], server.user_id(TEST_EMAIL));
    let file_path = song["filePath"].as_str().unwrap().to_string();
    assert!(file_path.starts_with("uploads/"));

    let body: Value = client.get_local_songs().await.json().await.unwrap();
    assert_eq!(body["songs"].as_array().unwrap().len(), 1);

    // The stored file is served back
    let response = client.get_upload(&file_path).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), TEST_MP3_BYTES);
}

#[tokio::test]
async fn test_upload_rejects_non_audio() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .upload_local_song("Notes", "Me", b"just some text", "text/plain")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid file type.");
}

#[tokio::test]
async fn test_upload_requires_title_and_artist() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .upload_local_song("", "Me", TEST_MP3_BYTES, "audio/mpeg")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recently_played_shows_up_in_library() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;
    let song_id = client.create_song_id("Hello", SOURCE_URL).await;

    let response = client.record_play(&song_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        client.record_play("no-such-song").await.status(),
        StatusCode::NOT_FOUND
    );

    let library: Value = client.get_library().await.json().await.unwrap();
    let recent = library["recentlyPlayed"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["id"], song_id);
    assert!(recent[0]["playedAt"].is_string());
    // No artwork given, a placeholder is generated
    assert!(recent[0]["thumbnail"]
        .as_str()
        .unwrap()
        .starts_with("https://placehold.co/"));
}

#[tokio::test]
async fn test_user_profile_and_stats() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;
    let user_id = server.user_id(TEST_EMAIL);
    let song_id = client.create_song_id("Hello", SOURCE_URL).await;
    client.like_song(&song_id).await;
    client.create_playlist(Some("Mine")).await;

    let me: Value = client.get_me().await.json().await.unwrap();
    assert_eq!(me["id"], user_id);
    assert_eq!(me["isPremium"], false);

    let response = client.get_user_stats(&user_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats: Value = response.json().await.unwrap();
    assert_eq!(stats["_count"]["playlists"], 1);
    assert_eq!(stats["_count"]["likedSongs"], 1);

    let response = client.get_user_stats("someone-else").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
