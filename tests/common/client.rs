//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for the karaoke-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use karaoke_server::billing::signature_header;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Bearer token sent with every request, if set
    pub bearer: Option<String>,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `authenticated()` or `authenticated_premium()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            bearer: None,
        }
    }

    /// Creates a client pre-authenticated (web session cookie) as the free tier user
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::logged_in(base_url, TEST_EMAIL, TEST_PASS).await
    }

    /// Creates a client pre-authenticated (web session cookie) as the premium user
    pub async fn authenticated_premium(base_url: String) -> Self {
        Self::logged_in(base_url, PREMIUM_EMAIL, PREMIUM_PASS).await
    }

    async fn logged_in(base_url: String, email: &str, password: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.login(email, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Test user authentication failed: {:?}",
            response.text().await
        );

        client
    }

    /// Creates a cookie-less client holding an access token for the free tier user
    ///
    /// # Panics
    ///
    /// Panics if token generation fails.
    pub async fn with_bearer(base_url: String) -> Self {
        let mut client = Self::new(base_url);
        let response = client.generate_token(TEST_EMAIL, TEST_PASS).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.expect("Invalid token response");
        client.bearer = Some(
            body["token"]
                .as_str()
                .expect("Missing token")
                .to_string(),
        );
        client
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.put(format!("{}{}", self.base_url, path)))
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.delete(format!("{}{}", self.base_url, path)))
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ========================================================================
    // Web Authentication Endpoints
    // ========================================================================

    /// POST /api/auth/signup
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Response {
        self.post("/api/auth/signup")
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await
            .expect("Signup request failed")
    }

    /// POST with an arbitrary body and content type, for malformed payloads
    pub async fn post_raw(&self, path: &str, content_type: &str, body: &str) -> Response {
        self.post(path)
            .header("content-type", content_type)
            .body(body.to_string())
            .send()
            .await
            .expect("Raw POST request failed")
    }

    /// POST /api/auth/login
    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.post("/api/auth/login")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Login request failed")
    }

    /// GET /api/auth/logout
    pub async fn logout(&self) -> Response {
        self.get("/api/auth/logout")
            .send()
            .await
            .expect("Logout request failed")
    }

    /// GET /api/auth/session
    pub async fn get_session(&self) -> Response {
        self.get("/api/auth/session")
            .send()
            .await
            .expect("Session request failed")
    }

    /// POST /api/auth/session/update
    pub async fn update_session(&self) -> Response {
        self.post("/api/auth/session/update")
            .send()
            .await
            .expect("Session update request failed")
    }

    /// GET /api/auth/error?error=
    pub async fn auth_error(&self, kind: &str) -> Response {
        self.get("/api/auth/error")
            .query(&[("error", kind)])
            .send()
            .await
            .expect("Auth error request failed")
    }

    // ========================================================================
    // Token Endpoints
    // ========================================================================

    /// POST /api/auth/generate-token
    pub async fn generate_token(&self, email: &str, password: &str) -> Response {
        self.post("/api/auth/generate-token")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Generate token request failed")
    }

    /// POST /api/auth/refresh
    pub async fn refresh_token(&self, refresh_token: &str) -> Response {
        self.post("/api/auth/refresh")
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .expect("Refresh request failed")
    }

    /// POST /api/auth/google
    pub async fn google_sign_in(&self, email: &str, name: &str) -> Response {
        self.post("/api/auth/google")
            .json(&json!({ "email": email, "name": name }))
            .send()
            .await
            .expect("Google sign in request failed")
    }

    /// GET /api/auth/premium/sync
    pub async fn get_premium_sync(&self) -> Response {
        self.get("/api/auth/premium/sync")
            .send()
            .await
            .expect("Premium sync request failed")
    }

    /// POST /api/auth/premium/sync
    pub async fn post_premium_sync(&self, is_premium: bool) -> Response {
        self.post("/api/auth/premium/sync")
            .json(&json!({ "isPremium": is_premium }))
            .send()
            .await
            .expect("Premium sync request failed")
    }

    // ========================================================================
    // Mobile Endpoints
    // ========================================================================

    /// POST /api/mobile/auth/register
    pub async fn mobile_register(&self, name: &str, email: &str, password: &str) -> Response {
        self.post("/api/mobile/auth/register")
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await
            .expect("Mobile register request failed")
    }

    /// POST /api/mobile/auth/refresh
    pub async fn mobile_refresh(&self) -> Response {
        self.post("/api/mobile/auth/refresh")
            .send()
            .await
            .expect("Mobile refresh request failed")
    }

    /// POST /api/mobile/auth/logout
    pub async fn mobile_logout(&self) -> Response {
        self.post("/api/mobile/auth/logout")
            .send()
            .await
            .expect("Mobile logout request failed")
    }

    /// GET /api/mobile/check-premium
    pub async fn get_check_premium(&self) -> Response {
        self.get("/api/mobile/check-premium")
            .send()
            .await
            .expect("Check premium request failed")
    }

    /// POST /api/mobile/check-premium
    pub async fn post_check_premium(&self, user_id: &str, email: &str) -> Response {
        self.post("/api/mobile/check-premium")
            .json(&json!({ "userId": user_id, "email": email }))
            .send()
            .await
            .expect("Check premium request failed")
    }

    // ========================================================================
    // Playlist Endpoints
    // ========================================================================

    /// GET /api/playlists
    pub async fn get_playlists(&self) -> Response {
        self.get("/api/playlists")
            .send()
            .await
            .expect("Get playlists request failed")
    }

    /// POST /api/playlists
    pub async fn create_playlist(&self, name: Option<&str>) -> Response {
        let body = match name {
            Some(name) => json!({ "name": name }),
            None => json!({}),
        };
        self.post("/api/playlists")
            .json(&body)
            .send()
            .await
            .expect("Create playlist request failed")
    }

    /// DELETE /api/playlists
    pub async fn delete_duplicate_playlists(&self) -> Response {
        self.delete("/api/playlists")
            .send()
            .await
            .expect("Delete duplicates request failed")
    }

    /// GET /api/playlists/public
    pub async fn get_public_playlists(&self) -> Response {
        self.get("/api/playlists/public")
            .send()
            .await
            .expect("Get public playlists request failed")
    }

    /// GET /api/playlists/{id}
    pub async fn get_playlist(&self, id: &str) -> Response {
        self.get(&format!("/api/playlists/{}", id))
            .send()
            .await
            .expect("Get playlist request failed")
    }

    /// PUT /api/playlists/{id}
    pub async fn update_playlist(&self, id: &str, body: Value) -> Response {
        self.put(&format!("/api/playlists/{}", id))
            .json(&body)
            .send()
            .await
            .expect("Update playlist request failed")
    }

    /// DELETE /api/playlists/{id}
    pub async fn delete_playlist(&self, id: &str) -> Response {
        self.delete(&format!("/api/playlists/{}", id))
            .send()
            .await
            .expect("Delete playlist request failed")
    }

    /// GET /api/playlists/{id}/songs
    pub async fn get_playlist_songs(&self, id: &str) -> Response {
        self.get(&format!("/api/playlists/{}/songs", id))
            .send()
            .await
            .expect("Get playlist songs request failed")
    }

    /// POST /api/playlists/{id}/songs
    pub async fn add_playlist_song(&self, id: &str, song_id: &str) -> Response {
        self.post(&format!("/api/playlists/{}/songs", id))
            .json(&json!({ "songId": song_id }))
            .send()
            .await
            .expect("Add playlist song request failed")
    }

    /// DELETE /api/playlists/{id}/songs
    pub async fn remove_playlist_song(&self, id: &str, song_id: &str) -> Response {
        self.delete(&format!("/api/playlists/{}/songs", id))
            .json(&json!({ "songId": song_id }))
            .send()
            .await
            .expect("Remove playlist song request failed")
    }

    // ========================================================================
    // Song Endpoints
    // ========================================================================

    /// POST /api/songs
    pub async fn create_song(&self, title: &str, source_url: &str) -> Response {
        self.post("/api/songs")
            .json(&json!({
                "title": title,
                "artist": "Test Artist",
                "duration": "3:45",
                "source": "youtube",
                "sourceUrl": source_url,
            }))
            .send()
            .await
            .expect("Create song request failed")
    }

    /// POST /api/songs with a raw body
    pub async fn create_song_raw(&self, body: Value) -> Response {
        self.post("/api/songs")
            .json(&body)
            .send()
            .await
            .expect("Create song request failed")
    }

    /// Creates a song and returns its id
    pub async fn create_song_id(&self, title: &str, source_url: &str) -> String {
        let response = self.create_song(title, source_url).await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Invalid song response");
        body["id"].as_str().expect("Missing song id").to_string()
    }

    /// GET /api/songs
    pub async fn get_songs(&self) -> Response {
        self.get("/api/songs")
            .send()
            .await
            .expect("Get songs request failed")
    }

    /// GET /api/songs/liked
    pub async fn get_liked_songs(&self) -> Response {
        self.get("/api/songs/liked")
            .send()
            .await
            .expect("Get liked songs request failed")
    }

    /// POST /api/songs/liked
    pub async fn like_song(&self, song_id: &str) -> Response {
        self.post("/api/songs/liked")
            .json(&json!({ "songId": song_id }))
            .send()
            .await
            .expect("Like song request failed")
    }

    /// DELETE /api/songs/liked?songId=
    pub async fn unlike_song(&self, song_id: &str) -> Response {
        self.delete("/api/songs/liked")
            .query(&[("songId", song_id)])
            .send()
            .await
            .expect("Unlike song request failed")
    }

    /// POST /api/songs/local
    pub async fn upload_local_song(
        &self,
        title: &str,
        artist: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Response {
        let part = Part::bytes(bytes.to_vec())
            .file_name("song.mp3")
            .mime_str(mime_type)
            .expect("Invalid mime type");
        let form = Form::new()
            .text("title", title.to_string())
            .text("artist", artist.to_string())
            .part("file", part);
        self.post("/api/songs/local")
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    /// GET /api/songs/local
    pub async fn get_local_songs(&self) -> Response {
        self.get("/api/songs/local")
            .send()
            .await
            .expect("Get local songs request failed")
    }

    /// POST /api/songs/recently-played
    pub async fn record_play(&self, song_id: &str) -> Response {
        self.post("/api/songs/recently-played")
            .json(&json!({ "songId": song_id }))
            .send()
            .await
            .expect("Recently played request failed")
    }

    /// GET /uploads/{path}
    pub async fn get_upload(&self, file_path: &str) -> Response {
        self.get(&format!("/{}", file_path))
            .send()
            .await
            .expect("Get upload request failed")
    }

    // ========================================================================
    // User Endpoints
    // ========================================================================

    /// GET /api/users/me
    pub async fn get_me(&self) -> Response {
        self.get("/api/users/me")
            .send()
            .await
            .expect("Get me request failed")
    }

    /// GET /api/users/{id}/stats
    pub async fn get_user_stats(&self, user_id: &str) -> Response {
        self.get(&format!("/api/users/{}/stats", user_id))
            .send()
            .await
            .expect("Get user stats request failed")
    }

    /// GET /api/library
    pub async fn get_library(&self) -> Response {
        self.get("/api/library")
            .send()
            .await
            .expect("Get library request failed")
    }

    // ========================================================================
    // Billing Endpoints
    // ========================================================================

    /// POST /api/create-checkout-session
    pub async fn create_checkout_session(&self) -> Response {
        self.post("/api/create-checkout-session")
            .send()
            .await
            .expect("Create checkout session request failed")
    }

    /// POST /api/verify-subscription
    pub async fn verify_subscription(&self, session_id: &str) -> Response {
        self.post("/api/verify-subscription")
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await
            .expect("Verify subscription request failed")
    }

    /// POST /api/subscription/cancel
    pub async fn cancel_subscription(&self) -> Response {
        self.post("/api/subscription/cancel")
            .send()
            .await
            .expect("Cancel subscription request failed")
    }

    /// GET /api/subscription/details
    pub async fn get_subscription_details(&self) -> Response {
        self.get("/api/subscription/details")
            .send()
            .await
            .expect("Subscription details request failed")
    }

    /// POST /api/webhooks/stripe, signed with the test webhook secret
    pub async fn send_webhook(&self, event: Value) -> Response {
        let payload = serde_json::to_vec(&event).expect("Failed to serialize event");
        let header = signature_header(
            STRIPE_WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
            &payload,
        )
        .expect("Failed to sign event");
        self.send_webhook_raw(payload, &header).await
    }

    /// POST /api/webhooks/stripe with an arbitrary signature
    pub async fn send_webhook_raw(&self, payload: Vec<u8>, signature: &str) -> Response {
        self.client
            .post(format!("{}/api/webhooks/stripe", self.base_url))
            .header("stripe-signature", signature)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await
            .expect("Webhook request failed")
    }

    // ========================================================================
    // Admin Endpoints
    // ========================================================================

    fn admin(&self, method: reqwest::Method, path: &str, key: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-admin-api-key", key)
    }

    /// GET /api/admin-users
    pub async fn admin_get_users(&self, key: &str) -> Response {
        self.admin(reqwest::Method::GET, "/api/admin-users", key)
            .send()
            .await
            .expect("Admin get users request failed")
    }

    /// POST /api/admin-users
    pub async fn admin_create_user(&self, key: &str, body: Value) -> Response {
        self.admin(reqwest::Method::POST, "/api/admin-users", key)
            .json(&body)
            .send()
            .await
            .expect("Admin create user request failed")
    }

    /// PUT /api/admin-users
    pub async fn admin_update_user(&self, key: &str, body: Value) -> Response {
        self.admin(reqwest::Method::PUT, "/api/admin-users", key)
            .json(&body)
            .send()
            .await
            .expect("Admin update user request failed")
    }

    /// DELETE /api/admin-users
    pub async fn admin_delete_user(&self, key: &str, id: &str) -> Response {
        self.admin(reqwest::Method::DELETE, "/api/admin-users", key)
            .json(&json!({ "id": id }))
            .send()
            .await
            .expect("Admin delete user request failed")
    }

    /// GET /api/admin-songs
    pub async fn admin_get_songs(&self, key: &str) -> Response {
        self.admin(reqwest::Method::GET, "/api/admin-songs", key)
            .send()
            .await
            .expect("Admin get songs request failed")
    }

    /// GET /api/admin-playlists
    pub async fn admin_get_playlists(&self, key: &str) -> Response {
        self.admin(reqwest::Method::GET, "/api/admin-playlists", key)
            .send()
            .await
            .expect("Admin get playlists request failed")
    }

    // ========================================================================
    // Search Endpoints
    // ========================================================================

    /// GET /api/youtube/karaoke?q=
    pub async fn karaoke_search(&self, query: &str) -> Response {
        self.get("/api/youtube/karaoke")
            .query(&[("q", query)])
            .send()
            .await
            .expect("Karaoke search request failed")
    }

    /// GET /api/youtube/video/{id}
    pub async fn get_video(&self, id: &str) -> Response {
        self.get(&format!("/api/youtube/video/{}", id))
            .send()
            .await
            .expect("Get video request failed")
    }

    /// GET /api/mixcloud/search?q=
    pub async fn mixcloud_search(&self, query: &str) -> Response {
        self.get("/api/mixcloud/search")
            .query(&[("q", query)])
            .send()
            .await
            .expect("Mixcloud search request failed")
    }
}
