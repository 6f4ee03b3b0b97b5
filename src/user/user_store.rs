use super::auth::{AuthToken, AuthTokenValue, UsernamePasswordCredentials};
use super::user_models::{
    LikedSong, LocalSong, NewLocalSong, NewSong, Playlist, PlaylistSongEntry, PlaylistSummary,
    PlaylistUpdate, PublicPlaylist, RecentlyPlayedEntry, Song, User, UserStats,
};
use anyhow::Result;
use std::time::SystemTime;

pub trait UserAuthCredentialsStore: Send + Sync {
    /// Returns the user's password credentials.
    /// Returns Ok(None) if the user has none.
    fn get_password_credentials(&self, user_id: &str) -> Result<Option<UsernamePasswordCredentials>>;

    /// Inserts or replaces the user's password credentials.
    fn update_password_credentials(&self, credentials: &UsernamePasswordCredentials) -> Result<()>;

    /// Records a login attempt against the credentials, bumping `last_used` on success.
    fn record_password_attempt(&self, user_id: &str, success: bool) -> Result<()>;
}

pub trait UserAuthTokenStore: Send + Sync {
    /// Returns a session token given its value, expired or not.
    /// Returns Ok(None) if the token does not exist.
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Deletes a session token, returning the deleted token.
    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Updates the token's `last_used` timestamp.
    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()>;

    /// Moves the token's expiry. Returns false if the token does not exist.
    fn extend_user_auth_token(&self, token: &AuthTokenValue, expires: SystemTime) -> Result<bool>;

    fn add_user_auth_token(&self, token: &AuthToken) -> Result<()>;

    /// Deletes every expired token, returning how many were removed.
    fn prune_expired_auth_tokens(&self) -> Result<usize>;
}

pub trait UserStore: Send + Sync {
    /// Creates a new user and returns its id.
    fn create_user(&self, name: Option<&str>, email: &str) -> Result<String>;

    fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Returns all users, newest first.
    fn get_all_users(&self) -> Result<Vec<User>>;

    /// Updates name and/or email. Returns Ok(None) if the user does not exist.
    fn update_user(
        &self,
        user_id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>>;

    /// Returns false if the user does not exist.
    fn delete_user(&self, user_id: &str) -> Result<bool>;

    /// Returns false if the user does not exist.
    fn set_user_premium(&self, user_id: &str, is_premium: bool) -> Result<bool>;

    fn set_user_stripe_customer(&self, user_id: &str, customer_id: &str) -> Result<bool>;

    /// Sets or clears the user's subscription id.
    fn set_user_stripe_subscription(&self, user_id: &str, subscription_id: Option<&str>)
        -> Result<bool>;

    /// Increments the user's token version, returning the new value.
    fn bump_token_version(&self, user_id: &str) -> Result<Option<i64>>;

    fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>>;
}

pub trait MusicLibraryStore: Send + Sync {
    fn create_song(&self, song: &NewSong) -> Result<Song>;

    fn get_song(&self, song_id: &str) -> Result<Option<Song>>;

    fn get_song_by_source_url(&self, source_url: &str) -> Result<Option<Song>>;

    /// Returns all songs, newest first.
    fn get_songs(&self) -> Result<Vec<Song>>;

    fn create_playlist(&self, user_id: &str, name: &str, description: Option<&str>)
        -> Result<Playlist>;

    fn get_playlist(&self, playlist_id: &str) -> Result<Option<Playlist>>;

    /// Returns the playlist's songs ordered by position.
    fn get_playlist_songs(&self, playlist_id: &str) -> Result<Vec<PlaylistSongEntry>>;

    /// Returns the user's playlists with song counts, newest first.
    fn get_user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistSummary>>;

    /// Returns playlists of every user, newest first, optionally only those owned by
    /// premium users.
    fn get_public_playlists(
        &self,
        premium_owners_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<PublicPlaylist>>;

    /// Returns Ok(None) if the playlist does not exist.
    fn update_playlist(&self, playlist_id: &str, update: &PlaylistUpdate)
        -> Result<Option<Playlist>>;

    fn delete_playlist(&self, playlist_id: &str) -> Result<bool>;

    /// Deletes all the user's playlists named `name` except the newest one.
    fn delete_duplicate_playlists(&self, user_id: &str, name: &str) -> Result<usize>;

    fn count_user_playlists(&self, user_id: &str) -> Result<usize>;

    /// Appends a song to the playlist and returns its position.
    /// Returns Ok(None) if the song is already in the playlist.
    fn add_song_to_playlist(&self, playlist_id: &str, song_id: &str) -> Result<Option<i64>>;

    fn remove_song_from_playlist(&self, playlist_id: &str, song_id: &str) -> Result<bool>;

    /// Returns Ok(None) if the song is already liked.
    fn like_song(&self, user_id: &str, song_id: &str) -> Result<Option<LikedSong>>;

    /// Returns false if the song wasn't liked.
    fn unlike_song(&self, user_id: &str, song_id: &str) -> Result<bool>;

    /// Returns the user's liked songs, newest first.
    fn get_liked_songs(&self, user_id: &str) -> Result<Vec<LikedSong>>;

    fn create_local_song(&self, song: &NewLocalSong) -> Result<LocalSong>;

    fn get_local_songs(&self, user_id: &str) -> Result<Vec<LocalSong>>;

    fn count_local_songs(&self, user_id: &str) -> Result<usize>;

    fn record_recently_played(&self, user_id: &str, song_id: &str) -> Result<()>;

    /// Returns the user's most recent plays, newest first.
    fn get_recently_played(&self, user_id: &str, limit: usize) -> Result<Vec<RecentlyPlayedEntry>>;
}

pub trait FullUserStore:
    UserStore + UserAuthTokenStore + UserAuthCredentialsStore + MusicLibraryStore
{
}

impl<T: UserStore + UserAuthTokenStore + UserAuthCredentialsStore + MusicLibraryStore>
    FullUserStore for T
{
}

/// Returned (wrapped in `anyhow::Error`) when an insert hits a uniqueness constraint.
#[derive(Debug, thiserror::Error)]
#[error("{0} already exists")]
pub struct DuplicateEntry(pub &'static str);
