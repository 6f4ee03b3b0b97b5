pub mod auth;
pub mod jwt;
pub mod premium;
mod sqlite_user_store;
mod user_manager;
pub mod user_models;
mod user_store;

pub use auth::{AuthToken, AuthTokenValue, UsernamePasswordCredentials};
pub use jwt::{AccessClaims, JwtIssuer, JwtSettings, RefreshClaims, TokenPair};
pub use premium::{FreeTierLimits, LimitError, PremiumStatus};
pub use sqlite_user_store::SqliteUserStore;
pub use user_manager::{is_valid_email, RegistrationError, UserManager, DEFAULT_SESSION_MAX_AGE};
pub use user_models::{
    LikedSong, LocalSong, NewLocalSong, NewSong, Playlist, PlaylistCount, PlaylistOwner,
    PlaylistSongEntry, PlaylistSummary, PlaylistUpdate, PlaylistWithSongs, PublicPlaylist,
    RecentlyPlayedEntry, Song, User, UserStats,
};
pub use user_store::{
    DuplicateEntry, FullUserStore, MusicLibraryStore, UserAuthCredentialsStore,
    UserAuthTokenStore, UserStore,
};
