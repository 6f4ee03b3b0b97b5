//! Third-party music search: YouTube videos, karaoke discovery and Mixcloud shows.

pub mod karaoke;
pub mod mixcloud;
pub mod youtube;

pub use karaoke::{search_karaoke, KaraokeTrack};
pub use mixcloud::{MixcloudClient, Show, ShowSearch, ShowSummary};
pub use youtube::{UpstreamError, Video, VideoSearch, YoutubeClient};
