//! Client playback state: the current song, the play queue, shuffle and history.

mod queue;

pub use queue::{format_youtube_url, PlayerQueue, QueueSong, SongSource, HISTORY_LIMIT};
