use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongSource {
    Youtube,
    Mixcloud,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSong {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration: String,
    pub source: SongSource,
    pub source_url: String,
    pub thumbnail: Option<String>,
}

impl QueueSong {
    fn normalized(mut self) -> QueueSong {
        if self.source == SongSource::Youtube {
            self.source_url = format_youtube_url(&self.source_url);
        }
        self
    }
}

/// Full URLs are kept, a bare video id becomes a watch URL.
pub fn format_youtube_url(url: &str) -> String {
    if url.starts_with("http") || url.contains("youtube.com") || url.contains("youtu.be") {
        url.to_string()
    } else {
        format!("https://www.youtube.com/watch?v={}", url)
    }
}

pub struct PlayerQueue<R: Rng = StdRng> {
    current: Option<QueueSong>,
    is_playing: bool,
    volume: f32,
    queue: VecDeque<QueueSong>,
    shuffled_queue: VecDeque<QueueSong>,
    is_shuffled: bool,
    history: VecDeque<QueueSong>,
    has_started_playing: bool,
    rng: R,
}

impl PlayerQueue<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl Default for PlayerQueue<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PlayerQueue<R> {
    pub fn with_rng(rng: R) -> Self {
        PlayerQueue {
            current: None,
            is_playing: false,
            volume: 1.0,
            queue: VecDeque::new(),
            shuffled_queue: VecDeque::new(),
            is_shuffled: false,
            history: VecDeque::new(),
            has_started_playing: false,
            rng,
        }
    }

    pub fn current(&self) -> Option<&QueueSong> {
        self.current.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn queue(&self) -> &VecDeque<QueueSong> {
        &self.queue
    }

    pub fn shuffled_queue(&self) -> &VecDeque<QueueSong> {
        &self.shuffled_queue
    }

    pub fn is_shuffled(&self) -> bool {
        self.is_shuffled
    }

    pub fn history(&self) -> &VecDeque<QueueSong> {
        &self.history
    }

    pub fn has_started_playing(&self) -> bool {
        self.has_started_playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_has_started_playing(&mut self, started: bool) {
        self.has_started_playing = started;
    }

    fn push_history(&mut self, song: QueueSong) {
        self.history.push_front(song);
        self.history.truncate(HISTORY_LIMIT);
    }

    fn active_queue_mut(&mut self) -> &mut VecDeque<QueueSong> {
        if self.is_shuffled {
            &mut self.shuffled_queue
        } else {
            &mut self.queue
        }
    }

    fn shuffle(&mut self, songs: &mut [QueueSong]) {
        // Fisher-Yates
        for i in (1..songs.len()).rev() {
            let j = self.rng.random_range(0..=i);
            songs.swap(i, j);
        }
    }

    pub fn set_current_song(&mut self, song: QueueSong) {
        if let Some(previous) = self.current.take() {
            self.push_history(previous);
        }
        self.current = Some(song.normalized());
        self.is_playing = true;
        self.has_started_playing = false;
    }

    pub fn add_to_queue(&mut self, song: QueueSong) {
        let song = song.normalized();
        if self.is_shuffled {
            let position = self.rng.random_range(0..=self.shuffled_queue.len());
            self.shuffled_queue.insert(position, song.clone());
        }
        self.queue.push_back(song);
    }

    pub fn remove_from_queue(&mut self, song_id: &str) {
        self.queue.retain(|s| s.id != song_id);
        self.shuffled_queue.retain(|s| s.id != song_id);
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.shuffled_queue.clear();
    }

    /// Advances to the head of the active queue, or stops when it is empty.
    pub fn play_next(&mut self) {
        let Some(next) = self.active_queue_mut().pop_front() else {
            self.current = None;
            self.is_playing = false;
            return;
        };
        if let Some(previous) = self.current.take() {
            self.push_history(previous);
        }
        self.current = Some(next.normalized());
    }

    pub fn play_previous(&mut self) {
        let Some(previous) = self.history.pop_front() else {
            return;
        };
        if let Some(current) = self.current.take() {
            self.active_queue_mut().push_front(current);
        }
        self.current = Some(previous.normalized());
        self.is_playing = true;
    }

    pub fn toggle_shuffle(&mut self) {
        if self.is_shuffled {
            self.is_shuffled = false;
            return;
        }
        let current_id = self.current.as_ref().map(|s| s.id.clone());
        let mut remaining: Vec<QueueSong> = self
            .queue
            .iter()
            .filter(|s| Some(&s.id) != current_id.as_ref())
            .cloned()
            .collect();
        self.shuffle(&mut remaining);
        self.shuffled_queue = remaining.into();
        self.is_shuffled = true;
    }

    pub fn set_queue(&mut self, songs: Vec<QueueSong>) {
        let songs: Vec<QueueSong> = songs.into_iter().map(QueueSong::normalized).collect();
        if self.is_shuffled {
            let mut shuffled = songs.clone();
            self.shuffle(&mut shuffled);
            self.shuffled_queue = shuffled.into();
        }
        self.queue = songs.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> QueueSong {
        QueueSong {
            id: id.to_string(),
            title: format!("Song {}", id),
            artist: "Artist".to_string(),
            duration: "3:00".to_string(),
            source: SongSource::Youtube,
            source_url: format!("vid{}", id),
            thumbnail: None,
        }
    }

    fn player() -> PlayerQueue<StdRng> {
        PlayerQueue::with_rng(StdRng::seed_from_u64(7))
    }

    fn ids(songs: &VecDeque<QueueSong>) -> Vec<&str> {
        songs.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn formats_youtube_urls() {
        assert_eq!(
            format_youtube_url("abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            format_youtube_url("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
        assert_eq!(
            format_youtube_url("www.youtube.com/watch?v=abc"),
            "www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn set_current_song_normalizes_and_tracks_history() {
        let mut player = player();
        player.set_current_song(song("1"));
        assert_eq!(
            player.current().unwrap().source_url,
            "https://www.youtube.com/watch?v=vid1"
        );
        assert!(player.is_playing());
        assert!(!player.has_started_playing());

        player.set_current_song(song("2"));
        assert_eq!(ids(player.history()), vec!["1"]);
    }

    #[test]
    fn local_sources_are_not_rewritten() {
        let mut player = player();
        let mut local = song("1");
        local.source = SongSource::Local;
        local.source_url = "uploads/x.mp3".to_string();
        player.set_current_song(local);
        assert_eq!(player.current().unwrap().source_url, "uploads/x.mp3");
    }

    #[test]
    fn history_is_capped() {
        let mut player = player();
        for i in 0..(HISTORY_LIMIT + 10) {
            player.set_current_song(song(&i.to_string()));
        }
        assert_eq!(player.history().len(), HISTORY_LIMIT);
        assert_eq!(player.history()[0].id, (HISTORY_LIMIT + 8).to_string());
    }

    #[test]
    fn play_next_walks_the_queue_then_stops() {
        let mut player = player();
        player.set_current_song(song("a"));
        player.add_to_queue(song("b"));
        player.add_to_queue(song("c"));

        player.play_next();
        assert_eq!(player.current().unwrap().id, "b");
        assert_eq!(ids(player.queue()), vec!["c"]);
        assert_eq!(ids(player.history()), vec!["a"]);

        player.play_next();
        player.play_next();
        assert!(player.current().is_none());
        assert!(!player.is_playing());
        assert_eq!(ids(player.history()), vec!["b", "a"]);
    }

    #[test]
    fn play_previous_restores_history() {
        let mut player = player();
        player.play_previous();
        assert!(player.current().is_none());

        player.set_current_song(song("a"));
        player.set_current_song(song("b"));
        player.set_playing(false);
        player.play_previous();

        assert_eq!(player.current().unwrap().id, "a");
        assert!(player.is_playing());
        assert_eq!(ids(player.queue()), vec!["b"]);
        assert!(player.history().is_empty());
    }

    #[test]
    fn shuffle_excludes_current_and_keeps_all_songs() {
        let mut player = player();
        player.set_queue((0..10).map(|i| song(&i.to_string())).collect());
        player.set_current_song(song("3"));
        player.toggle_shuffle();

        assert!(player.is_shuffled());
        let mut shuffled: Vec<_> = ids(player.shuffled_queue());
        assert!(!shuffled.contains(&"3"));
        shuffled.sort();
        assert_eq!(shuffled, vec!["0", "1", "2", "4", "5", "6", "7", "8", "9"]);

        let expected = player.shuffled_queue()[0].id.clone();
        player.play_next();
        assert_eq!(player.current().unwrap().id, expected);
        assert_eq!(player.queue().len(), 10);

        player.toggle_shuffle();
        assert!(!player.is_shuffled());
    }

    #[test]
    fn queue_edits_apply_to_both_queues() {
        let mut player = player();
        player.set_queue(vec![song("a"), song("b")]);
        player.toggle_shuffle();
        player.add_to_queue(song("c"));
        assert_eq!(player.queue().len(), 3);
        assert_eq!(player.shuffled_queue().len(), 3);

        player.remove_from_queue("a");
        assert_eq!(ids(player.queue()), vec!["b", "c"]);
        assert!(!ids(player.shuffled_queue()).contains(&"a"));

        player.clear_queue();
        assert!(player.queue().is_empty());
        assert!(player.shuffled_queue().is_empty());
    }

    #[test]
    fn volume_is_clamped() {
        let mut player = PlayerQueue::new();
        assert_eq!(player.volume(), 1.0);
        player.set_volume(1.5);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-0.5);
        assert_eq!(player.volume(), 0.0);
    }
}
