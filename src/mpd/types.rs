use std::collections::HashMap;
use std::time::Duration;

/// A single MPD response: ordered fields plus an optional trailing binary
/// chunk (`albumart`/`readpicture` replies carry one).
#[derive(Debug, Clone, Default)]
pub struct MpdResponse {
    pub fields: Vec<(String, String)>,
    pub binary: Option<Vec<u8>>,
}

impl MpdResponse {
    pub fn field_map(&self) -> HashMap<String, Vec<String>> {
        let mut res: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in &self.fields {
            res.entry(name.clone())
                .or_insert_with(Vec::new)
                .push(value.clone());
        }
        res
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// MPD connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Wait,
    Connected,
    Failure,
    Disconnect,
    DisconnectInstant,
    Reconnect,
    TooOld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stop,
    Play,
    Pause,
}

impl PlayState {
    pub fn from_mpd(s: &str) -> Self {
        match s {
            "play" => PlayState::Play,
            "pause" => PlayState::Pause,
            _ => PlayState::Stop,
        }
    }
}

/// Feature flags probed once on connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    pub stickers: bool,
    pub tags: bool,
    pub smartpls: bool,
    pub playlists: bool,
    pub advsearch: bool,
    pub whence: bool,
    pub albumart: bool,
}

/// The persistent MPD state owned exclusively by the idle loop.
pub struct MpdState {
    pub conn_state: ConnState,
    pub reconnect_interval: u64,
    pub reconnect_deadline: std::time::Instant,
    pub queue_version: u32,
    pub queue_length: u32,
    pub play_state: PlayState,
    pub song_id: Option<u32>,
    pub last_song_id: Option<u32>,
    pub last_skipped_id: Option<u32>,
    pub last_last_played_id: Option<u32>,
    pub last_song_uri: Option<String>,
    pub last_song_start_time: Option<std::time::SystemTime>,
    pub set_song_played_time: Option<std::time::SystemTime>,
    pub song_end_time: Option<std::time::SystemTime>,
    pub crossfade: Duration,
    pub features: Features,
    pub enabled_tags: Vec<String>,
}

impl Default for MpdState {
    fn default() -> Self {
        MpdState {
            conn_state: ConnState::Disconnected,
            reconnect_interval: 0,
            reconnect_deadline: std::time::Instant::now(),
            queue_version: 0,
            queue_length: 0,
            play_state: PlayState::Stop,
            song_id: None,
            last_song_id: None,
            last_skipped_id: None,
            last_last_played_id: None,
            last_song_uri: None,
            last_song_start_time: None,
            set_song_played_time: None,
            song_end_time: None,
            crossfade: Duration::from_secs(0),
            features: Features::default(),
            enabled_tags: Vec::new(),
        }
    }
}

impl MpdState {
    /// True iff a connection handle exists and the last probe succeeded.
    /// The handle itself lives on `MpdClient`, not here, so this just
    /// reflects the state machine's own bookkeeping.
    pub fn is_connected(&self) -> bool {
        self.conn_state == ConnState::Connected
    }
}
