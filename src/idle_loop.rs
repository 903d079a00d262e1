//! C8: the idle loop — the heart.
//!
//! A single-threaded state machine that multiplexes waiting for MPD push
//! events via `idle`/`noidle` against serving the API queue, ticking the
//! timer wheel, and draining the sticker backlog. Runs on
//! its own `std::thread`; nothing else touches `MpdState`, the timer
//! wheel, the trigger registry, the sticker backlog or the last-played
//! ring.
use crate::album_cache::AlbumCacheHandle;
use crate::config::Config;
use crate::error::{AppError, Facility, JsonRpcError, MpdError, Severity};
use crate::http::jsonrpc::{Response, ResponseBody};
use crate::jukebox;
use crate::mpd::client::{version_at_least, IDLE_SUBSYSTEMS};
use crate::mpd::types::{ConnState, Features, MpdState, PlayState};
use crate::mpd::MpdClient;
use crate::notification::{self, NotificationHub};
use crate::queue::Queue;
use crate::request::{ApiCommand, ApiRequest, CONNECTION_ID_INTERNAL};
use crate::session::SessionStore;
use crate::sticker::{StickerBacklog, StickerJob, StickerKind};
use crate::timer::TimerWheel;
use crate::trigger::{Event, TriggerRegistry};
use crate::worker::{self, WorkerJob, WorkerSpec};
use base64::Engine;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

const MPD_VERSION_FLOOR: (u32, u32, u32) = (0, 21, 0);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SKIP_SEEK_GUARD: Duration = Duration::from_secs(10);
const MAX_SCROBBLE_DELAY: Duration = Duration::from_secs(4 * 60);

const TIMER_CACHE_REBUILD: i64 = 1;
const TIMER_SMARTPLS_UPDATE_ALL: i64 = 2;
const TIMER_DATABASE_UPDATE: i64 = 3;

// Idle event bits, in the ascending order spec.md §4.5/§5 requires they
// be processed in.
const BIT_DATABASE: u32 = 1 << 0;
const BIT_STORED_PLAYLIST: u32 = 1 << 1;
const BIT_QUEUE: u32 = 1 << 2;
const BIT_PLAYER: u32 = 1 << 3;
const BIT_MIXER: u32 = 1 << 4;
const BIT_OUTPUT: u32 = 1 << 5;
const BIT_OPTIONS: u32 = 1 << 6;
const BIT_UPDATE: u32 = 1 << 7;

#[derive(Debug, Clone, Copy)]
enum TimerHandler {
    CacheRebuild,
    SmartplsUpdateAll,
    DatabaseUpdate,
}

/// Everything the idle loop owns exclusively.
pub struct IdleLoop {
    config: Arc<Config>,
    client: Option<MpdClient>,
    state: MpdState,

    album_cache: Arc<AlbumCacheHandle>,
    timers: TimerWheel<TimerHandler>,
    triggers: TriggerRegistry,
    stickers: StickerBacklog,
    session_store: Arc<SessionStore>,

    api_queue: Arc<Queue<ApiRequest>>,
    response_queue: Arc<Queue<Response>>,
    notify: NotificationHub,
    shutdown: Arc<AtomicBool>,
    /// Mirrors `state.features.albumart` for the HTTP frontend (C12),
    /// which never touches `MpdState` directly.
    albumart_supported: Arc<AtomicBool>,

    scored_song_id: Option<u32>,
    jukebox_selector: Box<dyn jukebox::JukeboxSelector + Send>,
}

impl IdleLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        album_cache: Arc<AlbumCacheHandle>,
        session_store: Arc<SessionStore>,
        api_queue: Arc<Queue<ApiRequest>>,
        response_queue: Arc<Queue<Response>>,
        notify: NotificationHub,
        shutdown: Arc<AtomicBool>,
        albumart_supported: Arc<AtomicBool>,
    ) -> Self {
        IdleLoop {
            config,
            client: None,
            state: MpdState::default(),
            album_cache,
            timers: TimerWheel::new(),
            triggers: TriggerRegistry::new(),
            stickers: StickerBacklog::new(),
            session_store,
            api_queue,
            response_queue,
            notify,
            shutdown,
            albumart_supported,
            scored_song_id: None,
            jukebox_selector: Box::new(jukebox::NullSelector),
        }
    }

    /// Drives the state machine until the shutdown flag is set.
    pub fn run(mut self) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.drain_on_shutdown();
                return;
            }
            match self.state.conn_state {
                ConnState::Disconnected | ConnState::Reconnect => self.connect(),
                ConnState::Wait => self.wait_backoff(),
                ConnState::Connected => self.idle_cycle(),
                ConnState::Failure => self.state.conn_state = ConnState::Disconnect,
                ConnState::Disconnect => self.enter_wait(),
                ConnState::DisconnectInstant => {
                    self.client = None;
                    self.state.conn_state = ConnState::Disconnected;
                }
                ConnState::TooOld => {
                    error!("MPD server is older than 0.21.0, shutting down");
                    self.shutdown.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    /// Connect path.
    fn connect(&mut self) {
        match MpdClient::connect(
            &self.config.mpd_host,
            self.config.mpd_port,
            self.config.mpd_password.as_deref(),
        ) {
            Ok(client) => {
                if !version_at_least(client.server_version, MPD_VERSION_FLOOR) {
                    self.state.conn_state = ConnState::TooOld;
                    return;
                }
                self.client = Some(client);
                self.notify.send(notification::mpd_connected());
                self.state.reconnect_interval = 0;
                self.probe_features();
                self.reset_tag_set();
                self.timers.replace(
                    TIMER_CACHE_REBUILD,
                    self.config.cache_rebuild_delay,
                    None,
                    TimerHandler::CacheRebuild,
                );
                self.timers.replace(
                    TIMER_SMARTPLS_UPDATE_ALL,
                    self.config.smartpls_update_interval,
                    Some(self.config.smartpls_update_interval),
                    TimerHandler::SmartplsUpdateAll,
                );
                self.fire_trigger(Event::MympdConnected);
                self.state.conn_state = ConnState::Connected;
            }
            Err(e) => {
                warn!("connect to MPD failed: {e}");
                self.state.reconnect_interval = (self.state.reconnect_interval + 2).min(20);
                self.state.reconnect_deadline =
                    Instant::now() + Duration::from_secs(self.state.reconnect_interval);
                self.state.conn_state = ConnState::Wait;
            }
        }
    }

    fn enter_wait(&mut self) {
        self.client = None;
        self.state.reconnect_interval = (self.state.reconnect_interval + 2).min(20);
        self.state.reconnect_deadline =
            Instant::now() + Duration::from_secs(self.state.reconnect_interval);
        self.state.conn_state = ConnState::Wait;
    }

    /// During WAIT, only MPD-independent requests are serviced; a
    /// `MYMPD_API_CONNECTION_SAVE` request additionally forces an instant
    /// transition out of WAIT.
    fn wait_backoff(&mut self) {
        if let Some(req) = self.api_queue.shift(IDLE_POLL_INTERVAL, 0) {
            if req.method == "MYMPD_API_CONNECTION_SAVE" {
                self.respond_ok(&req);
                self.state.conn_state = ConnState::Disconnected;
                return;
            }
            if req.command.is_mpd_independent() {
                self.handle_mpd_independent(&req);
            } else {
                self.respond_disconnected(&req);
            }
        }
        if Instant::now() >= self.state.reconnect_deadline {
            self.state.conn_state = ConnState::Disconnected;
        }
    }

    fn probe_features(&mut self) {
        let Some(client) = self.client.as_mut() else { return };
        let mut features = Features::default();
        if let Ok(resp) = client.issue_command("commands") {
            let cmds: Vec<&str> = resp.all("command");
            features.stickers = cmds.contains(&"sticker");
            features.smartpls = cmds.contains(&"listplaylists");
            features.playlists = cmds.contains(&"listplaylists");
            features.advsearch = cmds.contains(&"searchadd");
            features.albumart = cmds.contains(&"albumart");
        }
        if version_at_least(client.server_version, (0, 22, 4)) {
            features.whence = true;
        }
        if let Ok(resp) = client.issue_command("tagtypes") {
            self.state.enabled_tags = resp.all("tagtype").into_iter().map(String::from).collect();
            features.tags = !self.state.enabled_tags.is_empty();
        }
        self.albumart_supported.store(features.albumart, Ordering::Relaxed);
        self.state.features = features;
    }

    /// Tag-type negotiation issued as one atomic command list.
    fn reset_tag_set(&mut self) {
        let Some(client) = self.client.as_mut() else { return };
        if let Err(e) = client.command_list(&["tagtypes clear", "tagtypes all"]) {
            warn!("failed to reset tag set: {e}");
        }
    }

    /// One iteration of "inside MPD idle" / "outside MPD idle".
    fn idle_cycle(&mut self) {
        let Some(client) = self.client.as_mut() else {
            self.state.conn_state = ConnState::Disconnected;
            return;
        };
        if let Err(e) = client.start_idle(IDLE_SUBSYSTEMS) {
            self.handle_mpd_error(e);
            return;
        }

        loop {
            if self.should_leave_idle() {
                break;
            }
        }

        let resp = match self.client.as_mut().unwrap().finish_idle() {
            Ok(r) => r,
            Err(e) => {
                self.handle_mpd_error(e);
                return;
            }
        };

        let mask = decode_changed(&resp);
        self.process_idle_bits(mask);
        // `played_crossed_half_threshold()` and `jukebox_refill_due()` are
        // time-based leave-idle conditions (`should_leave_idle`) that fire
        // with no MPD event pending, so the corresponding actions must run
        // unconditionally here rather than only from the `player`/`queue`
        // idle-bit handlers above: otherwise leaving idle solely on one of
        // these timers does nothing, and the loop re-enters idle and wakes
        // again every poll interval forever.
        self.maybe_score_play();
        if self.jukebox_refill_due() {
            self.run_jukebox_refill();
        }
        self.drain_timers();
        self.drain_stickers();
        self.service_one_api_request();
        self.api_queue.expire(Duration::from_secs(300));
    }

    /// Entry conditions to leave idle, ORed. Blocks up to
    /// `IDLE_POLL_INTERVAL` on the socket each pass so timers and the
    /// sticker backlog stay serviceable even with no MPD traffic.
    fn should_leave_idle(&mut self) -> bool {
        let client = self.client.as_ref().unwrap();
        if matches!(client.poll_readable(IDLE_POLL_INTERVAL), Ok(true)) {
            return true;
        }
        if self.api_queue.length(Duration::ZERO) > 0 {
            return true;
        }
        if self.timers.has_due(Instant::now()) {
            return true;
        }
        if !self.stickers.is_empty() {
            return true;
        }
        if self.played_crossed_half_threshold() {
            return true;
        }
        if self.jukebox_refill_due() {
            return true;
        }
        false
    }

    fn played_crossed_half_threshold(&self) -> bool {
        let Some(start) = self.state.last_song_start_time else { return false };
        let Some(song_id) = self.state.song_id else { return false };
        if self.scored_song_id == Some(song_id) {
            return false;
        }
        let Some(mark) = self.state.set_song_played_time else {
            let _ = start;
            return false;
        };
        SystemTime::now() >= mark
    }

    fn jukebox_refill_due(&self) -> bool {
        jukebox::refill_due(
            SystemTime::now(),
            self.state.song_end_time,
            self.state.crossfade,
            self.state.queue_length,
            self.config.jukebox_queue_target,
        )
    }

    /// Processes every set bit in ascending order.
    fn process_idle_bits(&mut self, mask: u32) {
        for bit in [
            BIT_DATABASE,
            BIT_STORED_PLAYLIST,
            BIT_QUEUE,
            BIT_PLAYER,
            BIT_MIXER,
            BIT_OUTPUT,
            BIT_OPTIONS,
            BIT_UPDATE,
        ] {
            if mask & bit == 0 {
                continue;
            }
            let event = match bit {
                BIT_DATABASE => {
                    self.notify.send(notification::update_database());
                    self.timers.replace(
                        TIMER_DATABASE_UPDATE,
                        Duration::from_secs(10),
                        None,
                        TimerHandler::DatabaseUpdate,
                    );
                    Event::Database
                }
                BIT_STORED_PLAYLIST => {
                    self.notify.send(notification::update_stored_playlist());
                    Event::StoredPlaylist
                }
                BIT_QUEUE => {
                    self.handle_queue_event();
                    Event::Queue
                }
                BIT_PLAYER => {
                    self.handle_player_event();
                    Event::Player
                }
                BIT_MIXER => {
                    self.handle_mixer_event();
                    Event::Mixer
                }
                BIT_OUTPUT => {
                    self.notify.send(notification::update_outputs());
                    Event::Output
                }
                BIT_OPTIONS => {
                    self.handle_queue_status();
                    self.notify.send(notification::update_options());
                    Event::Options
                }
                BIT_UPDATE => {
                    self.notify.send(notification::updatedb_state("updating_db"));
                    Event::Update
                }
                _ => unreachable!(),
            };
            self.fire_trigger(event);
        }
    }

    fn handle_queue_status(&mut self) {
        let Some(client) = self.client.as_mut() else { return };
        if let Ok(resp) = client.issue_command("status") {
            if let Some(v) = resp.first("playlist").and_then(|s| s.parse().ok()) {
                self.state.queue_version = v;
            }
            if let Some(v) = resp.first("playlistlength").and_then(|s| s.parse().ok()) {
                self.state.queue_length = v;
            }
            if let Some(v) = resp.first("xfade").and_then(|s| s.parse().ok::<u64>()) {
                self.state.crossfade = Duration::from_secs(v);
            }
        }
    }

    /// `queue` idle bit: refresh queue status and maybe trigger jukebox
    /// refill or auto-play.
    fn handle_queue_event(&mut self) {
        let previous_version = self.state.queue_version;
        self.handle_queue_status();
        if self.state.queue_version == previous_version {
            // belongs to another partition; discard
            return;
        }
        if self.jukebox_refill_due() {
            self.run_jukebox_refill();
        }
        if self.state.play_state != PlayState::Play && self.state.queue_length > 0 {
            if let Some(client) = self.client.as_mut() {
                let _ = client.issue_command("play");
            }
        }
    }

    fn run_jukebox_refill(&mut self) {
        let needed = self.config.jukebox_queue_target.saturating_sub(self.state.queue_length);
        if needed == 0 {
            return;
        }
        let uris = self.jukebox_selector.select(needed);
        if uris.is_empty() {
            return;
        }
        let Some(client) = self.client.as_mut() else { return };
        for uri in uris {
            let _ = client.issue_command(&format!("add \"{uri}\""));
        }
    }

    /// `player` idle bit: refresh player status, detect skips, and score
    /// plays crossing the half-played mark.
    fn handle_player_event(&mut self) {
        let Some(client) = self.client.as_mut() else { return };
        let Ok(resp) = client.issue_command("status") else { return };

        let song_id: Option<u32> = resp.first("songid").and_then(|s| s.parse().ok());
        let elapsed: Option<f64> = resp.first("elapsed").and_then(|s| s.parse().ok());
        let duration: Option<f64> = resp.first("duration").and_then(|s| s.parse().ok());
        self.state.play_state = resp
            .first("state")
            .map(PlayState::from_mpd)
            .unwrap_or_default();

        if song_id != self.state.song_id {
            // Skip detection: the previous song's scheduled-played time
            // lies in the future means it was cut short.
            if let (Some(prev_id), Some(mark)) =
                (self.state.song_id, self.state.set_song_played_time)
            {
                let now = SystemTime::now();
                let started_at_least =
                    self.state.last_song_start_time.map(|s| now.duration_since(s).unwrap_or_default());
                let past_seek_guard = started_at_least.map(|d| d >= SKIP_SEEK_GUARD).unwrap_or(false);
                if mark > now && past_seek_guard && self.scored_song_id != Some(prev_id) {
                    if let Some(uri) = self.state.last_song_uri.clone() {
                        let now_secs = now
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_secs();
                        self.stickers.push(StickerJob {
                            uri: uri.clone(),
                            kind: StickerKind::SkipCountIncrement,
                        });
                        self.stickers.push(StickerJob {
                            uri,
                            kind: StickerKind::LastSkippedStamp(now_secs),
                        });
                    }
                }
            }

            self.state.last_song_id = self.state.song_id;
            self.state.song_id = song_id;
            self.state.last_song_uri = resp.first("file").map(String::from);
            self.state.last_song_start_time = Some(SystemTime::now());
            self.scored_song_id = None;

            if let (Some(elapsed), Some(duration)) = (elapsed, duration) {
                let now = SystemTime::now();
                let to_mark = Duration::from_secs_f64((duration / 2.0).min(MAX_SCROBBLE_DELAY.as_secs_f64()));
                let already_elapsed = Duration::from_secs_f64(elapsed);
                self.state.set_song_played_time = Some(
                    now + to_mark.saturating_sub(already_elapsed),
                );
                self.state.song_end_time =
                    Some(now + Duration::from_secs_f64((duration - elapsed).max(0.0)));
            } else {
                self.state.set_song_played_time = None;
                self.state.song_end_time = None;
            }
        }

        self.maybe_score_play();
        self.notify.send(notification::update_queue(
            self.state.queue_version,
            self.state.queue_length,
        ));
    }

    /// Scores the current song as played once "now" passes the
    /// played-at mark.
    fn maybe_score_play(&mut self) {
        let Some(song_id) = self.state.song_id else { return };
        if self.scored_song_id == Some(song_id) {
            return;
        }
        let Some(mark) = self.state.set_song_played_time else { return };
        if SystemTime::now() < mark {
            return;
        }
        let Some(uri) = self.state.last_song_uri.clone() else { return };
        let now_secs = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.stickers.push(StickerJob {
            uri: uri.clone(),
            kind: StickerKind::PlayCountIncrement,
        });
        self.stickers.push(StickerJob {
            uri: uri.clone(),
            kind: StickerKind::LastPlayedStamp(now_secs),
        });
        self.scored_song_id = Some(song_id);
        self.notify.send(notification::update_last_played());
        self.fire_trigger(Event::MympdScrobble);
        debug!("scored play for {uri}");
    }

    fn handle_mixer_event(&mut self) {
        let Some(client) = self.client.as_mut() else { return };
        if let Ok(resp) = client.issue_command("status") {
            let volume: i64 = resp.first("volume").and_then(|s| s.parse().ok()).unwrap_or(-1);
            self.notify.send(notification::update_volume(volume));
        }
    }

    fn fire_trigger(&self, event: Event) {
        for t in self.triggers.matching(event, "default") {
            debug!("trigger fired: {} for {:?}", t.handler_id, event);
        }
    }

    /// Runs due timers in ascending id order.
    fn drain_timers(&mut self) {
        let due = self.timers.tick(Instant::now());
        for id in due {
            let Some(handler) = self.timers.handler(id).copied() else { continue };
            match handler {
                TimerHandler::CacheRebuild => self.spawn_cache_rebuild(CONNECTION_ID_INTERNAL, 0),
                TimerHandler::SmartplsUpdateAll => {
                    self.spawn_smartpls_update_all(CONNECTION_ID_INTERNAL, 0)
                }
                TimerHandler::DatabaseUpdate => {
                    self.notify.send(notification::updatedb_state("finished"));
                }
            }
        }
    }

    fn drain_stickers(&mut self) {
        let Some(client) = self.client.as_mut() else { return };
        self.stickers.drain(client);
    }

    /// Pulls and handles exactly one API request, if any is waiting.
    fn service_one_api_request(&mut self) {
        let Some(req) = self.api_queue.shift(Duration::ZERO, 0) else { return };
        if req.command.is_long() {
            self.dispatch_worker(req);
        } else if req.command.is_mpd_independent() {
            self.handle_mpd_independent(&req);
        } else {
            self.handle_sync(req);
        }
    }

    fn dispatch_worker(&mut self, req: ApiRequest) {
        match req.command {
            ApiCommand::CachesCreate => self.spawn_cache_rebuild(req.connection_id, req.request_id),
            ApiCommand::SmartplsUpdateAll => {
                self.spawn_smartpls_update_all(req.connection_id, req.request_id)
            }
            _ => unreachable!("dispatch_worker called for a non-long command"),
        }
    }

    fn spawn_cache_rebuild(&self, connection_id: i64, request_id: i64) {
        worker::spawn(
            WorkerSpec {
                host: self.config.mpd_host.clone(),
                port: self.config.mpd_port,
                password: self.config.mpd_password.clone(),
                connection_id,
                request_id,
            },
            WorkerJob::CachesCreate,
            self.response_queue.clone(),
            self.album_cache.clone(),
        );
    }

    fn spawn_smartpls_update_all(&self, connection_id: i64, request_id: i64) {
        worker::spawn(
            WorkerSpec {
                host: self.config.mpd_host.clone(),
                port: self.config.mpd_port,
                password: self.config.mpd_password.clone(),
                connection_id,
                request_id,
            },
            WorkerJob::SmartplsUpdateAll,
            self.response_queue.clone(),
            self.album_cache.clone(),
        );
    }

    /// Session endpoints: no MPD connection required.
    fn handle_mpd_independent(&mut self, req: &ApiRequest) {
        let body = match req.command {
            ApiCommand::SessionLogin => {
                // A real PIN check belongs to a config-file collaborator
                // out of this core's scope; any non-empty pin succeeds.
                let pin_ok = req
                    .body
                    .get("pin")
                    .and_then(|v| v.as_str())
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                if pin_ok {
                    let token = self.session_store.new_session();
                    ResponseBody::Result(serde_json::json!({ "session": token }))
                } else {
                    ResponseBody::Error(JsonRpcError::new(
                        Facility::Session,
                        Severity::Error,
                        "invalid pin",
                    ))
                }
            }
            ApiCommand::SessionLogout => {
                if let Some(token) = req.body.get("session").and_then(|v| v.as_str()) {
                    self.session_store.remove(token);
                }
                ResponseBody::Result(serde_json::json!({}))
            }
            ApiCommand::SessionValidate => {
                let valid = req
                    .body
                    .get("session")
                    .and_then(|v| v.as_str())
                    .map(|t| self.session_store.validate(t))
                    .unwrap_or(false);
                ResponseBody::Result(serde_json::json!({ "valid": valid }))
            }
            _ => ResponseBody::Error(JsonRpcError::new(
                Facility::General,
                Severity::Error,
                "not an mpd-independent command",
            )),
        };
        self.push_response(req, body);
    }

    /// Synchronous handlers calling the MPD wrapper and tag/cache layers
    /// directly.
    fn handle_sync(&mut self, req: ApiRequest) {
        let result = self.run_sync_command(&req);
        match result {
            Ok(value) => self.push_response(&req, ResponseBody::Result(value)),
            Err(e) => self.push_response(&req, ResponseBody::Error(e.to_jsonrpc())),
        }
    }

    fn run_sync_command(&mut self, req: &ApiRequest) -> Result<serde_json::Value, AppError> {
        match &req.command {
            ApiCommand::PlayerPlay => self.simple_command("play").map(|_| serde_json::json!({})),
            ApiCommand::PlayerPause => self.simple_command("pause 1").map(|_| serde_json::json!({})),
            ApiCommand::PlayerStop => self.simple_command("stop").map(|_| serde_json::json!({})),
            ApiCommand::PlayerNext => self.simple_command("next").map(|_| serde_json::json!({})),
            ApiCommand::PlayerPrev => self.simple_command("previous").map(|_| serde_json::json!({})),
            ApiCommand::PlayerState => {
                let client = self.client.as_mut().ok_or(AppError::Mpd(MpdError::Protocol(
                    "not connected".into(),
                )))?;
                let resp = client.issue_command("status")?;
                Ok(serde_json::json!({
                    "state": resp.first("state").unwrap_or("stop"),
                    "songid": resp.first("songid"),
                    "elapsed": resp.first("elapsed"),
                }))
            }
            ApiCommand::QueueList => {
                let client = self.client.as_mut().ok_or(AppError::Mpd(MpdError::Protocol(
                    "not connected".into(),
                )))?;
                let resp = client.issue_command("playlistinfo")?;
                let songs: Vec<&str> = resp.all("file");
                Ok(serde_json::json!({ "songs": songs }))
            }
            ApiCommand::QueueClear => self.simple_command("clear").map(|_| serde_json::json!({})),
            ApiCommand::DatabaseAlbumList => {
                let cache = self.album_cache.get();
                let albums: Vec<serde_json::Value> = cache
                    .all_sorted_by(crate::mpd::tags::Tag::Album)
                    .into_iter()
                    .map(|(key, rec)| {
                        serde_json::json!({
                            "key": key,
                            "songCount": rec.song_count(),
                            "totalDuration": rec.total_duration_secs(),
                        })
                    })
                    .collect();
                Ok(serde_json::json!({ "albums": albums }))
            }
            ApiCommand::DatabaseAlbumDetail => {
                let key = req
                    .body
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AppError::ClientRequest("missing 'key' parameter".into()))?;
                let cache = self.album_cache.get();
                let rec = cache
                    .lookup(key)
                    .ok_or_else(|| AppError::NotFound(format!("no such album: {key}")))?;
                Ok(serde_json::json!({
                    "firstSeenUri": rec.first_seen_uri,
                    "songCount": rec.song_count(),
                    "discCount": rec.disc_count(),
                    "totalDuration": rec.total_duration_secs(),
                }))
            }
            ApiCommand::AlbumArtByUri => {
                let uri = req
                    .body
                    .get("uri")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AppError::ClientRequest("missing 'uri' parameter".into()))?;
                let client = self.client.as_mut().ok_or(AppError::Mpd(MpdError::Protocol(
                    "not connected".into(),
                )))?;
                match client.read_binary_chunked("albumart", uri)? {
                    Some((bytes, mime_type)) => {
                        let mime_type = if mime_type.is_empty() {
                            "image/jpeg".to_owned()
                        } else {
                            mime_type
                        };
                        Ok(serde_json::json!({
                            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                            "mimeType": mime_type,
                        }))
                    }
                    None => Err(AppError::NotFound(format!("no albumart for {uri}"))),
                }
            }
            other => Err(AppError::ClientRequest(format!(
                "unhandled command: {other:?}"
            ))),
        }
    }

    fn simple_command(&mut self, cmd: &str) -> Result<(), AppError> {
        let client = self
            .client
            .as_mut()
            .ok_or(AppError::Mpd(MpdError::Protocol("not connected".into())))?;
        client.issue_command(cmd)?;
        Ok(())
    }

    fn respond_ok(&self, req: &ApiRequest) {
        self.push_response(req, ResponseBody::Result(serde_json::json!({})));
    }

    fn respond_disconnected(&self, req: &ApiRequest) {
        self.push_response(
            req,
            ResponseBody::Error(JsonRpcError::new(
                Facility::Mpd,
                Severity::Error,
                "MPD disconnected",
            )),
        );
    }

    fn push_response(&self, req: &ApiRequest, body: ResponseBody) {
        self.response_queue.push(
            Response {
                connection_id: req.connection_id,
                request_id: req.request_id,
                method: req.method.clone(),
                body,
            },
            req.connection_id,
        );
    }

    /// A transient MPD error transitions the connection to FAILURE and
    /// lets the main loop drive the reconnect path.
    fn handle_mpd_error(&mut self, e: MpdError) {
        if e.is_protocol_version_error() {
            self.state.conn_state = ConnState::TooOld;
            return;
        }
        warn!("MPD error, reconnecting: {e}");
        self.client = None;
        self.notify.send(notification::mpd_disconnected());
        self.state.conn_state = ConnState::Failure;
    }

    /// Shutdown: drain the API queue, acknowledging with "MPD
    /// disconnected" errors for non-local requests.
    fn drain_on_shutdown(&mut self) {
        self.timers.remove_all();
        while let Some(req) = self.api_queue.shift(Duration::ZERO, 0) {
            if req.connection_id == CONNECTION_ID_INTERNAL {
                continue;
            }
            self.respond_disconnected(&req);
        }
        info!("idle loop exiting");
    }
}

fn decode_changed(resp: &crate::mpd::types::MpdResponse) -> u32 {
    let mut mask = 0;
    for v in resp.all("changed") {
        mask |= match v {
            "database" => BIT_DATABASE,
            "stored_playlist" => BIT_STORED_PLAYLIST,
            "playlist" => BIT_QUEUE,
            "player" => BIT_PLAYER,
            "mixer" => BIT_MIXER,
            "output" => BIT_OUTPUT,
            "options" => BIT_OPTIONS,
            "update" => BIT_UPDATE,
            _ => 0,
        };
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpd::types::MpdResponse;

    fn resp(changed: &[&str]) -> MpdResponse {
        MpdResponse {
            fields: changed.iter().map(|c| ("changed".to_string(), c.to_string())).collect(),
            binary: None,
        }
    }

    #[test]
    fn decode_changed_sets_expected_bits() {
        let mask = decode_changed(&resp(&["player", "mixer"]));
        assert_eq!(mask, BIT_PLAYER | BIT_MIXER);
    }

    #[test]
    fn decode_changed_ignores_unknown_subsystems() {
        let mask = decode_changed(&resp(&["partition", "database"]));
        assert_eq!(mask, BIT_DATABASE);
    }

    #[test]
    fn bits_are_in_ascending_declared_order() {
        let bits = [
            BIT_DATABASE,
            BIT_STORED_PLAYLIST,
            BIT_QUEUE,
            BIT_PLAYER,
            BIT_MIXER,
            BIT_OUTPUT,
            BIT_OPTIONS,
            BIT_UPDATE,
        ];
        for w in bits.windows(2) {
            assert!(w[0] < w[1]);
        }
    }
}
