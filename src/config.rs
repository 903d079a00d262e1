//! CLI entry point and the operational-knob `Config` struct.
//!
//! spec.md §1 scopes argument parsing and on-disk config files out as
//! named collaborators; SPEC_FULL.md's ambient-stack section keeps the
//! teacher's `argh`-based `Args` for the one thing this crate still
//! needs from that surface (host/port/workdir to start the process) and
//! adds the knobs spec.md's data model requires (jukebox target queue
//! length, smart-playlist rebuild interval, covercache retention, session
//! cap, last-played keep-count). No on-disk config file format is parsed
//! here — that loader is the seam a future collaborator would fill.
use argh::FromArgs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(FromArgs, Debug)]
/// myMPD control-plane core: bridges browsers (HTTP/JSON-RPC/WebSocket) to MPD.
pub struct Args {
    /// address of the MPD server
    #[argh(option, default = "String::from(\"localhost\")")]
    pub mpd_host: String,
    /// port of the MPD server
    #[argh(option, default = "6600")]
    pub mpd_port: u16,
    /// password for the MPD server, if required
    #[argh(option)]
    pub mpd_password: Option<String>,
    /// working directory holding state/, cache/, pics/, webradios/
    #[argh(option, default = "default_workdir()")]
    pub workdir: PathBuf,
    /// address the HTTP/WebSocket frontend listens on
    #[argh(option, default = "String::from(\"127.0.0.1:8080\")")]
    pub listen: String,
    /// path to the music library directory MPD serves from
    #[argh(option, default = "default_music_dir()")]
    pub music_directory: PathBuf,
    /// verbosity (repeat for more, e.g. -v, -vv)
    #[argh(switch, short = 'v')]
    pub verbose: u8,
}

fn default_workdir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mympd")
}

fn default_music_dir() -> PathBuf {
    dirs::audio_dir().unwrap_or_else(|| PathBuf::from("/var/lib/mpd/music"))
}

/// The operational knobs spec.md's data model and component designs name
/// explicitly: jukebox target queue length (§4.5), smart-playlist rebuild
/// interval (§4.5's 30s timer), session cap (§3 `HTTP_SESSIONS_MAX`),
/// last-played keep-count (§3), and covercache retention (§4.7).
#[derive(Debug, Clone)]
pub struct Config {
    pub mpd_host: String,
    pub mpd_port: u16,
    pub mpd_password: Option<String>,
    pub workdir: PathBuf,
    pub music_directory: PathBuf,
    pub listen: String,

    pub jukebox_queue_target: u32,
    pub smartpls_update_interval: Duration,
    pub cache_rebuild_delay: Duration,
    pub covercache_keep_days: u64,
    pub http_sessions_max: usize,
    pub last_played_keep_count: usize,
    pub cover_names: Vec<String>,
    pub thumbnail_names: Vec<String>,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        Config {
            mpd_host: args.mpd_host.clone(),
            mpd_port: args.mpd_port,
            mpd_password: args.mpd_password.clone(),
            workdir: args.workdir.clone(),
            music_directory: args.music_directory.clone(),
            listen: args.listen.clone(),

            jukebox_queue_target: 1,
            smartpls_update_interval: Duration::from_secs(30),
            cache_rebuild_delay: Duration::from_secs(2),
            covercache_keep_days: 31,
            http_sessions_max: 50,
            last_played_keep_count: 200,
            cover_names: vec!["cover.jpg".into(), "cover.png".into(), "folder".into()],
            thumbnail_names: vec!["cover-thumb".into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_args_carries_through_connection_settings() {
        let args = Args {
            mpd_host: "example".into(),
            mpd_port: 6601,
            mpd_password: Some("hunter2".into()),
            workdir: PathBuf::from("/tmp/mympd"),
            listen: "0.0.0.0:80".into(),
            music_directory: PathBuf::from("/music"),
            verbose: 0,
        };
        let cfg = Config::from_args(&args);
        assert_eq!(cfg.mpd_host, "example");
        assert_eq!(cfg.mpd_port, 6601);
        assert_eq!(cfg.mpd_password.as_deref(), Some("hunter2"));
    }
}
