//! C9: worker dispatch.
//!
//! For long-running commands (`SMARTPLS_UPDATE`, `SMARTPLS_UPDATE_ALL`,
//! `CACHES_CREATE`) the idle loop spawns a detached worker instead of
//! blocking itself. Each worker opens its own `MpdClient` and talks to
//! the rest of the system only through the response queue and, for
//! `CACHES_CREATE`, the single album-cache swap point.
//!
//! Workers are detached `std::thread::spawn` tasks, each opening its own
//! blocking MPD connection rather than sharing a runtime with anything else.
use crate::album_cache::{AlbumCache, AlbumCacheHandle};
use crate::http::jsonrpc::{Response, ResponseBody};
use crate::mpd::MpdClient;
use crate::mpd::tags::SongTags;
use crate::queue::Queue;
use log::{error, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide count of currently-running worker threads.
pub static WORKER_THREADS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub connection_id: i64,
    pub request_id: i64,
}

#[derive(Debug, Clone)]
pub enum WorkerJob {
    CachesCreate,
    SmartplsUpdate { name: String },
    SmartplsUpdateAll,
}

/// Spawns the worker thread and returns immediately; the idle loop does
/// not join it.
pub fn spawn(
    spec: WorkerSpec,
    job: WorkerJob,
    response_queue: Arc<Queue<Response>>,
    album_cache: Arc<AlbumCacheHandle>,
) {
    WORKER_THREADS.fetch_add(1, Ordering::SeqCst);
    std::thread::spawn(move || {
        let result = run(&spec, &job, &album_cache);
        let (method, body) = match result {
            Ok(msg) => (
                "worker_finished".to_string(),
                ResponseBody::Result(serde_json::json!({ "message": msg })),
            ),
            Err(e) => {
                error!("worker job {:?} failed: {e}", job);
                ("worker_finished".to_string(), ResponseBody::Error(e.to_jsonrpc()))
            }
        };
        response_queue.push(
            Response {
                connection_id: spec.connection_id,
                request_id: spec.request_id,
                method,
                body,
            },
            spec.connection_id,
        );
        WORKER_THREADS.fetch_sub(1, Ordering::SeqCst);
    });
}

fn run(
    spec: &WorkerSpec,
    job: &WorkerJob,
    album_cache: &Arc<AlbumCacheHandle>,
) -> Result<String, crate::error::AppError> {
    let mut client = MpdClient::connect(&spec.host, spec.port, spec.password.as_deref())?;
    match job {
        WorkerJob::CachesCreate => {
            info!("worker: rebuilding album cache");
            let songs = fetch_all_songs(&mut client)?;
            let count = songs.len();
            let built = AlbumCache::build(songs);
            let album_count = built.len();
            album_cache.swap(built);
            Ok(format!(
                "rebuilt album cache: {album_count} albums from {count} songs"
            ))
        }
        WorkerJob::SmartplsUpdate { name } => {
            info!("worker: updating smart playlist {name}");
            // Smart-playlist rule evaluation is out of this core's scope
            //;
            // this worker only demonstrates the dispatch shape.
            Ok(format!("smart playlist {name} update requested"))
        }
        WorkerJob::SmartplsUpdateAll => {
            info!("worker: updating all smart playlists");
            Ok("smart playlist update requested for all playlists".to_string())
        }
    }
}

/// Pulls every song in the library via `listallinfo`, grouping consecutive
/// `file:` lines into per-song tag sets. A full rescan is what
/// `CACHES_CREATE` is for (spec.md §4.2 "build(song stream, ...)").
fn fetch_all_songs(client: &mut MpdClient) -> Result<Vec<SongTags>, crate::error::AppError> {
    let resp = client.issue_command("listallinfo")?;
    let mut songs = Vec::new();
    let mut current: Option<SongTags> = None;
    for (name, value) in &resp.fields {
        if name == "file" {
            if let Some(song) = current.take() {
                songs.push(song);
            }
            current = Some(SongTags {
                uri: value.clone(),
                ..Default::default()
            });
        } else if let Some(song) = current.as_mut() {
            if let Some(field) = known_field_name(name) {
                song.values.entry(field).or_default().push(value.clone());
            }
        }
    }
    if let Some(song) = current.take() {
        songs.push(song);
    }
    Ok(songs)
}

/// `SongTags::values` is keyed by `&'static str`. Every MPD field name this
/// core reads (the album cache's `WANTED_MULTIVALUE_TAGS`, plus
/// `Title`/`Name`/`Track`/`Date`/`duration`/`Time`) maps onto the matching
/// `Tag::mpd_name()` static or a literal held for the process lifetime;
/// anything else is dropped rather than leaked, since `listallinfo` reruns
/// on every cache rebuild and an unbounded `Box::leak` per unknown field
/// would grow without limit over the daemon's lifetime.
fn known_field_name(name: &str) -> Option<&'static str> {
    use crate::mpd::tags::Tag;
    Some(match name {
        "duration" => "duration",
        "Time" => "Time",
        "Artist" => Tag::Artist.mpd_name(),
        "ArtistSort" => Tag::ArtistSort.mpd_name(),
        "Album" => Tag::Album.mpd_name(),
        "AlbumSort" => Tag::AlbumSort.mpd_name(),
        "AlbumArtist" => Tag::AlbumArtist.mpd_name(),
        "AlbumArtistSort" => Tag::AlbumArtistSort.mpd_name(),
        "Title" => Tag::Title.mpd_name(),
        "TitleSort" => Tag::TitleSort.mpd_name(),
        "Name" => Tag::Name.mpd_name(),
        "Genre" => Tag::Genre.mpd_name(),
        "Composer" => Tag::Composer.mpd_name(),
        "ComposerSort" => Tag::ComposerSort.mpd_name(),
        "Performer" => Tag::Performer.mpd_name(),
        "Conductor" => Tag::Conductor.mpd_name(),
        "Ensemble" => Tag::Ensemble.mpd_name(),
        "Disc" => Tag::Disc.mpd_name(),
        "Track" => Tag::Track.mpd_name(),
        "Date" => Tag::Date.mpd_name(),
        "MUSICBRAINZ_ARTISTID" => Tag::MusicBrainzArtistId.mpd_name(),
        "MUSICBRAINZ_ALBUMARTISTID" => Tag::MusicBrainzAlbumArtistId.mpd_name(),
        "Last-Modified" => Tag::LastModified.mpd_name(),
        _ => return None,
    })
}
