mod album_cache;
mod config;
mod container;
mod coverart;
mod error;
mod http;
mod idle_loop;
mod jukebox;
mod last_played;
mod mpd;
mod notification;
mod queue;
mod request;
mod session;
mod state_files;
mod sticker;
mod timer;
mod trigger;
mod worker;

use album_cache::AlbumCacheHandle;
use anyhow::Result;
use colored::Colorize;
use coverart::CoverArtConfig;
use fern::colors::{Color, ColoredLevelConfig};
use log::{error, info};
use notification::NotificationHub;
use queue::Queue;
use session::SessionStore;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    if let Err(err) = try_main() {
        println!("{:>6} {err}", "ERROR".red());
        err.chain().skip(1).for_each(|cause| {
            println!("{} {}", "DUE TO".yellow(), cause);
        });
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args: config::Args = argh::from_env();
    setup_logger(args.verbose)?;

    let config = Arc::new(config::Config::from_args(&args));
    for dir in ["state/default", "cache/covercache", "pics/thumbs", "pics/playlists", "webradios"] {
        std::fs::create_dir_all(config.workdir.join(dir))?;
    }

    let album_cache = Arc::new(AlbumCacheHandle::new());
    let session_store = Arc::new(SessionStore::new(config.http_sessions_max));
    let api_queue = Arc::new(Queue::new("api"));
    let response_queue = Arc::new(Queue::new("response"));
    let notify = NotificationHub::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let albumart_supported = Arc::new(AtomicBool::new(false));
    let next_connection_id = Arc::new(AtomicI64::new(1));

    let coverart_cfg = Arc::new(CoverArtConfig {
        workdir: config.workdir.clone(),
        music_dir: config.music_directory.clone(),
        cover_names: config.cover_names.clone(),
        thumbnail_names: config.thumbnail_names.clone(),
        covercache_keep_days: config.covercache_keep_days,
    });

    spawn_idle_loop_thread(
        config.clone(),
        album_cache.clone(),
        session_store.clone(),
        api_queue.clone(),
        response_queue.clone(),
        notify.clone(),
        shutdown.clone(),
        albumart_supported.clone(),
    )?;
    spawn_signal_thread(shutdown.clone())?;

    let state = http::AppState {
        config: config.clone(),
        api_queue,
        response_queue,
        session_store,
        album_cache,
        coverart_cfg,
        notify,
        next_connection_id,
        mpd_albumart_supported: albumart_supported,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(state, config.listen.clone(), shutdown))
}

#[allow(clippy::too_many_arguments)]
fn spawn_idle_loop_thread(
    config: Arc<config::Config>,
    album_cache: Arc<AlbumCacheHandle>,
    session_store: Arc<SessionStore>,
    api_queue: Arc<Queue<request::ApiRequest>>,
    response_queue: Arc<Queue<http::jsonrpc::Response>>,
    notify: NotificationHub,
    shutdown: Arc<AtomicBool>,
    albumart_supported: Arc<AtomicBool>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("idle-loop".into())
        .spawn(move || {
            let heart = idle_loop::IdleLoop::new(
                config,
                album_cache,
                session_store,
                api_queue,
                response_queue,
                notify,
                shutdown,
                albumart_supported,
            );
            heart.run();
        })?;
    Ok(())
}

/// SIGTERM/SIGINT set the shutdown flag the idle loop and the HTTP
/// server's graceful shutdown both poll.
fn spawn_signal_thread(shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if signals.forever().next().is_some() {
                info!("shutdown signal received");
                shutdown.store(true, Ordering::SeqCst);
            }
        })?;
    Ok(())
}

async fn serve(state: http::AppState, listen: String, shutdown: Arc<AtomicBool>) -> Result<()> {
    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;
    Ok(())
}

async fn wait_for_shutdown(shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn setup_logger(verbosity: u8) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Blue);

    let level = match verbosity {
        1 => log::LevelFilter::Debug,
        n if n >= 2 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{:>5} [{}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
