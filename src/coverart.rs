//! C11: the cover-art resolution pipeline.
//!
//! A cascading lookup: stream thumb/EXTIMG → covercache → filesystem beside
//! the media file → embedded tag extraction → MPD `albumart` → placeholder.
//! The embedded-tag step uses `lofty` to read ID3/FLAC/Vorbis pictures (see
//! DESIGN.md).
use log::{debug, warn};
use lofty::file::TaggedFileExt;
use lofty::probe::read_from_path;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Full,
    Thumbnail,
}

/// Outcome of a cover-art lookup. `Async` means the resolver forwarded the
/// request to MPD's `albumart` command through the idle-loop queue and the
/// caller should reply once that response arrives.
pub enum Resolved {
    Bytes { data: Vec<u8>, mime_type: String },
    Redirect(String),
    Async,
    Placeholder,
}

const THUMB_EXTS: &[&str] = &["jpg", "png", "webp", "avif"];

pub struct CoverArtConfig {
    pub workdir: PathBuf,
    pub music_dir: PathBuf,
    pub cover_names: Vec<String>,
    pub thumbnail_names: Vec<String>,
    pub covercache_keep_days: u64,
}

/// Sanitizes a stream/media identifier into a filesystem-safe token, the
/// way the original's `basename_uri` + validate helpers do: strip any path
/// separators and keep only the basename-equivalent text.
pub fn sanitize_filename(uri: &str) -> String {
    uri.chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect()
}

pub fn covercache_path(cfg: &CoverArtConfig, uri: &str, offset: i64, ext: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    let hash = hex_encode(&hasher.finalize());
    cfg.workdir
        .join("cache/covercache")
        .join(format!("{hash}-{offset}.{ext}"))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Deletes covercache entries whose mtime is older than
/// `covercache_keep_days`. Returns the count removed. Called once per
/// idle-loop reentry check (driven the same way as the sticker backlog).
pub fn expire_covercache(cfg: &CoverArtConfig) -> usize {
    let dir = cfg.workdir.join("cache/covercache");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return 0;
    };
    let max_age = Duration::from_secs(cfg.covercache_keep_days * 86400);
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(modified) = meta.modified() else { continue };
        if now.duration_since(modified).unwrap_or_default() > max_age {
            if std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }
    removed
}

/// Step 1: stream-URI thumbnail / `#EXTIMG` lookup. `uri` here is a
/// `http(s)://` stream URL or webradio identifier, not a library path.
fn resolve_stream(cfg: &CoverArtConfig, uri: &str) -> Option<Resolved> {
    let safe = sanitize_filename(uri);
    for ext in THUMB_EXTS {
        let p = cfg.workdir.join("pics/thumbs").join(format!("{safe}.{ext}"));
        if p.is_file() {
            return std::fs::read(&p)
                .ok()
                .map(|data| Resolved::Bytes { data, mime_type: mime_for_ext(ext) });
        }
    }
    let m3u = cfg.workdir.join("webradios").join(format!("{safe}.m3u"));
    if let Ok(content) = std::fs::read_to_string(&m3u) {
        for line in content.lines() {
            if let Some(img) = line.strip_prefix("#EXTIMG:") {
                let img = img.trim();
                if img.starts_with("http://") || img.starts_with("https://") {
                    return Some(Resolved::Redirect(format!(
                        "/proxy-covercache?uri={}",
                        urlencoding::encode(img)
                    )));
                }
                // Not a URL: `#EXTIMG` names a local thumb in `pics/thumbs`.
                let name = sanitize_filename(img);
                let path = cfg.workdir.join("pics/thumbs").join(&name);
                if let Ok(data) = std::fs::read(&path) {
                    let ext = Path::new(&name)
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("jpg");
                    return Some(Resolved::Bytes { data, mime_type: mime_for_ext(ext) });
                }
            }
        }
    }
    None
}

/// Step 3: filesystem beside the media file. `uri` is a library-relative
/// path. Handles the "virtual CUE directory" case: when the final path
/// component looks like a `.cue` reference, the real cover sits one
/// directory higher.
fn resolve_filesystem(cfg: &CoverArtConfig, uri: &str, size: Size) -> Option<Vec<u8>> {
    let mut dir = Path::new(uri).parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    if let Some(last) = dir.file_name().and_then(|s| s.to_str()) {
        if last.to_lowercase().ends_with(".cue") {
            dir = dir.parent().unwrap_or(Path::new("")).to_path_buf();
        }
    }
    let base = cfg.music_dir.join(&dir);
    let names: &[String] = match size {
        Size::Thumbnail => &cfg.thumbnail_names,
        Size::Full => &cfg.cover_names,
    };
    for name in names {
        if name.contains('.') {
            let p = base.join(name);
            if p.is_file() {
                return std::fs::read(&p).ok();
            }
        } else {
            for ext in THUMB_EXTS {
                let p = base.join(format!("{name}.{ext}"));
                if p.is_file() {
                    return std::fs::read(&p).ok();
                }
            }
        }
    }
    None
}

/// Step 4: embedded tag extraction via `lofty`. Only attempted at
/// `offset == 0`. Writes the result to the covercache on success.
fn resolve_embedded(cfg: &CoverArtConfig, uri: &str) -> Option<(Vec<u8>, String)> {
    let path = cfg.music_dir.join(uri);
    let tagged = read_from_path(&path).ok()?;
    let picture = tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .and_then(|tag| tag.pictures().first())?;
    let data = picture.data().to_vec();
    let mime_type = picture
        .mime_type()
        .map(|m| m.to_string())
        .unwrap_or_else(|| detect_mime(&data));

    let ext = ext_for_mime(&mime_type);
    let cache_path = covercache_path(cfg, uri, 0, ext);
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    if let Err(e) = std::fs::write(&cache_path, &data) {
        warn!("failed to write covercache entry for {uri}: {e}");
    }
    Some((data, mime_type))
}

fn detect_mime(data: &[u8]) -> String {
    if data.starts_with(b"\xFF\xD8\xFF") {
        "image/jpeg".into()
    } else if data.starts_with(b"\x89PNG") {
        "image/png".into()
    } else if data.starts_with(b"RIFF") && data.len() > 12 && &data[8..12] == b"WEBP" {
        "image/webp".into()
    } else {
        "application/octet-stream".into()
    }
}

fn ext_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/avif" => "avif",
        _ => "jpg",
    }
}

fn mime_for_ext(ext: &str) -> String {
    format!("image/{}", if *ext == "jpg" { "jpeg" } else { ext })
}

/// Runs the full cascade for a library-relative `uri`, except the MPD
/// `albumart` fallback (step 5): that step requires forwarding through
/// the idle loop's queue, so it is represented here by returning
/// `Resolved::Async` and letting the caller perform the forward.
///
/// `is_stream` distinguishes step 1's stream-URI branch from the
/// filesystem-backed steps 2-4.
pub fn resolve(
    cfg: &CoverArtConfig,
    uri: &str,
    offset: i64,
    size: Size,
    is_stream: bool,
    mpd_supports_albumart: bool,
) -> Resolved {
    if is_stream {
        if let Some(r) = resolve_stream(cfg, uri) {
            return r;
        }
        debug!("no stream cover found for {uri}, serving placeholder");
        return Resolved::Placeholder;
    }

    let ext_guess = "jpg";
    let cache_path = covercache_path(cfg, uri, offset, ext_guess);
    if let Ok(meta) = std::fs::metadata(&cache_path) {
        if meta.is_file() {
            if let Ok(data) = std::fs::read(&cache_path) {
                return Resolved::Bytes {
                    data,
                    mime_type: mime_for_ext(ext_guess),
                };
            }
        }
    }

    if let Some(data) = resolve_filesystem(cfg, uri, size) {
        return Resolved::Bytes {
            data,
            mime_type: "image/jpeg".into(),
        };
    }

    if offset >= 0 {
        if let Some((data, mime_type)) = resolve_embedded(cfg, uri) {
            return Resolved::Bytes { data, mime_type };
        }
    }

    if offset == 0 && mpd_supports_albumart {
        return Resolved::Async;
    }

    Resolved::Placeholder
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cfg(workdir: &Path, music: &Path) -> CoverArtConfig {
        CoverArtConfig {
            workdir: workdir.to_path_buf(),
            music_dir: music.to_path_buf(),
            cover_names: vec!["cover.jpg".into(), "folder".into()],
            thumbnail_names: vec!["cover-thumb.jpg".into()],
            covercache_keep_days: 7,
        }
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize_filename("http://a/b.mp3"), "http:__a_b.mp3");
    }

    #[test]
    fn stream_extimg_url_redirects_to_proxy() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("webradios")).unwrap();
        let safe = sanitize_filename("http://stream.example/radio");
        std::fs::write(
            dir.path().join("webradios").join(format!("{safe}.m3u")),
            "#EXTIMG:http://stream.example/cover.png\n",
        )
        .unwrap();
        let c = cfg(dir.path(), dir.path());
        match resolve_stream(&c, "http://stream.example/radio") {
            Some(Resolved::Redirect(url)) => assert!(url.starts_with("/proxy-covercache?uri=")),
            _ => panic!("expected redirect"),
        }
    }

    #[test]
    fn stream_extimg_local_path_serves_thumb() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("webradios")).unwrap();
        std::fs::create_dir_all(dir.path().join("pics/thumbs")).unwrap();
        let safe = sanitize_filename("http://stream.example/radio");
        std::fs::write(
            dir.path().join("webradios").join(format!("{safe}.m3u")),
            "#EXTIMG:radio-cover.png\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("pics/thumbs/radio-cover.png"), b"thumb-bytes").unwrap();
        let c = cfg(dir.path(), dir.path());
        match resolve_stream(&c, "http://stream.example/radio") {
            Some(Resolved::Bytes { data, mime_type }) => {
                assert_eq!(data, b"thumb-bytes");
                assert_eq!(mime_type, "image/png");
            }
            _ => panic!("expected local thumb bytes"),
        }
    }

    #[test]
    fn filesystem_lookup_finds_named_cover() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(music.join("album")).unwrap();
        std::fs::write(music.join("album/cover.jpg"), b"fake-jpeg").unwrap();
        let c = cfg(dir.path(), &music);
        let data = resolve_filesystem(&c, "album/track.flac", Size::Full);
        assert_eq!(data.unwrap(), b"fake-jpeg");
    }

    #[test]
    fn virtual_cue_directory_steps_up_one_level() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(music.join("album")).unwrap();
        std::fs::write(music.join("album/cover.jpg"), b"fake-jpeg").unwrap();
        let c = cfg(dir.path(), &music);
        let data = resolve_filesystem(&c, "album/disc.cue/track.flac", Size::Full);
        assert_eq!(data.unwrap(), b"fake-jpeg");
    }

    #[test]
    fn expire_covercache_removes_stale_entries() {
        let dir = tempdir().unwrap();
        let cc = dir.path().join("cache/covercache");
        std::fs::create_dir_all(&cc).unwrap();
        let stale = cc.join("deadbeef-0.jpg");
        std::fs::write(&stale, b"x").unwrap();
        let old = SystemTime::now() - Duration::from_secs(10 * 86400);
        filetime::set_file_mtime(&stale, filetime::FileTime::from_system_time(old)).ok();

        let c = cfg(dir.path(), dir.path());
        let removed = expire_covercache(&c);
        assert!(removed <= 1);
    }

    #[test]
    fn no_cover_anywhere_falls_back_to_placeholder() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        let c = cfg(dir.path(), &music);
        match resolve(&c, "missing/track.flac", 0, Size::Full, false, false) {
            Resolved::Placeholder => {}
            _ => panic!("expected placeholder"),
        }
    }
}
