//! C4: the album cache.
//!
//! A read-mostly aggregate index over the library, keyed by album identity
//! and rebuilt wholesale from a full library scan rather than mutated
//! incrementally. A `BTreeMap<String, AlbumRecord>` gives ordered iteration
//! for listing and O(key-length)-ish lookup without a specialized trie.
use crate::mpd::tags::{is_multivalue_tag, SongTags, Tag};
use log::warn;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// One album's aggregate record.
#[derive(Debug, Clone, Default)]
pub struct AlbumRecord {
    pub first_seen_uri: String,
    pub values: std::collections::HashMap<&'static str, Vec<String>>,
    pub last_modified: i64,
    pub max_disc: u32,
    pub total_duration_secs: f64,
    pub total_duration_ms: u64,
    pub song_count: u32,
}

impl AlbumRecord {
    pub fn song_count(&self) -> u32 {
        self.song_count
    }

    pub fn disc_count(&self) -> u32 {
        self.max_disc.max(1)
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.total_duration_secs
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    fn insert_value(&mut self, tag: Tag, value: &str) {
        let entry = self.values.entry(tag.mpd_name()).or_default();
        if !entry.iter().any(|v| v == value) {
            entry.push(value.to_owned());
        }
    }

    pub fn get(&self, tag: Tag) -> &[String] {
        self.values
            .get(tag.mpd_name())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Derives the album key for a song, or `None` if it lacks an album tag
/// or an artist/album-artist tag to pair it with.
pub fn key_of(song: &SongTags) -> Option<String> {
    let album = song.first(Tag::Album).unwrap_or("");
    if album.is_empty() {
        warn!("song {:?} has no Album tag, skipping for album cache", song.uri);
        return None;
    }
    let artist = song
        .first(Tag::AlbumArtist)
        .filter(|s| !s.is_empty())
        .or_else(|| song.first(Tag::Artist).filter(|s| !s.is_empty()));
    let Some(artist) = artist else {
        warn!(
            "song {:?} has neither AlbumArtist nor Artist, skipping for album cache",
            song.uri
        );
        return None;
    };
    Some(format!(
        "{}::{}",
        album.to_lowercase(),
        artist.to_lowercase()
    ))
}

const WANTED_MULTIVALUE_TAGS: &[Tag] = &[
    Tag::Artist,
    Tag::ArtistSort,
    Tag::AlbumArtist,
    Tag::AlbumArtistSort,
    Tag::Genre,
    Tag::Composer,
    Tag::ComposerSort,
    Tag::Performer,
    Tag::Conductor,
    Tag::Ensemble,
    Tag::MusicBrainzArtistId,
    Tag::MusicBrainzAlbumArtistId,
];

/// The built cache: an ordered index keyed by album key.
#[derive(Debug, Default)]
pub struct AlbumCache {
    albums: BTreeMap<String, AlbumRecord>,
}

impl AlbumCache {
    pub fn lookup(&self, key: &str) -> Option<&AlbumRecord> {
        self.albums.get(key)
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }

    /// All albums, sorted by the given tag. Falls back to key order when the tag is absent on both
    /// sides.
    pub fn all_sorted_by(&self, tag: Tag) -> Vec<(&str, &AlbumRecord)> {
        let mut v: Vec<_> = self
            .albums
            .iter()
            .map(|(k, r)| (k.as_str(), r))
            .collect();
        v.sort_by(|a, b| {
            let av = a.1.get(tag).first().cloned().unwrap_or_default();
            let bv = b.1.get(tag).first().cloned().unwrap_or_default();
            av.cmp(&bv).then_with(|| a.0.cmp(b.0))
        });
        v
    }

    /// Consumes a lazy sequence of songs and builds a fresh cache. Building
    /// happens into a detached structure; the caller swaps it in via
    /// [`AlbumCacheHandle::swap`] once complete, so no partial tree is ever
    /// observed by readers.
    pub fn build<I: IntoIterator<Item = SongTags>>(songs: I) -> Self {
        let mut cache = AlbumCache::default();
        for song in songs {
            let Some(key) = key_of(&song) else { continue };
            let disc: u32 = song
                .first(Tag::Disc)
                .and_then(|d| d.split('/').next())
                .and_then(|d| d.parse().ok())
                .unwrap_or(0);
            let last_modified: i64 = song
                .first(Tag::LastModified)
                .and_then(parse_last_modified)
                .unwrap_or(0);
            let duration_secs: f64 = song
                .values
                .get("duration")
                .and_then(|v| v.first())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0);
            let duration_ms = (duration_secs * 1000.0).round() as u64;

            let record = cache.albums.entry(key).or_insert_with(|| AlbumRecord {
                first_seen_uri: song.uri.clone(),
                max_disc: disc,
                ..Default::default()
            });

            record.song_count += 1;
            record.total_duration_secs += duration_secs;
            record.total_duration_ms += duration_ms;
            if last_modified > record.last_modified {
                record.last_modified = last_modified;
            }
            if disc > record.max_disc {
                record.max_disc = disc;
            }
            for tag in WANTED_MULTIVALUE_TAGS {
                for value in song.get(*tag) {
                    record.insert_value(*tag, value);
                }
            }
            debug_assert!(is_multivalue_tag(Tag::Artist));
        }
        cache
    }
}

fn parse_last_modified(s: &str) -> Option<i64> {
    // MPD emits RFC 3339 timestamps for `Last-Modified`.
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}

/// The single swap point shared between the idle loop (reader, and writer
/// of the *pointer* only) and the cache-rebuild worker (builder).
///
/// A real CPU-atomic swap of a `BTreeMap` isn't expressible safely; an
/// `RwLock` whose write lock is held only for the pointer-sized `Arc`
/// replacement gives the same externally-observable guarantee instead —
/// readers always see either the fully-old or fully-new tree, never a
/// partial one.
#[derive(Default)]
pub struct AlbumCacheHandle {
    inner: RwLock<Arc<AlbumCache>>,
}

impl AlbumCacheHandle {
    pub fn new() -> Self {
        AlbumCacheHandle {
            inner: RwLock::new(Arc::new(AlbumCache::default())),
        }
    }

    pub fn get(&self) -> Arc<AlbumCache> {
        self.inner.read().unwrap().clone()
    }

    pub fn swap(&self, new_cache: AlbumCache) {
        let mut guard = self.inner.write().unwrap();
        *guard = Arc::new(new_cache);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(uri: &str, pairs: &[(Tag, &[&str])]) -> SongTags {
        let mut st = SongTags {
            uri: uri.to_owned(),
            ..Default::default()
        };
        for (tag, vals) in pairs {
            st.values
                .insert(tag.mpd_name(), vals.iter().map(|s| s.to_string()).collect());
        }
        st
    }

    #[test]
    fn key_build_with_album_artist() {
        let s = song(
            "a.flac",
            &[(Tag::Album, &["OK Computer"]), (Tag::AlbumArtist, &["Radiohead"])],
        );
        assert_eq!(key_of(&s).as_deref(), Some("ok computer::radiohead"));
    }

    #[test]
    fn key_build_falls_back_to_artist() {
        let s = song("a.flac", &[(Tag::Album, &["OK Computer"]), (Tag::Artist, &["Radiohead"])]);
        assert_eq!(key_of(&s).as_deref(), Some("ok computer::radiohead"));
    }

    #[test]
    fn key_build_refuses_empty_album() {
        let s = song("a.flac", &[(Tag::Artist, &["Radiohead"])]);
        assert_eq!(key_of(&s), None);
    }

    #[test]
    fn aggregate_monotonicity() {
        let mut s1 = song("a.flac", &[(Tag::Album, &["A"]), (Tag::Artist, &["X"]), (Tag::Disc, &["1"])]);
        s1.values.insert("duration", vec!["200".into()]);
        let mut s2 = song("b.flac", &[(Tag::Album, &["A"]), (Tag::Artist, &["X"]), (Tag::Disc, &["2"])]);
        s2.values.insert("duration", vec!["240".into()]);

        let cache = AlbumCache::build(vec![s1, s2]);
        let rec = cache.lookup("a::x").unwrap();
        assert_eq!(rec.song_count(), 2);
        assert_eq!(rec.total_duration_secs(), 440.0);
        assert_eq!(rec.disc_count(), 2);
    }

    #[test]
    fn multivalue_dedup() {
        let mut s1 = song("a.flac", &[(Tag::Album, &["A"]), (Tag::Artist, &["X", "Y"])]);
        s1.values.insert("duration", vec!["1".into()]);
        let mut s2 = song("b.flac", &[(Tag::Album, &["A"]), (Tag::Artist, &["X"])]);
        s2.values.insert("duration", vec!["1".into()]);

        let cache = AlbumCache::build(vec![s1, s2]);
        let rec = cache.lookup("a::x").unwrap();
        assert_eq!(rec.get(Tag::Artist), &["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn swap_is_visible_atomically() {
        let handle = AlbumCacheHandle::new();
        assert!(handle.get().is_empty());
        let mut s = song("a.flac", &[(Tag::Album, &["A"]), (Tag::Artist, &["X"])]);
        s.values.insert("duration", vec!["1".into()]);
        handle.swap(AlbumCache::build(vec![s]));
        assert_eq!(handle.get().len(), 1);
    }
}
