//! C5: tag model.
//!
//! Grounded in `examples/original_source/src/mpd_client/tags.c`
//! (`is_multivalue_tag`, `get_sort_tag`, `mpd_client_get_tag_value[s]`).
use std::collections::HashMap;

/// The MPD tags myMPD understands. Mirrors `enum mpd_tag_type`'s subset
/// this core cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Artist,
    ArtistSort,
    Album,
    AlbumSort,
    AlbumArtist,
    AlbumArtistSort,
    Title,
    TitleSort,
    Name,
    Genre,
    Composer,
    ComposerSort,
    Performer,
    Conductor,
    Ensemble,
    Disc,
    Track,
    Date,
    MusicBrainzArtistId,
    MusicBrainzAlbumArtistId,
    LastModified,
}

impl Tag {
    pub fn mpd_name(self) -> &'static str {
        match self {
            Tag::Artist => "Artist",
            Tag::ArtistSort => "ArtistSort",
            Tag::Album => "Album",
            Tag::AlbumSort => "AlbumSort",
            Tag::AlbumArtist => "AlbumArtist",
            Tag::AlbumArtistSort => "AlbumArtistSort",
            Tag::Title => "Title",
            Tag::TitleSort => "TitleSort",
            Tag::Name => "Name",
            Tag::Genre => "Genre",
            Tag::Composer => "Composer",
            Tag::ComposerSort => "ComposerSort",
            Tag::Performer => "Performer",
            Tag::Conductor => "Conductor",
            Tag::Ensemble => "Ensemble",
            Tag::Disc => "Disc",
            Tag::Track => "Track",
            Tag::Date => "Date",
            Tag::MusicBrainzArtistId => "MUSICBRAINZ_ARTISTID",
            Tag::MusicBrainzAlbumArtistId => "MUSICBRAINZ_ALBUMARTISTID",
            Tag::LastModified => "Last-Modified",
        }
    }
}

/// Exactly the multi-value tags named in spec.md §4.2. All other tags
/// store a single value.
pub fn is_multivalue_tag(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::Artist
            | Tag::ArtistSort
            | Tag::AlbumArtist
            | Tag::AlbumArtistSort
            | Tag::Genre
            | Tag::Composer
            | Tag::ComposerSort
            | Tag::Performer
            | Tag::Conductor
            | Tag::Ensemble
            | Tag::MusicBrainzArtistId
            | Tag::MusicBrainzAlbumArtistId
    )
}

/// Maps a sortable tag to its `*Sort` pendant if that pendant is present
/// in `enabled_tags`, otherwise returns the original tag unchanged
///.
pub fn sort_tag(tag: Tag, enabled_tags: &[String]) -> Tag {
    let candidate = match tag {
        Tag::Artist => Tag::ArtistSort,
        Tag::AlbumArtist => Tag::AlbumArtistSort,
        Tag::Album => Tag::AlbumSort,
        Tag::Composer => Tag::ComposerSort,
        Tag::Title => Tag::TitleSort,
        _ => return tag,
    };
    if enabled_tags.iter().any(|t| t == candidate.mpd_name()) {
        candidate
    } else {
        tag
    }
}

/// A song's tag values, keyed by tag. This is the local, already-parsed
/// representation built from an MPD `MpdResponse`'s field list — multiple
/// occurrences of a multi-value tag name become multiple entries.
#[derive(Debug, Clone, Default)]
pub struct SongTags {
    pub values: HashMap<&'static str, Vec<String>>,
    pub uri: String,
}

impl SongTags {
    pub fn get(&self, tag: Tag) -> &[String] {
        self.values
            .get(tag.mpd_name())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, tag: Tag) -> Option<&str> {
        self.get(tag).first().map(|s| s.as_str())
    }

    /// Scalar, human-readable rendering: multiple values joined with
    /// `", "`. `Title` falls back to `Name`, then to the URI's basename.
    pub fn scalar(&self, tag: Tag) -> String {
        let values = self.get(tag);
        if !values.is_empty() {
            return values.join(", ");
        }
        if tag == Tag::Title {
            let name = self.get(Tag::Name);
            if !name.is_empty() {
                return name.join(", ");
            }
            return basename(&self.uri).to_owned();
        }
        String::new()
    }

    /// JSON rendering: multi-value tags become a JSON array, single-value
    /// tags a JSON string. Empty tag sets render as `"-"` (or `["-"]`).
    /// MusicBrainz id tags are split on `;` and trimmed first — MPD packs
    /// multiple ids into one value.
    pub fn json(&self, tag: Tag) -> serde_json::Value {
        let mut values = self.get(tag).to_vec();
        if matches!(
            tag,
            Tag::MusicBrainzArtistId | Tag::MusicBrainzAlbumArtistId
        ) {
            values = values
                .iter()
                .flat_map(|v| v.split(';').map(|s| s.trim().to_owned()))
                .filter(|s| !s.is_empty())
                .collect();
        }

        if values.is_empty() && tag == Tag::Title {
            let name = self.get(Tag::Name);
            if !name.is_empty() {
                values = name.to_vec();
            } else {
                values = vec![basename(&self.uri).to_owned()];
            }
        }

        if is_multivalue_tag(tag) {
            if values.is_empty() {
                serde_json::json!(["-"])
            } else {
                serde_json::Value::Array(values.into_iter().map(serde_json::Value::from).collect())
            }
        } else if let Some(v) = values.first() {
            serde_json::Value::from(v.clone())
        } else {
            serde_json::Value::from("-")
        }
    }
}

pub fn basename(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(values: &[(Tag, &[&str])], uri: &str) -> SongTags {
        let mut st = SongTags {
            uri: uri.to_owned(),
            ..Default::default()
        };
        for (tag, vals) in values {
            st.values.insert(
                tag.mpd_name(),
                vals.iter().map(|s| s.to_string()).collect(),
            );
        }
        st
    }

    #[test]
    fn musicbrainz_split() {
        let s = song(
            &[(Tag::MusicBrainzArtistId, &["id1;id2;id3"])],
            "foo.mp3",
        );
        let v = s.json(Tag::MusicBrainzArtistId);
        assert_eq!(v, serde_json::json!(["id1", "id2", "id3"]));
    }

    #[test]
    fn title_falls_back_to_name_then_basename() {
        let s = song(&[], "music/foo/bar.flac");
        assert_eq!(s.scalar(Tag::Title), "bar.flac");

        let s = song(&[(Tag::Name, &["Live Stream"][..])], "http://x");
        assert_eq!(s.scalar(Tag::Title), "Live Stream");
    }

    #[test]
    fn empty_multivalue_tag_is_dash_array() {
        let s = song(&[], "foo.mp3");
        assert_eq!(s.json(Tag::Genre), serde_json::json!(["-"]));
        assert_eq!(s.json(Tag::Album), serde_json::Value::from("-"));
    }

    #[test]
    fn sort_tag_fallback() {
        let enabled = vec!["ArtistSort".to_string()];
        assert_eq!(sort_tag(Tag::Artist, &enabled), Tag::ArtistSort);
        assert_eq!(sort_tag(Tag::Artist, &[]), Tag::Artist);
    }

    #[test]
    fn multivalue_tag_set_is_exact() {
        for t in [
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
        ] {
            assert!(is_multivalue_tag(t), "{t:?} should be multivalue");
        }
        for t in [Tag::Album, Tag::Title, Tag::Disc, Tag::Track, Tag::Date] {
            assert!(!is_multivalue_tag(t), "{t:?} should be single-valued");
        }
    }
}
