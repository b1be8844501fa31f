//!
//! src/catalog.rs
//!
//! Defines the CatalogSource trait the pipeline drives, plus the
//! Spotify-backed implementation that decodes each endpoint's payload
//! into flat domain rows
//!

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::PipelineError;
use crate::fetch::{send_json, SpotifyClient};
use crate::types::{Album, Artist, AudioFeature, Track, ARTIST_JOIN};

/// Maximum number of track ids the audio-feature endpoint accepts per call
pub const FEATURE_BATCH_CEILING: usize = 100;

/// One page of an artist's album listing, with the upstream total hint
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumPage {
    pub items: Vec<Album>,
    pub total: Option<u64>,
}

/// Pre-flight guard for a caller-declared feature chunk. Runs before any
/// network call so misuse never costs a request.
pub fn ensure_feature_chunk(ids: &[String]) -> Result<(), PipelineError> {
    if ids.len() > FEATURE_BATCH_CEILING {
        return Err(PipelineError::Validation(format!(
            "audio-feature chunk of {} ids exceeds ceiling of {}",
            ids.len(), FEATURE_BATCH_CEILING
        )));
    }
    Ok(())
}

/// Upstream collaborator contract. Each method covers exactly one page or
/// one chunk; pagination and batching discipline live in the pipeline.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Ranked artist candidates for a free-text query
    async fn search_artists(&self, token: &str, query: &str, limit: u32)
        -> Result<Vec<Artist>, PipelineError>;

    /// One artist by identifier
    async fn artist(&self, token: &str, artist_id: &str)
        -> Result<Artist, PipelineError>;

    /// One page of the artist's albums
    async fn album_page(&self, token: &str, artist_id: &str, limit: u32, offset: u32)
        -> Result<AlbumPage, PipelineError>;

    /// One page of an album's tracks, annotated with the owning album id
    async fn track_page(&self, token: &str, album_id: &str, limit: u32, offset: u32)
        -> Result<Vec<Track>, PipelineError>;

    /// Audio features for at most FEATURE_BATCH_CEILING track ids
    async fn feature_chunk(&self, token: &str, ids: &[String])
        -> Result<Vec<AudioFeature>, PipelineError>;

    /// The artist's ranked top tracks
    async fn top_tracks(&self, token: &str, artist_id: &str)
        -> Result<Vec<Track>, PipelineError>;

    /// Artists related to the given artist
    async fn related_artists(&self, token: &str, artist_id: &str)
        -> Result<Vec<Artist>, PipelineError>;
}

pub struct SpotifyCatalog {
    client: SpotifyClient,
}

impl SpotifyCatalog {
    pub fn new(client: SpotifyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CatalogSource for SpotifyCatalog {
    async fn search_artists(&self, token: &str, query: &str, limit: u32)
        -> Result<Vec<Artist>, PipelineError> {
        let request = self.client.search("artist", query, limit, token)?;
        let value = send_json(request, &format!("search artist {query:?}")).await?;

        value.pointer("/artists/items")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Parse(
                format!("search {query:?}: no artists.items in response")
            ))?
            .iter()
            .map(parse_artist)
            .collect()
    }

    async fn artist(&self, token: &str, artist_id: &str)
        -> Result<Artist, PipelineError> {
        let request = self.client.artist(artist_id, token)?;
        let value = send_json(request, &format!("artist {artist_id}")).await?;
        parse_artist(&value)
    }

    async fn album_page(&self, token: &str, artist_id: &str, limit: u32, offset: u32)
        -> Result<AlbumPage, PipelineError> {
        let request = self.client.artist_albums(artist_id, limit, offset, token)?;
        let value = send_json(
            request,
            &format!("albums of artist {artist_id} offset {offset}")
        ).await?;

        let items = value.get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Parse(
                format!("artist {artist_id}: no items in album page")
            ))?
            .iter()
            .map(parse_album)
            .collect::<Result<Vec<_>, _>>()?;

        let total = value.get("total").and_then(Value::as_u64);
        Ok(AlbumPage { items, total })
    }

    async fn track_page(&self, token: &str, album_id: &str, limit: u32, offset: u32)
        -> Result<Vec<Track>, PipelineError> {
        let request = self.client.album_tracks(album_id, limit, offset, token)?;
        let value = send_json(
            request,
            &format!("tracks of album {album_id} offset {offset}")
        ).await?;

        value.get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Parse(
                format!("album {album_id}: no items in track page")
            ))?
            .iter()
            .map(|t| parse_track(t, album_id))
            .collect()
    }

    async fn feature_chunk(&self, token: &str, ids: &[String])
        -> Result<Vec<AudioFeature>, PipelineError> {
        ensure_feature_chunk(ids)?;

        let csv = ids.join(",");
        let request = self.client.audio_features(&csv, token)?;
        let value = send_json(
            request,
            &format!("audio features for {} track ids", ids.len())
        ).await?;

        // unknown ids come back as null entries, skip them
        value.get("audio_features")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Parse(
                "no audio_features in response".to_string()
            ))?
            .iter()
            .filter(|f| !f.is_null())
            .map(parse_feature)
            .collect()
    }

    async fn top_tracks(&self, token: &str, artist_id: &str)
        -> Result<Vec<Track>, PipelineError> {
        let request = self.client.artist_top_tracks(artist_id, token)?;
        let value = send_json(request, &format!("top tracks of {artist_id}")).await?;

        value.get("tracks")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Parse(
                format!("artist {artist_id}: no tracks in top-tracks response")
            ))?
            .iter()
            .map(|t| {
                let album_id = t.pointer("/album/id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                parse_track(t, album_id)
            })
            .collect()
    }

    async fn related_artists(&self, token: &str, artist_id: &str)
        -> Result<Vec<Artist>, PipelineError> {
        let request = self.client.related_artists(artist_id, token)?;
        let value = send_json(
            request,
            &format!("related artists of {artist_id}")
        ).await?;

        value.get("artists")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::Parse(
                format!("artist {artist_id}: no artists in related response")
            ))?
            .iter()
            .map(parse_artist)
            .collect()
    }
}

fn required_str(v: &Value, field: &str, context: &str) -> Result<String, PipelineError> {
    v.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Parse(
            format!("{context}: missing {field}")
        ))
}

/// Flattens an `artists` array into delimiter-joined id and name columns
fn join_artists(v: &Value) -> (String, String) {
    let artists = v.get("artists")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let ids = artists.iter()
        .filter_map(|a| a.get("id").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(ARTIST_JOIN);
    let names = artists.iter()
        .filter_map(|a| a.get("name").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(ARTIST_JOIN);
    (ids, names)
}

pub fn parse_artist(v: &Value) -> Result<Artist, PipelineError> {
    let id = required_str(v, "id", "artist")?;
    let name = required_str(v, "name", "artist")?;
    let genres = v.get("genres")
        .and_then(Value::as_array)
        .map(|g| g.iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(ARTIST_JOIN))
        .unwrap_or_default();

    Ok(Artist {
        id,
        name,
        genres,
        popularity: v.get("popularity").and_then(Value::as_i64),
        followers: v.pointer("/followers/total").and_then(Value::as_i64),
    })
}

pub fn parse_album(v: &Value) -> Result<Album, PipelineError> {
    let album_id = required_str(v, "id", "album")?;
    let album_name = required_str(v, "name", "album")?;
    let (artist_ids, artist_names) = join_artists(v);

    Ok(Album {
        album_id,
        album_name,
        album_type: v.get("album_type").and_then(Value::as_str).map(str::to_string),
        release_date: v.get("release_date").and_then(Value::as_str).map(str::to_string),
        release_date_precision: v.get("release_date_precision")
            .and_then(Value::as_str)
            .map(str::to_string),
        total_tracks: v.get("total_tracks").and_then(Value::as_i64),
        artist_ids,
        artist_names,
    })
}

pub fn parse_track(v: &Value, album_id: &str) -> Result<Track, PipelineError> {
    let track_id = required_str(v, "id", "track")?;
    let track_name = required_str(v, "name", "track")?;
    let (artist_ids, artist_names) = join_artists(v);

    Ok(Track {
        track_id,
        track_name,
        disc_number: v.get("disc_number").and_then(Value::as_i64),
        duration_ms: v.get("duration_ms").and_then(Value::as_i64),
        explicit: v.get("explicit").and_then(Value::as_bool),
        // the album-tracks endpoint never reports popularity
        popularity: None,
        artist_ids,
        artist_names,
        album_id: album_id.to_string(),
    })
}

pub fn parse_feature(v: &Value) -> Result<AudioFeature, PipelineError> {
    let track_id = required_str(v, "id", "audio feature")?;

    Ok(AudioFeature {
        track_id,
        danceability: v.get("danceability").and_then(Value::as_f64),
        energy: v.get("energy").and_then(Value::as_f64),
        key: v.get("key").and_then(Value::as_i64),
        loudness: v.get("loudness").and_then(Value::as_f64),
        mode: v.get("mode").and_then(Value::as_i64),
        speechiness: v.get("speechiness").and_then(Value::as_f64),
        acousticness: v.get("acousticness").and_then(Value::as_f64),
        instrumentalness: v.get("instrumentalness").and_then(Value::as_f64),
        liveness: v.get("liveness").and_then(Value::as_f64),
        valence: v.get("valence").and_then(Value::as_f64),
        tempo: v.get("tempo").and_then(Value::as_f64),
        duration_ms: v.get("duration_ms").and_then(Value::as_i64),
        time_signature: v.get("time_signature").and_then(Value::as_i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn album_decodes_with_joined_artists() {
        let value = json!({
            "id": "al1",
            "name": "Duet Record",
            "album_type": "album",
            "release_date": "2015-03-20",
            "release_date_precision": "day",
            "total_tracks": 12,
            "artists": [
                {"id": "a1", "name": "First"},
                {"id": "a2", "name": "Second"}
            ]
        });
        let album = parse_album(&value).unwrap();
        assert_eq!(album.album_id, "al1");
        assert_eq!(album.artist_ids, "a1, a2");
        assert_eq!(album.artist_names, "First, Second");
        assert_eq!(album.release_year(), Some(2015));
    }

    #[test]
    fn track_is_annotated_with_owning_album() {
        let value = json!({
            "id": "t1",
            "name": "Opener",
            "disc_number": 1,
            "duration_ms": 201000,
            "explicit": false,
            "artists": [{"id": "a1", "name": "First"}]
        });
        let track = parse_track(&value, "al1").unwrap();
        assert_eq!(track.album_id, "al1");
        assert_eq!(track.duration_ms, Some(201000));
        assert_eq!(track.popularity, None);
    }

    #[test]
    fn feature_requires_track_id() {
        let value = json!({"danceability": 0.5});
        assert!(matches!(
            parse_feature(&value),
            Err(PipelineError::Parse(_))
        ));
    }

    #[test]
    fn chunk_guard_rejects_oversized_chunks() {
        let ids: Vec<String> = (0..101).map(|i| format!("t{i}")).collect();
        assert!(matches!(
            ensure_feature_chunk(&ids),
            Err(PipelineError::Validation(_))
        ));
        assert!(ensure_feature_chunk(&ids[..100]).is_ok());
    }
}
