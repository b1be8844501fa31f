//!
//! src/pipeline.rs
//!
//! Drives the aggregation stages in order: resolve artist, page through
//! albums, fetch tracks per album, batch audio features, then merge into
//! one denormalized table. Every stage failure aborts the whole run.
//!
//!

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::{ensure_feature_chunk, CatalogSource, FEATURE_BATCH_CEILING};
use crate::errors::PipelineError;
use crate::types::{
    key_mode, key_name, mode_name, Album, Artist, ArtistQuery, AudioFeature,
    MergedRow, Track,
};

#[derive(Clone, Debug)]
pub struct PipelineLimits {
    pub album_page_size: u32,
    pub track_page_size: u32,
    pub search_limit: u32,
    pub fetch_concurrency: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            album_page_size: 50,
            track_page_size: 50,
            search_limit: 1,
            fetch_concurrency: 4,
        }
    }
}

pub struct Pipeline<S> {
    source: Arc<S>,
    token: String,
    limits: PipelineLimits,
    fetch_gate: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl<S: CatalogSource + 'static> Pipeline<S> {
    /// The bearer credential is injected here and treated as an opaque
    /// string per call; the pipeline never reads ambient credential state.
    pub fn new(source: Arc<S>, token: impl Into<String>, limits: PipelineLimits) -> Self {
        let fetch_gate = Arc::new(Semaphore::new(limits.fetch_concurrency.max(1)));
        Self {
            source,
            token: token.into(),
            limits,
            fetch_gate,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token aborts the run between stages and discards
    /// partial results
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Resolves an id as-is; a free-text name goes through search and the
    /// first ranked candidate wins
    pub async fn resolve_artist(&self, query: &ArtistQuery) -> Result<Artist, PipelineError> {
        match query {
            ArtistQuery::Id(id) => self.source.artist(&self.token, id).await,
            ArtistQuery::Name(name) => {
                let candidates = self.source
                    .search_artists(&self.token, name, self.limits.search_limit)
                    .await?;
                candidates.into_iter().next().ok_or_else(|| {
                    PipelineError::NotFound(format!("no artist matched {name:?}"))
                })
            }
        }
    }

    /// Pages through the artist's albums until exhaustion, then dedupes by
    /// album id keeping the first occurrence
    pub async fn albums(&self, artist_id: &str) -> Result<Vec<Album>, PipelineError> {
        let page_size = self.limits.album_page_size;
        let mut collected: Vec<Album> = Vec::new();
        let mut offset = 0_u32;

        loop {
            let page = self.source
                .album_page(&self.token, artist_id, page_size, offset)
                .await?;
            let fetched = page.items.len();
            debug!(artist = %artist_id, offset, fetched, "albums.page");

            collected.extend(page.items);
            offset += fetched as u32;

            // a short page signals exhaustion; a trusted total hint lets us
            // stop without paying for the final empty page
            if fetched < page_size as usize {
                break;
            }
            if let Some(total) = page.total {
                if u64::from(offset) >= total {
                    break;
                }
            }
        }

        let mut seen = HashSet::new();
        collected.retain(|album| seen.insert(album.album_id.clone()));

        if collected.is_empty() {
            return Err(PipelineError::EmptyResult(
                format!("artist {artist_id} has no albums")
            ));
        }
        info!(artist = %artist_id, albums = collected.len(), "albums.done");
        Ok(collected)
    }

    /// Fetches every album's track listing. Albums are mutually independent
    /// so they run concurrently under the fetch gate; rows are re-assembled
    /// in album order so the result is deterministic.
    pub async fn tracks(&self, albums: &[Album]) -> Result<Vec<Track>, PipelineError> {
        let mut set: JoinSet<Result<(usize, Vec<Track>), PipelineError>> = JoinSet::new();

        for (idx, album) in albums.iter().enumerate() {
            let source = self.source.clone();
            let token = self.token.clone();
            let album_id = album.album_id.clone();
            let page_size = self.limits.track_page_size;
            let gate = self.fetch_gate.clone();

            set.spawn(async move {
                let _permit = gate.acquire_owned().await.map_err(|_| {
                    PipelineError::Fetch("fetch gate closed".to_string())
                })?;
                let tracks = album_track_listing(
                    source.as_ref(), &token, &album_id, page_size
                ).await?;
                Ok((idx, tracks))
            });
        }

        let mut slots: Vec<Option<Vec<Track>>> = vec![None; albums.len()];
        while let Some(joined) = set.join_next().await {
            let (idx, tracks) = joined
                .map_err(|e| PipelineError::Fetch(format!("track fetch task: {e}")))??;
            slots[idx] = Some(tracks);
        }

        let rows: Vec<Track> = slots.into_iter().flatten().flatten().collect();
        info!(albums = albums.len(), tracks = rows.len(), "tracks.done");
        Ok(rows)
    }

    /// Partitions the ids into chunks of at most FEATURE_BATCH_CEILING and
    /// issues one upstream call per chunk, concurrently under the fetch
    /// gate. Results keep chunk order.
    pub async fn audio_features(&self, ids: &[String])
        -> Result<Vec<AudioFeature>, PipelineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<Vec<String>> = ids
            .chunks(FEATURE_BATCH_CEILING)
            .map(<[String]>::to_vec)
            .collect();

        let mut set: JoinSet<Result<(usize, Vec<AudioFeature>), PipelineError>> =
            JoinSet::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let source = self.source.clone();
            let token = self.token.clone();
            let chunk = chunk.clone();
            let gate = self.fetch_gate.clone();

            set.spawn(async move {
                let _permit = gate.acquire_owned().await.map_err(|_| {
                    PipelineError::Fetch("fetch gate closed".to_string())
                })?;
                let features = source.feature_chunk(&token, &chunk).await?;
                Ok((idx, features))
            });
        }

        let mut slots: Vec<Option<Vec<AudioFeature>>> = vec![None; chunks.len()];
        while let Some(joined) = set.join_next().await {
            let (idx, features) = joined
                .map_err(|e| PipelineError::Fetch(format!("feature fetch task: {e}")))??;
            slots[idx] = Some(features);
        }

        let rows: Vec<AudioFeature> = slots.into_iter().flatten().flatten().collect();
        info!(requested = ids.len(), features = rows.len(), "features.done");
        Ok(rows)
    }

    /// Single caller-declared chunk. Validated pre-flight so an oversized
    /// chunk never reaches the network.
    pub async fn audio_feature_chunk(&self, ids: &[String])
        -> Result<Vec<AudioFeature>, PipelineError> {
        ensure_feature_chunk(ids)?;
        self.source.feature_chunk(&self.token, ids).await
    }

    /// The whole pipeline: resolved artist plus the merged per-track table
    pub async fn artist_catalog(&self, query: &ArtistQuery)
        -> Result<(Artist, Vec<MergedRow>), PipelineError> {
        self.checkpoint()?;
        let artist = self.resolve_artist(query).await?;
        info!(artist = %artist.id, name = %artist.name, "pipeline.start");

        self.checkpoint()?;
        let albums = self.albums(&artist.id).await?;

        self.checkpoint()?;
        let tracks = self.tracks(&albums).await?;

        self.checkpoint()?;
        let mut seen = HashSet::new();
        let track_ids: Vec<String> = tracks.iter()
            .map(|t| t.track_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let features = self.audio_features(&track_ids).await?;

        self.checkpoint()?;
        let rows = merge(&albums, &tracks, &features);
        info!(artist = %artist.id, rows = rows.len(), "pipeline.done");
        Ok((artist, rows))
    }

    pub async fn artist_track_features(&self, query: &ArtistQuery)
        -> Result<Vec<MergedRow>, PipelineError> {
        let (_, rows) = self.artist_catalog(query).await?;
        Ok(rows)
    }

    pub async fn top_tracks(&self, query: &ArtistQuery)
        -> Result<Vec<Track>, PipelineError> {
        let artist = self.resolve_artist(query).await?;
        self.source.top_tracks(&self.token, &artist.id).await
    }

    pub async fn related_artists(&self, query: &ArtistQuery)
        -> Result<Vec<Artist>, PipelineError> {
        let artist = self.resolve_artist(query).await?;
        self.source.related_artists(&self.token, &artist.id).await
    }
}

async fn album_track_listing<S: CatalogSource>(
    source: &S,
    token: &str,
    album_id: &str,
    page_size: u32,
) -> Result<Vec<Track>, PipelineError> {
    let mut collected: Vec<Track> = Vec::new();
    let mut offset = 0_u32;
    loop {
        let page = source.track_page(token, album_id, page_size, offset).await?;
        let fetched = page.len();
        debug!(album = %album_id, offset, fetched, "tracks.page");
        collected.extend(page);
        if fetched < page_size as usize {
            break;
        }
        offset += fetched as u32;
    }
    Ok(collected)
}

/// Joins tracks with features on track id (left join from tracks) and
/// album fields onto the result on album id (left join from albums, so an
/// album with zero tracks still contributes one row). Canonical sources:
/// `duration_ms` from the track stage, `artist_id`/`artist_name` from the
/// album stage. Pure function of its inputs, so re-running it on the same
/// inputs yields an identical row set.
pub fn merge(albums: &[Album], tracks: &[Track], features: &[AudioFeature])
    -> Vec<MergedRow> {
    let feature_by_track: HashMap<&str, &AudioFeature> = features.iter()
        .map(|f| (f.track_id.as_str(), f))
        .collect();

    let mut tracks_by_album: HashMap<&str, Vec<&Track>> = HashMap::new();
    for track in tracks {
        tracks_by_album.entry(track.album_id.as_str()).or_default().push(track);
    }

    let mut rows = Vec::with_capacity(tracks.len().max(albums.len()));
    for album in albums {
        match tracks_by_album.get(album.album_id.as_str()) {
            Some(album_tracks) => {
                for track in album_tracks.iter().copied() {
                    let feature = feature_by_track.get(track.track_id.as_str()).copied();
                    rows.push(merged_row(album, Some(track), feature));
                }
            }
            None => rows.push(merged_row(album, None, None)),
        }
    }
    rows
}

fn merged_row(album: &Album, track: Option<&Track>, feature: Option<&AudioFeature>)
    -> MergedRow {
    MergedRow {
        artist_id: album.artist_ids.clone(),
        artist_name: album.artist_names.clone(),

        album_id: album.album_id.clone(),
        album_name: album.album_name.clone(),
        album_type: album.album_type.clone(),
        release_date: album.release_date.clone(),
        release_date_precision: album.release_date_precision.clone(),
        release_year: album.release_year(),
        total_tracks: album.total_tracks,

        track_id: track.map(|t| t.track_id.clone()),
        track_name: track.map(|t| t.track_name.clone()),
        disc_number: track.and_then(|t| t.disc_number),
        // track-stage duration is canonical; the feature-stage duplicate
        // is dropped here
        duration_ms: track.and_then(|t| t.duration_ms),
        explicit: track.and_then(|t| t.explicit),
        popularity: track.and_then(|t| t.popularity),
        track_artist_ids: track.map(|t| t.artist_ids.clone()),
        track_artist_names: track.map(|t| t.artist_names.clone()),

        danceability: feature.and_then(|f| f.danceability),
        energy: feature.and_then(|f| f.energy),
        key: feature.and_then(|f| f.key),
        loudness: feature.and_then(|f| f.loudness),
        mode: feature.and_then(|f| f.mode),
        speechiness: feature.and_then(|f| f.speechiness),
        acousticness: feature.and_then(|f| f.acousticness),
        instrumentalness: feature.and_then(|f| f.instrumentalness),
        liveness: feature.and_then(|f| f.liveness),
        valence: feature.and_then(|f| f.valence),
        tempo: feature.and_then(|f| f.tempo),
        time_signature: feature.and_then(|f| f.time_signature),

        key_name: feature.map(|f| key_name(f.key).to_string()),
        mode_name: feature.and_then(|f| mode_name(f.mode).map(str::to_string)),
        key_mode: feature.and_then(|f| key_mode(f.key, f.mode)),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::catalog::{ensure_feature_chunk, AlbumPage, CatalogSource};
    use crate::errors::PipelineError;
    use crate::types::{Album, Artist, AudioFeature, Track};

    pub fn artist(id: &str, name: &str) -> Artist {
        Artist {
            id: id.to_string(),
            name: name.to_string(),
            genres: String::new(),
            popularity: None,
            followers: None,
        }
    }

    pub fn album(id: &str, artist_id: &str, artist_name: &str) -> Album {
        Album {
            album_id: id.to_string(),
            album_name: format!("album {id}"),
            album_type: Some("album".to_string()),
            release_date: Some("2020-01-10".to_string()),
            release_date_precision: Some("day".to_string()),
            total_tracks: None,
            artist_ids: artist_id.to_string(),
            artist_names: artist_name.to_string(),
        }
    }

    pub fn track(id: &str, album_id: &str, duration_ms: i64) -> Track {
        Track {
            track_id: id.to_string(),
            track_name: format!("track {id}"),
            disc_number: Some(1),
            duration_ms: Some(duration_ms),
            explicit: Some(false),
            popularity: None,
            artist_ids: "x9".to_string(),
            artist_names: "Guest".to_string(),
            album_id: album_id.to_string(),
        }
    }

    pub fn feature(track_id: &str, duration_ms: i64) -> AudioFeature {
        AudioFeature {
            track_id: track_id.to_string(),
            danceability: Some(0.61),
            energy: Some(0.8),
            key: Some(9),
            loudness: Some(-6.3),
            mode: Some(0),
            speechiness: Some(0.04),
            acousticness: Some(0.12),
            instrumentalness: Some(0.0),
            liveness: Some(0.1),
            valence: Some(0.5),
            tempo: Some(120.0),
            duration_ms: Some(duration_ms),
            time_signature: Some(4),
        }
    }

    /// Fake upstream that slices canned data by offset/limit and counts
    /// calls per endpoint
    pub struct FakeSource {
        pub artists: Vec<Artist>,
        pub albums: Vec<Album>,
        pub tracks: Vec<Track>,
        pub features: Vec<AudioFeature>,
        pub report_total: bool,
        pub album_page_calls: AtomicUsize,
        pub track_page_calls: AtomicUsize,
        pub feature_calls: AtomicUsize,
    }

    impl FakeSource {
        pub fn new(artist: Artist) -> Self {
            Self {
                artists: vec![artist],
                albums: Vec::new(),
                tracks: Vec::new(),
                features: Vec::new(),
                report_total: false,
                album_page_calls: AtomicUsize::new(0),
                track_page_calls: AtomicUsize::new(0),
                feature_calls: AtomicUsize::new(0),
            }
        }

        pub fn album_pages(&self) -> usize {
            self.album_page_calls.load(Ordering::SeqCst)
        }

        pub fn feature_chunks(&self) -> usize {
            self.feature_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for FakeSource {
        async fn search_artists(&self, _token: &str, query: &str, limit: u32)
            -> Result<Vec<Artist>, PipelineError> {
            Ok(self.artists.iter()
                .filter(|a| a.name == query)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn artist(&self, _token: &str, artist_id: &str)
            -> Result<Artist, PipelineError> {
            self.artists.iter()
                .find(|a| a.id == artist_id)
                .cloned()
                .ok_or_else(|| PipelineError::Fetch(
                    format!("unknown artist {artist_id}")
                ))
        }

        async fn album_page(&self, _token: &str, artist_id: &str, limit: u32, offset: u32)
            -> Result<AlbumPage, PipelineError> {
            self.album_page_calls.fetch_add(1, Ordering::SeqCst);
            let owned: Vec<&Album> = self.albums.iter()
                .filter(|a| a.artist_ids == artist_id)
                .collect();
            let items = owned.iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|a| (*a).clone())
                .collect();
            let total = self.report_total.then(|| owned.len() as u64);
            Ok(AlbumPage { items, total })
        }

        async fn track_page(&self, _token: &str, album_id: &str, limit: u32, offset: u32)
            -> Result<Vec<Track>, PipelineError> {
            self.track_page_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tracks.iter()
                .filter(|t| t.album_id == album_id)
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn feature_chunk(&self, _token: &str, ids: &[String])
            -> Result<Vec<AudioFeature>, PipelineError> {
            ensure_feature_chunk(ids)?;
            self.feature_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids.iter()
                .filter_map(|id| {
                    self.features.iter().find(|f| &f.track_id == id).cloned()
                })
                .collect())
        }

        async fn top_tracks(&self, _token: &str, _artist_id: &str)
            -> Result<Vec<Track>, PipelineError> {
            Ok(self.tracks.iter().take(10).cloned().collect())
        }

        async fn related_artists(&self, _token: &str, artist_id: &str)
            -> Result<Vec<Artist>, PipelineError> {
            Ok(self.artists.iter()
                .filter(|a| a.id != artist_id)
                .cloned()
                .collect())
        }
    }
}
