//!
//! src/summary.rs
//!
//! Reduces a merged per-track table to one row of descriptive statistics
//! per artist
//!

use std::collections::BTreeMap;

use tracing::info;

use crate::catalog::CatalogSource;
use crate::errors::PipelineError;
use crate::pipeline::Pipeline;
use crate::types::{Artist, ArtistQuery, ArtistSummary, MergedRow, NUMERIC_FEATURES};

/// Arithmetic mean and sample standard deviation for each numeric feature
/// column, computed over the rows where the column is present. Columns
/// with no values contribute no stat keys; a column with one value gets a
/// mean but no deviation.
pub fn reduce(artist: &Artist, rows: &[MergedRow]) -> Result<ArtistSummary, PipelineError> {
    if rows.is_empty() {
        return Err(PipelineError::EmptyResult(
            format!("no rows to summarize for artist {}", artist.id)
        ));
    }

    let mut stats: BTreeMap<String, f64> = BTreeMap::new();
    for feature in NUMERIC_FEATURES {
        let values: Vec<f64> = rows.iter()
            .filter_map(|r| r.numeric(feature))
            .collect();
        if values.is_empty() {
            continue;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        stats.insert(format!("mean_{feature}"), mean);

        if values.len() > 1 {
            let variance = values.iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>() / (n - 1.0);
            stats.insert(format!("std_{feature}"), variance.sqrt());
        }
    }

    Ok(ArtistSummary {
        artist_id: artist.id.clone(),
        artist_name: artist.name.clone(),
        track_count: rows.iter().filter(|r| r.track_id.is_some()).count(),
        stats,
    })
}

/// One summary row per artist query, in the caller's order. Any per-artist
/// failure aborts the whole batch.
pub async fn artists_summary<S: CatalogSource + 'static>(
    pipeline: &Pipeline<S>,
    queries: &[ArtistQuery],
) -> Result<Vec<ArtistSummary>, PipelineError> {
    if queries.is_empty() {
        return Err(PipelineError::Validation(
            "no artist ids or names given".to_string()
        ));
    }

    let mut summaries = Vec::with_capacity(queries.len());
    for query in queries {
        let (artist, rows) = pipeline.artist_catalog(query).await?;
        let summary = reduce(&artist, &rows)?;
        info!(
            artist = %summary.artist_id,
            tracks = summary.track_count,
            "summary.row"
        );
        summaries.push(summary);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::pipeline::testutil::*;
    use crate::pipeline::{merge, Pipeline, PipelineLimits};

    use super::*;

    #[test]
    fn reduce_computes_mean_and_sample_std() {
        let albums = vec![album("al1", "x1", "Somebody")];
        let tracks = vec![
            track("t1", "al1", 100_000),
            track("t2", "al1", 200_000),
            track("t3", "al1", 300_000),
        ];
        let mut features = vec![
            feature("t1", 100_000),
            feature("t2", 200_000),
            feature("t3", 300_000),
        ];
        features[0].danceability = Some(0.2);
        features[1].danceability = Some(0.4);
        features[2].danceability = Some(0.6);

        let rows = merge(&albums, &tracks, &features);
        let summary = reduce(&artist("x1", "Somebody"), &rows).unwrap();

        assert_eq!(summary.track_count, 3);
        assert!((summary.stats["mean_danceability"] - 0.4).abs() < 1e-9);
        assert!((summary.stats["std_danceability"] - 0.2).abs() < 1e-9);
        // canonical duration is the track-stage value
        assert!((summary.stats["mean_duration_ms"] - 200_000.0).abs() < 1e-9);
    }

    #[test]
    fn reduce_rejects_an_empty_table() {
        let err = reduce(&artist("x1", "Somebody"), &[]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult(_)));
    }

    #[test]
    fn single_value_gets_a_mean_but_no_deviation() {
        let albums = vec![album("al1", "x1", "Somebody")];
        let tracks = vec![track("t1", "al1", 100_000)];
        let features = vec![feature("t1", 100_000)];

        let rows = merge(&albums, &tracks, &features);
        let summary = reduce(&artist("x1", "Somebody"), &rows).unwrap();

        assert!(summary.stats.contains_key("mean_tempo"));
        assert!(!summary.stats.contains_key("std_tempo"));
    }

    #[tokio::test]
    async fn batch_preserves_caller_order() {
        let mut fake = FakeSource::new(artist("x1", "Alpha"));
        fake.artists.push(artist("x2", "Beta"));
        fake.artists.push(artist("x3", "Gamma"));
        for (artist_id, album_id, n_tracks) in
            [("x1", "al1", 1), ("x2", "al2", 3), ("x3", "al3", 2)] {
            fake.albums.push(album(album_id, artist_id, "name"));
            for t in 0..n_tracks {
                let track_id = format!("{album_id}-t{t}");
                fake.tracks.push(track(&track_id, album_id, 120_000));
                fake.features.push(feature(&track_id, 120_000));
            }
        }
        let source = Arc::new(fake);
        let pipeline = Pipeline::new(
            source, "test-token", PipelineLimits::default()
        );

        let queries = vec![
            ArtistQuery::Name("Gamma".into()),
            ArtistQuery::Name("Alpha".into()),
            ArtistQuery::Name("Beta".into()),
        ];
        let summaries = artists_summary(&pipeline, &queries).await.unwrap();

        let order: Vec<&str> = summaries.iter()
            .map(|s| s.artist_id.as_str())
            .collect();
        assert_eq!(order, vec!["x3", "x1", "x2"]);
        assert_eq!(summaries[0].track_count, 2);
        assert_eq!(summaries[1].track_count, 1);
        assert_eq!(summaries[2].track_count, 3);
    }

    #[tokio::test]
    async fn empty_query_list_is_a_validation_error() {
        let fake = FakeSource::new(artist("x1", "Alpha"));
        let pipeline = Pipeline::new(
            Arc::new(fake), "test-token", PipelineLimits::default()
        );

        let err = artists_summary(&pipeline, &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
