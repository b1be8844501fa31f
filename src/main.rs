//!
//! src/main.rs
//!
//! Wires config, logging, token acquisition, and the aggregation
//! pipeline together behind a small argument surface
//!
//!

mod catalog;
mod config;
mod errors;
mod fetch;
mod logging;
mod pipeline;
mod summary;
mod types;

use std::sync::Arc;

use crate::errors::PipelineError;
use crate::types::ArtistQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Rows,
    Summary,
    TopTracks,
    Related,
}

/// Bare 22-char base62 strings and spotify:artist: URIs are identifiers,
/// everything else goes through search
fn classify(arg: &str) -> ArtistQuery {
    if let Some(id) = arg.strip_prefix("spotify:artist:") {
        return ArtistQuery::Id(id.to_string());
    }
    if arg.len() == 22 && arg.chars().all(|c| c.is_ascii_alphanumeric()) {
        return ArtistQuery::Id(arg.to_string());
    }
    ArtistQuery::Name(arg.to_string())
}

fn parse_args(args: &[String]) -> Result<(Mode, Vec<ArtistQuery>), PipelineError> {
    let mut mode = Mode::Rows;
    let mut queries = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--summary"    => mode = Mode::Summary,
            "--top-tracks" => mode = Mode::TopTracks,
            "--related"    => mode = Mode::Related,
            flag if flag.starts_with("--") => {
                return Err(PipelineError::Validation(
                    format!("unknown flag {flag}")
                ));
            }
            other => queries.push(classify(other)),
        }
    }

    if queries.is_empty() {
        return Err(PipelineError::Validation(
            "no artist ids or names given".to_string()
        ));
    }
    Ok((mode, queries))
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let cfgs = config::load_config()?;
    let _logger = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service = "rs-artist-catalog",
        version = %env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (mode, queries) = parse_args(&args)?;

    let client = fetch::SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;
    let token = fetch::request_access_token(&client).await?;

    let source = Arc::new(catalog::SpotifyCatalog::new(client));
    let pipeline = pipeline::Pipeline::new(
        source,
        token,
        pipeline::PipelineLimits::default()
    );

    match mode {
        Mode::Rows => {
            for query in &queries {
                for row in pipeline.artist_track_features(query).await? {
                    println!("{}", serde_json::to_string(&row)?);
                }
            }
        }
        Mode::Summary => {
            for row in summary::artists_summary(&pipeline, &queries).await? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        Mode::TopTracks => {
            for query in &queries {
                for track in pipeline.top_tracks(query).await? {
                    println!("{}", serde_json::to_string(&track)?);
                }
            }
        }
        Mode::Related => {
            for query in &queries {
                for related in pipeline.related_artists(query).await? {
                    println!("{}", serde_json::to_string(&related)?);
                }
            }
        }
    }

    Ok(())
}
