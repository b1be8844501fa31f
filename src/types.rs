use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Delimiter for flattened multi-artist columns
pub const ARTIST_JOIN: &str = ", ";

/// Fixed pitch-class lookup for integer key codes 0..=11
pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C♯/D♭", "D", "D♯/E♭", "E", "F",
    "F♯/G♭", "G", "G♯/A♭", "A", "A♯/B♭", "B",
];

/// Sentinel for undetected or out-of-range key codes
pub const UNKNOWN_KEY: &str = "Unknown";

/// Numeric feature columns the summary reducer aggregates over
pub const NUMERIC_FEATURES: [&str; 11] = [
    "danceability", "energy", "loudness", "speechiness", "acousticness",
    "instrumentalness", "liveness", "valence", "tempo", "duration_ms", "mode",
];

/// How an artist is selected at the pipeline entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtistQuery {
    Id(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub genres: String,
    pub popularity: Option<i64>,
    pub followers: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePrecision {
    Year,
    Month,
    Day,
}

impl ReleasePrecision {
    pub fn parse(s: &str) -> Option<ReleasePrecision> {
        match s {
            "year"  => Some(ReleasePrecision::Year),
            "month" => Some(ReleasePrecision::Month),
            "day"   => Some(ReleasePrecision::Day),
            _ => None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub album_id: String,
    pub album_name: String,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub total_tracks: Option<i64>,
    pub artist_ids: String,
    pub artist_names: String,
}

impl Album {
    pub fn release_year(&self) -> Option<i32> {
        release_year(
            self.release_date.as_deref()?,
            self.release_date_precision.as_deref().and_then(ReleasePrecision::parse),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: String,
    pub track_name: String,
    pub disc_number: Option<i64>,
    pub duration_ms: Option<i64>,
    pub explicit: Option<bool>,
    /// Not provided by the album-tracks endpoint, always absent here
    pub popularity: Option<i64>,
    pub artist_ids: String,
    pub artist_names: String,
    pub album_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeature {
    pub track_id: String,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i64>,
    pub loudness: Option<f64>,
    pub mode: Option<i64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub duration_ms: Option<i64>,
    pub time_signature: Option<i64>,
}

/// One denormalized row of the artist's catalog. Every column has exactly
/// one origin: `artist_id`/`artist_name` come from the album stage,
/// `duration_ms` from the track stage, so no suffixed duplicates can exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    pub artist_id: String,
    pub artist_name: String,

    pub album_id: String,
    pub album_name: String,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub release_year: Option<i32>,
    pub total_tracks: Option<i64>,

    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub disc_number: Option<i64>,
    pub duration_ms: Option<i64>,
    pub explicit: Option<bool>,
    pub popularity: Option<i64>,
    pub track_artist_ids: Option<String>,
    pub track_artist_names: Option<String>,

    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i64>,
    pub loudness: Option<f64>,
    pub mode: Option<i64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub time_signature: Option<i64>,

    pub key_name: Option<String>,
    pub mode_name: Option<String>,
    pub key_mode: Option<String>,
}

impl MergedRow {
    /// Accessor used by the summary reducer; names match NUMERIC_FEATURES
    pub fn numeric(&self, feature: &str) -> Option<f64> {
        match feature {
            "danceability"     => self.danceability,
            "energy"           => self.energy,
            "loudness"         => self.loudness,
            "speechiness"      => self.speechiness,
            "acousticness"     => self.acousticness,
            "instrumentalness" => self.instrumentalness,
            "liveness"         => self.liveness,
            "valence"          => self.valence,
            "tempo"            => self.tempo,
            "duration_ms"      => self.duration_ms.map(|v| v as f64),
            "mode"             => self.mode.map(|v| v as f64),
            _ => None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub artist_id: String,
    pub artist_name: String,
    pub track_count: usize,
    #[serde(flatten)]
    pub stats: BTreeMap<String, f64>,
}

/// Year extraction is total across precisions: `day` dates are parsed as
/// full calendar dates, everything else falls back to the four-digit prefix.
pub fn release_year(date: &str, precision: Option<ReleasePrecision>) -> Option<i32> {
    if precision == Some(ReleasePrecision::Day) {
        if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(d.year());
        }
    }
    date.get(..4).and_then(|prefix| prefix.parse::<i32>().ok())
}

pub fn key_name(code: Option<i64>) -> &'static str {
    match code {
        Some(k) if (0..=11).contains(&k) => PITCH_CLASSES[k as usize],
        _ => UNKNOWN_KEY,
    }
}

pub fn mode_name(mode: Option<i64>) -> Option<&'static str> {
    match mode {
        Some(1) => Some("major"),
        Some(0) => Some("minor"),
        _ => None,
    }
}

pub fn key_mode(code: Option<i64>, mode: Option<i64>) -> Option<String> {
    mode_name(mode).map(|m| format!("{} {}", key_name(code), m))
}
