use url::Url;
use std::time;
use crate::errors::PipelineError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

/// Wrapper over env::var to return an invalid environment var error
fn env_check(s: &str) -> Result<String, PipelineError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PipelineError::Config(format!("{s} was not set"))),
    }
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Configuration the catalog upstream expects when hitting endpoints
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
    pub market: String,
    pub include_groups: String,
}

fn build_spotify() -> Result<SpotifyConfig, PipelineError> {
    let client_id     = env_check("SPOTIFY_CLIENT_ID")?;
    let client_secret = env_check("SPOTIFY_CLIENT_SECRET")?;

    // form urls
    let token_url = std::env::var("SPOTIFY_TOKEN_URL")
        .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string());

    let api_base  = std::env::var("SPOTIFY_API_BASE")
        .unwrap_or_else(|_| "https://api.spotify.com/v1/".to_string());

    let token_url = Url::parse(&token_url)
        .map_err(|_| PipelineError::Config(
            "SPOTIFY_TOKEN_URL invalid".to_string()
        ))?;

    let mut api_base  = Url::parse(&api_base)
        .map_err(|_| PipelineError::Config(
            "SPOTIFY_API_BASE invalid".to_string()
        ))?;

    // ensure valid https and hostname for both urls
    ensure_https(&token_url).map_err(PipelineError::Config)?;
    ensure_https(&api_base).map_err(PipelineError::Config)?;
    ensure_host(&token_url, "accounts.spotify.com")
        .map_err(PipelineError::Config)?;
    ensure_host(&api_base, "api.spotify.com")
        .map_err(PipelineError::Config)?;

    ensure_trailing_slash(&mut api_base);

    let market = std::env::var("SPOTIFY_MARKET")
        .unwrap_or_else(|_| "US".to_string());

    // which release groups an album listing is restricted to
    let include_groups = std::env::var("SPOTIFY_INCLUDE_GROUPS")
        .unwrap_or_else(|_| "album".to_string());

    Ok( SpotifyConfig {
        client_id, client_secret, token_url, api_base, market, include_groups
    })
}

///
/// Configuration for Http timeouts, pooling, etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
        }
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,rs_artist_catalog=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            include_file_line: true,
            include_target: true,
        }
    }
}

///
/// AppConfig which holds everything needed by the fetch module and main
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, PipelineError> {
    dotenvy::dotenv().ok();

    let spotify = build_spotify()?;
    let http    = HttpConfig::default();
    let logging = LoggingConfig::default();

    Ok( AppConfig { spotify, http, logging } )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_and_host_checks() {
        let ok  = Url::parse("https://api.spotify.com/v1/").unwrap();
        let bad = Url::parse("http://api.spotify.com/v1/").unwrap();
        assert!(ensure_https(&ok).is_ok());
        assert!(ensure_https(&bad).is_err());
        assert!(ensure_host(&ok, "api.spotify.com").is_ok());
        assert!(ensure_host(&ok, "accounts.spotify.com").is_err());
    }

    #[test]
    fn trailing_slash_is_appended_once() {
        let mut url = Url::parse("https://api.spotify.com/v1").unwrap();
        ensure_trailing_slash(&mut url);
        assert_eq!(url.path(), "/v1/");
        ensure_trailing_slash(&mut url);
        assert_eq!(url.path(), "/v1/");
    }
}
