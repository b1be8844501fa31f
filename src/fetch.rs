//!
//! src/fetch.rs
//!
//! Defines methods for hitting the catalog endpoints and
//! returning unparsed data
//!

use reqwest::{Client, header, redirect, RequestBuilder};
use crate::config::{HttpConfig, SpotifyConfig};
use crate::errors::PipelineError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, PipelineError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| PipelineError::Fetch(format!("build client: {e}")))
}

/// Sends one request and decodes the JSON body. There is no retry layer:
/// any non-success status or transport failure is fatal to the caller.
pub async fn send_json(
    request: RequestBuilder,
    context: &str
) -> Result<serde_json::Value, PipelineError> {
    let response = request.send().await
        .map_err(|e| PipelineError::Fetch(format!("{context}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PipelineError::Fetch(
            format!("{context}: status {status}: {body}")
        ));
    }
    let value = response.json::<serde_json::Value>().await
        .map_err(|e| PipelineError::Fetch(format!("{context}: decode: {e}")))?;
    Ok(value)
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    pub http: Client,
    pub cfg: SpotifyConfig
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) ->
        Result<Self, PipelineError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, PipelineError> {
        self.cfg.api_base.join(path)
            .map_err(|e| PipelineError::Config(format!("endpoint {path}: {e}")))
    }

    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// GET /v1/search?type=...&q=...&limit=&offset=
    pub fn search(&self, kind: &str, query: &str, limit: u32, bearer: &str) ->
        Result<RequestBuilder, PipelineError> {
        let url = self.endpoint("search")?;
        Ok(self.http.get(url).bearer_auth(bearer).query(&[
            ("type", kind),
            ("q", query),
            ("market", &self.cfg.market),
            ("limit", &limit.to_string()),
        ]))
    }

    /// GET /v1/artists/{id}
    pub fn artist(&self, artist_id: &str, bearer: &str) ->
        Result<RequestBuilder, PipelineError> {
        let url = self.endpoint(&format!("artists/{artist_id}"))?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }

    /// GET /v1/artists/{id}/albums?include_groups=&market=&limit=&offset=
    pub fn artist_albums(&self, artist_id: &str, limit: u32, offset: u32, bearer: &str)
        -> Result<RequestBuilder, PipelineError> {
        let url = self.endpoint(&format!("artists/{artist_id}/albums"))?;
        Ok(self.http.get(url).bearer_auth(bearer).query(&[
            ("include_groups", self.cfg.include_groups.as_str()),
            ("market", &self.cfg.market),
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string()),
        ]))
    }

    /// GET /v1/albums/{id}/tracks?market=&limit=&offset=
    pub fn album_tracks(&self, album_id: &str, limit: u32, offset: u32, bearer: &str)
        -> Result<RequestBuilder, PipelineError> {
        let url = self.endpoint(&format!("albums/{album_id}/tracks"))?;
        Ok(self.http.get(url).bearer_auth(bearer).query(&[
            ("market", self.cfg.market.as_str()),
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string()),
        ]))
    }

    /// GET /v1/audio-features?ids=...
    pub fn audio_features(&self, ids_csv: &str, bearer: &str) ->
        Result<RequestBuilder, PipelineError> {
        let url = self.endpoint("audio-features")?;
        Ok(self.http.get(url).bearer_auth(bearer).query(&[("ids", ids_csv)]))
    }

    /// GET /v1/artists/{id}/top-tracks?market=
    pub fn artist_top_tracks(&self, artist_id: &str, bearer: &str) ->
        Result<RequestBuilder, PipelineError> {
        let url = self.endpoint(&format!("artists/{artist_id}/top-tracks"))?;
        Ok(self.http.get(url).bearer_auth(bearer)
            .query(&[("market", self.cfg.market.as_str())]))
    }

    /// GET /v1/artists/{id}/related-artists
    pub fn related_artists(&self, artist_id: &str, bearer: &str) ->
        Result<RequestBuilder, PipelineError> {
        let url = self.endpoint(&format!("artists/{artist_id}/related-artists"))?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }
}

/// Client-credentials token acquisition, used by main only. The pipeline
/// itself receives the bearer as an opaque string and never reads ambient
/// credential state.
pub async fn request_access_token(
    client: &SpotifyClient
) -> Result<String, PipelineError> {
    let response = send_json(
        client.token_request().basic_auth(
            &client.cfg.client_id,
            Some(&client.cfg.client_secret)
        ),
        "token request"
    ).await?;

    let token = response["access_token"].as_str()
        .ok_or_else(|| PipelineError::Parse(
            "no access_token in token response".to_string()
        ))?
        .to_string();
    Ok(token)
}
