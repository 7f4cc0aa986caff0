//! Spotify catalog adapter
//!
//! Searches use the client-credentials flow; the app token is cached until
//! shortly before expiry. User-facing authorization lives in `oauth`.

use crate::error::{LobbyError, Result};
use crate::providers::CatalogProvider;
use crate::types::{Track, TrackSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

/// Renew this far ahead of the reported expiry
const TOKEN_RENEWAL_MARGIN: Duration = Duration::from_secs(60);

pub struct SpotifyProvider {
    client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Deserialize)]
struct TrackPage {
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    artists: Vec<SpotifyArtist>,
    album: SpotifyAlbum,
    external_urls: ExternalUrls,
    preview_url: Option<String>,
    duration_ms: u64,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: String,
}

impl SpotifyProvider {
    pub fn new(
        client: reqwest::Client,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Fetch or reuse the app access token.
    async fn access_token(&self) -> Result<String> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(LobbyError::ProviderUnavailable {
                message: "spotify credentials missing".to_string(),
            }
            .into());
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting fresh Spotify app token");
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LobbyError::ProviderUnavailable {
                message: format!("spotify token request returned {}", response.status()),
            }
            .into());
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Instant::now()
            + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_RENEWAL_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}

impl From<SpotifyTrack> for Track {
    fn from(item: SpotifyTrack) -> Self {
        Track {
            id: item.id,
            title: item.name,
            artist: item
                .artists
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            url: item.external_urls.spotify,
            artwork_url: item.album.images.into_iter().next().map(|i| i.url),
            preview_url: item.preview_url,
            stream_url: None,
            source: TrackSource::Spotify,
            started_at: None,
            duration_secs: (item.duration_ms / 1000).max(1) as u32,
        }
    }
}

#[async_trait]
impl CatalogProvider for SpotifyProvider {
    fn source(&self) -> TrackSource {
        TrackSource::Spotify
    }

    fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("type", "track"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LobbyError::ProviderUnavailable {
                message: format!("spotify search returned {}", response.status()),
            }
            .into());
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.tracks.items.into_iter().map(Track::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_maps_to_tracks() {
        let json = r#"{
            "tracks": {
                "items": [{
                    "id": "4uLU6hMCjMI75M1A2tKUQC",
                    "name": "Never Gonna Give You Up",
                    "artists": [{"name": "Rick Astley"}],
                    "album": {"images": [{"url": "https://i.scdn.co/image/cover"}]},
                    "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMC"},
                    "preview_url": null,
                    "duration_ms": 213573
                }]
            }
        }"#;

        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let tracks: Vec<Track> = parsed.tracks.items.into_iter().map(Track::from).collect();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].source, TrackSource::Spotify);
        assert_eq!(tracks[0].artist, "Rick Astley");
        assert_eq!(tracks[0].duration_secs, 213);
        assert_eq!(
            tracks[0].artwork_url.as_deref(),
            Some("https://i.scdn.co/image/cover")
        );
        assert!(tracks[0].started_at.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_rejects_search() {
        let provider = SpotifyProvider::new(reqwest::Client::new(), None, None);
        assert!(!provider.is_configured());

        let err = provider.search("query", 10).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::ProviderUnavailable { .. })
        ));
    }
}
