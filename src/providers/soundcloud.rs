//! SoundCloud catalog adapter

use crate::error::{LobbyError, Result};
use crate::providers::CatalogProvider;
use crate::types::{Track, TrackSource};
use async_trait::async_trait;
use serde::Deserialize;

const SEARCH_URL: &str = "https://api.soundcloud.com/tracks";

pub struct SoundcloudProvider {
    client: reqwest::Client,
    client_id: Option<String>,
}

#[derive(Deserialize)]
struct SoundcloudTrack {
    id: u64,
    title: String,
    permalink_url: String,
    artwork_url: Option<String>,
    stream_url: Option<String>,
    /// Milliseconds
    duration: u64,
    user: SoundcloudUser,
}

#[derive(Deserialize)]
struct SoundcloudUser {
    username: String,
}

impl SoundcloudProvider {
    pub fn new(client: reqwest::Client, client_id: Option<String>) -> Self {
        Self { client, client_id }
    }
}

impl From<SoundcloudTrack> for Track {
    fn from(item: SoundcloudTrack) -> Self {
        Track {
            id: item.id.to_string(),
            title: item.title,
            artist: item.user.username,
            url: item.permalink_url,
            artwork_url: item.artwork_url,
            preview_url: None,
            stream_url: item.stream_url,
            source: TrackSource::Soundcloud,
            started_at: None,
            duration_secs: (item.duration / 1000).max(1) as u32,
        }
    }
}

#[async_trait]
impl CatalogProvider for SoundcloudProvider {
    fn source(&self) -> TrackSource {
        TrackSource::Soundcloud
    }

    fn is_configured(&self) -> bool {
        self.client_id.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let Some(client_id) = &self.client_id else {
            return Err(LobbyError::ProviderUnavailable {
                message: "soundcloud client id missing".to_string(),
            }
            .into());
        };

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", query),
                ("client_id", client_id),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LobbyError::ProviderUnavailable {
                message: format!("soundcloud search returned {}", response.status()),
            }
            .into());
        }

        let parsed: Vec<SoundcloudTrack> = response.json().await?;
        Ok(parsed.into_iter().map(Track::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_maps_to_tracks() {
        let json = r#"[{
            "id": 13158665,
            "title": "Munching at Tiannas house",
            "permalink_url": "https://soundcloud.com/user2835985/munching-at-tiannas-house",
            "artwork_url": null,
            "stream_url": "https://api.soundcloud.com/tracks/13158665/stream",
            "duration": 18109,
            "user": {"username": "user2835985"}
        }]"#;

        let parsed: Vec<SoundcloudTrack> = serde_json::from_str(json).unwrap();
        let tracks: Vec<Track> = parsed.into_iter().map(Track::from).collect();

        assert_eq!(tracks[0].id, "13158665");
        assert_eq!(tracks[0].source, TrackSource::Soundcloud);
        assert_eq!(tracks[0].artist, "user2835985");
        assert_eq!(tracks[0].duration_secs, 18);
        assert!(tracks[0].stream_url.is_some());
    }

    #[test]
    fn test_sub_second_duration_rounds_up() {
        let json = r#"[{
            "id": 1,
            "title": "Blip",
            "permalink_url": "https://soundcloud.com/x/blip",
            "artwork_url": null,
            "stream_url": null,
            "duration": 400,
            "user": {"username": "x"}
        }]"#;

        let parsed: Vec<SoundcloudTrack> = serde_json::from_str(json).unwrap();
        let track = Track::from(parsed.into_iter().next().unwrap());
        assert_eq!(track.duration_secs, 1);
    }
}
