//! YouTube catalog adapter
//!
//! Search needs two round trips: the search endpoint returns snippets
//! without durations, so matched video ids are re-fetched with
//! `contentDetails` for their ISO 8601 durations.

use crate::error::{LobbyError, Result};
use crate::providers::CatalogProvider;
use crate::types::{Track, TrackSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

pub struct YoutubeProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: String,
    thumbnails: Thumbnails,
}

#[derive(Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
struct VideosResponse {
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

/// Parse an ISO 8601 duration of the shape YouTube emits (`PT1H2M3S`) into
/// whole seconds. Returns `None` for anything it does not recognize.
fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let rest = raw.strip_prefix("PT").or_else(|| raw.strip_prefix("P0DT"))?;

    let mut seconds = 0u64;
    let mut number = String::new();
    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
            continue;
        }
        let value: u64 = number.parse().ok()?;
        number.clear();
        match ch {
            'H' => seconds += value * 3600,
            'M' => seconds += value * 60,
            'S' => seconds += value,
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(seconds)
}

impl YoutubeProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    async fn durations_for(
        &self,
        api_key: &str,
        video_ids: &[String],
    ) -> Result<HashMap<String, u64>> {
        let response = self
            .client
            .get(VIDEOS_URL)
            .query(&[
                ("part", "contentDetails"),
                ("id", &video_ids.join(",")),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LobbyError::ProviderUnavailable {
                message: format!("youtube videos lookup returned {}", response.status()),
            }
            .into());
        }

        let parsed: VideosResponse = response.json().await?;
        Ok(parsed
            .items
            .into_iter()
            .filter_map(|item| {
                parse_iso8601_duration(&item.content_details.duration).map(|d| (item.id, d))
            })
            .collect())
    }
}

#[async_trait]
impl CatalogProvider for YoutubeProvider {
    fn source(&self) -> TrackSource {
        TrackSource::Youtube
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let Some(api_key) = &self.api_key else {
            return Err(LobbyError::ProviderUnavailable {
                message: "youtube api key missing".to_string(),
            }
            .into());
        };

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("maxResults", &limit.to_string()),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LobbyError::ProviderUnavailable {
                message: format!("youtube search returned {}", response.status()),
            }
            .into());
        }

        let parsed: SearchResponse = response.json().await?;
        if parsed.items.is_empty() {
            return Ok(Vec::new());
        }

        let video_ids: Vec<String> = parsed.items.iter().map(|i| i.id.video_id.clone()).collect();
        let durations = self.durations_for(api_key, &video_ids).await?;

        Ok(parsed
            .items
            .into_iter()
            .map(|item| {
                let duration_secs = durations
                    .get(&item.id.video_id)
                    .map(|d| (*d).max(1) as u32)
                    .unwrap_or(0);
                Track {
                    url: format!("https://www.youtube.com/watch?v={}", item.id.video_id),
                    id: item.id.video_id,
                    title: item.snippet.title,
                    artist: item.snippet.channel_title,
                    artwork_url: item.snippet.thumbnails.default.map(|t| t.url),
                    preview_url: None,
                    stream_url: None,
                    source: TrackSource::Youtube,
                    started_at: None,
                    duration_secs,
                }
            })
            .collect())
    }
}
