//! Catalog provider adapters
//!
//! Each adapter maps one upstream music API onto the shared `Track` shape.
//! Providers are optional: one with no credentials reports itself
//! unconfigured and the aggregator degrades its slice of the results to a
//! warning instead of failing the whole search.

pub mod oauth;
pub mod soundcloud;
pub mod spotify;
pub mod youtube;

pub use oauth::SpotifyOauth;
pub use soundcloud::SoundcloudProvider;
pub use spotify::SpotifyProvider;
pub use youtube::YoutubeProvider;

use crate::config::ProviderSettings;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::types::{Track, TrackSource};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default number of results requested per provider
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// One upstream music catalog
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    fn source(&self) -> TrackSource;

    /// Whether credentials for this provider were supplied
    fn is_configured(&self) -> bool;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>>;
}

/// Merged search result. Provider failures land in `warnings`, never in an
/// error; a search against fully unconfigured providers succeeds with an
/// empty track list and three warnings.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub tracks: Vec<Track>,
    pub warnings: Vec<String>,
}

/// Fans a query out across the configured providers
pub struct SearchAggregator {
    providers: Vec<Box<dyn CatalogProvider>>,
    metrics: Arc<MetricsCollector>,
}

impl SearchAggregator {
    pub fn from_config(settings: &ProviderSettings, metrics: Arc<MetricsCollector>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;

        let providers: Vec<Box<dyn CatalogProvider>> = vec![
            Box::new(SpotifyProvider::new(
                client.clone(),
                settings.spotify_client_id.clone(),
                settings.spotify_client_secret.clone(),
            )),
            Box::new(SoundcloudProvider::new(
                client.clone(),
                settings.soundcloud_client_id.clone(),
            )),
            Box::new(YoutubeProvider::new(client, settings.youtube_api_key.clone())),
        ];

        Ok(Self { providers, metrics })
    }

    /// Providers with credentials present (for health reporting)
    pub fn configured_count(&self) -> usize {
        self.providers.iter().filter(|p| p.is_configured()).count()
    }

    /// Search one source, or all of them when `source` is `None`.
    pub async fn search(&self, query: &str, source: Option<TrackSource>) -> SearchOutcome {
        let mut tracks = Vec::new();
        let mut warnings = Vec::new();

        for provider in &self.providers {
            if let Some(wanted) = source {
                if provider.source() != wanted {
                    continue;
                }
            }

            self.metrics
                .search_requests_total
                .with_label_values(&[provider.source().as_str()])
                .inc();

            if !provider.is_configured() {
                warnings.push(format!("{}: not configured", provider.source()));
                continue;
            }

            match provider.search(query, DEFAULT_SEARCH_LIMIT).await {
                Ok(found) => tracks.extend(found),
                Err(err) => {
                    warn!("Search against {} failed: {:#}", provider.source(), err);
                    warnings.push(format!("{}: search failed", provider.source()));
                }
            }
        }

        SearchOutcome { tracks, warnings }
    }
}
