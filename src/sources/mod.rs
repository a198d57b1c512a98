//! Track resolution and audio inputs.
//!
//! A [`TrackResolver`] turns the free text of a `play` request into a single
//! [`Track`]; a [`SongbirdSource`] turns that track into a lazily-initialised
//! songbird [`Input`] when the engine is ready to play it.

pub mod youtube;
pub mod youtube_api_v3;

use async_trait::async_trait;
use songbird::input::{HttpRequest, Input, YoutubeDl};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::{audio::engine::AudioSource, config::Config, error::PlaybackError};

pub use youtube::YtDlpResolver;
pub use youtube_api_v3::YouTubeApiResolver;

/// A resolved, playable unit: where the audio lives and what to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    locator: String,
    title: String,
}

impl Track {
    pub fn new(locator: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            title: title.into(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Maps a search string (or URL) to the first matching track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, PlaybackError>;

    fn name(&self) -> &'static str;
}

/// Picks the resolver for this deployment: the Data API when a key is
/// configured, yt-dlp search otherwise.
pub fn resolver_from_config(config: &Config) -> anyhow::Result<Arc<dyn TrackResolver>> {
    let timeout = Duration::from_secs(config.resolve_timeout_secs);

    let resolver: Arc<dyn TrackResolver> = match &config.youtube_api_key {
        Some(key) => Arc::new(YouTubeApiResolver::new(key.clone(), timeout)?),
        None => Arc::new(YtDlpResolver::new(timeout)),
    };

    info!("🔍 Resolving queries with {}", resolver.name());
    Ok(resolver)
}

pub fn is_http_url(query: &str) -> bool {
    Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Track for a plain audio URL, titled after its last path segment.
pub fn direct_track(url: &str) -> Track {
    let title = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| url.to_string());

    Track::new(url, title)
}

/// Builds songbird inputs for resolved tracks.
///
/// YouTube pages go through songbird's yt-dlp wrapper, everything else is
/// fetched as a plain HTTP stream. Both are lazy: no bytes are requested until
/// the driver starts the track.
pub struct SongbirdSource {
    client: reqwest::Client,
}

impl SongbirdSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl AudioSource<Input> for SongbirdSource {
    fn check(&self, track: &Track) -> Result<(), PlaybackError> {
        if is_http_url(track.locator()) {
            Ok(())
        } else {
            Err(PlaybackError::Resolution(format!(
                "unplayable locator: {}",
                track.locator()
            )))
        }
    }

    fn open(&self, track: &Track) -> Result<Input, PlaybackError> {
        self.check(track)?;

        let input = if youtube::is_youtube_url(track.locator()) {
            debug!("🎵 yt-dlp input for {}", track.title());
            YoutubeDl::new(self.client.clone(), track.locator().to_string()).into()
        } else {
            debug!("🌐 HTTP input for {}", track.title());
            HttpRequest::new(self.client.clone(), track.locator().to_string()).into()
        };

        Ok(input)
    }
}
