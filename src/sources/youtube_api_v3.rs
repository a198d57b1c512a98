use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error};

use super::{direct_track, is_http_url, youtube::is_youtube_url, Track, TrackResolver};
use crate::error::PlaybackError;

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:v=|youtu\.be/|embed/|shorts/|v/)([A-Za-z0-9_-]{11})").expect("valid video id pattern")
});

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

/// Resolves queries through the YouTube Data API v3 (one result, videos only).
pub struct YouTubeApiResolver {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeApiResolver {
    pub fn new(api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { api_key, client })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PlaybackError> {
        let response = self
            .client
            .get(endpoint)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| PlaybackError::Resolution(e.to_string()))?;

        if !response.status().is_success() {
            error!("❌ YouTube API returned {}", response.status());
            return Err(PlaybackError::Resolution(format!(
                "YouTube API returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PlaybackError::Resolution(format!("bad YouTube API payload: {}", e)))
    }

    async fn search(&self, query: &str) -> Result<Track, PlaybackError> {
        debug!("🔍 YouTube API search: {}", query);

        let response: SearchResponse = self
            .get(
                SEARCH_ENDPOINT,
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("maxResults", "1"),
                    ("q", query),
                ],
            )
            .await?;

        response
            .items
            .into_iter()
            .find_map(|item| {
                item.id
                    .video_id
                    .map(|id| Track::new(watch_url(&id), unescape_html(&item.snippet.title)))
            })
            .ok_or(PlaybackError::NoResults)
    }

    async fn lookup(&self, video_id: &str) -> Result<Track, PlaybackError> {
        debug!("📊 YouTube API lookup: {}", video_id);

        let response: VideosResponse = self
            .get(VIDEOS_ENDPOINT, &[("part", "snippet"), ("id", video_id)])
            .await?;

        response
            .items
            .into_iter()
            .next()
            .map(|item| Track::new(watch_url(&item.id), unescape_html(&item.snippet.title)))
            .ok_or(PlaybackError::NoResults)
    }
}

#[async_trait]
impl TrackResolver for YouTubeApiResolver {
    async fn resolve(&self, query: &str) -> Result<Track, PlaybackError> {
        if !is_http_url(query) {
            return self.search(query).await;
        }

        if !is_youtube_url(query) {
            return Ok(direct_track(query));
        }

        match extract_video_id(query) {
            Some(id) => self.lookup(&id).await,
            None => Err(PlaybackError::NoResults),
        }
    }

    fn name(&self) -> &'static str {
        "YouTube Data API v3"
    }
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

/// The search endpoint returns HTML-escaped titles.
fn unescape_html(title: &str) -> String {
    title
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
