use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{direct_track, is_http_url, Track, TrackResolver};
use crate::error::PlaybackError;

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("valid YouTube URL pattern")
});

pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Subset of `yt-dlp --dump-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    webpage_url: Option<String>,
    url: Option<String>,
    id: Option<String>,
}

impl YtDlpInfo {
    fn into_track(self) -> Option<Track> {
        let locator = self
            .webpage_url
            .or_else(|| self.url.filter(|url| is_http_url(url)))
            .or_else(|| {
                self.id
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })?;

        Some(Track::new(locator, self.title))
    }
}

/// Resolves queries by shelling out to yt-dlp.
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, PlaybackError> {
        let output = timeout(self.timeout, Command::new(&self.binary).args(args).output())
            .await
            .map_err(|_| PlaybackError::Resolution("yt-dlp timed out".to_string()))?
            .map_err(|e| PlaybackError::Resolution(format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp error: {}", error.trim());
            return Err(PlaybackError::Resolution(format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// First parseable entry of line-delimited yt-dlp JSON.
fn first_track(stdout: &str) -> Option<Track> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .find_map(YtDlpInfo::into_track)
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, PlaybackError> {
        let stdout = if is_http_url(query) {
            if !is_youtube_url(query) {
                return Ok(direct_track(query));
            }
            debug!("📊 Fetching info for {}", query);
            self.run(&["--no-playlist", "--dump-json", "--no-warnings", query])
                .await?
        } else {
            info!("🔍 Searching YouTube: {}", query);
            let search = format!("ytsearch1:{}", query);
            self.run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search,
            ])
            .await?
        };

        first_track(&stdout).ok_or(PlaybackError::NoResults)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
