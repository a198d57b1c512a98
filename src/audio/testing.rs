//! In-memory voice link, audio source and reply used by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    audio::engine::{
        AudioSource, LinkWatch, OutputControl, TrackSignal, VoiceConnector, VoiceLink,
    },
    bot::reply::Reply,
    error::PlaybackError,
    sources::Track,
};

pub fn track(title: &str) -> Track {
    Track::new(format!("https://example.com/{}.mp3", title), title)
}

#[derive(Debug, Default, Clone)]
pub struct LinkLog {
    pub connects: usize,
    pub disconnects: usize,
    pub bound: Vec<String>,
    pub stopped: Vec<String>,
    pub pauses: usize,
    pub resumes: usize,
    /// Binds that happened while another stream was still audible.
    pub overlaps: usize,
}

#[derive(Default)]
struct Shared {
    log: LinkLog,
    audible: Option<String>,
    connected: bool,
    /// Streams that reached their end without the signal being delivered yet.
    ended: Vec<String>,
    signals: Vec<(String, TrackSignal)>,
    watches: Vec<LinkWatch>,
}

#[derive(Default)]
pub struct FakeConnector {
    shared: Arc<Mutex<Shared>>,
    fail_connect: AtomicBool,
    fail_bind: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn log(&self) -> LinkLog {
        self.shared.lock().log.clone()
    }

    pub fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_bind(&self) {
        self.fail_bind.store(true, Ordering::SeqCst);
    }

    pub fn take_signal(&self, title: &str) -> Option<TrackSignal> {
        let mut shared = self.shared.lock();
        let index = shared.signals.iter().position(|(t, _)| t == title)?;
        Some(shared.signals.remove(index).1)
    }

    /// Watch handed to the `n`th successful connect.
    pub fn watch(&self, n: usize) -> Option<LinkWatch> {
        self.shared.lock().watches.get(n).cloned()
    }

    /// The voice server dropped the bot; the engine is not told.
    pub fn drop_link(&self) {
        let mut shared = self.shared.lock();
        shared.connected = false;
        shared.audible = None;
    }

    /// The stream runs out but its completion is still in flight.
    pub fn end_silently(&self, title: &str) {
        let mut shared = self.shared.lock();
        if shared.audible.as_deref() == Some(title) {
            shared.audible = None;
        }
        shared.ended.push(title.to_string());
    }

    /// Plays the audible stream to its natural end.
    pub async fn finish_current(&self) {
        let signal = {
            let mut shared = self.shared.lock();
            let Some(title) = shared.audible.take() else {
                return;
            };
            let index = shared.signals.iter().position(|(t, _)| *t == title);
            index.map(|i| shared.signals.remove(i).1)
        };

        if let Some(signal) = signal {
            signal.finished().await;
        }
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    type Link = FakeLink;

    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
        watch: LinkWatch,
    ) -> Result<FakeLink, PlaybackError> {
        if self.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::VoiceLink("connect refused".to_string()));
        }

        let mut shared = self.shared.lock();
        shared.log.connects += 1;
        shared.connected = true;
        shared.watches.push(watch);
        drop(shared);

        Ok(FakeLink {
            shared: self.shared.clone(),
            fail_bind: self.fail_bind.clone(),
        })
    }
}

pub struct FakeLink {
    shared: Arc<Mutex<Shared>>,
    fail_bind: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceLink for FakeLink {
    type Stream = String;
    type Output = FakeOutput;

    async fn bind_output(
        &self,
        stream: String,
        signal: TrackSignal,
    ) -> Result<FakeOutput, PlaybackError> {
        if self.fail_bind.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::VoiceLink("bind refused".to_string()));
        }

        let mut shared = self.shared.lock();
        if shared.audible.is_some() {
            shared.log.overlaps += 1;
        }
        shared.audible = Some(stream.clone());
        shared.log.bound.push(stream.clone());
        shared.signals.push((stream.clone(), signal));

        Ok(FakeOutput {
            title: stream,
            shared: self.shared.clone(),
        })
    }

    async fn disconnect(&self) -> Result<(), PlaybackError> {
        let mut shared = self.shared.lock();
        shared.audible = None;
        shared.connected = false;
        shared.log.disconnects += 1;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }
}

pub struct FakeOutput {
    title: String,
    shared: Arc<Mutex<Shared>>,
}

impl OutputControl for FakeOutput {
    fn pause(&self) -> Result<(), PlaybackError> {
        let mut shared = self.shared.lock();
        if shared.ended.contains(&self.title) {
            return Err(PlaybackError::NotPlaying);
        }
        shared.log.pauses += 1;
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        let mut shared = self.shared.lock();
        if shared.ended.contains(&self.title) {
            return Err(PlaybackError::NotPaused);
        }
        shared.log.resumes += 1;
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        let mut shared = self.shared.lock();
        if shared.audible.as_deref() == Some(self.title.as_str()) {
            shared.audible = None;
        }
        shared.log.stopped.push(self.title.clone());
        Ok(())
    }
}

/// Streams are named after the track title so logs read naturally.
pub struct FakeSource;

impl AudioSource<String> for FakeSource {
    fn check(&self, track: &Track) -> Result<(), PlaybackError> {
        if track.locator().is_empty() {
            return Err(PlaybackError::Resolution("empty locator".to_string()));
        }
        Ok(())
    }

    fn open(&self, track: &Track) -> Result<String, PlaybackError> {
        self.check(track)?;
        Ok(track.title().to_string())
    }
}

#[derive(Default)]
pub struct RecordingReply {
    sent: Mutex<Vec<String>>,
}

impl RecordingReply {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Reply for RecordingReply {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}
