//! Per-guild playback state machine.
//!
//! The engine owns the guild's [`TrackQueue`], the single live voice link and
//! the output currently bound to it. Every mutation (enqueue-triggered start,
//! skip, pause, resume, completion advance) runs under one async mutex, so
//! requests arriving from concurrent command handlers are linearised and at
//! most one track is ever bound to the output.
//!
//! ```text
//!            enqueue / ensure_started
//!   Idle ───────────────────────────────▶ Playing ◀──── resume ──── Paused
//!    ▲                                    │  │  ▲                      ▲ │
//!    │ queue drained / link error         │  │  └── skip / finished ───┘ │
//!    └────────────────────────────────────┘  └──────── pause ────────────┘
//! ```

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    audio::queue::{QueueEntry, TrackQueue},
    bot::reply::Reply,
    error::PlaybackError,
    sources::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Control surface of the stream currently bound to a voice link.
///
/// Calls on a stream that already ended return a denial (`NotPlaying` or
/// `NotPaused`); its pending completion signal does the advancing.
pub trait OutputControl: Send + Sync + 'static {
    fn pause(&self) -> Result<(), PlaybackError>;
    fn resume(&self) -> Result<(), PlaybackError>;
    /// Stops delivery immediately; no further frames of this stream reach the link.
    fn stop(&self) -> Result<(), PlaybackError>;
}

/// A live voice connection able to carry one audio stream.
#[async_trait]
pub trait VoiceLink: Send + Sync + 'static {
    type Stream: Send + 'static;
    type Output: OutputControl;

    /// Binds `stream` as the only audible output. The link must call
    /// [`TrackSignal::finished`] or [`TrackSignal::failed`] when the stream
    /// ends.
    async fn bind_output(
        &self,
        stream: Self::Stream,
        signal: TrackSignal,
    ) -> Result<Self::Output, PlaybackError>;

    async fn disconnect(&self) -> Result<(), PlaybackError>;

    /// Whether the link is still joined to a voice channel.
    async fn is_connected(&self) -> bool;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync + 'static {
    type Link: VoiceLink;

    /// Joins `channel_id`. The link reports a dropped connection through
    /// `watch` for as long as it lives.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        watch: LinkWatch,
    ) -> Result<Self::Link, PlaybackError>;
}

/// Turns a resolved track into a stream a voice link can play.
///
/// Implementations must not block: `open` hands back a lazy stream whose
/// bytes are fetched by the driver, outside the engine lock.
pub trait AudioSource<S>: Send + Sync {
    /// Rejects tracks this source could never open.
    fn check(&self, track: &Track) -> Result<(), PlaybackError>;

    fn open(&self, track: &Track) -> Result<S, PlaybackError>;
}

pub type LinkStream<C> = <<C as VoiceConnector>::Link as VoiceLink>::Stream;
type LinkOutput<C> = <<C as VoiceConnector>::Link as VoiceLink>::Output;

#[async_trait]
trait SignalSink: Send + Sync {
    async fn track_finished(&self, generation: u64);
    async fn track_failed(&self, generation: u64, reason: String);
    async fn link_dropped(&self, epoch: u64, reason: String);
}

/// Single-use notification for the end of one bound track.
///
/// Consuming the signal is the only way to report completion, so each track
/// advances the queue at most once. Signals of tracks that were skipped or
/// torn down carry a stale generation and are ignored by the engine.
pub struct TrackSignal {
    generation: u64,
    sink: Weak<dyn SignalSink>,
}

impl TrackSignal {
    pub async fn finished(self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.track_finished(self.generation).await;
        }
    }

    pub async fn failed(self, reason: impl Into<String>) {
        if let Some(sink) = self.sink.upgrade() {
            sink.track_failed(self.generation, reason.into()).await;
        }
    }
}

/// Reports the loss of one voice connection.
///
/// Each connect gets a new epoch; reports for a connection that was already
/// released or replaced are ignored.
#[derive(Clone)]
pub struct LinkWatch {
    epoch: u64,
    sink: Weak<dyn SignalSink>,
}

impl LinkWatch {
    pub async fn lost(&self, reason: impl Into<String>) {
        if let Some(sink) = self.sink.upgrade() {
            sink.link_dropped(self.epoch, reason.into()).await;
        }
    }
}

impl std::fmt::Debug for LinkWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkWatch").field("epoch", &self.epoch).finish()
    }
}

impl std::fmt::Debug for TrackSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSignal")
            .field("generation", &self.generation)
            .finish()
    }
}

/// What a start attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The engine was already playing or paused; nothing changed.
    AlreadyActive,
    /// Nothing is queued.
    NothingQueued,
    /// The named track is now bound to the output.
    Started(String),
    /// Starting failed; the engine is idle and the queue untouched.
    Failed(PlaybackError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub title: String,
    pub position: usize,
    pub start: StartOutcome,
}

/// Result of moving past the current track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    NowPlaying(String),
    /// Queue empty, link released.
    Drained,
    /// The next track could not be started; the engine is idle.
    Failed(PlaybackError),
}

struct Session<C: VoiceConnector> {
    queue: TrackQueue,
    state: PlaybackState,
    link: Option<C::Link>,
    link_epoch: u64,
    output: Option<LinkOutput<C>>,
    generation: u64,
    announcer: Option<Arc<dyn Reply>>,
}

pub struct PlaybackEngine<C: VoiceConnector> {
    guild_id: GuildId,
    connector: Arc<C>,
    source: Arc<dyn AudioSource<LinkStream<C>>>,
    session: Mutex<Session<C>>,
    /// Held by whoever is about to announce; always taken before `session`.
    announcements: Mutex<()>,
    this: Weak<Self>,
}

impl<C: VoiceConnector> PlaybackEngine<C> {
    pub fn new(
        guild_id: GuildId,
        connector: Arc<C>,
        source: Arc<dyn AudioSource<LinkStream<C>>>,
        max_queue_size: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            guild_id,
            connector,
            source,
            session: Mutex::new(Session {
                queue: TrackQueue::new(max_queue_size),
                state: PlaybackState::Idle,
                link: None,
                link_epoch: 0,
                output: None,
                generation: 0,
                announcer: None,
            }),
            announcements: Mutex::new(()),
            this: this.clone(),
        })
    }

    pub async fn state(&self) -> PlaybackState {
        self.session.lock().await.state
    }

    pub async fn snapshot(&self) -> Vec<QueueEntry> {
        self.session.lock().await.queue.snapshot()
    }

    /// Orders announcements for this guild. A caller that replies about an
    /// operation holds the guard across the operation and its replies, so a
    /// completion-driven "now playing" can never overtake them.
    pub async fn hold_announcements(&self) -> MutexGuard<'_, ()> {
        self.announcements.lock().await
    }

    /// Appends `track` and starts playback if the engine is idle.
    ///
    /// Tracks the audio source rejects are never queued. A failure to start
    /// playback leaves the track queued and is reported in
    /// [`Enqueued::start`].
    pub async fn enqueue(
        &self,
        track: Track,
        channel_id: ChannelId,
        announcer: Arc<dyn Reply>,
    ) -> Result<Enqueued, PlaybackError> {
        self.source.check(&track)?;

        let title = track.title().to_string();
        let mut session = self.session.lock().await;
        let position = session.queue.enqueue(track)?;

        let start = self
            .start_if_idle(&mut session, channel_id, announcer)
            .await;

        Ok(Enqueued {
            title,
            position,
            start,
        })
    }

    /// Starts the queue head if nothing is playing. Idempotent while active.
    pub async fn ensure_started(
        &self,
        channel_id: ChannelId,
        announcer: Arc<dyn Reply>,
    ) -> StartOutcome {
        let mut session = self.session.lock().await;
        self.start_if_idle(&mut session, channel_id, announcer).await
    }

    /// Force-stops the current track and moves to the next one.
    pub async fn skip(&self) -> Result<Advance, PlaybackError> {
        let mut session = self.session.lock().await;

        if session.state == PlaybackState::Idle {
            return Err(PlaybackError::NoActiveTrack);
        }

        if let Some(output) = session.output.take() {
            if let Err(e) = output.stop() {
                warn!("⚠️ Could not stop skipped track in guild {}: {}", self.guild_id, e);
            }
        }

        info!("⏭️ Skipping in guild {}", self.guild_id);
        Ok(self.advance(&mut session).await)
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let mut session = self.session.lock().await;

        if session.state != PlaybackState::Playing {
            return Err(PlaybackError::NotPlaying);
        }

        let result = match &session.output {
            Some(output) => output.pause(),
            None => Err(PlaybackError::VoiceLink("no bound output".to_string())),
        };

        match result {
            Ok(()) => {
                session.state = PlaybackState::Paused;
                info!("⏸️ Paused in guild {}", self.guild_id);
                Ok(())
            }
            Err(e) if e.is_denial() => {
                debug!("Pause refused by output in guild {}: {}", self.guild_id, e);
                Err(e)
            }
            Err(e) => {
                self.tear_down(&mut session).await;
                Err(e)
            }
        }
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let mut session = self.session.lock().await;

        if session.state != PlaybackState::Paused {
            return Err(PlaybackError::NotPaused);
        }

        let result = match &session.output {
            Some(output) => output.resume(),
            None => Err(PlaybackError::VoiceLink("no bound output".to_string())),
        };

        match result {
            Ok(()) => {
                session.state = PlaybackState::Playing;
                info!("▶️ Resumed in guild {}", self.guild_id);
                Ok(())
            }
            Err(e) if e.is_denial() => {
                debug!("Resume refused by output in guild {}: {}", self.guild_id, e);
                Err(e)
            }
            Err(e) => {
                self.tear_down(&mut session).await;
                Err(e)
            }
        }
    }

    /// The bot was seen leaving voice. If the current link is in fact gone the
    /// engine goes idle and keeps its queue so the next `play` resumes from the
    /// same head. A report that arrives after a reconnect finds a live link
    /// and is ignored.
    pub async fn link_lost(&self) {
        let mut session = self.session.lock().await;
        let Some(link) = session.link.as_ref() else {
            return;
        };

        if link.is_connected().await {
            debug!("Ignoring voice leave for a live link in guild {}", self.guild_id);
            return;
        }

        warn!("🔌 Voice link lost in guild {}", self.guild_id);
        self.tear_down(&mut session).await;
    }

    async fn start_if_idle(
        &self,
        session: &mut Session<C>,
        channel_id: ChannelId,
        announcer: Arc<dyn Reply>,
    ) -> StartOutcome {
        if session.state != PlaybackState::Idle {
            debug!(
                "Engine already active in guild {} ({} queued)",
                self.guild_id,
                session.queue.len()
            );
            return StartOutcome::AlreadyActive;
        }

        if session.queue.is_empty() {
            return StartOutcome::NothingQueued;
        }

        session.announcer = Some(announcer);

        if session.link.is_none() {
            session.link_epoch += 1;
            let sink: Weak<dyn SignalSink> = self.this.clone();
            let watch = LinkWatch {
                epoch: session.link_epoch,
                sink,
            };

            match self.connector.connect(self.guild_id, channel_id, watch).await {
                Ok(link) => {
                    info!("🔊 Connected to voice in guild {}", self.guild_id);
                    session.link = Some(link);
                }
                Err(e) => {
                    error!("❌ Voice connect failed in guild {}: {}", self.guild_id, e);
                    return StartOutcome::Failed(e);
                }
            }
        }

        match self.start_head(session).await {
            Ok(title) => StartOutcome::Started(title),
            Err(e) => StartOutcome::Failed(e),
        }
    }

    /// Binds the queue head to the link. Heads the source cannot open are
    /// dropped; a bind failure tears the link down and keeps the queue.
    async fn start_head(&self, session: &mut Session<C>) -> Result<String, PlaybackError> {
        loop {
            let track = match session.queue.peek_front() {
                Some(track) => track.clone(),
                None => {
                    self.tear_down(session).await;
                    return Err(PlaybackError::NoActiveTrack);
                }
            };

            let stream = match self.source.open(&track) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("⚠️ Dropping unplayable track {}: {}", track.title(), e);
                    session.queue.dequeue_front();
                    continue;
                }
            };

            let Some(link) = session.link.as_ref() else {
                session.state = PlaybackState::Idle;
                return Err(PlaybackError::VoiceLink("not connected".to_string()));
            };

            session.generation += 1;
            let sink: Weak<dyn SignalSink> = self.this.clone();
            let signal = TrackSignal {
                generation: session.generation,
                sink,
            };

            match link.bind_output(stream, signal).await {
                Ok(output) => {
                    session.output = Some(output);
                    session.state = PlaybackState::Playing;
                    info!("🎵 Now playing in guild {}: {}", self.guild_id, track.title());
                    return Ok(track.title().to_string());
                }
                Err(e) => {
                    error!("❌ Bind failed in guild {}: {}", self.guild_id, e);
                    self.tear_down(session).await;
                    return Err(e);
                }
            }
        }
    }

    /// Pops the finished head and starts the next one, or releases the link.
    async fn advance(&self, session: &mut Session<C>) -> Advance {
        session.generation += 1;
        session.output = None;
        session.queue.dequeue_front();

        if session.queue.is_empty() {
            info!("📭 Queue drained in guild {}", self.guild_id);
            self.tear_down(session).await;
            return Advance::Drained;
        }

        match self.start_head(session).await {
            Ok(title) => Advance::NowPlaying(title),
            Err(PlaybackError::NoActiveTrack) => Advance::Drained,
            Err(e) => Advance::Failed(e),
        }
    }

    /// Returns to `Idle` and releases the voice link. Runs on every terminal
    /// path, including errors; the queue is left as is.
    async fn tear_down(&self, session: &mut Session<C>) {
        session.generation += 1;
        session.state = PlaybackState::Idle;

        if let Some(output) = session.output.take() {
            if let Err(e) = output.stop() {
                debug!("Stop during teardown failed: {}", e);
            }
        }

        if let Some(link) = session.link.take() {
            match link.disconnect().await {
                Ok(()) => info!("👋 Disconnected from voice in guild {}", self.guild_id),
                Err(e) => warn!("⚠️ Disconnect failed in guild {}: {}", self.guild_id, e),
            }
        }
    }

    fn is_current(&self, session: &Session<C>, generation: u64) -> bool {
        session.state != PlaybackState::Idle && session.generation == generation
    }
}

#[async_trait]
impl<C: VoiceConnector> SignalSink for PlaybackEngine<C> {
    async fn track_finished(&self, generation: u64) {
        let _order = self.announcements.lock().await;
        let (advance, announcer) = {
            let mut session = self.session.lock().await;
            if !self.is_current(&session, generation) {
                debug!("Ignoring stale completion {} in guild {}", generation, self.guild_id);
                return;
            }

            debug!("Track finished in guild {}", self.guild_id);
            let advance = self.advance(&mut session).await;
            (advance, session.announcer.clone())
        };

        announce(announcer, advance).await;
    }

    async fn track_failed(&self, generation: u64, reason: String) {
        let _order = self.announcements.lock().await;
        let (title, advance, announcer) = {
            let mut session = self.session.lock().await;
            if !self.is_current(&session, generation) {
                debug!("Ignoring stale failure {} in guild {}", generation, self.guild_id);
                return;
            }

            let title = session
                .queue
                .peek_front()
                .map(|track| track.title().to_string())
                .unwrap_or_default();
            error!("❌ Playback of {} failed in guild {}: {}", title, self.guild_id, reason);

            let advance = self.advance(&mut session).await;
            (title, advance, session.announcer.clone())
        };

        if let Some(announcer) = &announcer {
            if let Err(e) = announcer.send(&format!("Could not play {}, skipping.", title)).await {
                warn!("⚠️ Could not send announcement: {:?}", e);
            }
        }
        announce(announcer, advance).await;
    }

    async fn link_dropped(&self, epoch: u64, reason: String) {
        let _order = self.announcements.lock().await;
        let announcer = {
            let mut session = self.session.lock().await;
            if session.link.is_none() || session.link_epoch != epoch {
                debug!("Ignoring stale link loss {} in guild {}", epoch, self.guild_id);
                return;
            }

            warn!("🔌 Voice connection dropped in guild {}: {}", self.guild_id, reason);
            self.tear_down(&mut session).await;
            session.announcer.clone()
        };

        announce(announcer, Advance::Failed(PlaybackError::VoiceLink(reason))).await;
    }
}

async fn announce(announcer: Option<Arc<dyn Reply>>, advance: Advance) {
    let Some(announcer) = announcer else {
        return;
    };

    let text = match advance {
        Advance::NowPlaying(title) => format!("Now playing: {}", title),
        Advance::Drained => return,
        Advance::Failed(e) => e.user_message(),
    };

    if let Err(e) = announcer.send(&text).await {
        warn!("⚠️ Could not send announcement: {:?}", e);
    }
}
