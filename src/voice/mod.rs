//! Songbird-backed voice link.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::ControlError,
    input::Input,
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{
    audio::engine::{LinkWatch, OutputControl, TrackSignal, VoiceConnector, VoiceLink},
    error::PlaybackError,
};

/// Joins voice channels through the shared songbird manager.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    type Link = SongbirdLink;

    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        watch: LinkWatch,
    ) -> Result<SongbirdLink, PlaybackError> {
        info!("🔗 Connecting to channel {} in guild {}", channel_id, guild_id);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::VoiceLink(format!("join failed: {:?}", e)))?;

        call.lock().await.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DriverDisconnectNotifier { guild_id, watch },
        );

        info!("✅ Connected to channel {} in guild {}", channel_id, guild_id);
        Ok(SongbirdLink {
            manager: self.manager.clone(),
            call,
            guild_id,
        })
    }
}

pub struct SongbirdLink {
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    guild_id: GuildId,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    type Stream = Input;
    type Output = SongbirdOutput;

    async fn bind_output(
        &self,
        stream: Input,
        signal: TrackSignal,
    ) -> Result<SongbirdOutput, PlaybackError> {
        let handle = self.call.lock().await.play_only_input(stream);

        // End and Error may both fire for one track; only the first one reports.
        let signal = Arc::new(Mutex::new(Some(signal)));

        let registered = handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id: self.guild_id,
                    signal: signal.clone(),
                },
            )
            .and_then(|_| {
                handle.add_event(
                    Event::Track(TrackEvent::Error),
                    TrackErrorNotifier {
                        guild_id: self.guild_id,
                        signal,
                    },
                )
            });

        if let Err(e) = registered {
            let _ = handle.stop();
            return Err(PlaybackError::VoiceLink(format!(
                "could not watch track: {:?}",
                e
            )));
        }

        Ok(SongbirdOutput(handle))
    }

    async fn disconnect(&self) -> Result<(), PlaybackError> {
        info!("👋 Leaving voice in guild {}", self.guild_id);
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| PlaybackError::VoiceLink(format!("leave failed: {:?}", e)))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_channel().is_some()
    }
}

pub struct SongbirdOutput(TrackHandle);

impl OutputControl for SongbirdOutput {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.0.pause().map_err(|e| match e {
            ControlError::Finished => PlaybackError::NotPlaying,
            e => PlaybackError::VoiceLink(format!("pause failed: {:?}", e)),
        })
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.0.play().map_err(|e| match e {
            ControlError::Finished => PlaybackError::NotPaused,
            e => PlaybackError::VoiceLink(format!("resume failed: {:?}", e)),
        })
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        self.0
            .stop()
            .map_err(|e| PlaybackError::VoiceLink(format!("stop failed: {:?}", e)))
    }
}

struct TrackEndNotifier {
    guild_id: GuildId,
    signal: Arc<Mutex<Option<TrackSignal>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let signal = self.signal.lock().take();
        if let Some(signal) = signal {
            debug!("🎵 Track ended in guild {}", self.guild_id);
            signal.finished().await;
        }

        None
    }
}

struct TrackErrorNotifier {
    guild_id: GuildId,
    signal: Arc<Mutex<Option<TrackSignal>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut reason = String::from("unknown playback error");
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    reason = e.to_string();
                }
            }
        }

        let signal = self.signal.lock().take();
        if let Some(signal) = signal {
            error!("❌ Track error in guild {}: {}", self.guild_id, reason);
            signal.failed(reason).await;
        }

        None
    }
}

/// Fires whenever the driver drops out of its channel, including leaves
/// the engine asked for; those carry an epoch the engine has already retired.
struct DriverDisconnectNotifier {
    guild_id: GuildId,
    watch: LinkWatch,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            let reason = match &data.reason {
                Some(reason) => format!("{:?}", reason),
                None => "left voice".to_string(),
            };
            info!("🔌 Voice driver disconnected in guild {}: {}", self.guild_id, reason);
            self.watch.lost(reason).await;
        }

        None
    }
}
