use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

use crate::audio::engine::{AudioSource, LinkStream, PlaybackEngine, VoiceConnector};

/// Per-guild registry of playback engines.
///
/// Each guild gets its own queue, state machine and lock, so commands in one
/// guild never wait on or interfere with playback in another.
pub struct GuildPlayers<C: VoiceConnector> {
    engines: DashMap<GuildId, Arc<PlaybackEngine<C>>>,
    connector: Arc<C>,
    source: Arc<dyn AudioSource<LinkStream<C>>>,
    max_queue_size: usize,
}

impl<C: VoiceConnector> GuildPlayers<C> {
    pub fn new(
        connector: Arc<C>,
        source: Arc<dyn AudioSource<LinkStream<C>>>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            connector,
            source,
            max_queue_size,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<PlaybackEngine<C>> {
        self.engines
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Creating playback engine for guild {}", guild_id);
                PlaybackEngine::new(
                    guild_id,
                    self.connector.clone(),
                    self.source.clone(),
                    self.max_queue_size,
                )
            })
            .clone()
    }

    /// Existing engine only; read-only commands never create one.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackEngine<C>>> {
        self.engines.get(&guild_id).map(|engine| engine.clone())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.engines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        engine::PlaybackState,
        testing::{track, FakeConnector, FakeSource, RecordingReply},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;

    fn players() -> GuildPlayers<FakeConnector> {
        GuildPlayers::new(Arc::new(FakeConnector::default()), Arc::new(FakeSource), 10)
    }

    #[test]
    fn same_guild_returns_same_engine() {
        let players = players();
        let first = players.get_or_create(GuildId::new(1));
        let again = players.get_or_create(GuildId::new(1));

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(players.len(), 1);
    }

    #[test]
    fn lookup_does_not_create() {
        let players = players();
        assert!(players.get(GuildId::new(5)).is_none());
        assert_eq!(players.len(), 0);
    }

    #[tokio::test]
    async fn guilds_have_independent_queues_and_state() {
        let players = players();
        let one = players.get_or_create(GuildId::new(1));
        let two = players.get_or_create(GuildId::new(2));

        one.enqueue(track("A"), ChannelId::new(10), RecordingReply::new())
            .await
            .unwrap();
        one.pause().await.unwrap();

        assert_eq!(one.state().await, PlaybackState::Paused);
        assert_eq!(two.state().await, PlaybackState::Idle);
        assert!(two.snapshot().await.is_empty());
        assert_eq!(one.snapshot().await.len(), 1);
    }
}
