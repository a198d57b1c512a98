//! Transport-independent command handling.
//!
//! Both input channels (slash commands and prefix messages) are reduced to an
//! [`Intent`] plus a [`Requester`], then handed to [`CommandDispatcher`],
//! which talks to the guild's engine and answers through a [`Reply`].

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        engine::{Advance, StartOutcome, VoiceConnector},
        player::GuildPlayers,
        queue::QueueEntry,
    },
    bot::reply::Reply,
    error::PlaybackError,
    sources::TrackResolver,
};

/// Discord rejects messages longer than this.
const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Play { query: String },
    Skip,
    ShowQueue,
    Pause,
    Resume,
}

impl Intent {
    /// Parses `<prefix><command> [args]`, e.g. `!play never gonna`.
    pub fn from_text(content: &str, prefix: &str) -> Option<Self> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let mut parts = body.splitn(2, char::is_whitespace);
        let command = parts.next()?.to_lowercase();
        let rest = parts.next().unwrap_or("").trim();

        Self::from_name(&command, rest)
    }

    pub fn from_slash(name: &str, query: Option<&str>) -> Option<Self> {
        Self::from_name(name, query.unwrap_or("").trim())
    }

    fn from_name(name: &str, query: &str) -> Option<Self> {
        match name {
            "play" => Some(Intent::Play {
                query: query.to_string(),
            }),
            "skip" => Some(Intent::Skip),
            "queue" => Some(Intent::ShowQueue),
            "pause" => Some(Intent::Pause),
            "resume" => Some(Intent::Resume),
            _ => None,
        }
    }
}

/// Who asked, as far as playback cares.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub guild_id: GuildId,
    /// The requester's current voice channel.
    pub voice_channel: Option<ChannelId>,
    /// Whether the bot may CONNECT and SPEAK in that channel.
    pub can_join: bool,
}

pub struct CommandDispatcher<C: VoiceConnector> {
    players: Arc<GuildPlayers<C>>,
    resolver: Arc<dyn TrackResolver>,
}

impl<C: VoiceConnector> CommandDispatcher<C> {
    pub fn new(players: Arc<GuildPlayers<C>>, resolver: Arc<dyn TrackResolver>) -> Self {
        Self { players, resolver }
    }

    /// Handles one request. All output, including failures, goes to `reply`;
    /// "now playing" notices go to `announcer`.
    pub async fn handle(
        &self,
        intent: Intent,
        requester: Requester,
        reply: Arc<dyn Reply>,
        announcer: Arc<dyn Reply>,
    ) {
        debug!("Dispatching {:?} in guild {}", intent, requester.guild_id);

        let result = match intent {
            Intent::Play { query } => self.play(&query, requester, &reply, announcer).await,
            Intent::Skip => self.skip(requester, &reply, &announcer).await,
            Intent::ShowQueue => self.show_queue(requester, &reply).await,
            Intent::Pause => self.pause(requester, &reply).await,
            Intent::Resume => self.resume(requester, &reply).await,
        };

        if let Err(e) = result {
            if e.is_denial() {
                debug!("Request denied in guild {}: {}", requester.guild_id, e);
            } else {
                warn!("⚠️ Request failed in guild {}: {}", requester.guild_id, e);
            }
            send(&reply, &e.user_message()).await;
        }
    }

    async fn play(
        &self,
        query: &str,
        requester: Requester,
        reply: &Arc<dyn Reply>,
        announcer: Arc<dyn Reply>,
    ) -> Result<(), PlaybackError> {
        let channel_id = requester
            .voice_channel
            .ok_or(PlaybackError::NotInVoiceChannel)?;

        if !requester.can_join {
            return Err(PlaybackError::MissingPermissions);
        }

        if query.is_empty() {
            send(reply, "Please provide a song name or URL to play.").await;
            return Ok(());
        }

        // Resolution happens before touching the engine lock.
        let track = self.resolver.resolve(query).await?;
        info!("🎶 Resolved '{}' to {}", query, track.title());

        let engine = self.players.get_or_create(requester.guild_id);
        let _order = engine.hold_announcements().await;
        let enqueued = engine
            .enqueue(track, channel_id, announcer.clone())
            .await?;

        send(reply, &format!("Added to queue: {}", enqueued.title)).await;

        match enqueued.start {
            StartOutcome::Started(title) => {
                send(&announcer, &format!("Now playing: {}", title)).await
            }
            StartOutcome::Failed(e) => return Err(e),
            StartOutcome::AlreadyActive | StartOutcome::NothingQueued => {}
        }

        Ok(())
    }

    async fn skip(
        &self,
        requester: Requester,
        reply: &Arc<dyn Reply>,
        announcer: &Arc<dyn Reply>,
    ) -> Result<(), PlaybackError> {
        let engine = self
            .players
            .get(requester.guild_id)
            .ok_or(PlaybackError::NoActiveTrack)?;

        let _order = engine.hold_announcements().await;
        let advance = engine.skip().await?;
        send(reply, "Skipped the current song.").await;

        match advance {
            Advance::NowPlaying(title) => {
                send(announcer, &format!("Now playing: {}", title)).await
            }
            Advance::Failed(e) => send(announcer, &e.user_message()).await,
            Advance::Drained => {}
        }

        Ok(())
    }

    async fn show_queue(
        &self,
        requester: Requester,
        reply: &Arc<dyn Reply>,
    ) -> Result<(), PlaybackError> {
        let entries = match self.players.get(requester.guild_id) {
            Some(engine) => engine.snapshot().await,
            None => Vec::new(),
        };

        send(reply, &render_queue(&entries)).await;
        Ok(())
    }

    async fn pause(&self, requester: Requester, reply: &Arc<dyn Reply>) -> Result<(), PlaybackError> {
        let engine = self
            .players
            .get(requester.guild_id)
            .ok_or(PlaybackError::NotPlaying)?;

        engine.pause().await?;
        send(reply, "Playback paused.").await;
        Ok(())
    }

    async fn resume(&self, requester: Requester, reply: &Arc<dyn Reply>) -> Result<(), PlaybackError> {
        let engine = self
            .players
            .get(requester.guild_id)
            .ok_or(PlaybackError::NotPaused)?;

        engine.resume().await?;
        send(reply, "Playback resumed.").await;
        Ok(())
    }
}

/// Renders a queue listing, eliding the tail when it would not fit in one
/// message.
pub fn render_queue(entries: &[QueueEntry]) -> String {
    if entries.is_empty() {
        return "The queue is currently empty.".to_string();
    }

    let mut text = String::from("Current queue:");
    for (shown, entry) in entries.iter().enumerate() {
        let line = format!("\n{}. {}", entry.position, entry.title);
        let remaining = entries.len() - shown;
        let footer = format!("\n...and {} more", remaining);

        if text.len() + line.len() + footer.len() > MESSAGE_LIMIT {
            text.push_str(&footer);
            break;
        }
        text.push_str(&line);
    }

    text
}

async fn send(reply: &Arc<dyn Reply>, text: &str) {
    if let Err(e) = reply.send(text).await {
        warn!("⚠️ Could not send reply: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::PlaybackState;
    use crate::audio::testing::{FakeConnector, FakeSource, RecordingReply};
    use crate::sources::{MockTrackResolver, Track};
    use pretty_assertions::assert_eq;

    struct Harness {
        players: Arc<GuildPlayers<FakeConnector>>,
        dispatcher: CommandDispatcher<FakeConnector>,
        reply: Arc<RecordingReply>,
        announcer: Arc<RecordingReply>,
    }

    fn harness(resolver: MockTrackResolver) -> Harness {
        let players = Arc::new(GuildPlayers::new(
            Arc::new(FakeConnector::default()),
            Arc::new(FakeSource),
            10,
        ));
        Harness {
            dispatcher: CommandDispatcher::new(players.clone(), Arc::new(resolver)),
            players,
            reply: RecordingReply::new(),
            announcer: RecordingReply::new(),
        }
    }

    fn resolving_by_title() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|query| Ok(Track::new(format!("https://example.com/{}", query), query)));
        resolver
    }

    fn requester() -> Requester {
        Requester {
            guild_id: GuildId::new(1),
            voice_channel: Some(ChannelId::new(9)),
            can_join: true,
        }
    }

    impl Harness {
        async fn run(&self, intent: Intent) {
            self.run_as(intent, requester()).await;
        }

        async fn run_as(&self, intent: Intent, requester: Requester) {
            self.dispatcher
                .handle(intent, requester, self.reply.clone(), self.announcer.clone())
                .await;
        }
    }

    fn play(query: &str) -> Intent {
        Intent::Play {
            query: query.to_string(),
        }
    }

    #[test]
    fn text_commands_parse() {
        assert_eq!(
            Intent::from_text("!play  never gonna give you up ", "!"),
            Some(play("never gonna give you up"))
        );
        assert_eq!(Intent::from_text("!skip", "!"), Some(Intent::Skip));
        assert_eq!(Intent::from_text("!QUEUE", "!"), Some(Intent::ShowQueue));
        assert_eq!(Intent::from_text("!playlist x", "!"), None);
        assert_eq!(Intent::from_text("play something", "!"), None);
        assert_eq!(Intent::from_text("?pause", "?"), Some(Intent::Pause));
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(Intent::from_slash("play", Some("song")), Some(play("song")));
        assert_eq!(Intent::from_slash("resume", None), Some(Intent::Resume));
        assert_eq!(Intent::from_slash("volume", None), None);
    }

    #[tokio::test]
    async fn play_replies_added_then_now_playing() {
        let h = harness(resolving_by_title());

        h.run(play("A")).await;
        h.run(play("B")).await;

        assert_eq!(
            h.reply.sent(),
            vec!["Added to queue: A".to_string(), "Added to queue: B".to_string()]
        );
        assert_eq!(h.announcer.sent(), vec!["Now playing: A".to_string()]);
    }

    #[tokio::test]
    async fn show_queue_lists_in_order() {
        let h = harness(resolving_by_title());

        h.run(Intent::ShowQueue).await;
        h.run(play("A")).await;
        h.run(play("B")).await;
        h.run(Intent::ShowQueue).await;

        let sent = h.reply.sent();
        assert_eq!(sent[0], "The queue is currently empty.");
        assert_eq!(sent[3], "Current queue:\n1. A\n2. B");
    }

    #[tokio::test]
    async fn skip_pause_resume_flow() {
        let h = harness(resolving_by_title());

        h.run(play("A")).await;
        h.run(play("B")).await;
        h.run(Intent::Pause).await;
        h.run(Intent::Resume).await;
        h.run(Intent::Skip).await;

        assert_eq!(
            h.reply.sent()[2..].to_vec(),
            vec![
                "Playback paused.".to_string(),
                "Playback resumed.".to_string(),
                "Skipped the current song.".to_string(),
            ]
        );
        assert_eq!(
            h.announcer.sent(),
            vec!["Now playing: A".to_string(), "Now playing: B".to_string()]
        );
    }

    #[tokio::test]
    async fn denials_on_idle_guild() {
        let h = harness(MockTrackResolver::new());

        h.run(Intent::Skip).await;
        h.run(Intent::Pause).await;
        h.run(Intent::Resume).await;

        assert_eq!(
            h.reply.sent(),
            vec![
                "There are no videos in the queue to skip.".to_string(),
                "There is no song currently playing.".to_string(),
                "There is no paused song to resume.".to_string(),
            ]
        );
        assert_eq!(h.players.len(), 0);
    }

    #[tokio::test]
    async fn resolution_failure_is_reported_and_nothing_queued() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Err(PlaybackError::Resolution("quota exceeded".to_string())));
        let h = harness(resolver);

        h.run(play("anything")).await;

        assert_eq!(
            h.reply.sent(),
            vec!["An error occurred while searching for the video.".to_string()]
        );
        h.run(Intent::ShowQueue).await;
        assert_eq!(h.reply.sent()[1], "The queue is currently empty.");
    }

    #[tokio::test]
    async fn no_results_is_reported() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(PlaybackError::NoResults));
        let h = harness(resolver);

        h.run(play("zzzz")).await;

        assert_eq!(
            h.reply.sent(),
            vec!["No videos found for the search query.".to_string()]
        );
    }

    #[tokio::test]
    async fn play_requires_voice_channel_and_permissions() {
        let h = harness(MockTrackResolver::new());

        let mut outside = requester();
        outside.voice_channel = None;
        h.run_as(play("A"), outside).await;

        let mut muted = requester();
        muted.can_join = false;
        h.run_as(play("A"), muted).await;

        assert_eq!(
            h.reply.sent(),
            vec![
                "You must be in a voice channel to use this command.".to_string(),
                "I don't have permission to join or speak in your voice channel.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn empty_query_is_not_resolved() {
        let h = harness(MockTrackResolver::new());

        h.run(play("")).await;

        assert_eq!(
            h.reply.sent(),
            vec!["Please provide a song name or URL to play.".to_string()]
        );
    }

    #[tokio::test]
    async fn guilds_do_not_share_queues() {
        let h = harness(resolving_by_title());
        let other = Requester {
            guild_id: GuildId::new(2),
            ..requester()
        };

        h.run(play("A")).await;
        h.run_as(play("B"), other).await;

        let first = h.players.get(GuildId::new(1)).unwrap();
        let second = h.players.get(GuildId::new(2)).unwrap();
        assert_eq!(first.snapshot().await.len(), 1);
        assert_eq!(second.snapshot().await.len(), 1);
        assert_eq!(second.state().await, PlaybackState::Playing);
    }

    #[test]
    fn long_queues_are_elided() {
        let entries: Vec<_> = (1..=500)
            .map(|position| QueueEntry {
                position,
                title: format!("A fairly long song title number {}", position),
            })
            .collect();

        let text = render_queue(&entries);

        assert!(text.len() <= MESSAGE_LIMIT);
        assert!(text.starts_with("Current queue:\n1. A fairly long song title number 1\n"));
        assert!(text.contains("more"));
    }
}
