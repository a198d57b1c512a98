use async_trait::async_trait;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    http::Http,
    model::{application::CommandInteraction, id::ChannelId},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where user-facing text for a request goes.
#[async_trait]
pub trait Reply: Send + Sync {
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

/// Plain messages in a text channel. Used for prefix commands and for
/// announcements that outlive the request which started playback.
pub struct ChannelReply {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelReply {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Arc<Self> {
        Arc::new(Self { http, channel_id })
    }
}

#[async_trait]
impl Reply for ChannelReply {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.channel_id.say(&self.http, text).await?;
        Ok(())
    }
}

/// Replies to a slash command: the first message answers the interaction
/// (editing the deferred response when there is one), later ones are
/// follow-ups.
pub struct InteractionReply {
    http: Arc<Http>,
    command: CommandInteraction,
    deferred: AtomicBool,
    responded: AtomicBool,
}

impl InteractionReply {
    pub fn new(http: Arc<Http>, command: CommandInteraction) -> Arc<Self> {
        Arc::new(Self {
            http,
            command,
            deferred: AtomicBool::new(false),
            responded: AtomicBool::new(false),
        })
    }

    /// Acknowledges the interaction so slow lookups don't time it out.
    pub async fn defer(&self) -> anyhow::Result<()> {
        self.command
            .create_response(
                &self.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Reply for InteractionReply {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        if self.responded.swap(true, Ordering::SeqCst) {
            self.command
                .create_followup(
                    &self.http,
                    CreateInteractionResponseFollowup::new().content(text),
                )
                .await?;
        } else if self.deferred.load(Ordering::SeqCst) {
            self.command
                .edit_response(&self.http, EditInteractionResponse::new().content(text))
                .await?;
        } else {
            self.command
                .create_response(
                    &self.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new().content(text),
                    ),
                )
                .await?;
        }

        Ok(())
    }
}
