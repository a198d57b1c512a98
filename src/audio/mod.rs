//! # Audio Module
//!
//! Queueing and playback control for the bot.
//!
//! ### [`queue`] - Queue
//! - FIFO backlog per guild, head kept until its completion is observed
//! - Point-in-time snapshots for the `queue` command
//!
//! ### [`engine`] - Playback engine
//! - Explicit `Idle` / `Playing` / `Paused` state machine
//! - Owns the guild's voice link; the only component that binds, stops or
//!   disconnects it
//! - Single-use completion signals, re-armed for every track
//!
//! ### [`player`] - Guild registry
//! - One independent `(queue, engine)` pair per guild, each with its own lock
//!
//! ## Example
//!
//! ```rust,ignore
//! let players = GuildPlayers::new(connector, source, config.max_queue_size);
//! let engine = players.get_or_create(guild_id);
//!
//! let enqueued = engine.enqueue(track, voice_channel, announcer).await?;
//! engine.pause().await?;
//! engine.resume().await?;
//! engine.skip().await?;
//! ```

pub mod engine;
pub mod player;
pub mod queue;

#[cfg(test)]
pub mod testing;
