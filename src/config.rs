use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Per-guild slash commands for development
    pub command_prefix: String,

    // Lookup
    pub youtube_api_key: Option<String>,
    pub resolve_timeout_secs: u64,

    // Limits
    pub max_queue_size: usize,

    // Supervisor
    pub restart_backoff_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            youtube_api_key: std::env::var("YOUTUBE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            resolve_timeout_secs: parse_or("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,

            max_queue_size: parse_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            restart_backoff_secs: parse_or("RESTART_BACKOFF_SECS", defaults.restart_backoff_secs)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Rejects values that would otherwise surface as confusing runtime
    /// behavior, such as a queue that refuses every track.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        Ok(())
    }

    /// Summary for logging; never includes credentials.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix '{}' (Commands: {})\n  \
            Lookup: {} ({}s timeout)\n  \
            Limits: {} queue\n  \
            Supervisor: {}s restart backoff",
            self.command_prefix,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            if self.youtube_api_key.is_some() {
                "YouTube Data API"
            } else {
                "yt-dlp"
            },
            self.resolve_timeout_secs,
            self.max_queue_size,
            self.restart_backoff_secs
        )
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Must be provided
            discord_token: String::new(),
            guild_id: None,
            command_prefix: "!".to_string(),

            youtube_api_key: None,
            resolve_timeout_secs: 30,

            max_queue_size: 1000,

            restart_backoff_secs: 5,
        }
    }
}
