use std::fmt;

const ABSENT: &str = "-";

/// Identifies the throttling scope of a call before and after the server has
/// revealed its real bucket
///
/// The server partitions limits by route and by the "major" parameters of the
/// path (channel, guild, webhook). Until a response carries `X-RateLimit-Bucket`,
/// the template itself stands in for the server token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    template: String,
    channel_id: Option<String>,
    guild_id: Option<String>,
    webhook_id: Option<String>,
}

impl RouteKey {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), channel_id: None, guild_id: None, webhook_id: None }
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn webhook(mut self, webhook_id: impl Into<String>) -> Self {
        self.webhook_id = Some(webhook_id.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// `channel:guild:webhook` part shared by provisional and token keys
    pub fn major(&self) -> String {
        format!(
            "{}:{}:{}",
            self.channel_id.as_deref().unwrap_or(ABSENT),
            self.guild_id.as_deref().unwrap_or(ABSENT),
            self.webhook_id.as_deref().unwrap_or(ABSENT)
        )
    }

    /// Key used until the server bucket token is known
    pub fn provisional(&self) -> String {
        format!("{}:{}", self.major(), self.template)
    }

    /// Key of the server-side bucket `token` for this route's major parameters
    pub fn shared(&self, token: &str) -> String {
        format!("{}:{}", self.major(), token)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.provisional())
    }
}
