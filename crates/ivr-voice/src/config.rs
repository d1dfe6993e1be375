use serde::{Deserialize, Serialize};
use std::fmt;

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_room_prefix() -> String {
    "ivr-call".to_string()
}

fn default_navigator_identity() -> String {
    "ivr-navigator".to_string()
}

fn default_empty_timeout_seconds() -> u32 {
    300
}

/// Connection settings for the LiveKit server carrying caller audio.
#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Server URL used for Room Service calls. Empty disables voice.
    #[serde(default)]
    pub url: String,
    /// URL handed to callers. Falls back to `url` when empty.
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Call rooms are named `<prefix>-<uuid>`.
    #[serde(default = "default_room_prefix")]
    pub room_prefix: String,
    /// Identity the navigator joins call rooms with.
    #[serde(default = "default_navigator_identity")]
    pub navigator_identity: String,
    /// Seconds an empty call room survives before LiveKit removes it.
    #[serde(default = "default_empty_timeout_seconds")]
    pub empty_timeout_seconds: u32,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            public_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
            room_prefix: default_room_prefix(),
            navigator_identity: default_navigator_identity(),
            empty_timeout_seconds: default_empty_timeout_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("public_url", &self.public_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("room_prefix", &self.room_prefix)
            .field("navigator_identity", &self.navigator_identity)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    /// Returns `true` when enough is set to create rooms and sign tokens.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}
