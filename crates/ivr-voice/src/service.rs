use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use livekit_protocol::Room;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Join credentials for one call: the caller's and the navigator's.
#[derive(Debug, Clone, Serialize)]
pub struct CallTokens {
    pub room_name: String,
    pub url: String,
    pub caller_token: String,
    pub navigator_token: String,
}

/// Creates call rooms and signs join tokens.
#[derive(Debug)]
pub struct VoiceService {
    config: LiveKitConfig,
    room_client: RoomClient,
}

impl VoiceService {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Returns the caller-facing URL. Falls back to the internal URL if no
    /// public URL is configured.
    pub fn public_url(&self) -> &str {
        if self.config.public_url.is_empty() {
            &self.config.url
        } else {
            &self.config.public_url
        }
    }

    /// A fresh, unique call room name.
    pub fn new_room_name(&self) -> String {
        format!("{}-{}", self.config.room_prefix, Uuid::new_v4())
    }

    /// Creates a room for one caller and signs tokens for the caller and
    /// the navigator.
    pub async fn open_call(
        &self,
        caller_identity: &str,
        caller_name: &str,
    ) -> Result<CallTokens, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::NotConfigured);
        }
        let room = self.create_room(&self.new_room_name()).await?;
        tracing::info!(room = %room.name, caller = caller_identity, "call room created");
        self.call_tokens(&room.name, caller_identity, caller_name)
    }

    pub async fn create_room(&self, name: &str) -> Result<Room, VoiceError> {
        let options = CreateRoomOptions {
            empty_timeout: self.config.empty_timeout_seconds,
            max_participants: 2,
            ..Default::default()
        };

        self.room_client
            .create_room(name, options)
            .await
            .map_err(|e| VoiceError::RoomService(e.to_string()))
    }

    /// Ends a call by deleting its room.
    pub async fn close_room(&self, name: &str) -> Result<(), VoiceError> {
        self.room_client
            .delete_room(name)
            .await
            .map_err(|e| VoiceError::RoomService(e.to_string()))
    }

    /// Signs both join tokens for an existing room.
    pub fn call_tokens(
        &self,
        room_name: &str,
        caller_identity: &str,
        caller_name: &str,
    ) -> Result<CallTokens, VoiceError> {
        let caller_token = self.generate_join_token(room_name, caller_identity, caller_name)?;
        let navigator_token = self.generate_join_token(
            room_name,
            &self.config.navigator_identity,
            "Phone Menu Guide",
        )?;
        Ok(CallTokens {
            room_name: room_name.to_string(),
            url: self.public_url().to_string(),
            caller_token,
            navigator_token,
        })
    }

    pub fn generate_join_token(
        &self,
        room_name: &str,
        participant_identity: &str,
        participant_name: &str,
    ) -> Result<String, VoiceError> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(participant_identity)
            .with_name(participant_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        token.to_jwt().map_err(VoiceError::Token)
    }
}
