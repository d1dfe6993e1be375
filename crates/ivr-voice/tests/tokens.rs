use ivr_voice::{LiveKitConfig, VoiceError, VoiceService};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

const DEFAULT_URL: &str = "http://localhost:7880";
const DEFAULT_KEY: &str = "devkey";
const DEFAULT_SECRET: &str = "secret";

#[derive(Deserialize)]
struct Claims {
    sub: String,
    name: String,
    video: VideoClaims,
}

#[derive(Deserialize)]
struct VideoClaims {
    room: String,
    #[serde(rename = "roomJoin")]
    room_join: bool,
    #[serde(rename = "canPublish")]
    can_publish: bool,
    #[serde(rename = "canSubscribe")]
    can_subscribe: bool,
}

fn decode_claims(token: &str) -> Claims {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(DEFAULT_SECRET.as_bytes());
    decode::<Claims>(token, &key, &validation)
        .expect("Failed to decode token")
        .claims
}

fn service() -> VoiceService {
    VoiceService::new(LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET))
}

#[test]
fn call_tokens_admit_caller_and_navigator_to_the_same_room() {
    let service = service();
    let room = service.new_room_name();
    assert!(room.starts_with("ivr-call-"));

    let tokens = service
        .call_tokens(&room, "caller-42", "Caller")
        .expect("Failed to sign tokens");
    assert_eq!(tokens.url, DEFAULT_URL);

    let caller = decode_claims(&tokens.caller_token);
    assert_eq!(caller.sub, "caller-42");
    assert_eq!(caller.name, "Caller");
    assert_eq!(caller.video.room, room);
    assert!(caller.video.room_join);
    assert!(caller.video.can_publish);
    assert!(caller.video.can_subscribe);

    let navigator = decode_claims(&tokens.navigator_token);
    assert_eq!(navigator.sub, "ivr-navigator");
    assert_eq!(navigator.video.room, room);
}

#[test]
fn room_names_are_unique() {
    let service = service();
    assert_ne!(service.new_room_name(), service.new_room_name());
}

#[test]
fn public_url_overrides_internal_url() {
    let mut config = LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET);
    config.public_url = "wss://voice.example.com".to_string();
    let service = VoiceService::new(config);
    assert_eq!(service.public_url(), "wss://voice.example.com");
}

#[tokio::test]
async fn unconfigured_service_refuses_calls() {
    let service = VoiceService::new(LiveKitConfig::default());
    assert!(!service.is_enabled());
    match service.open_call("caller", "Caller").await {
        Err(VoiceError::NotConfigured) => {}
        other => panic!("expected NotConfigured, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_room_service_error() {
    let service = VoiceService::new(LiveKitConfig::new(
        "http://127.0.0.1:1",
        DEFAULT_KEY,
        DEFAULT_SECRET,
    ));
    match service.open_call("caller", "Caller").await {
        Err(VoiceError::RoomService(_)) => {}
        other => panic!("expected RoomService error, got {other:?}"),
    }
}

#[test]
fn secret_is_redacted_and_not_serialized() {
    let config = LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET);
    let debug = format!("{config:?}");
    assert!(debug.contains("[REDACTED]"));
    assert!(!debug.contains(DEFAULT_SECRET));

    let json = serde_json::to_value(&config).unwrap();
    assert!(json.get("api_secret").is_none());
}

#[test]
fn config_deserializes_with_defaults() {
    let config: LiveKitConfig = toml::from_str(
        r#"
url = "http://livekit:7880"
api_key = "k"
api_secret = "s"
"#,
    )
    .unwrap();
    assert!(config.is_configured());
    assert_eq!(config.token_ttl_seconds, 3600);
    assert_eq!(config.room_prefix, "ivr-call");
    assert!(!LiveKitConfig::default().is_configured());
}
