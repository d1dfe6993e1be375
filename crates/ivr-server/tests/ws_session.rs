use futures_util::{SinkExt, StreamExt};
use ivr_dialogue::{AgentEvent, CloseReason, EngineConfig, NavigationEngine, SchedulerConfig};
use ivr_observe::MetricsCollector;
use ivr_server::{app, AppState};
use ivr_voice::{LiveKitConfig, VoiceService};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

type Socket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, AppState) {
    let tree = Arc::new(ivr_menu::bundled().unwrap());
    let engine =
        NavigationEngine::new(tree, EngineConfig::default(), Arc::new(MetricsCollector::new()))
            .unwrap();
    let state = AppState {
        engine: Arc::new(engine),
        scheduler: SchedulerConfig::default(),
        voice: Arc::new(VoiceService::new(LiveKitConfig::default())),
        shutdown: CancellationToken::new(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws/session", addr))
        .await
        .expect("failed to connect");
    socket
}

async fn next_event(socket: &mut Socket) -> AgentEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for the navigator")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("invalid agent event");
        }
    }
}

async fn send(socket: &mut Socket, event: serde_json::Value) {
    socket
        .send(Message::Text(event.to_string().into()))
        .await
        .unwrap();
}

/// Reads the next spoken segment and acknowledges it.
async fn hear(socket: &mut Socket) -> String {
    match next_event(socket).await {
        AgentEvent::Say { seq, text, .. } => {
            send(socket, json!({ "type": "playback_finished", "seq": seq })).await;
            text
        }
        other => panic!("expected Say, got {other:?}"),
    }
}

#[tokio::test]
async fn caller_is_greeted_and_guided() {
    let (addr, state) = start_server().await;
    let mut socket = connect(addr).await;

    assert!(hear(&mut socket).await.contains("interrupt me at any time"));
    hear(&mut socket).await;

    // Malformed messages are ignored.
    socket
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();

    send(
        &mut socket,
        json!({ "type": "utterance", "text": "I need my account balance" }),
    )
    .await;
    assert!(hear(&mut socket).await.starts_with("Sure"));
    assert_eq!(hear(&mut socket).await, "Step 1: press 1 for English.");
    assert_eq!(
        hear(&mut socket).await,
        "Step 2: press 1 for Account Information."
    );

    send(&mut socket, json!({ "type": "disconnect" })).await;
    loop {
        if let AgentEvent::Closed { reason } = next_event(&mut socket).await {
            assert_eq!(reason, CloseReason::CallerDisconnected);
            break;
        }
    }

    let snapshot = state.engine.metrics().snapshot();
    assert_eq!(snapshot.sessions_opened, 1);
    assert_eq!(snapshot.turns.resolved, 1);
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let (addr, state) = start_server().await;
    let mut socket = connect(addr).await;
    hear(&mut socket).await;

    state.shutdown.cancel();
    loop {
        match next_event(&mut socket).await {
            AgentEvent::Closed { reason } => {
                assert_eq!(reason, CloseReason::Shutdown);
                break;
            }
            AgentEvent::Say { .. } | AgentEvent::CancelSpeech => {}
            other => panic!("unexpected event {other:?}"),
        }
    }

    // The server closes the socket after the session ends.
    let closed = timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = socket.next().await {
            if let Message::Close(_) = msg {
                return true;
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn sessions_on_separate_sockets_are_independent() {
    let (addr, state) = start_server().await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;

    hear(&mut first).await;
    hear(&mut second).await;

    send(&mut first, json!({ "type": "dtmf", "key": "0" })).await;
    loop {
        if let AgentEvent::TransferToAgent { .. } = next_event(&mut first).await {
            break;
        }
    }

    // The second caller is still being greeted.
    assert!(hear(&mut second).await.contains("for example"));
    assert_eq!(state.engine.metrics().snapshot().sessions_opened, 2);
}
