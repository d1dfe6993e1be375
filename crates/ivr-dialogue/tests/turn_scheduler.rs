//! Turn timing on a paused clock.

use ivr_dialogue::{
    AgentEvent, CallerEvent, CloseReason, DialogueSession, EngineConfig, NavigationEngine,
    SchedulerConfig, TurnScheduler,
};
use ivr_observe::MetricsCollector;
use ivr_types::{CallerUtterance, EscalationReason, TurnState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

struct Call {
    tx: mpsc::Sender<CallerEvent>,
    rx: mpsc::Receiver<AgentEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<DialogueSession>,
}

impl Call {
    fn start(config: SchedulerConfig) -> Self {
        let tree = Arc::new(ivr_menu::bundled().unwrap());
        let engine = Arc::new(
            NavigationEngine::new(tree, EngineConfig::default(), Arc::new(MetricsCollector::new()))
                .unwrap(),
        );
        let (tx, events) = mpsc::channel(16);
        let (out, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let scheduler = TurnScheduler::new(
            DialogueSession::new(engine),
            config,
            events,
            out,
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());
        Self {
            tx,
            rx,
            cancel,
            handle,
        }
    }

    async fn send(&self, event: CallerEvent) {
        self.tx.send(event).await.unwrap();
    }

    async fn say(&self, text: &str) {
        self.send(CallerEvent::Utterance(CallerUtterance::spoken(text)))
            .await;
    }

    async fn next(&mut self) -> AgentEvent {
        self.rx.recv().await.expect("scheduler hung up")
    }

    /// Acknowledges every segment until the line is quiet for a second.
    async fn hear(&mut self) -> Vec<AgentEvent> {
        let mut heard = Vec::new();
        while let Ok(Some(event)) = timeout(Duration::from_secs(1), self.rx.recv()).await {
            if let AgentEvent::Say { seq, .. } = &event {
                self.send(CallerEvent::PlaybackFinished { seq: *seq }).await;
            }
            heard.push(event);
        }
        heard
    }
}

fn spoken(events: &[AgentEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::Say { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn greets_in_segments() {
    let mut call = Call::start(SchedulerConfig::default());
    let heard = call.hear().await;
    let text = spoken(&heard);
    assert_eq!(text.len(), 2);
    assert!(text[0].contains("interrupt me at any time"));
    match &heard[1] {
        AgentEvent::Say { seq, .. } => assert_eq!(*seq, 2),
        other => panic!("expected Say, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn silence_reprompts_without_closing() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    match call.next().await {
        AgentEvent::Say { text, .. } => assert!(text.contains("did not hear")),
        other => panic!("expected the timeout prompt, got {other:?}"),
    }

    call.cancel.cancel();
    let session = call.handle.await.unwrap();
    assert_eq!(session.consecutive_unresolved(), 1);
    assert_eq!(session.close_reason(), Some(CloseReason::Shutdown));
}

#[tokio::test(start_paused = true)]
async fn confident_end_of_turn_uses_the_short_delay() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    let sent = Instant::now();
    call.say("I need my account balance").await;
    match call.next().await {
        AgentEvent::Say { text, .. } => assert!(text.starts_with("Sure")),
        other => panic!("expected Say, got {other:?}"),
    }
    let waited = sent.elapsed();
    assert!(waited >= Duration::from_millis(500), "{waited:?}");
    assert!(waited < Duration::from_secs(1), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn uncertain_end_of_turn_uses_the_long_delay() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    let sent = Instant::now();
    let mut utterance = CallerUtterance::spoken("I need my account balance");
    utterance.end_of_turn_confidence = 0.2;
    call.send(CallerEvent::Utterance(utterance)).await;
    call.next().await;
    assert!(sent.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn fragments_inside_the_window_are_merged() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    let mut first = CallerUtterance::spoken("I lost");
    first.end_of_turn_confidence = 0.2;
    call.send(CallerEvent::Utterance(first)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    call.say("my card").await;

    let heard = call.hear().await;
    let text = spoken(&heard);
    assert!(
        text.contains(&"Step 3: press 3 for Report Lost or Stolen Card."),
        "{text:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn barge_in_discards_the_rest_of_the_response() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    call.say("I need my account balance").await;
    match call.next().await {
        AgentEvent::Say { text, .. } => assert!(text.starts_with("Sure")),
        other => panic!("expected Say, got {other:?}"),
    }
    call.send(CallerEvent::SpeechOnset).await;
    assert_eq!(call.next().await, AgentEvent::CancelSpeech);

    // Nothing else from the interrupted response, only the eventual timeout prompt.
    assert!(call.hear().await.is_empty());
    match call.next().await {
        AgentEvent::Say { text, .. } => assert!(text.contains("did not hear")),
        other => panic!("expected the timeout prompt, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn two_misses_then_transfer() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    for _ in 0..2 {
        call.say("the weather is nice today").await;
        let heard = call.hear().await;
        assert!(spoken(&heard)[0].starts_with("Sorry"));
    }

    call.say("I need my account balance").await;
    let heard = call.hear().await;
    assert!(spoken(&heard)[0].contains("transferring you to an agent"));
    match &heard[1] {
        AgentEvent::TransferToAgent { reason, transcript } => {
            assert_eq!(*reason, EscalationReason::ConsecutiveUnresolved);
            assert!(!transcript.is_empty());
        }
        other => panic!("expected TransferToAgent, got {other:?}"),
    }
    assert_eq!(
        heard[2],
        AgentEvent::Closed {
            reason: CloseReason::Transferred
        }
    );

    let session = call.handle.await.unwrap();
    assert_eq!(session.state(), TurnState::Closed);
    assert_eq!(session.escalation(), Some(EscalationReason::ConsecutiveUnresolved));
}

#[tokio::test(start_paused = true)]
async fn transfer_key_interrupts_the_greeting() {
    let mut call = Call::start(SchedulerConfig::default());
    assert!(matches!(call.next().await, AgentEvent::Say { .. }));

    call.send(CallerEvent::Dtmf { key: '0' }).await;
    assert_eq!(call.next().await, AgentEvent::CancelSpeech);

    let heard = call.hear().await;
    assert!(matches!(
        heard[1],
        AgentEvent::TransferToAgent {
            reason: EscalationReason::TransferShortcut,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_the_session() {
    let mut call = Call::start(SchedulerConfig::default());
    call.hear().await;

    call.send(CallerEvent::Disconnect).await;
    assert_eq!(
        call.next().await,
        AgentEvent::Closed {
            reason: CloseReason::CallerDisconnected
        }
    );
    let session = call.handle.await.unwrap();
    assert_eq!(session.close_reason(), Some(CloseReason::CallerDisconnected));
}

#[tokio::test(start_paused = true)]
async fn idle_caller_is_closed() {
    let mut call = Call::start(SchedulerConfig {
        listen_timeout_secs: 100.0,
        idle_timeout_secs: 12.0,
        ..SchedulerConfig::default()
    });
    call.hear().await;

    assert_eq!(
        call.next().await,
        AgentEvent::Closed {
            reason: CloseReason::IdleTimeout
        }
    );
}

#[tokio::test(start_paused = true)]
async fn silent_caller_is_transferred_before_the_idle_bound() {
    let mut call = Call::start(SchedulerConfig {
        idle_timeout_secs: 60.0,
        ..SchedulerConfig::default()
    });
    let started = Instant::now();

    let mut heard = Vec::new();
    loop {
        let event = call.next().await;
        if let AgentEvent::Say { seq, .. } = &event {
            call.send(CallerEvent::PlaybackFinished { seq: *seq }).await;
        }
        let closed = matches!(event, AgentEvent::Closed { .. });
        heard.push(event);
        if closed {
            break;
        }
    }

    let prompts = spoken(&heard)
        .into_iter()
        .filter(|text| text.contains("did not hear"))
        .count();
    assert_eq!(prompts, 2);
    assert!(heard.iter().any(|event| matches!(
        event,
        AgentEvent::TransferToAgent {
            reason: EscalationReason::ConsecutiveUnresolved,
            ..
        }
    )));
    assert_eq!(
        heard.last(),
        Some(&AgentEvent::Closed {
            reason: CloseReason::Transferred
        })
    );
    assert!(started.elapsed() < Duration::from_secs(60));
}
