//! Topic engine scenarios driven through a full deck over a mock session

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use topicdeck::config::DeckConfig;
use topicdeck::deck::TopicDeck;
use topicdeck::engine::DisplayGroup;
use topicdeck::session::SessionEvent;
use topicdeck::testing::MockSession;
use topicdeck::DeckError;

fn mock_deck() -> (
    Arc<TopicDeck>,
    Arc<MockSession>,
    mpsc::UnboundedSender<SessionEvent>,
    tempfile::TempDir,
) {
    let dir = tempdir().unwrap();
    let mut config = DeckConfig::with_broker_url("mqtt://localhost:1883");
    config.prefs.path = dir.path().join("prefs.json");
    let session = Arc::new(MockSession::connected());
    let (tx, rx) = mpsc::unbounded_channel();
    let deck = TopicDeck::with_session(config, session.clone(), rx);
    (deck, session, tx, dir)
}

fn message(topic: &str, payload: &str) -> SessionEvent {
    SessionEvent::Message {
        topic: topic.to_string(),
        payload: payload.to_string(),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_discovery_announcement_registers_declared_topics_only() {
    let (deck, _session, tx, _dir) = mock_deck();

    tx.send(message(
        "devices/abc",
        r#"{"topics": ["devices/abc/led/command"]}"#,
    ))
    .unwrap();
    settle().await;

    let topics = deck.topics().await;
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].name, "devices/abc/led/command");
}

#[tokio::test]
async fn test_malformed_discovery_payload_is_skipped() {
    let (deck, _session, tx, _dir) = mock_deck();

    tx.send(message("devices/abc", "not json")).unwrap();
    tx.send(message("devices/def", r#"{"topics": "wrong shape"}"#))
        .unwrap();
    settle().await;

    assert!(deck.topics().await.is_empty());
}

#[tokio::test]
async fn test_repeated_messages_count_without_reregistering() {
    let (deck, _session, tx, _dir) = mock_deck();

    tx.send(message("sensors/temp", "20")).unwrap();
    settle().await;
    let revision_after_first = deck.registry_revision().await;

    tx.send(message("sensors/temp", "21")).unwrap();
    tx.send(message("sensors/temp", "22")).unwrap();
    settle().await;

    let topics = deck.topics().await;
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].message_count, 3);
    assert_eq!(deck.registry_revision().await, revision_after_first);
}

#[tokio::test]
async fn test_grouped_view_splits_on_first_segment() {
    let (deck, _session, tx, _dir) = mock_deck();

    tx.send(message("sensors/temp", "1")).unwrap();
    tx.send(message("sensors/humidity", "2")).unwrap();
    tx.send(message("status", "up")).unwrap();
    settle().await;

    let groups = deck.grouped_topics().await;
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().any(|g| matches!(
        g,
        DisplayGroup::Group { label, topics }
            if label == "sensors" && topics.len() == 2
    )));
    assert!(groups
        .iter()
        .any(|g| matches!(g, DisplayGroup::Flat(t) if t == "status")));
}

#[tokio::test]
async fn test_concurrent_waits_on_same_topic_all_resolve() {
    let (deck, _session, tx, _dir) = mock_deck();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let deck = deck.clone();
        waiters.push(tokio::spawn(async move {
            deck.subscribe_once("x/y", Duration::from_secs(5)).await
        }));
    }
    settle().await;

    tx.send(message("x/y", "shared")).unwrap();

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap().unwrap(), "shared");
    }
}

#[tokio::test]
async fn test_duration_collection_stops_early_at_max_messages() {
    let (deck, _session, tx, _dir) = mock_deck();

    let collector = {
        let deck = deck.clone();
        tokio::spawn(async move {
            deck.subscribe_for_duration("x/y", Duration::from_secs(5), 2)
                .await
        })
    };
    settle().await;

    tx.send(message("x/y", "1")).unwrap();
    tx.send(message("x/y", "2")).unwrap();
    tx.send(message("x/y", "3")).unwrap();

    let collected = collector.await.unwrap().unwrap();
    assert_eq!(collected, vec!["1".to_string(), "2".to_string()]);
}

#[tokio::test]
async fn test_duration_collection_resolves_empty_when_topic_stays_silent() {
    let (deck, _session, _tx, _dir) = mock_deck();

    let collected = deck
        .subscribe_for_duration("silent/topic", Duration::from_millis(50), 10)
        .await
        .unwrap();
    assert!(collected.is_empty());
}

#[tokio::test]
async fn test_wait_timeout_error_names_the_topic() {
    let (deck, _session, _tx, _dir) = mock_deck();

    let result = deck.subscribe_once("x/y", Duration::from_millis(50)).await;
    match result {
        Err(DeckError::Wait(e)) => {
            assert!(e.to_string().contains("x/y"), "{e}");
        }
        other => panic!("expected wait timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pinned_topic_tracks_only_its_own_messages() {
    let (deck, _session, tx, _dir) = mock_deck();

    assert!(deck.pin("sensors/temp").await);

    tx.send(message("sensors/temp", "20")).unwrap();
    tx.send(message("sensors/humidity", "55")).unwrap();
    tx.send(message("sensors/temp", "21")).unwrap();
    settle().await;

    let pinned = deck.pinned().await;
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0].topic, "sensors/temp");
    assert_eq!(pinned[0].last_payload.as_deref(), Some("21"));
}

#[tokio::test]
async fn test_registry_survives_transient_loss_but_not_close() {
    let (deck, _session, tx, _dir) = mock_deck();

    tx.send(message("a/b", "1")).unwrap();
    settle().await;

    tx.send(SessionEvent::ConnectionLost {
        reason: "broker restart".to_string(),
    })
    .unwrap();
    settle().await;
    assert_eq!(deck.topics().await.len(), 1);

    tx.send(SessionEvent::Closed {
        reason: "manual disconnect".to_string(),
    })
    .unwrap();
    settle().await;
    assert!(deck.topics().await.is_empty());
}
