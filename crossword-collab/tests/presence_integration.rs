//! Cursor presence over a real server: relay tagging, throttling, and
//! removal on disconnect.

use crossword_collab::client::{ClientEvent, CollabClient};
use crossword_collab::presence::{CursorThrottle, PresenceTracker};
use crossword_collab::protocol::ServerMessage;
use crossword_collab::server::{CollabServer, ServerConfig};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

async fn start_test_server() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        channel_capacity: 64,
        storage: None,
    };
    let server = Arc::new(CollabServer::new(config).unwrap());
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

async fn expect_event<F>(rx: &mut mpsc::UnboundedReceiver<ClientEvent>, pred: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn cursor_moves_are_tagged_and_relayed() {
    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut alice = CollabClient::new("p1", "alice");
    let mut events_a = alice.connect(&url).await.unwrap();
    expect_event(&mut events_a, |e| *e == ClientEvent::PlayerCount(1)).await;

    let mut bob = CollabClient::new("p1", "bob");
    let mut events_b = bob.connect(&url).await.unwrap();
    expect_event(&mut events_b, |e| *e == ClientEvent::PlayerCount(2)).await;

    assert!(alice.send_cursor(1, 2).unwrap());

    let event = expect_event(&mut events_b, |e| {
        matches!(e, ClientEvent::RemoteCursor { .. })
    })
    .await;
    match event {
        ClientEvent::RemoteCursor {
            player_id,
            row,
            col,
            ..
        } => {
            assert_eq!(player_id, "alice");
            assert_eq!((row, col), (1, 2));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The mover never sees its own cursor come back.
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events_a.try_recv() {
        assert!(!matches!(event, ClientEvent::RemoteCursor { .. }));
    }
}

#[tokio::test]
async fn cursor_burst_is_throttled_to_one_message() {
    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut alice = CollabClient::new("p1", "alice");
    let mut events_a = alice.connect(&url).await.unwrap();
    expect_event(&mut events_a, |e| *e == ClientEvent::PlayerCount(1)).await;

    let mut bob = CollabClient::new("p1", "bob");
    let mut events_b = bob.connect(&url).await.unwrap();
    expect_event(&mut events_b, |e| *e == ClientEvent::PlayerCount(2)).await;

    // Ten rapid moves: only the first clears the 100ms window.
    let sent = (0..10)
        .filter(|&i| alice.send_cursor(0, i).unwrap())
        .count();
    assert_eq!(sent, 1);

    expect_event(&mut events_b, |e| {
        matches!(e, ClientEvent::RemoteCursor { col: 0, .. })
    })
    .await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    while let Ok(event) = events_b.try_recv() {
        assert!(
            !matches!(event, ClientEvent::RemoteCursor { .. }),
            "throttled cursor move leaked through"
        );
    }

    // The window has passed; the next move goes out.
    assert!(alice.send_cursor(5, 5).unwrap());
    expect_event(&mut events_b, |e| {
        matches!(e, ClientEvent::RemoteCursor { row: 5, col: 5, .. })
    })
    .await;
}

#[tokio::test]
async fn disconnect_removes_the_peer_cursor() {
    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut alice = CollabClient::new("p1", "alice");
    let mut events_a = alice.connect(&url).await.unwrap();
    expect_event(&mut events_a, |e| *e == ClientEvent::PlayerCount(1)).await;

    let mut bob = CollabClient::new("p1", "bob");
    let mut events_b = bob.connect(&url).await.unwrap();
    expect_event(&mut events_b, |e| *e == ClientEvent::PlayerCount(2)).await;

    alice.send_cursor(0, 0).unwrap();
    let moved = expect_event(&mut events_b, |e| {
        matches!(e, ClientEvent::RemoteCursor { .. })
    })
    .await;
    let ClientEvent::RemoteCursor { session_id, .. } = moved else {
        unreachable!();
    };

    // Track bob's view of the room through a PresenceTracker.
    let mut tracker = PresenceTracker::new();
    tracker.apply(&ServerMessage::CursorMoved {
        session_id,
        player_id: "alice".to_string(),
        row: 0,
        col: 0,
    });
    assert_eq!(tracker.len(), 1);

    alice.close();
    let gone = expect_event(&mut events_b, |e| {
        matches!(e, ClientEvent::CursorGone { .. })
    })
    .await;
    assert_eq!(gone, ClientEvent::CursorGone { session_id });

    tracker.apply(&ServerMessage::CursorLeave { session_id });
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn custom_throttle_interval_is_honored() {
    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut alice = CollabClient::new("p1", "alice");
    alice.set_cursor_throttle(CursorThrottle::with_interval(StdDuration::from_millis(10)));
    let mut events = alice.connect(&url).await.unwrap();
    expect_event(&mut events, |e| *e == ClientEvent::PlayerCount(1)).await;

    assert!(alice.send_cursor(0, 0).unwrap());
    assert!(!alice.send_cursor(0, 1).unwrap());
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert!(alice.send_cursor(0, 2).unwrap());
}

#[tokio::test]
async fn late_joiner_sees_no_cursors_until_peers_move() {
    let port = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut alice = CollabClient::new("p1", "alice");
    let mut events_a = alice.connect(&url).await.unwrap();
    expect_event(&mut events_a, |e| *e == ClientEvent::PlayerCount(1)).await;
    alice.send_cursor(2, 2).unwrap();

    // Bob joins after alice already moved: no cursor state is replayed.
    let mut bob = CollabClient::new("p1", "bob");
    let mut events_b = bob.connect(&url).await.unwrap();
    expect_event(&mut events_b, |e| *e == ClientEvent::PlayerCount(2)).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events_b.try_recv() {
        assert!(!matches!(event, ClientEvent::RemoteCursor { .. }));
    }

    // Only a fresh move shows up.
    tokio::time::sleep(Duration::from_millis(110)).await;
    alice.send_cursor(1, 1).unwrap();
    expect_event(&mut events_b, |e| {
        matches!(e, ClientEvent::RemoteCursor { row: 1, col: 1, .. })
    })
    .await;
}
