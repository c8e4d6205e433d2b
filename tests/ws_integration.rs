//! Integration tests for the UI push channel.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and checks the frames the browser would see.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use mail_responder::channels::MessageRecord;
use mail_responder::notify::{NotificationEvent, NotificationSink, Notifier};
use mail_responder::server::routes;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an Axum server on a random port, return (port, notifier).
async fn start_server() -> (u16, Arc<Notifier>) {
    let notifier = Notifier::new();
    let app = routes(Arc::clone(&notifier));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, notifier)
}

fn record(id: &str) -> MessageRecord {
    MessageRecord {
        id: id.into(),
        subject: "Hi".into(),
        from: "a@x.com".into(),
        body: "Question?".into(),
    }
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn ws_receives_new_then_remove() {
    timeout(TEST_TIMEOUT, async {
        let (port, notifier) = start_server().await;

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .expect("WS connect failed");

        // The handler subscribes after the upgrade completes.
        tokio::time::sleep(Duration::from_millis(50)).await;

        notifier.notify(NotificationEvent::NewEmail(record("42")));
        notifier.notify(NotificationEvent::RemovedEmail("42".into()));

        let first = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(first["event"], "new_email");
        assert_eq!(first["data"]["id"], "42");
        assert_eq!(first["data"]["subject"], "Hi");
        assert_eq!(first["data"]["from"], "a@x.com");
        assert_eq!(first["data"]["body"], "Question?");

        let second = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(second["event"], "remove_email");
        assert_eq!(second["data"], "42");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn late_client_gets_unremoved_emails_replayed() {
    timeout(TEST_TIMEOUT, async {
        let (port, notifier) = start_server().await;

        // Announced before anyone connects; "1" is resolved, "2" is not.
        notifier.notify(NotificationEvent::NewEmail(record("1")));
        notifier.notify(NotificationEvent::NewEmail(record("2")));
        notifier.notify(NotificationEvent::RemovedEmail("1".into()));

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();

        let replayed = parse_ws_json(&ws.next().await.unwrap().unwrap());
        assert_eq!(replayed["event"], "new_email");
        assert_eq!(replayed["data"]["id"], "2");

        // Nothing else pending.
        let quiet = timeout(Duration::from_millis(200), ws.next()).await;
        assert!(quiet.is_err(), "unexpected extra frame: {:?}", quiet);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn every_client_receives_broadcast() {
    timeout(TEST_TIMEOUT, async {
        let (port, notifier) = start_server().await;

        let (mut a, _) = connect_async(format!("ws://127.0.0.1:{port}/ws")).await.unwrap();
        let (mut b, _) = connect_async(format!("ws://127.0.0.1:{port}/ws")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        notifier.notify(NotificationEvent::RemovedEmail("7".into()));

        for ws in [&mut a, &mut b] {
            let json = parse_ws_json(&ws.next().await.unwrap().unwrap());
            assert_eq!(json["event"], "remove_email");
            assert_eq!(json["data"], "7");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn index_page_is_served() {
    timeout(TEST_TIMEOUT, async {
        let (port, _notifier) = start_server().await;

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("text/html"));
        assert!(response.contains("<title>Mail Responder</title>"));
    })
    .await
    .expect("test timed out");
}
