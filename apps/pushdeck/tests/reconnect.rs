use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

use pushdeck::app::GridApp;
use pushdeck::config::Config;
use pushdeck::session::{ConnectionState, SendError};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

fn test_config(url: &str) -> Config {
    Config {
        server_url: url.to_string(),
        grid: None,
        reconnect_delay: Duration::from_millis(50),
    }
}

async fn recv_text(socket: &mut WebSocketStream<TcpStream>) -> Option<String> {
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next()).await.ok()??;
        match msg.ok()? {
            Message::Text(text) => return Some(text),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

fn action_of(frame: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    value["action"].as_str().unwrap().to_string()
}

async fn wait_until(limit: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

#[tokio::test]
async fn state_transitions_fire_in_order() {
    let (listener, url) = bind().await;
    let app = Arc::new(GridApp::new(&test_config(&url)));

    let seen: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    app.manager()
        .subscribe_state(move |state| sink.lock().push(*state));

    app.connect();
    let mut socket = accept(&listener).await;
    let _ = recv_text(&mut socket).await;
    assert!(wait_until(Duration::from_secs(2), || app.state() == ConnectionState::Open).await);

    app.close();
    assert_eq!(
        *seen.lock(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ]
    );
}

#[tokio::test]
async fn dropped_connection_retries_pending_request_exactly_once() {
    let (listener, url) = bind().await;
    let app = Arc::new(GridApp::new(&test_config(&url)));
    app.connect();

    let mut socket = accept(&listener).await;
    let frame = recv_text(&mut socket).await.expect("size request");
    assert_eq!(action_of(&frame), "size");

    // Kill the connection with the size query still in flight.
    drop(socket);

    // The client reconnects on its own and reissues a single size query; the
    // stale pending entry from the dead connection must not suppress it.
    let mut socket = accept(&listener).await;
    let frame = recv_text(&mut socket).await.expect("size request after reconnect");
    assert_eq!(action_of(&frame), "size");

    let extra = timeout(Duration::from_millis(300), socket.next()).await;
    assert!(extra.is_err(), "unexpected extra frame: {extra:?}");

    app.close();
}

#[tokio::test]
async fn connect_same_endpoint_while_open_is_a_noop() {
    let (listener, url) = bind().await;
    let app = Arc::new(GridApp::new(&test_config(&url)));

    let seen: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    app.manager()
        .subscribe_state(move |state| sink.lock().push(*state));

    app.connect();
    let mut socket = accept(&listener).await;
    let _ = recv_text(&mut socket).await;
    assert!(wait_until(Duration::from_secs(2), || app.state() == ConnectionState::Open).await);

    // Re-connecting to the active endpoint must not spawn a new transport
    // or replay any transitions.
    app.manager().connect(&url);
    let second = timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(second.is_err(), "second transport spawned for the same endpoint");
    assert_eq!(app.state(), ConnectionState::Open);
    assert_eq!(
        *seen.lock(),
        vec![ConnectionState::Connecting, ConnectionState::Open]
    );

    app.close();
}

#[tokio::test]
async fn endpoint_switch_clears_pending_and_resyncs() {
    let (listener_a, url_a) = bind().await;
    let (listener_b, url_b) = bind().await;
    let app = Arc::new(GridApp::new(&test_config(&url_a)));

    let seen: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    app.manager()
        .subscribe_state(move |state| sink.lock().push(*state));

    app.connect();
    let mut socket_a = accept(&listener_a).await;
    let frame = recv_text(&mut socket_a).await.expect("size request");
    assert_eq!(action_of(&frame), "size");

    // Switch endpoints with the size query still unanswered. Superseding
    // the live transport counts as connection loss, so the in-flight entry
    // must die with it and the new session must resync from scratch.
    app.manager().connect(&url_b);

    let mut socket_b = accept(&listener_b).await;
    let frame = recv_text(&mut socket_b)
        .await
        .expect("size request after endpoint switch");
    assert_eq!(action_of(&frame), "size");

    // The supersession surfaced as a disconnect before the new attempt.
    assert!(seen.lock().contains(&ConnectionState::Closed));

    app.close();
}

#[tokio::test]
async fn failed_connect_keeps_retrying() {
    // Grab a port, then release it so the connect attempts are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let app = Arc::new(GridApp::new(&test_config(&url)));
    let attempts: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = attempts.clone();
    app.manager()
        .subscribe_state(move |state| sink.lock().push(*state));

    app.connect();
    assert!(
        wait_until(Duration::from_secs(2), || {
            attempts
                .lock()
                .iter()
                .filter(|s| **s == ConnectionState::Connecting)
                .count()
                >= 2
        })
        .await
    );
    // Each failed attempt settles in Closed before the next retry.
    assert!(attempts.lock().contains(&ConnectionState::Closed));

    app.close();
}

#[tokio::test]
async fn push_while_closed_is_rejected() {
    let app = GridApp::new(&test_config("ws://127.0.0.1:1/ws"));
    assert_eq!(app.state(), ConnectionState::Closed);
    assert!(matches!(app.push(0, 0), Err(SendError::NotConnected)));
}
