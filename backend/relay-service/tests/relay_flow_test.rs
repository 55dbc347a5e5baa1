use relay_service::{config::Config, server, state::AppState};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const PROMPT: &str = "Please enter your username: ";

async fn start_relay() -> (AppState, SocketAddr) {
    let state = AppState::new(Config::test_defaults()).unwrap();
    let listener = server::bind(&state.config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state.clone(), std::future::pending()));
    (state, addr)
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect, consume the prompt and answer it with `name`
    async fn join(addr: SocketAddr, name: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer,
        };

        let mut prompt = vec![0u8; PROMPT.len()];
        tokio::time::timeout(Duration::from_secs(10), client.reader.read_exact(&mut prompt))
            .await
            .expect("timed out waiting for prompt")
            .unwrap();
        assert_eq!(String::from_utf8(prompt).unwrap(), PROMPT);

        client.send(name).await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn line(&mut self) -> String {
        let mut buf = String::new();
        let n = tokio::time::timeout(Duration::from_secs(10), self.reader.read_line(&mut buf))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        assert!(n > 0, "connection closed unexpectedly");
        buf
    }

    /// Assert nothing arrives within a short window
    async fn expect_silence(&mut self) {
        let mut buf = String::new();
        let got = tokio::time::timeout(Duration::from_millis(300), self.reader.read_line(&mut buf)).await;
        assert!(got.is_err(), "unexpected line: {buf:?}");
    }
}

async fn wait_joined(state: &AppState, count: usize) {
    for _ in 0..1000 {
        let joined = state
            .registry
            .snapshot()
            .await
            .iter()
            .filter(|m| m.user.joined)
            .count();
        if joined == count {
            // let the last handshake finish its join announcement
            tokio::time::sleep(Duration::from_millis(100)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never reached {count} joined users");
}

fn joined(name: &str) -> String {
    format!("\x1b[1;31m{name} has joined the chat!\x1b[0m\n")
}

fn chat(name: &str, message: &str) -> String {
    format!("\x1b[34m{name}\x1b[0m: {message}\n")
}

fn departed(name: &str, remaining: usize) -> String {
    format!("\x1b[1;31mUser {name} disconnected, users in the channel: {remaining}\x1b[0m\n")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn newcomer_receives_every_existing_key_and_is_announced_once() {
    let (state, addr) = start_relay().await;

    let mut alice = TestClient::join(addr, "alice").await;
    wait_joined(&state, 1).await;
    let mut carol = TestClient::join(addr, "carol").await;
    wait_joined(&state, 2).await;
    assert_eq!(alice.line().await, joined("carol"));
    assert!(carol.line().await.starts_with("Public Key of alice: "));

    let mut newcomer = TestClient::join(addr, "").await;
    wait_joined(&state, 3).await;

    let snapshot = state.registry.snapshot().await;
    let expected_keys: Vec<String> = snapshot[..2]
        .iter()
        .map(|m| format!("Public Key of {}: {}\n", m.user.name, m.user.keys.encoded_modulus()))
        .collect();
    assert_eq!(newcomer.line().await, expected_keys[0]);
    assert_eq!(newcomer.line().await, expected_keys[1]);

    assert_eq!(alice.line().await, joined("User2"));
    assert_eq!(carol.line().await, joined("User2"));

    // nothing else was queued ahead of live traffic
    newcomer.send("hello").await;
    assert_eq!(alice.line().await, chat("User2", "hello"));
    assert_eq!(carol.line().await, chat("User2", "hello"));
    newcomer.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn default_name_is_used_when_handshake_input_is_empty() {
    let (state, addr) = start_relay().await;

    let mut alice = TestClient::join(addr, "alice").await;
    wait_joined(&state, 1).await;
    let mut second = TestClient::join(addr, "").await;
    wait_joined(&state, 2).await;

    assert_eq!(alice.line().await, joined("User1"));
    assert!(second.line().await.starts_with("Public Key of alice: "));

    second.send("  hi alice  ").await;
    assert_eq!(alice.line().await, chat("User1", "hi alice"));

    // alice joined first, so nobody ever sees a join notice for her
    alice.send("hey").await;
    assert_eq!(second.line().await, chat("alice", "hey"));
    assert_eq!(state.registry.snapshot().await[1].user.name, "User1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_notifies_remaining_sessions_exactly_once() {
    let (state, addr) = start_relay().await;

    let mut a = TestClient::join(addr, "ann").await;
    wait_joined(&state, 1).await;
    let mut b = TestClient::join(addr, "ben").await;
    wait_joined(&state, 2).await;
    let mut c = TestClient::join(addr, "cat").await;
    wait_joined(&state, 3).await;

    assert_eq!(a.line().await, joined("ben"));
    assert_eq!(a.line().await, joined("cat"));
    b.line().await; // ann's key
    assert_eq!(b.line().await, joined("cat"));
    c.line().await; // ann's key
    c.line().await; // ben's key

    a.send("STOP").await;
    assert_eq!(b.line().await, departed("ann", 2));
    assert_eq!(c.line().await, departed("ann", 2));

    // the stopped client's connection is closed by the relay
    let mut rest = String::new();
    tokio::time::timeout(Duration::from_secs(10), a.reader.read_to_string(&mut rest))
        .await
        .expect("relay did not close the connection")
        .unwrap();
    assert!(rest.is_empty());
    assert_eq!(state.registry.len().await, 2);

    b.send("still here").await;
    assert_eq!(c.line().await, chat("ben", "still here"));
    b.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abrupt_disconnect_is_silent() {
    let (state, addr) = start_relay().await;

    let mut a = TestClient::join(addr, "a").await;
    wait_joined(&state, 1).await;
    let b = TestClient::join(addr, "b").await;
    wait_joined(&state, 2).await;
    assert_eq!(a.line().await, joined("b"));

    drop(b);
    for _ in 0..500 {
        if state.registry.len().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.registry.len().await, 1);
    a.expect_silence().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_get_unique_monotonic_ids() {
    let (state, addr) = start_relay().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(tokio::spawn(async move { TestClient::join(addr, "").await }));
    }
    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }
    wait_joined(&state, 8).await;

    let snapshot = state.registry.snapshot().await;
    let ids: Vec<u64> = snapshot.iter().map(|m| m.user.id.as_u64()).collect();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());

    let names: HashSet<String> = snapshot.iter().map(|m| m.user.name.clone()).collect();
    let expected: HashSet<String> = (0..8).map(|i| format!("User{i}")).collect();
    assert_eq!(names, expected);

    let moduli: HashSet<String> = snapshot.iter().map(|m| m.user.keys.encoded_modulus()).collect();
    assert_eq!(moduli.len(), 8, "key pairs must not be shared");
}
