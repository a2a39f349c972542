//! Integration tests for the relay server.
//!
//! These tests start a real `ChatServer` on an ephemeral localhost port and
//! drive it with plain TCP clients speaking the line protocol.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free behavior of
//! production code is checked through assertions.

use std::net::SocketAddr;
use std::time::Duration;

use pairchatd::registry::{spawn_registry, RegistryHandle};
use pairchatd::server::{ChatServer, SessionSettings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Time allowed for any single expected line to arrive
const LINE_TIMEOUT: Duration = Duration::from_secs(2);

/// Window in which an unexpected line would have shown up
const QUIET_WINDOW: Duration = Duration::from_millis(200);

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Test server wrapper that shuts down on drop.
struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(SessionSettings::default()).await
    }

    async fn start_with(settings: SessionSettings) -> Self {
        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();
        let server = ChatServer::bind("127.0.0.1:0", registry.clone(), settings, cancel_token.clone())
            .await
            .expect("bind should succeed");
        let addr = server.local_addr().unwrap();

        let task = tokio::spawn(async move {
            server.run().await.expect("server should run");
        });

        Self {
            addr,
            registry,
            cancel_token,
            task: Some(task),
        }
    }

    async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Waits until the registry holds exactly `count` names.
    async fn wait_for_clients(&self, count: usize) {
        for _ in 0..100 {
            if self.registry.snapshot().await.len() == count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "registry never reached {count} clients: {:?}",
            self.registry.snapshot().await
        );
    }

    async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            timeout(Duration::from_secs(2), task)
                .await
                .expect("server should stop")
                .unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Line-protocol client for tests.
struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect should succeed");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write should succeed");
    }

    async fn recv(&mut self) -> Option<String> {
        timeout(LINE_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for line")
            .expect("read should succeed")
    }

    async fn expect(&mut self, expected: &str) {
        let line = self.recv().await.expect("connection closed");
        assert_eq!(line, expected);
    }

    /// Asserts nothing arrives for a short while.
    async fn expect_quiet(&mut self) {
        if let Ok(line) = timeout(QUIET_WINDOW, self.lines.next_line()).await {
            panic!("expected no line, got {line:?}");
        }
    }

    /// Runs the name exchange up to the partner prompt.
    async fn register(&mut self, name: &str) {
        self.expect("SUBMITNAME").await;
        self.send(name).await;
        self.expect("NAMEACCEPTED").await;
        self.expect("SUBMITPART").await;
    }
}

/// Two registered clients paired with each other (first asked for second).
async fn paired(server: &TestServer, first: &str, second: &str) -> (TestClient, TestClient) {
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register(first).await;
    b.register(second).await;

    a.send(second).await;
    a.expect("PARTACCEPTED").await;
    b.expect("PARTACCEPTED").await;
    (a, b)
}

// ============================================================================
// Registration Scenarios
// ============================================================================

#[tokio::test]
async fn test_duplicate_name_reprompts() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.register("alice").await;

    b.expect("SUBMITNAME").await;
    b.send("alice").await;
    b.expect("SUBMITNAME").await;
    b.send("bob").await;
    b.expect("NAMEACCEPTED").await;
    b.expect("SUBMITPART").await;

    server.wait_for_clients(2).await;
}

#[tokio::test]
async fn test_blank_name_reprompts() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;

    a.expect("SUBMITNAME").await;
    a.send("").await;
    a.expect("SUBMITNAME").await;
    a.send("   ").await;
    a.expect("SUBMITNAME").await;
    a.send("alice").await;
    a.expect("NAMEACCEPTED").await;
}

#[tokio::test]
async fn test_name_is_trimmed() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.register("  alice\t").await;

    b.expect("SUBMITNAME").await;
    b.send("alice").await;
    b.expect("SUBMITNAME").await;
}

// ============================================================================
// Pairing Scenarios
// ============================================================================

#[tokio::test]
async fn test_partner_before_registration_then_retry() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    a.register("alice").await;

    a.send("bob").await;
    a.expect("SUBMITPART").await;

    let mut b = server.connect().await;
    b.register("bob").await;

    a.send("bob").await;
    a.expect("PARTACCEPTED").await;
    b.expect("PARTACCEPTED").await;
}

#[tokio::test]
async fn test_busy_partner_reprompts() {
    let server = TestServer::start().await;
    let (_a, _b) = paired(&server, "alice", "bob").await;

    let mut c = server.connect().await;
    c.register("carol").await;
    c.send("alice").await;
    c.expect("SUBMITPART").await;
    c.send("bob").await;
    c.expect("SUBMITPART").await;
}

#[tokio::test]
async fn test_mutual_requests_pair_once() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.register("alice").await;
    b.register("bob").await;

    a.send("bob").await;
    b.send("alice").await;

    // One request wins; the other side is told through its outbox
    a.expect("PARTACCEPTED").await;
    b.expect("PARTACCEPTED").await;

    let clients = server.registry.snapshot().await;
    assert_eq!(clients.len(), 2);
    assert!(clients.iter().all(|c| c.busy));
    assert_eq!(clients[0].partner.as_ref(), Some(&clients[1].name));
    assert_eq!(clients[1].partner.as_ref(), Some(&clients[0].name));
}

// ============================================================================
// Relay Scenarios
// ============================================================================

#[tokio::test]
async fn test_message_relay_both_directions() {
    let server = TestServer::start().await;
    let (mut a, mut b) = paired(&server, "alice", "bob").await;

    a.send("MESSAGE hello").await;
    b.expect("MESSAGE alice: hello").await;

    b.send("MESSAGE hi alice").await;
    a.expect("MESSAGE bob: hi alice").await;
}

#[tokio::test]
async fn test_relay_preserves_order() {
    let server = TestServer::start().await;
    let (mut a, mut b) = paired(&server, "alice", "bob").await;

    for i in 0..50 {
        a.send(&format!("MESSAGE line {i}")).await;
    }
    for i in 0..50 {
        b.expect(&format!("MESSAGE alice: line {i}")).await;
    }
}

#[tokio::test]
async fn test_non_message_lines_pass_through() {
    let server = TestServer::start().await;
    let (mut a, mut b) = paired(&server, "alice", "bob").await;

    a.send("POST /chat HTTP/1.1").await;
    a.send("Content-Length: 5").await;
    a.send("").await;
    a.send("MESSAGEhello").await;

    b.expect("POST /chat HTTP/1.1").await;
    b.expect("Content-Length: 5").await;
    b.expect("").await;
    b.expect("MESSAGEhello").await;
}

// ============================================================================
// Departure Scenarios
// ============================================================================

#[tokio::test]
async fn test_partner_disconnect_sends_partleft() {
    let server = TestServer::start().await;
    let (a, mut b) = paired(&server, "alice", "bob").await;

    drop(a);
    b.expect("PARTLEFT").await;
    server.wait_for_clients(1).await;

    // Further relay attempts from bob go nowhere and do not end his session
    b.send("MESSAGE anyone?").await;
    b.expect_quiet().await;

    let clients = server.registry.snapshot().await;
    assert_eq!(clients[0].name.as_str(), "bob");
    assert!(!clients[0].busy);
}

#[tokio::test]
async fn test_name_reusable_after_disconnect() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    a.register("alice").await;
    drop(a);
    server.wait_for_clients(0).await;

    let mut again = server.connect().await;
    again.register("alice").await;
}

#[tokio::test]
async fn test_left_partner_can_be_paired_again() {
    let server = TestServer::start().await;
    let (a, mut b) = paired(&server, "alice", "bob").await;

    drop(a);
    b.expect("PARTLEFT").await;

    let mut c = server.connect().await;
    c.register("carol").await;
    c.send("bob").await;
    c.expect("PARTACCEPTED").await;
    b.expect("PARTACCEPTED").await;

    c.send("MESSAGE hello bob").await;
    b.expect("MESSAGE carol: hello bob").await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = TestServer::start().await;
    let (mut a, mut b) = paired(&server, "alice", "bob").await;
    let registry = server.registry.clone();

    server.shutdown().await;

    assert_eq!(a.recv().await, None);
    assert_eq!(b.recv().await, None);

    // Sessions release on their own once cancelled
    for _ in 0..100 {
        if registry.snapshot().await.is_empty() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("names not released after shutdown: {:?}", registry.snapshot().await);
}
