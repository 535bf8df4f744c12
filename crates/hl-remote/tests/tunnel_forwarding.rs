//! Forwarding tests against a real local TCP echo destination

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use hl_core::{Credentials, ExecutionError, TunnelError};
use hl_remote::tunnel::{
    self, BoxedStream, ChannelOpener, SessionFactory, TaskLauncher, TunnelControl, TunnelManager,
    TunnelSpec, TunnelStart,
};

/// Echo server that closes its write half once the client is done
async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                tokio::io::copy(&mut reader, &mut writer).await.unwrap();
                writer.shutdown().await.unwrap();
            });
        }
    });
    addr
}

/// Opens "channels" as plain TCP connections to the echo server, failing
/// the first `fail_first` requests.
struct DirectOpener {
    target: SocketAddr,
    fail_first: u32,
    opened: AtomicU32,
}

#[async_trait]
impl ChannelOpener for DirectOpener {
    async fn open(
        &self,
        host: &str,
        port: u16,
        _originator: SocketAddr,
    ) -> Result<BoxedStream, TunnelError> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(TunnelError::Forward {
                destination: format!("{}:{}", host, port),
                message: "administratively prohibited".into(),
            });
        }
        let stream = TcpStream::connect(self.target).await.map_err(|e| TunnelError::Forward {
            destination: format!("{}:{}", host, port),
            message: e.to_string(),
        })?;
        Ok(Box::new(stream))
    }
}

struct FakeSessions {
    target: SocketAddr,
    fail_first: u32,
    sessions: Arc<AtomicU32>,
    reject: bool,
}

impl FakeSessions {
    fn new(target: SocketAddr) -> Self {
        Self {
            target,
            fail_first: 0,
            sessions: Arc::new(AtomicU32::new(0)),
            reject: false,
        }
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open_session(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ChannelOpener>, TunnelError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(ExecutionError::AuthenticationFailed {
                host: credentials.host.clone(),
                username: credentials.username.clone(),
            }
            .into());
        }
        Ok(Arc::new(DirectOpener {
            target: self.target,
            fail_first: self.fail_first,
            opened: AtomicU32::new(0),
        }))
    }
}

fn spec() -> TunnelSpec {
    TunnelSpec {
        credentials: Credentials::new("login.cluster", "alice").with_password("pw"),
        destination_host: "node07".into(),
        destination_port: 5000,
        local_port: 0,
    }
}

async fn round_trip(local: SocketAddr, payload: Vec<u8>) -> Vec<u8> {
    let client = TcpStream::connect(local).await.unwrap();
    let (mut reader, mut writer) = client.into_split();
    let writer_task = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer.shutdown().await.unwrap();
    });
    let mut received = Vec::new();
    reader.read_to_end(&mut received).await.unwrap();
    writer_task.await.unwrap();
    received
}

#[tokio::test]
async fn test_single_byte_round_trip() {
    let echo = echo_server().await;
    let ready = tunnel::establish(&spec(), &FakeSessions::new(echo)).await.unwrap();
    let local = ready.local_addr();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(ready.serve(cancel.clone()));

    assert_eq!(round_trip(local, vec![0x2a]).await, vec![0x2a]);

    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_one_mebibyte_round_trip() {
    let echo = echo_server().await;
    let ready = tunnel::establish(&spec(), &FakeSessions::new(echo)).await.unwrap();
    let local = ready.local_addr();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(ready.serve(cancel.clone()));

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    let received = round_trip(local, payload.clone()).await;
    assert_eq!(received.len(), payload.len());
    assert!(received == payload, "payload corrupted in transit");

    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_connections_are_independent() {
    let echo = echo_server().await;
    let ready = tunnel::establish(&spec(), &FakeSessions::new(echo)).await.unwrap();
    let local = ready.local_addr();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(ready.serve(cancel.clone()));

    // A client that connects and never writes must not block others
    let _stalled = TcpStream::connect(local).await.unwrap();

    let mut clients = Vec::new();
    for i in 0..8u8 {
        clients.push(tokio::spawn(round_trip(local, vec![i; 4096])));
    }
    for (i, client) in clients.into_iter().enumerate() {
        assert_eq!(client.await.unwrap(), vec![i as u8; 4096]);
    }

    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_forwarding_failure_keeps_listener_serving() {
    let echo = echo_server().await;
    let mut sessions = FakeSessions::new(echo);
    sessions.fail_first = 1;
    let ready = tunnel::establish(&spec(), &sessions).await.unwrap();
    let local = ready.local_addr();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(ready.serve(cancel.clone()));

    // First connection is dropped by the tunnel without any data
    let mut rejected = TcpStream::connect(local).await.unwrap();
    let mut buf = Vec::new();
    rejected.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());

    assert_eq!(round_trip(local, b"still here".to_vec()).await, b"still here");

    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_rejected_session_never_binds() {
    let echo = echo_server().await;
    let mut sessions = FakeSessions::new(echo);
    sessions.reject = true;

    let err = tunnel::establish(&spec(), &sessions).await.err().unwrap();
    match err {
        TunnelError::Session(e) => assert!(e.is_fatal()),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let echo = echo_server().await;
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut spec = spec();
    spec.local_port = taken.local_addr().unwrap().port();

    let err = tunnel::establish(&spec, &FakeSessions::new(echo)).await.err().unwrap();
    assert!(matches!(err, TunnelError::Bind { .. }));
}

#[tokio::test]
async fn test_manager_double_start_binds_once() {
    let echo = echo_server().await;
    let sessions = Arc::new(FakeSessions::new(echo));
    let counter = sessions.sessions.clone();
    let manager = TunnelManager::new(TaskLauncher::new(sessions));

    let first = manager.start(&spec()).await.unwrap();
    let second = manager.start(&spec()).await.unwrap();

    let TunnelStart::Started(addr) = first else {
        panic!("first start should launch");
    };
    assert_eq!(second, TunnelStart::AlreadyRunning(addr));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(round_trip(addr, b"ping".to_vec()).await, b"ping");

    assert!(manager.stop().await);
    assert!(!manager.is_active().await);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stop_never_started_is_no_op() {
    let echo = echo_server().await;
    let manager = TunnelManager::new(TaskLauncher::new(Arc::new(FakeSessions::new(echo))));
    assert!(!manager.stop().await);
}
