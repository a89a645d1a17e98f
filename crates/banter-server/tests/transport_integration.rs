//! End-to-end integration over real TCP sockets.
//!
//! Spins up the production server runtime on an ephemeral port and
//! drives real clients (the `banter-client` transport) through the
//! handshake, relay, kick, and shutdown paths.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use banter_client::{
    ClientNotice, SessionFailure,
    transport::{ClientCommand, ConnectedClient, connect},
};
use banter_proto::{PresenceReason, Role};
use banter_server::{
    DriverConfig, Server, ServerHandle, ServerNotification, ServerObserver, ServerRuntimeConfig,
};
use tokio::time::{sleep, timeout};

/// Observer that ignores everything; these tests assert on the client
/// side and the operator API.
struct NullObserver;

impl ServerObserver for NullObserver {
    fn handle(&self, _notification: ServerNotification) {}
}

async fn start_server(driver: DriverConfig) -> (ServerHandle, SocketAddr) {
    let config = ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), driver };
    let server = Server::bind(config, Arc::new(NullObserver)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();

    tokio::spawn(server.run());

    (handle, addr)
}

async fn next_notice(client: &mut ConnectedClient) -> ClientNotice {
    timeout(Duration::from_secs(5), client.notices.recv())
        .await
        .expect("timed out waiting for a notice")
        .expect("notice channel closed")
}

/// Wait until the server reports `n` active sessions; identity frames
/// race the next accept, so tests synchronize on the registry.
async fn wait_for_active(handle: &ServerHandle, n: usize) {
    for _ in 0..500 {
        if handle.active_count().await == n {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(handle.active_count().await, n, "server never reached {n} active sessions");
}

#[tokio::test]
async fn handshake_and_text_relay() {
    let (handle, addr) = start_server(DriverConfig::default()).await;

    let mut alice = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut alice).await, ClientNotice::Connected);
    wait_for_active(&handle, 1).await;

    let mut bob = connect(&addr.to_string(), "bob").await.unwrap();
    assert_eq!(next_notice(&mut bob).await, ClientNotice::Connected);
    wait_for_active(&handle, 2).await;

    // Alice hears bob join
    assert_eq!(next_notice(&mut alice).await, ClientNotice::PeerJoined {
        name: "bob".to_string(),
    });

    // Alice speaks; bob receives the relay with alice's stored identity
    alice.commands.send(ClientCommand::SendText("hi bob".to_string())).await.unwrap();
    assert_eq!(next_notice(&mut bob).await, ClientNotice::Text {
        role: Role::Member,
        name: "alice".to_string(),
        body: "hi bob".to_string(),
    });

    // Alice never receives her own broadcast back
    let echo = timeout(Duration::from_millis(300), alice.notices.recv()).await;
    assert!(echo.is_err(), "sender must not receive its own text: {echo:?}");
}

#[tokio::test]
async fn password_gate_over_tcp() {
    let (handle, addr) = start_server(DriverConfig {
        password: Some("pw".to_string()),
        ..Default::default()
    })
    .await;

    let mut client = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut client).await, ClientNotice::PasswordRequired { retry: false });

    // Wrong password: challenged again
    client.commands.send(ClientCommand::SubmitPassword(Some("nope".to_string()))).await.unwrap();
    assert_eq!(next_notice(&mut client).await, ClientNotice::PasswordRequired { retry: true });
    assert_eq!(handle.active_count().await, 0);

    // Correct password: admitted
    client.commands.send(ClientCommand::SubmitPassword(Some("pw".to_string()))).await.unwrap();
    assert_eq!(next_notice(&mut client).await, ClientNotice::Connected);
    wait_for_active(&handle, 1).await;
}

#[tokio::test]
async fn server_full_over_tcp() {
    let (handle, addr) = start_server(DriverConfig {
        max_clients: Some(1),
        ..Default::default()
    })
    .await;

    let mut alice = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut alice).await, ClientNotice::Connected);
    wait_for_active(&handle, 1).await;

    let mut bob = connect(&addr.to_string(), "bob").await.unwrap();
    assert_eq!(next_notice(&mut bob).await, ClientNotice::SessionFailed {
        failure: SessionFailure::ServerIsFull,
    });

    assert_eq!(handle.active_count().await, 1);
}

#[tokio::test]
async fn kick_notifies_target_and_peers() {
    let (handle, addr) = start_server(DriverConfig::default()).await;

    let mut alice = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut alice).await, ClientNotice::Connected);
    wait_for_active(&handle, 1).await;

    let mut bob = connect(&addr.to_string(), "bob").await.unwrap();
    assert_eq!(next_notice(&mut bob).await, ClientNotice::Connected);
    wait_for_active(&handle, 2).await;
    assert_eq!(next_notice(&mut alice).await, ClientNotice::PeerJoined {
        name: "bob".to_string(),
    });

    assert!(handle.kick("bob", false).await);

    assert_eq!(next_notice(&mut bob).await, ClientNotice::Kicked);
    assert_eq!(next_notice(&mut alice).await, ClientNotice::PeerLeft {
        name: "bob".to_string(),
        reason: PresenceReason::Kicked,
    });
    wait_for_active(&handle, 1).await;
}

#[tokio::test]
async fn blocked_address_cannot_rejoin() {
    let (handle, addr) = start_server(DriverConfig::default()).await;

    let mut alice = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut alice).await, ClientNotice::Connected);
    wait_for_active(&handle, 1).await;

    assert!(handle.kick("alice", true).await);
    assert_eq!(next_notice(&mut alice).await, ClientNotice::Kicked);

    // 127.0.0.1 is now blocked: the retry is turned away mid-handshake
    let mut again = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut again).await, ClientNotice::SessionFailed {
        failure: SessionFailure::Blocked,
    });
    assert_eq!(handle.active_count().await, 0);
}

#[tokio::test]
async fn unknown_kick_identifier_reports_not_found() {
    let (handle, _addr) = start_server(DriverConfig::default()).await;

    assert!(!handle.kick("nobody", false).await);
}

#[tokio::test]
async fn shutdown_reaches_active_clients() {
    let (handle, addr) = start_server(DriverConfig::default()).await;

    let mut alice = connect(&addr.to_string(), "alice").await.unwrap();
    assert_eq!(next_notice(&mut alice).await, ClientNotice::Connected);
    wait_for_active(&handle, 1).await;

    handle.shutdown().await;

    assert_eq!(next_notice(&mut alice).await, ClientNotice::ServerShutdown);
}
