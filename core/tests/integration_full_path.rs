// Full-path integration: directory + three relays + terminal destination
//
// Mirrors the canonical deployment: a directory service, relays r1..r3
// registering over real TCP, a terminal listener named "bob", and a
// sender whose only knowledge is the directory address.

use std::sync::Arc;
use std::time::Duration;

use shallot_core::{
    Directory, DirectoryClient, DirectoryServer, NetConfig, Originator, Relay, RelayConfig,
    SendError, Terminal, TerminalConfig,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const TEST_PRIME_BITS: u64 = 48;

fn test_net() -> NetConfig {
    NetConfig {
        hops: 3,
        prime_bits: TEST_PRIME_BITS,
        io_timeout_secs: 10,
    }
}

async fn spawn_directory(net: &NetConfig) -> Arc<dyn Directory> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let server = DirectoryServer::new(net.clone());
    tokio::spawn(server.run(listener));
    Arc::new(DirectoryClient::new(address, net))
}

async fn spawn_relay(name: &str, directory: &Arc<dyn Directory>, net: &NetConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay = Relay::new(
        RelayConfig {
            name: name.to_string(),
            ip: addr.ip().to_string(),
            port: addr.port(),
            net: net.clone(),
        },
        Arc::clone(directory),
    )
    .unwrap();
    relay.register().await;
    tokio::spawn(relay.serve(listener));
}

async fn spawn_terminal(
    name: &str,
    directory: &Arc<dyn Directory>,
    net: &NetConfig,
) -> mpsc::UnboundedReceiver<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (terminal, rx) = Terminal::new(
        TerminalConfig {
            name: name.to_string(),
            ip: addr.ip().to_string(),
            port: addr.port(),
            net: net.clone(),
        },
        Arc::clone(directory),
    )
    .unwrap();
    terminal.register().await;
    tokio::spawn(terminal.serve(listener));
    rx
}

async fn recv_with_deadline(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("delivery deadline passed")
        .expect("terminal channel closed")
}

#[tokio::test]
async fn test_three_hop_end_to_end_delivery() {
    let net = test_net();
    let directory = spawn_directory(&net).await;

    for name in ["r1", "r2", "r3"] {
        spawn_relay(name, &directory, &net).await;
    }
    let mut deliveries = spawn_terminal("bob", &directory, &net).await;

    // Three relays plus the terminal are registered.
    assert_eq!(directory.list().await.unwrap().len(), 4);

    let originator = Originator::new(Arc::clone(&directory), net.clone());
    originator
        .send("Hello", "bob")
        .await
        .expect("first hop should accept the envelope");

    assert_eq!(recv_with_deadline(&mut deliveries).await, "Hello");
}

#[tokio::test]
async fn test_multiple_messages_each_get_fresh_chains() {
    let net = test_net();
    let directory = spawn_directory(&net).await;

    for name in ["r1", "r2", "r3", "r4", "r5"] {
        spawn_relay(name, &directory, &net).await;
    }
    let mut deliveries = spawn_terminal("bob", &directory, &net).await;

    let originator = Originator::new(Arc::clone(&directory), net.clone());
    for text in ["first", "second", "third"] {
        originator.send(text, "bob").await.unwrap();
        // Chains are sampled per message; each still lands intact.
        assert_eq!(recv_with_deadline(&mut deliveries).await, text);
    }
}

#[tokio::test]
async fn test_send_fails_cleanly_with_too_few_relays() {
    let net = test_net();
    let directory = spawn_directory(&net).await;

    spawn_relay("r1", &directory, &net).await;
    spawn_relay("r2", &directory, &net).await;
    let _deliveries = spawn_terminal("bob", &directory, &net).await;

    // "bob" is registered too but is excluded from chain candidacy,
    // leaving two relays for a three-hop chain.
    let originator = Originator::new(Arc::clone(&directory), net.clone());
    let result = originator.send("Hello", "bob").await;
    assert!(matches!(
        result,
        Err(SendError::InsufficientRouters {
            available: 2,
            required: 3
        })
    ));
}

#[tokio::test]
async fn test_unicode_survives_the_full_path() {
    let net = test_net();
    let directory = spawn_directory(&net).await;

    for name in ["r1", "r2", "r3"] {
        spawn_relay(name, &directory, &net).await;
    }
    let mut deliveries = spawn_terminal("bob", &directory, &net).await;

    let originator = Originator::new(Arc::clone(&directory), net.clone());
    let text = "héllo 中文 🧅 | with, punctuation";
    originator.send(text, "bob").await.unwrap();
    assert_eq!(recv_with_deadline(&mut deliveries).await, text);
}
