//! End-to-end scenarios exercised against real bound loopback sockets, no
//! mock framework — a hand-rolled listener task per target, in the style of
//! the teacher's `tests/mocks/mock_webserver.rs`.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use socket_transfer::balancer::Strategy;
use socket_transfer::{Event, Options, Target, TransferSupervisor};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Binds an ephemeral loopback listener that, on one connection, reads a
/// request and replies with a fixed 4-byte response, then exits. Returns the
/// bound port.
async fn spawn_fixed_reply_target(reply: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            if sock.read(&mut buf).await.is_ok() {
                let _ = sock.write_all(reply).await;
            }
        }
    });
    port
}

/// Binds an ephemeral loopback listener that accepts every connection in a
/// loop and appends its own port to `hits` in the order connections land,
/// so a test can assert the exact dial sequence the balancer produced.
async fn spawn_marking_target(hits: Arc<Mutex<Vec<u16>>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut sock, _)) => {
                    hits.lock().unwrap().push(port);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 16];
                        let _ = sock.read(&mut buf).await;
                        let _ = sock.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    port
}

fn loopback() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

#[tokio::test]
async fn s1_round_robin_dials_targets_in_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let mut ports = Vec::new();
    for _ in 0..3 {
        ports.push(spawn_marking_target(hits.clone()).await);
    }

    let options = Options {
        port: 0,
        address: loopback(),
        bind: loopback(),
        strategy: Strategy::Polling,
        targets: ports.iter().map(|&id| Target::new(id)).collect(),
        heartbeat: vec![300_000.0],
    };
    let mut sup = TransferSupervisor::new(options).unwrap();
    let bound = sup.listen(None).await.unwrap();

    // Five connects, strictly sequential so acceptance order matches dial
    // order: the POLLING cursor visits the three targets round-robin.
    for _ in 0..5 {
        let len_before = hits.lock().unwrap().len();
        let mut client = TcpStream::connect((loopback(), bound)).await.unwrap();
        client.write_all(b"hi").await.unwrap();
        client.shutdown().await.unwrap();
        // Wait for this target to record the hit before dialing the next,
        // so the recorded order reflects dial order and not scheduling luck.
        for _ in 0..50 {
            if hits.lock().unwrap().len() > len_before {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    let recorded = hits.lock().unwrap().clone();
    let expected: Vec<u16> = vec![ports[0], ports[1], ports[2], ports[0], ports[1]];
    assert_eq!(recorded, expected);

    sup.stop().await;
}

#[tokio::test]
async fn s2_empty_target_set_replies_not_ready_and_emits_event() {
    let options = Options {
        port: 0,
        address: loopback(),
        bind: loopback(),
        strategy: Strategy::Polling,
        targets: Vec::new(),
        heartbeat: vec![300_000.0],
    };
    let mut sup = TransferSupervisor::new(options).unwrap();
    let mut events = sup.subscribe();
    let bound = sup.listen(None).await.unwrap();

    let mut client = TcpStream::connect((loopback(), bound)).await.unwrap();
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"socket transfer not ready!");

    let event = tokio::time::timeout(Duration::from_millis(200), events.recv())
        .await
        .expect("timed out waiting for error:loadbalancer event")
        .unwrap();
    assert!(matches!(event, Event::ErrorLoadBalancer { .. }));

    sup.stop().await;
}

#[tokio::test]
async fn s3_byte_accounting_counts_both_directions() {
    let target_port = spawn_fixed_reply_target(b"pong").await;

    let options = Options {
        port: 0,
        address: loopback(),
        bind: loopback(),
        strategy: Strategy::Polling,
        targets: vec![Target::new(target_port)],
        heartbeat: vec![300_000.0],
    };
    let mut sup = TransferSupervisor::new(options).unwrap();
    let bound = sup.listen(None).await.unwrap();

    let before = sup.bytes_transfer();
    let mut client = TcpStream::connect((loopback(), bound)).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
    drop(client);

    // The relay task records the session asynchronously, just after the
    // spliced copy completes; give it a moment to land.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sup.bytes_transfer() - before, 8);

    sup.stop().await;
}

#[tokio::test]
async fn s4_port_in_use_is_rejected_with_localized_message() {
    let held = TcpListener::bind((loopback(), 0)).await.unwrap();
    let taken_port = held.local_addr().unwrap().port();

    let options = Options {
        port: taken_port,
        address: loopback(),
        bind: loopback(),
        strategy: Strategy::Polling,
        targets: Vec::new(),
        heartbeat: vec![300_000.0],
    };
    let mut sup = TransferSupervisor::new(options).unwrap();
    let err = sup.listen(None).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("port already in use"));
    assert!(message.contains(&taken_port.to_string()));

    sup.stop().await;
    drop(held);
}
