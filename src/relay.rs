//! The TCP relay (C4): accepts inbound connections, asks the balancer for a
//! target, dials it, and splices the two sockets.
//!
//! Grounded on the teacher's `server::Bound` accept loop (poll the listener,
//! spawn a task per accepted connection) and its `connection::duplex`
//! byte-accounting Summary, generalized from the teacher's single-threaded
//! futures-0.1 poll loop to a per-connection `tokio::spawn`ed task, per the
//! spec's concurrency model (§5): each accepted connection is independent,
//! and the registry lock is held only across `pick_one`/`on_open`/`on_close`,
//! never across the dial or the splice.

use std::sync::Arc;

use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::connector;
use crate::events::Event;
use crate::shared::Shared;

/// The literal body the spec requires when no target is available (S2).
pub const NOT_READY_BODY: &[u8] = b"socket transfer not ready!";

/// Drives the accept loop for one bound listener until the task is aborted
/// (by the supervisor's `unlisten`).
pub async fn run_listener(listener: tokio::net::TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("accepted connection from {}", peer);
                let shared = shared.clone();
                tokio::spawn(async move {
                    handle_connection(socket, shared).await;
                });
            }
            Err(e) => {
                warn!("listener accept error: {}", e);
                let _ = shared.events.send(Event::ErrorSocketTransfer { message: e.to_string() });
            }
        }
    }
}

async fn handle_connection(mut client: TcpStream, shared: Arc<Shared>) {
    // pick_one + on_open happen under one lock acquisition, not two: for
    // MINIMUM_CONNECTION, selection and bookkeeping must be atomic or two
    // concurrent accepts can both observe the same least-loaded target
    // before either increments it. The lock is dropped before the dial.
    let target = {
        let mut reg = shared.registry.lock().expect("registry lock poisoned");
        let target = shared.balancer.pick_one(&mut reg);
        if let Some(t) = &target {
            shared.balancer.on_open(&mut reg, t.id());
        }
        target
    };

    let target = match target {
        Some(t) => t,
        None => {
            let _ = client.write_all(NOT_READY_BODY).await;
            let _ = client.shutdown().await;
            let _ = shared.events.send(Event::ErrorLoadBalancer { message: "no target available".into() });
            return;
        }
    };

    let dialed = connector::dial(shared.bind, &target).await;
    let mut remote = match dialed {
        Ok(remote) => remote,
        Err(e) => {
            // The balancer's connection counter must not leak on a failed dial.
            let mut reg = shared.registry.lock().expect("registry lock poisoned");
            shared.balancer.on_close(&mut reg, target.id());
            warn!("dial to target {} failed: {}", target.id(), e);
            return;
        }
    };

    let result = tokio::io::copy_bidirectional(&mut client, &mut remote).await;

    {
        let mut reg = shared.registry.lock().expect("registry lock poisoned");
        shared.balancer.on_close(&mut reg, target.id());
    }

    match result {
        Ok((to_remote, to_client)) => {
            shared.stats.record_session(to_remote, to_client);
        }
        Err(e) => {
            debug!("relay session with target {} ended: {}", target.id(), e);
        }
    }
}
