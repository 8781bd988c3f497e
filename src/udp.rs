//! The UDP forwarder pair (C5): binds a local IPv4 and a local IPv6 loopback
//! socket, each relaying datagrams to one fixed upstream endpoint and
//! returning the reply to the original sender.
//!
//! This component has no ancestor in the teacher repository (`linkerd-tcp`
//! proxies TCP only); its shape — bind, spawn a relay task per address
//! family, tear down on `end()` swallowing errors — is grounded on the
//! teacher's own lifecycle idiom for the TCP listener (`server::Bound`
//! bind/accept/drop) applied to `tokio::net::UdpSocket`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// The reference configuration's fixed upstream: a public DNS resolver.
pub const DEFAULT_UPSTREAM: (&str, u16) = ("114.114.114.114", 53);

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpForwarderPair {
    v4_addr: SocketAddr,
    v6_addr: SocketAddr,
    v4: JoinHandle<()>,
    v6: JoinHandle<()>,
}

impl UdpForwarderPair {
    /// Binds `127.0.0.1:port` and `[::1]:port`, forwarding both to
    /// `upstream`. `port == 0` lets the OS assign an ephemeral port on each
    /// family independently; use `local_v4_addr`/`local_v6_addr` to recover
    /// what was actually bound.
    pub async fn start(port: u16, upstream: SocketAddr) -> std::io::Result<UdpForwarderPair> {
        let v4_sock = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        let v6_sock = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 1], port))).await?;
        let v4_addr = v4_sock.local_addr()?;
        let v6_addr = v6_sock.local_addr()?;

        let v4 = tokio::spawn(forward_loop(Arc::new(v4_sock), upstream));
        let v6 = tokio::spawn(forward_loop(Arc::new(v6_sock), upstream));

        Ok(UdpForwarderPair { v4_addr, v6_addr, v4, v6 })
    }

    pub fn local_v4_addr(&self) -> SocketAddr {
        self.v4_addr
    }

    pub fn local_v6_addr(&self) -> SocketAddr {
        self.v6_addr
    }

    /// Ends both forwarders. Exceptions from the underlying teardown are
    /// swallowed (best-effort), matching the reference's `handle.end()`
    /// contract.
    pub async fn end(self) {
        self.v4.abort();
        self.v6.abort();
        let _ = self.v4.await;
        let _ = self.v6.await;
    }
}

async fn forward_loop(local: Arc<UdpSocket>, upstream: SocketAddr) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, sender) = match local.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!("udp forwarder recv error: {}", e);
                continue;
            }
        };
        let datagram = buf[..n].to_vec();
        let local = local.clone();
        tokio::spawn(async move {
            if let Err(e) = relay_one(&local, &datagram, sender, upstream).await {
                debug!("udp forwarder relay to {} failed: {}", upstream, e);
            }
        });
    }
}

async fn relay_one(local: &UdpSocket, datagram: &[u8], sender: SocketAddr, upstream: SocketAddr) -> std::io::Result<()> {
    let bind_any: SocketAddr = if upstream.is_ipv6() {
        SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0, 0, 0, 0], 0))
    };
    let upstream_sock = UdpSocket::bind(bind_any).await?;
    upstream_sock.connect(upstream).await?;
    upstream_sock.send(datagram).await?;

    let mut reply = vec![0u8; MAX_DATAGRAM];
    let n = tokio::time::timeout(REPLY_TIMEOUT, upstream_sock.recv(&mut reply)).await??;
    local.send_to(&reply[..n], sender).await?;
    Ok(())
}
