//! The health checker (C3): a protocol-aware reachability oracle.
//!
//! A bare TCP connect is necessary but not sufficient — an unrelated service
//! squatting on the port would pass a plain connect check. The default
//! checker here speaks the SOCKS5 method-negotiation opening (RFC 1928 §3:
//! client sends `[VER=5, NMETHODS=1, METHODS=[NO_AUTH]]`, server replies
//! `[VER=5, METHOD]`) since the upstream this crate was built to monitor is a
//! SOCKS5 proxy; any other service, or a dead port, fails to answer with
//! that exact two-byte reply inside the bound.
//!
//! The `HealthChecker` trait is the pluggable seam (the "collaborator
//! contract" of the spec's `shadowChecker`); hosts embedding this crate
//! against a different upstream supply their own impl.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout as tokio_timeout;

/// The reference implementation bounds each probe to 3 seconds.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// `true` iff `address:port` is reachable and answers like the expected
    /// upstream. Connection refused, timeout, and handshake mismatch all
    /// collapse to `false` — callers cannot distinguish the cause, by
    /// contract.
    async fn check(&self, address: IpAddr, port: u16) -> bool;
}

pub struct Socks5HandshakeChecker {
    timeout: Duration,
}

impl Socks5HandshakeChecker {
    pub fn new() -> Socks5HandshakeChecker {
        Socks5HandshakeChecker { timeout: DEFAULT_CHECK_TIMEOUT }
    }

    pub fn with_timeout(timeout: Duration) -> Socks5HandshakeChecker {
        Socks5HandshakeChecker { timeout }
    }
}

impl Default for Socks5HandshakeChecker {
    fn default() -> Socks5HandshakeChecker {
        Socks5HandshakeChecker::new()
    }
}

#[async_trait]
impl HealthChecker for Socks5HandshakeChecker {
    async fn check(&self, address: IpAddr, port: u16) -> bool {
        matches!(tokio_timeout(self.timeout, probe(address, port)).await, Ok(Ok(true)))
    }
}

async fn probe(address: IpAddr, port: u16) -> io::Result<bool> {
    let mut sock = TcpStream::connect((address, port)).await?;
    sock.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut reply = [0u8; 2];
    sock.read_exact(&mut reply).await?;
    Ok(reply[0] == 0x05)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dead_port_is_unreachable() {
        let checker = Socks5HandshakeChecker::with_timeout(Duration::from_millis(200));
        // Port 1 is privileged/unused in test sandboxes; connect should fail fast.
        assert!(!checker.check("127.0.0.1".parse().unwrap(), 1).await);
    }

    #[tokio::test]
    async fn matching_handshake_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 3];
                let _ = sock.read_exact(&mut buf).await;
                let _ = sock.write_all(&[0x05, 0x00]).await;
            }
        });
        let checker = Socks5HandshakeChecker::with_timeout(Duration::from_secs(1));
        assert!(checker.check("127.0.0.1".parse().unwrap(), port).await);
    }

    #[tokio::test]
    async fn unrelated_service_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });
        let checker = Socks5HandshakeChecker::with_timeout(Duration::from_secs(1));
        assert!(!checker.check("127.0.0.1".parse().unwrap(), port).await);
    }
}
