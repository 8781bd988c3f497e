//! Outbound dial helper used by the relay (C4) to connect to a chosen
//! target.
//!
//! Grounded on the teacher's `connector::Connector::connect`, simplified:
//! this crate has no TLS client path (the upstream's crypto is an opaque
//! concern per the spec's scope), so the connector is reduced to "dial
//! `bind:target.id` and hand back the stream".

use std::net::IpAddr;

use tokio::net::TcpStream;

use crate::target::{dial_addr, Target};

pub async fn dial(bind: IpAddr, target: &Target) -> std::io::Result<TcpStream> {
    TcpStream::connect(dial_addr(bind, target)).await
}
