//! The state shared between the relay's accept loop, the health-check task,
//! and the supervisor's control-plane methods.
//!
//! Bundled into one struct behind an `Arc` so that accepted-connection tasks
//! (spawned independently, per §5) can reach the registry/balancer/stats/
//! events without the supervisor needing to hand out five separate handles.

use std::net::IpAddr;
use std::sync::Mutex;

use crate::balancer::{Balancer, Registry};
use crate::events::EventSender;
use crate::stats::TransferStats;

pub struct Shared {
    pub registry: Mutex<Registry>,
    pub balancer: Balancer,
    pub bind: IpAddr,
    pub stats: TransferStats,
    pub events: EventSender,
}
