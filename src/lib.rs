//! A local TCP relay that load-balances accepted connections across a set
//! of backend targets, prunes unreachable targets via a two-pass retried
//! health check, and runs a companion UDP forwarder pair bridging loopback
//! UDP traffic to a fixed upstream endpoint.
//!
//! See [`supervisor::TransferSupervisor`] for the orchestrating entry
//! point.

pub mod balancer;
pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod health;
pub mod relay;
mod shared;
pub mod stats;
pub mod supervisor;
pub mod target;
pub mod udp;

pub use error::{Error, Result};
pub use events::Event;
pub use supervisor::{Options, TransferSupervisor};
pub use target::{Target, TargetSet};
