//! The emitted-event facade.
//!
//! The reference event emitter is a set of named channels keyed by string;
//! in a typed crate that's a `tokio::sync::broadcast` channel of one `Event`
//! enum, so subscribers match on a variant instead of a string. Variant
//! names and payloads mirror the event table 1:1, including the
//! `ErrorHealthHeck` variant, which preserves the reference implementation's
//! `error:health:heck` misspelling verbatim for interop with anything
//! matching the literal wire name.

use crate::target::Target;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub enum Event {
    /// `error:loadbalancer` — no target was available at accept time.
    ErrorLoadBalancer { message: String },
    /// `error:server:local` — currently unused by default, kept for parity
    /// with the reference's commented-out emission.
    ErrorServerLocal { message: String },
    /// `error:server:remote` — currently unused by default, kept for parity
    /// with the reference's commented-out emission.
    ErrorServerRemote { message: String, port: u16 },
    /// `error:socket:transfer` — listener-level error.
    ErrorSocketTransfer { message: String },
    /// `error:health:heck` — misspelling preserved intentionally.
    ErrorHealthHeck { message: String },
    /// `health:check:failed` — the failed subset from the retry pass.
    HealthCheckFailed { targets: Vec<Target> },
}

pub type EventSender = tokio::sync::broadcast::Sender<Event>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
