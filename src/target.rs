//! The target registry (C1): the mutable set of backend `Target`s consulted
//! by the balancer.
//!
//! Grounded on the teacher's `balancer/endpoint.rs` per-endpoint state
//! (`pending_conns`, `open_conns`, ...) and `balancer/endpoints.rs`'s
//! ordered-collection-of-endpoints shape, generalized here into a single
//! order-preserving registry decoupled from any one balancing algorithm.

use std::net::IpAddr;

/// A backend target, identified by a loopback port.
///
/// Two targets are equal iff their `id`s are equal; `weight` and `id` are
/// immutable once registered, `connections` is owned and mutated only by the
/// balancer's MINIMUM_CONNECTION bookkeeping.
#[derive(Clone, Debug)]
pub struct Target {
    id: u16,
    weight: u32,
    connections: u32,
}

impl Target {
    pub fn new(id: u16) -> Target {
        Target { id, weight: 1, connections: 0 }
    }

    pub fn with_weight(id: u16, weight: u32) -> Target {
        Target { id, weight: weight.max(1), connections: 0 }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn connections(&self) -> u32 {
        self.connections
    }

    /// Mutator reserved for the balancer's MINIMUM_CONNECTION bookkeeping.
    pub(crate) fn set_connections(&mut self, connections: u32) {
        self.connections = connections;
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Target) -> bool {
        self.id == other.id
    }
}
impl Eq for Target {}

/// An ordered, duplicate-tolerant-on-push sequence of `Target`s.
///
/// Order is the balancer's reference order and is stable across `set`/`push`
/// calls that don't mention an existing id, matching the registry contract
/// of the spec's C1: `push` appends as-is (the reference semantics does not
/// deduplicate), `set` replaces wholesale, `filter` retains in place.
#[derive(Clone, Debug, Default)]
pub struct TargetSet(Vec<Target>);

impl TargetSet {
    pub fn new() -> TargetSet {
        TargetSet(Vec::new())
    }

    pub fn from_vec(targets: Vec<Target>) -> TargetSet {
        TargetSet(targets)
    }

    pub fn set(&mut self, targets: Vec<Target>) {
        self.0 = targets;
    }

    pub fn push(&mut self, mut targets: Vec<Target>) {
        self.0.append(&mut targets);
    }

    pub fn filter<F>(&mut self, mut pred: F)
    where
        F: FnMut(&Target) -> bool,
    {
        self.0.retain(|t| pred(t));
    }

    /// An immutable copy for iteration without holding the registry lock.
    pub fn snapshot(&self) -> Vec<Target> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.0.get(index)
    }

    pub fn find(&self, id: u16) -> Option<&Target> {
        self.0.iter().find(|t| t.id == id)
    }

    pub fn find_mut(&mut self, id: u16) -> Option<&mut Target> {
        self.0.iter_mut().find(|t| t.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Target> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Target> {
        self.0.iter_mut()
    }

    pub fn ids(&self) -> Vec<u16> {
        self.0.iter().map(Target::id).collect()
    }
}

/// The outbound-dial host, paired with a `Target`'s port to form a full
/// socket address. Defaults to `0.0.0.0` per the construction options.
pub fn dial_addr(bind: IpAddr, target: &Target) -> std::net::SocketAddr {
    std::net::SocketAddr::new(bind, target.id())
}
