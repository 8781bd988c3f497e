//! The load balancer (C2): given the current target set, selects one
//! target per request and maintains per-algorithm bookkeeping.
//!
//! Grounded on the teacher's `lb::Balancer`/`balancer::manager` split: a
//! balancer is constructed once with a fixed algorithm (the teacher's
//! `Balancer<A>` is likewise parameterized once, at construction, over its
//! address stream), and the registry it balances over is a separate,
//! lock-protected value the caller threads through.

mod state;

pub use self::state::BalancerState;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::target::{Target, TargetSet};

/// The balancing algorithm, fixed for the balancer's lifetime. To change
/// algorithms, construct a new `Balancer` (and a fresh `BalancerState`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    Polling,
    Weights,
    MinimumConnection,
    Random,
    WeightsRandom,
    Specify(u16),
}

impl Default for Strategy {
    fn default() -> Strategy {
        Strategy::Polling
    }
}

/// The registry and its balancer state, meant to be held behind a single
/// lock: the lock is taken for the duration of `pick_one` and any mutator,
/// and must never be held across network I/O.
#[derive(Debug)]
pub struct Registry {
    pub targets: TargetSet,
    pub state: BalancerState,
}

impl Registry {
    pub fn new(strategy: &Strategy, targets: TargetSet) -> Registry {
        let state = BalancerState::for_strategy(strategy);
        let mut reg = Registry { targets, state };
        reg.state.reseat(&reg.targets);
        reg
    }
}

pub struct Balancer {
    strategy: Strategy,
}

impl Balancer {
    pub fn new(strategy: Strategy) -> Balancer {
        Balancer { strategy }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn new_state(&self) -> BalancerState {
        BalancerState::for_strategy(&self.strategy)
    }

    /// Re-seats `state` to match `targets` after a registry mutation. For
    /// MINIMUM_CONNECTION, state (not `Target::connections`) is the
    /// authoritative live-count ledger across a `setTargets`/`pushTargets`
    /// call — an id present before and after keeps its in-flight count,
    /// matching the reseat rule `Weights` residues already follow.
    /// `Target::connections` is then re-synced from state so a snapshot
    /// taken right after reflects the carried-over count.
    pub fn reseat(&self, reg: &mut Registry) {
        reg.state.reseat(&reg.targets);
        reg.state.sync_connections(&mut reg.targets);
    }

    /// Selects one target. Returns `None` iff the registry is empty, or
    /// (SPECIFY) the pinned id is absent.
    pub fn pick_one(&self, reg: &mut Registry) -> Option<Target> {
        if reg.targets.is_empty() {
            return None;
        }
        let id = match self.strategy {
            Strategy::Polling => reg.state.next_polling(&reg.targets)?,
            Strategy::Weights => reg.state.next_weighted(&reg.targets)?,
            Strategy::MinimumConnection => reg.state.pick_minimum_connection(&reg.targets)?,
            Strategy::Random => pick_random(&reg.targets)?,
            Strategy::WeightsRandom => pick_weighted_random(&reg.targets)?,
            Strategy::Specify(pinned) => pinned,
        };
        reg.targets.find(id).cloned()
    }

    /// MINIMUM_CONNECTION bookkeeping: C4 must call this when dialing, under
    /// the same lock acquisition as the `pick_one` that selected `id` (the
    /// pick-then-bump must be atomic, or two concurrent accepts can both
    /// observe the same least-loaded target before either increments it).
    pub fn on_open(&self, reg: &mut Registry, id: u16) {
        if self.strategy == Strategy::MinimumConnection {
            let next = reg.state.bump_connection(id, 1);
            if let Some(t) = reg.targets.find_mut(id) {
                t.set_connections(next);
            }
        }
    }

    /// MINIMUM_CONNECTION bookkeeping: C4 must call this at session end, and
    /// on dial failure (the counter must not leak on a failed dial).
    pub fn on_close(&self, reg: &mut Registry, id: u16) {
        if self.strategy == Strategy::MinimumConnection {
            let next = reg.state.bump_connection(id, -1);
            if let Some(t) = reg.targets.find_mut(id) {
                t.set_connections(next);
            }
        }
    }
}

fn pick_random(targets: &TargetSet) -> Option<u16> {
    let n = targets.len();
    if n == 0 {
        return None;
    }
    let i = rand::thread_rng().gen_range(0..n);
    targets.get(i).map(Target::id)
}

fn pick_weighted_random(targets: &TargetSet) -> Option<u16> {
    let total: u64 = targets.iter().map(|t| t.weight() as u64).sum();
    if total == 0 {
        return None;
    }
    let mut pick = rand::thread_rng().gen_range(0..total);
    for t in targets.iter() {
        let w = t.weight() as u64;
        if pick < w {
            return Some(t.id());
        }
        pick -= w;
    }
    targets.iter().last().map(Target::id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    fn set(ids: &[u16]) -> TargetSet {
        let mut s = TargetSet::new();
        s.push(ids.iter().map(|&id| Target::new(id)).collect());
        s
    }

    #[test]
    fn empty_registry_yields_none() {
        let bal = Balancer::new(Strategy::Polling);
        let mut reg = Registry::new(&Strategy::Polling, TargetSet::new());
        assert!(bal.pick_one(&mut reg).is_none());
    }

    #[test]
    fn round_robin_matches_scenario_s1() {
        let bal = Balancer::new(Strategy::Polling);
        let mut reg = Registry::new(&Strategy::Polling, set(&[1081, 1082, 1083]));
        let picks: Vec<u16> = (0..5).map(|_| bal.pick_one(&mut reg).unwrap().id()).collect();
        assert_eq!(picks, vec![1081, 1082, 1083, 1081, 1082]);
    }

    #[test]
    fn minimum_connection_prefers_least_loaded() {
        let bal = Balancer::new(Strategy::MinimumConnection);
        let mut reg = Registry::new(&Strategy::MinimumConnection, set(&[1, 2]));
        bal.on_open(&mut reg, 1);
        bal.on_open(&mut reg, 1);
        let picked = bal.pick_one(&mut reg).unwrap();
        assert_eq!(picked.id(), 2);
    }

    #[test]
    fn minimum_connection_does_not_leak_on_close() {
        let bal = Balancer::new(Strategy::MinimumConnection);
        let mut reg = Registry::new(&Strategy::MinimumConnection, set(&[1]));
        bal.on_open(&mut reg, 1);
        bal.on_close(&mut reg, 1);
        assert_eq!(reg.targets.find(1).unwrap().connections(), 0);
    }

    #[test]
    fn minimum_connection_survives_set_targets_for_ids_still_present() {
        let bal = Balancer::new(Strategy::MinimumConnection);
        let mut reg = Registry::new(&Strategy::MinimumConnection, set(&[1, 2]));
        bal.on_open(&mut reg, 1);
        bal.on_open(&mut reg, 1);
        bal.on_open(&mut reg, 2);

        // `set` replaces with caller-built `Target`s that all carry
        // connections = 0; id 1 survives (keeps its count of 2), id 2 is
        // dropped, id 3 is new (zero-initialized).
        reg.targets.set(vec![Target::new(1), Target::new(3)]);
        bal.reseat(&mut reg);

        assert_eq!(reg.targets.find(1).unwrap().connections(), 2);
        assert_eq!(reg.targets.find(3).unwrap().connections(), 0);

        // The live count, not just the mirrored field, must be the ledger:
        // the next pick must favor id 3 (0 in-flight) over id 1 (2 in-flight).
        assert_eq!(bal.pick_one(&mut reg).unwrap().id(), 3);
    }

    #[test]
    fn specify_pins_to_one_target() {
        let bal = Balancer::new(Strategy::Specify(2));
        let mut reg = Registry::new(&Strategy::Specify(2), set(&[1, 2, 3]));
        assert_eq!(bal.pick_one(&mut reg).unwrap().id(), 2);
    }

    #[test]
    fn specify_missing_yields_none() {
        let bal = Balancer::new(Strategy::Specify(9));
        let mut reg = Registry::new(&Strategy::Specify(9), set(&[1, 2]));
        assert!(bal.pick_one(&mut reg).is_none());
    }

    #[test]
    fn set_targets_only_yields_members_of_new_set() {
        let bal = Balancer::new(Strategy::Polling);
        let mut reg = Registry::new(&Strategy::Polling, set(&[1, 2, 3]));
        reg.targets.set(vec![Target::new(4), Target::new(5)]);
        bal.reseat(&mut reg);
        for _ in 0..10 {
            let id = bal.pick_one(&mut reg).unwrap().id();
            assert!(id == 4 || id == 5);
        }
    }
}
