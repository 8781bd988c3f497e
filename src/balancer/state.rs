//! Per-algorithm balancer state (`BalancerState` in spec terms).
//!
//! Grounded on `balancer/endpoint.rs`'s `State { pending_conns, open_conns,
//! consecutive_failures, ... }` pattern from the teacher: small plain structs
//! owned behind the registry's lock, mutated in place as picks happen.

use std::collections::HashMap;

use super::Strategy;
use crate::target::{Target, TargetSet};

/// State is opaque to callers and keyed on whichever algorithm owns it.
/// `Stateless` covers RANDOM, WEIGHTS_RANDOM and SPECIFY, none of which
/// carry anything beyond the registry itself. MINIMUM_CONNECTION's live
/// counts live here rather than on `Target::connections` directly, so that
/// `reseat` can carry a surviving id's count across a `setTargets` call the
/// same way `Weights`' residues are carried — `Target::connections` is kept
/// in sync as a read-only mirror for callers that inspect a snapshot.
#[derive(Debug)]
pub enum BalancerState {
    Polling { cursor: usize },
    Weights { current: HashMap<u16, i64> },
    MinimumConnection { counts: HashMap<u16, u32> },
    Stateless,
}

impl BalancerState {
    pub fn for_strategy(strategy: &Strategy) -> BalancerState {
        match strategy {
            Strategy::Polling => BalancerState::Polling { cursor: 0 },
            Strategy::Weights => BalancerState::Weights { current: HashMap::new() },
            Strategy::MinimumConnection => BalancerState::MinimumConnection { counts: HashMap::new() },
            Strategy::Random | Strategy::WeightsRandom | Strategy::Specify(_) => BalancerState::Stateless,
        }
    }

    /// Picks the id with the smallest live count, tie-breaking by registry
    /// order (the first target reached with the minimum wins).
    pub(super) fn pick_minimum_connection(&self, targets: &TargetSet) -> Option<u16> {
        match self {
            BalancerState::MinimumConnection { counts } => targets
                .iter()
                .min_by_key(|t| counts.get(&t.id()).copied().unwrap_or(0))
                .map(Target::id),
            _ => None,
        }
    }

    /// Applies `delta` to `id`'s live count (clamped at 0) and returns the
    /// new value.
    pub(super) fn bump_connection(&mut self, id: u16, delta: i32) -> u32 {
        match self {
            BalancerState::MinimumConnection { counts } => {
                let entry = counts.entry(id).or_insert(0);
                let next = (*entry as i32 + delta).max(0) as u32;
                *entry = next;
                next
            }
            _ => 0,
        }
    }

    /// Advances the POLLING cursor and returns the target it now points at.
    pub(super) fn next_polling(&mut self, targets: &TargetSet) -> Option<u16> {
        match self {
            BalancerState::Polling { cursor } => {
                let n = targets.len();
                if n == 0 {
                    return None;
                }
                let i = *cursor % n;
                *cursor = cursor.wrapping_add(1);
                targets.get(i).map(|t| t.id())
            }
            _ => None,
        }
    }

    /// Smooth weighted round robin: add each target's static weight to its
    /// running `current`, pick the maximum, subtract the total weight from
    /// the winner. Yields an interleaving matching weight ratios without
    /// bursts.
    pub(super) fn next_weighted(&mut self, targets: &TargetSet) -> Option<u16> {
        match self {
            BalancerState::Weights { current } => {
                if targets.is_empty() {
                    return None;
                }
                current.retain(|id, _| targets.find(*id).is_some());
                let mut total = 0i64;
                let mut best: Option<(u16, i64)> = None;
                for t in targets.iter() {
                    let w = t.weight() as i64;
                    total += w;
                    let c = current.entry(t.id()).or_insert(0);
                    *c += w;
                    if best.map(|(_, bc)| *c > bc).unwrap_or(true) {
                        best = Some((t.id(), *c));
                    }
                }
                let (id, _) = best?;
                if let Some(c) = current.get_mut(&id) {
                    *c -= total;
                }
                Some(id)
            }
            _ => None,
        }
    }

    /// Drops state for ids no longer present, preserves state for ids still
    /// present, and leaves the cursor valid modulo the new length.
    pub fn reseat(&mut self, targets: &TargetSet) {
        match self {
            BalancerState::Polling { cursor } => {
                let n = targets.len();
                if n > 0 {
                    *cursor %= n;
                } else {
                    *cursor = 0;
                }
            }
            BalancerState::Weights { current } => {
                current.retain(|id, _| targets.find(*id).is_some());
                for t in targets.iter() {
                    current.entry(t.id()).or_insert(0);
                }
            }
            BalancerState::MinimumConnection { counts } => {
                counts.retain(|id, _| targets.find(*id).is_some());
                for t in targets.iter() {
                    counts.entry(t.id()).or_insert(0);
                }
            }
            BalancerState::Stateless => {}
        }
    }

    /// Mirrors live counts back onto `targets`' `connections` field so a
    /// caller reading `get_targets()`/a snapshot sees the carried-over count
    /// immediately after a `setTargets`/`pushTargets` reseat, not only after
    /// the next `on_open`/`on_close`.
    pub(super) fn sync_connections(&self, targets: &mut TargetSet) {
        if let BalancerState::MinimumConnection { counts } = self {
            for t in targets.iter_mut() {
                let c = counts.get(&t.id()).copied().unwrap_or(0);
                t.set_connections(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;

    #[test]
    fn polling_wraps_modulo_len() {
        let mut targets = TargetSet::new();
        targets.push(vec![Target::new(1081), Target::new(1082), Target::new(1083)]);
        let mut state = BalancerState::for_strategy(&Strategy::Polling);
        let picks: Vec<u16> = (0..5).map(|_| state.next_polling(&targets).unwrap()).collect();
        assert_eq!(picks, vec![1081, 1082, 1083, 1081, 1082]);
    }

    #[test]
    fn weighted_matches_ratio_over_window() {
        let mut targets = TargetSet::new();
        targets.push(vec![Target::with_weight(1, 1), Target::with_weight(2, 3)]);
        let mut state = BalancerState::for_strategy(&Strategy::Weights);
        let mut counts: HashMap<u16, u32> = HashMap::new();
        for _ in 0..(4 * 3) {
            let id = state.next_weighted(&targets).unwrap();
            *counts.entry(id).or_insert(0) += 1;
        }
        assert_eq!(counts[&1], 1 * 3);
        assert_eq!(counts[&2], 3 * 3);
    }

    #[test]
    fn reseat_drops_removed_and_keeps_present() {
        let mut targets = TargetSet::new();
        targets.push(vec![Target::new(1), Target::new(2)]);
        let mut state = BalancerState::for_strategy(&Strategy::Weights);
        state.next_weighted(&targets);
        targets.set(vec![Target::new(2), Target::new(3)]);
        state.reseat(&targets);
        if let BalancerState::Weights { current } = &state {
            assert!(!current.contains_key(&1));
            assert!(current.contains_key(&2));
            assert!(current.contains_key(&3));
        } else {
            panic!("expected weights state");
        }
    }
}
