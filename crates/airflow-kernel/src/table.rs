//! Action-value table: utility estimates for one observed state.

use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::action::{Action, ActionCatalog};
use crate::error::ControlFault;

/// Running-mean utility and attempt count for every candidate action of one
/// state, aligned slot for slot with the catalog.
#[derive(Debug, Clone)]
pub struct ActionValueTable {
    /// Candidate actions, shared with the catalog
    actions: Arc<[Action]>,
    /// Current utility estimate per slot
    utility: Vec<f64>,
    /// Number of rewards folded into each estimate
    attempts: Vec<u32>,
}

impl ActionValueTable {
    /// Create a table with zero utility and zero attempts for every candidate.
    pub fn new(catalog: &ActionCatalog) -> Self {
        let actions = catalog.shared();
        let len = actions.len();
        Self {
            actions,
            utility: vec![0.0; len],
            attempts: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn utility(&self, slot: usize) -> Option<f64> {
        self.utility.get(slot).copied()
    }

    pub fn attempts(&self, slot: usize) -> Option<u32> {
        self.attempts.get(slot).copied()
    }

    pub fn utilities(&self) -> &[f64] {
        &self.utility
    }

    /// Total rewards applied to this table.
    pub fn total_attempts(&self) -> u64 {
        self.attempts.iter().map(|&a| a as u64).sum()
    }

    /// Highest utility and every slot that reaches it exactly.
    pub fn best_slots(&self) -> (f64, Vec<usize>) {
        let mut max = f64::NEG_INFINITY;
        let mut best = Vec::new();

        for (slot, &u) in self.utility.iter().enumerate() {
            if u > max {
                max = u;
                best.clear();
                best.push(slot);
            } else if u == max {
                best.push(slot);
            }
        }

        (max, best)
    }

    /// Pick the next action.
    ///
    /// With probability `explore_probability` any candidate is drawn
    /// uniformly, off included. Otherwise the choice is among the maximal
    /// slots: `previous` is kept when it is one of them, else one is drawn
    /// uniformly.
    pub fn select_action<R: Rng>(
        &self,
        previous: Option<&Action>,
        explore_probability: f64,
        rng: &mut R,
    ) -> Action {
        if rng.random::<f64>() < explore_probability {
            let which = rng.random_range(0..self.actions.len());
            return self.actions[which];
        }

        let (_, best) = self.best_slots();

        if let Some(previous) = previous
            && let Some(slot) = self.slot_of(previous)
            && best.contains(&slot)
        {
            return *previous;
        }

        let which = rng.random_range(0..best.len());
        self.actions[best[which]]
    }

    /// Fold `value` into the running mean of `action`.
    ///
    /// Unknown actions are rejected without touching the table.
    pub fn reward_action(&mut self, action: &Action, value: f64) -> Result<(), ControlFault> {
        let slot = self
            .slot_of(action)
            .ok_or(ControlFault::UnknownActionReward {
                slot: action.slot(),
                slots: self.len(),
            })?;

        let n = self.attempts[slot] as f64;
        self.utility[slot] = (self.utility[slot] * n + value) / (n + 1.0);
        self.attempts[slot] += 1;
        Ok(())
    }

    /// Utilities formatted to two decimals, one column per slot.
    pub fn representation(&self) -> String {
        let mut out = String::with_capacity(self.utility.len() * 7);
        for u in &self.utility {
            out.push_str(&format!("{:.2}  ", u));
        }
        out
    }

    fn slot_of(&self, action: &Action) -> Option<usize> {
        self.actions
            .get(action.slot())
            .filter(|candidate| *candidate == action)
            .map(|candidate| candidate.slot())
    }
}

impl fmt::Display for ActionValueTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.representation().trim_end())
    }
}
