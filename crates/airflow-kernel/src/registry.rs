//! State snapshots and the registry of per-state value tables.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::action::ActionCatalog;
use crate::table::ActionValueTable;

/// Occupancy counts for the cells an actuator observes.
///
/// Produced by the sensor side of the environment and used as an immutable
/// lookup key: two snapshots are the same state iff every count matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateSnapshot(Vec<u32>);

impl StateSnapshot {
    pub fn new(cells: Vec<u32>) -> Self {
        Self(cells)
    }

    pub fn cells(&self) -> &[u32] {
        &self.0
    }

    /// Total targets across all observed cells.
    pub fn occupancy(&self) -> u64 {
        self.0.iter().map(|&c| c as u64).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }
}

impl From<Vec<u32>> for StateSnapshot {
    fn from(cells: Vec<u32>) -> Self {
        Self(cells)
    }
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// Maps every state ever observed to its value table.
///
/// Tables are created on first sight and never evicted, so memory grows with
/// the number of distinct snapshots seen during a run.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    catalog: ActionCatalog,
    tables: HashMap<StateSnapshot, ActionValueTable>,
}

impl StateRegistry {
    pub fn new(catalog: &ActionCatalog) -> Self {
        Self {
            catalog: catalog.clone(),
            tables: HashMap::new(),
        }
    }

    /// Table for `snapshot`, created from the catalog if this state is new.
    pub fn table_mut(&mut self, snapshot: &StateSnapshot) -> &mut ActionValueTable {
        let known = self.tables.len();
        match self.tables.entry(snapshot.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                trace!(state = %snapshot, known, "New state observed");
                entry.insert(ActionValueTable::new(&self.catalog))
            }
        }
    }

    pub fn get(&self, snapshot: &StateSnapshot) -> Option<&ActionValueTable> {
        self.tables.get(snapshot)
    }

    pub fn contains(&self, snapshot: &StateSnapshot) -> bool {
        self.tables.contains_key(snapshot)
    }

    /// Number of distinct states seen so far.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateSnapshot, &ActionValueTable)> {
        self.tables.iter()
    }

    /// Rewards applied across every table.
    pub fn total_attempts(&self) -> u64 {
        self.tables.values().map(|t| t.total_attempts()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_equality_is_by_value() {
        let a = StateSnapshot::new(vec![0, 1, 2]);
        let b = StateSnapshot::from(vec![0, 1, 2]);
        let c = StateSnapshot::new(vec![0, 2, 1]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.occupancy(), 3);
        assert!(!a.is_idle());
        assert!(StateSnapshot::new(vec![0; 8]).is_idle());
        assert_eq!(a.to_string(), "[0 1 2]");
    }

    #[test]
    fn test_tables_created_lazily() {
        let catalog = ActionCatalog::new(4, 4, 2);
        let mut registry = StateRegistry::new(&catalog);
        let state = StateSnapshot::new(vec![1, 0, 0, 0]);

        assert!(registry.is_empty());
        assert!(registry.get(&state).is_none());

        let table = registry.table_mut(&state);
        assert_eq!(table.len(), 9);
        assert_eq!(table.total_attempts(), 0);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&state));
    }

    #[test]
    fn test_existing_table_returned() {
        let catalog = ActionCatalog::new(4, 4, 2);
        let mut registry = StateRegistry::new(&catalog);
        let state = StateSnapshot::new(vec![0, 3]);

        let action = catalog.actions()[2];
        registry.table_mut(&state).reward_action(&action, 12.0).unwrap();

        // An equal snapshot built separately finds the same table
        let same = StateSnapshot::new(vec![0, 3]);
        assert_eq!(registry.table_mut(&same).utility(2), Some(12.0));
        assert_eq!(registry.len(), 1);

        registry.table_mut(&StateSnapshot::new(vec![3, 0]));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.total_attempts(), 1);

        let rewarded: Vec<&StateSnapshot> = registry
            .iter()
            .filter(|(_, table)| table.total_attempts() > 0)
            .map(|(state, _)| state)
            .collect();
        assert_eq!(rewarded, vec![&same]);
    }
}
