//! UTXO set (spec §3): unlike a per-outpoint model, each entry is keyed by
//! `txid` and tracks the still-unspent output indices of that transaction.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shared::Hash256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub v_outs: HashSet<u32>,
    pub block_id: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtxoSet {
    entries: HashMap<Hash256, UtxoEntry>,
}

impl UtxoSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, txid: &Hash256) -> Option<&UtxoEntry> {
        self.entries.get(txid)
    }

    #[must_use]
    pub fn contains(&self, txid: &Hash256, v_out: u32) -> bool {
        self.entries
            .get(txid)
            .is_some_and(|entry| entry.v_outs.contains(&v_out))
    }

    /// Inserts a freshly-created set of outpoints for a transaction just
    /// added to the chain (spec §4.8).
    pub fn insert(&mut self, txid: Hash256, v_outs: HashSet<u32>, block_id: usize) {
        if v_outs.is_empty() {
            return;
        }
        self.entries.insert(txid, UtxoEntry { v_outs, block_id });
    }

    /// Removes a spent `(txid, v_out)` pair, deleting the entry entirely
    /// once its last output has been spent (spec §3 invariant, §4.8).
    pub fn spend(&mut self, txid: &Hash256, v_out: u32) {
        let Some(entry) = self.entries.get_mut(txid) else {
            return;
        };
        entry.v_outs.remove(&v_out);
        if entry.v_outs.is_empty() {
            self.entries.remove(txid);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_spend_last_output_removes_entry() {
        let mut set = UtxoSet::new();
        let txid = Hash256::zero();
        set.insert(txid, HashSet::from([0]), 0);
        assert!(set.contains(&txid, 0));

        set.spend(&txid, 0);
        assert!(!set.contains(&txid, 0));
        assert!(set.get(&txid).is_none());
    }

    #[test]
    fn spending_one_of_two_outputs_keeps_entry() {
        let mut set = UtxoSet::new();
        let txid = Hash256::zero();
        set.insert(txid, HashSet::from([0, 1]), 0);

        set.spend(&txid, 0);
        assert!(!set.contains(&txid, 0));
        assert!(set.contains(&txid, 1));
    }

    #[test]
    fn spending_unknown_outpoint_is_a_no_op() {
        let mut set = UtxoSet::new();
        set.spend(&Hash256::zero(), 0);
        assert!(set.get(&Hash256::zero()).is_none());
    }
}
