//! Proof-of-work nonce search (spec §4.7, §9): a single mining thread that
//! can be preempted by a cancellation flag shared with the owning process,
//! mirroring `PoWNode.mine_block`'s hashcash loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use shared::{Amount, Hash256, Target};

use crate::block::{merkle_root, Block, BlockHeader};
use crate::error::Result;
use crate::transaction::Transaction;

/// Shared handle a coordinator/miner process uses to preempt an in-flight
/// mining attempt, e.g. when a competing block already won the round.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A successful proof-of-work search result.
#[derive(Debug, Clone)]
pub struct MiningResult {
    pub block: Block,
    pub attempts: u64,
}

/// Builds the candidate block (pool transactions plus a coinbase paying
/// `fee_total + reward` to `miner_keyhash`) and searches nonces until the
/// target is met or `cancel` is set.
///
/// Returns `None` if cancelled before a solution was found.
pub fn mine_block(
    parent: Hash256,
    pool: Vec<Transaction>,
    fee_total: Amount,
    miner_keyhash: String,
    target_str: &str,
    time: i64,
    cancel: &CancelToken,
) -> Result<Option<MiningResult>> {
    let target = Target::parse(target_str)?;
    let coinbase = Transaction::coinbase(fee_total + Amount::REWARD, miner_keyhash);

    let mut transactions = IndexMap::new();
    for tx in pool {
        let txid = tx.txid()?;
        transactions.insert(txid, tx);
    }
    let cb_id = coinbase.txid()?;
    transactions.insert(cb_id, coinbase);

    let merkle = merkle_root(transactions.keys().copied());
    let mut header = BlockHeader::new(1, parent, merkle, time, target_str.to_string(), 0);

    let mut attempts = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if header.block_hash().meets_target(&target) {
            return Ok(Some(MiningResult {
                block: Block::new(header, transactions),
                attempts,
            }));
        }
        header.nonce = header.nonce.wrapping_add(1);
        attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::GENESIS_HASH;

    #[test]
    fn mines_a_block_meeting_a_low_difficulty_target() {
        let target = Target::from_difficulty(1).encode();
        let cancel = CancelToken::new();
        let result = mine_block(
            Hash256::from_hex(GENESIS_HASH).unwrap(),
            Vec::new(),
            Amount::ZERO,
            "deadbeef".to_string(),
            &target,
            1_700_000_000,
            &cancel,
        )
        .unwrap()
        .expect("mining should not be cancelled");

        let parsed_target = Target::parse(&target).unwrap();
        assert!(result.block.block_hash().meets_target(&parsed_target));
        assert_eq!(result.block.transactions.len(), 1);
    }

    #[test]
    fn cancelled_before_start_returns_none() {
        let target = Target::from_difficulty(2).encode();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = mine_block(
            Hash256::from_hex(GENESIS_HASH).unwrap(),
            Vec::new(),
            Amount::ZERO,
            "deadbeef".to_string(),
            &target,
            1_700_000_000,
            &cancel,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn coinbase_reward_includes_pool_fees() {
        let target = Target::from_difficulty(1).encode();
        let cancel = CancelToken::new();
        let result = mine_block(
            Hash256::from_hex(GENESIS_HASH).unwrap(),
            Vec::new(),
            Amount::from_millis(500),
            "deadbeef".to_string(),
            &target,
            1_700_000_000,
            &cancel,
        )
        .unwrap()
        .unwrap();

        let coinbase = result.block.coinbase().unwrap();
        assert_eq!(
            coinbase.outputs[0].amount(),
            Some(Amount::REWARD + Amount::from_millis(500))
        );
    }
}
