//! Chain state: block storage, the UTXO set, transaction/block validation and
//! reconciliation between competing chains (spec §4.4, §4.5, §4.8, §4.10).

use std::collections::HashSet;

use shared::{Amount, Hash256, Target, GENESIS_HASH};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::transaction::{Transaction, TxOutput};
use crate::utxo::UtxoSet;

/// An owned blockchain: an ordered list of blocks plus the UTXO set derived
/// from applying them in order.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    blocks: Vec<Block>,
    utxo_set: UtxoSet,
}

impl Chain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    /// The parent hash a new block must reference: the last block's hash, or
    /// the sentinel genesis hash when the chain is empty.
    #[must_use]
    pub fn last_hash(&self) -> Hash256 {
        self.blocks
            .last()
            .map(Block::block_hash)
            .unwrap_or_else(|| Hash256::from_hex(GENESIS_HASH).expect("constant is valid hex"))
    }

    /// Checks a non-coinbase transaction against the current UTXO set,
    /// returning the resulting fee on success (spec §4.4).
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<Amount> {
        if tx.version != 1 {
            return Err(Error::InvalidTransaction(format!(
                "expected version 1, got {}",
                tx.version
            )));
        }
        let mut total = Amount::ZERO;
        let mut spent_data = Vec::new();
        let mut seen_outpoints = HashSet::new();

        for input in &tx.inputs {
            if !seen_outpoints.insert((input.tx_id, input.v_out)) {
                return Err(Error::InvalidTransaction(format!(
                    "outpoint {}:{} was spent twice in the same transaction",
                    input.tx_id, input.v_out
                )));
            }

            if !self.utxo_set.contains(&input.tx_id, input.v_out) {
                return Err(Error::InvalidTransaction(format!(
                    "outpoint {}:{} is not in the unspent set",
                    input.tx_id, input.v_out
                )));
            }

            let entry = self
                .utxo_set
                .get(&input.tx_id)
                .expect("contains() just confirmed presence");
            let referenced_block = self
                .blocks
                .get(entry.block_id)
                .ok_or_else(|| Error::InvalidTransaction("UTXO block index out of range".into()))?;
            let referenced_tx = referenced_block
                .transactions
                .get(&input.tx_id)
                .ok_or_else(|| Error::InvalidTransaction("UTXO transaction not found".into()))?;
            let output = referenced_tx
                .outputs
                .get(input.v_out as usize)
                .ok_or_else(|| Error::InvalidTransaction("UTXO output index out of range".into()))?;

            let key = shared::PublicKey::load(&input.key)?;
            if key.hash()? != output.keyhash() {
                return Err(Error::InvalidTransaction(format!(
                    "public key does not match outpoint {}:{}",
                    input.tx_id, input.v_out
                )));
            }

            let payload = output.signature_payload();
            if !shared::crypto::verify(&key, &input.signature, &payload) {
                return Err(Error::InvalidTransaction(format!(
                    "invalid signature for outpoint {}:{}",
                    input.tx_id, input.v_out
                )));
            }

            match output {
                TxOutput::Amount { amount, .. } => total = total + *amount,
                TxOutput::Data { data, .. } => spent_data.push(data.clone()),
            }
        }

        let output_total = tx
            .outputs
            .iter()
            .filter_map(TxOutput::amount)
            .fold(Amount::ZERO, |acc, a| acc + a);
        let fee = total
            .checked_sub(output_total)
            .ok_or_else(|| Error::InvalidTransaction("output value exceeds input value".into()))?;
        if fee.millis() < 0 {
            return Err(Error::InvalidTransaction(format!(
                "negative transaction fee: {fee}"
            )));
        }

        let carried_forward: HashSet<&str> =
            tx.outputs.iter().filter_map(TxOutput::data).collect();
        for data in &spent_data {
            if !carried_forward.contains(data.as_str()) {
                return Err(Error::InvalidTransaction(
                    "input data was not carried forward to an output".to_string(),
                ));
            }
        }

        Ok(fee)
    }

    /// Validates a mined block against the expected parent hash and target,
    /// re-deriving the coinbase reward from the pool fees (spec §4.5).
    pub fn validate_block(&self, block: &Block, expected_target: &str) -> Result<()> {
        if block.header.hash_parent != self.last_hash() {
            return Err(Error::InvalidBlock(format!(
                "expected parent {}, got {}",
                self.last_hash(),
                block.header.hash_parent
            )));
        }
        if block.header.target != expected_target {
            return Err(Error::InvalidBlock(format!(
                "expected target {}, got {}",
                expected_target, block.header.target
            )));
        }

        let target = Target::parse(&block.header.target)?;
        if !block.block_hash().meets_target(&target) {
            return Err(Error::InvalidBlock(
                "block hash does not meet target".to_string(),
            ));
        }

        if block.header.hash_merkle != block.compute_merkle_root() {
            return Err(Error::InvalidBlock("merkle root mismatch".to_string()));
        }

        let mut coinbase_seen = false;
        let mut total_fees = Amount::ZERO;
        for (txid, tx) in &block.transactions {
            let recomputed = tx.txid()?;
            if recomputed != *txid {
                return Err(Error::InvalidBlock(format!(
                    "transaction hash mismatch: declared {txid}, computed {recomputed}"
                )));
            }

            if tx.is_coinbase() {
                if coinbase_seen {
                    return Err(Error::InvalidBlock(
                        "more than one coinbase transaction".to_string(),
                    ));
                }
                if tx.outputs.len() != 1 {
                    return Err(Error::InvalidBlock(
                        "coinbase transaction must have exactly one output".to_string(),
                    ));
                }
                coinbase_seen = true;
                continue;
            }

            total_fees = total_fees + self.validate_transaction(tx)?;
        }

        if !coinbase_seen {
            return Err(Error::InvalidBlock(
                "block has no coinbase transaction".to_string(),
            ));
        }

        let coinbase_amount = block
            .coinbase()
            .and_then(|tx| tx.outputs.first())
            .and_then(TxOutput::amount)
            .ok_or_else(|| Error::InvalidBlock("coinbase has no amount output".to_string()))?;
        let expected = total_fees + Amount::REWARD;
        if coinbase_amount != expected {
            return Err(Error::InvalidBlock(format!(
                "expected coinbase reward {expected}, got {coinbase_amount}"
            )));
        }

        Ok(())
    }

    /// Validates and appends a block, then advances the UTXO set: spent
    /// outpoints are removed, and the block's own outputs become unspent
    /// (spec §4.8).
    pub fn add_block(&mut self, block: Block, expected_target: &str) -> Result<()> {
        self.validate_block(&block, expected_target)?;
        let block_id = self.blocks.len();

        for tx in block.transactions.values() {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    self.utxo_set.spend(&input.tx_id, input.v_out);
                }
            }
        }

        for (txid, tx) in &block.transactions {
            let v_outs: HashSet<u32> = (0..tx.outputs.len() as u32).collect();
            self.utxo_set.insert(*txid, v_outs, block_id);
        }

        self.blocks.push(block);
        Ok(())
    }

    /// Re-derives the UTXO set from scratch by replaying every block, used
    /// both as an integrity check and after a chain swap (spec §4.10).
    pub fn revalidate(&mut self) -> Result<()> {
        let blocks = std::mem::take(&mut self.blocks);
        self.utxo_set.clear();
        for block in blocks {
            let parent = self.last_hash();
            if block.header.hash_parent != parent {
                return Err(Error::ChainMismatch(format!(
                    "block at height {} does not chain to its predecessor",
                    self.blocks.len()
                )));
            }
            let target = block.header.target.clone();
            self.add_block(block, &target)?;
        }
        Ok(())
    }

    /// Chain reconciliation (spec §4.10): when two chains disagree, the
    /// longest chain that independently revalidates wins. Returns whether
    /// `other` replaced `self`.
    pub fn reconcile(&mut self, other: Chain) -> Result<bool> {
        if other.blocks.len() <= self.blocks.len() {
            return Ok(false);
        }
        let mut candidate = other;
        candidate.revalidate()?;
        *self = candidate;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{merkle_root, BlockHeader};
    use indexmap::IndexMap;
    use shared::{KeyPair, PublicKey};

    fn signed_coinbase_and_spend(keypair: &KeyPair) -> (Block, Block) {
        let pub_hash = PublicKey::hash(&keypair.public).unwrap();
        let coinbase = Transaction::coinbase(Amount::REWARD, pub_hash.clone());
        let mut genesis_txs = IndexMap::new();
        let cb_txid = coinbase.txid().unwrap();
        genesis_txs.insert(cb_txid, coinbase);
        let merkle = merkle_root(genesis_txs.keys().copied());
        let target = Target::from_difficulty(2).encode();
        let header = BlockHeader::new(
            1,
            Hash256::from_hex(GENESIS_HASH).unwrap(),
            merkle,
            1_700_000_000,
            target,
            0,
        );
        let genesis = Block::new(header, genesis_txs);

        let payload = Amount::from_millis(3125).to_payload_string();
        let sig = shared::crypto::sign(&keypair.private, &payload).unwrap();
        let spend_input = crate::transaction::TxInput {
            tx_id: cb_txid,
            v_out: 0,
            key: keypair.public.dump().unwrap(),
            signature: sig,
        };
        let spend_tx = Transaction {
            version: 1,
            inputs: vec![spend_input],
            outputs: vec![TxOutput::Amount {
                amount: Amount::from_millis(3125),
                keyhash: pub_hash,
            }],
            coinbase: false,
        };
        let spend_coinbase = Transaction::coinbase(Amount::REWARD, "feed".to_string());
        let mut next_txs = IndexMap::new();
        let spend_txid = spend_tx.txid().unwrap();
        let cb2_txid = spend_coinbase.txid().unwrap();
        next_txs.insert(cb2_txid, spend_coinbase);
        next_txs.insert(spend_txid, spend_tx);
        let merkle2 = merkle_root(next_txs.keys().copied());
        let header2 = BlockHeader::new(1, genesis.block_hash(), merkle2, 1_700_000_100, target2(), 0);
        let next = Block::new(header2, next_txs);
        (genesis, next)
    }

    fn target2() -> String {
        Target::from_difficulty(2).encode()
    }

    #[test]
    fn add_genesis_and_spend_it_updates_utxo_set() {
        let keypair = KeyPair::generate().unwrap();
        let (genesis, next) = signed_coinbase_and_spend(&keypair);

        let mut chain = Chain::new();
        let target = Target::from_difficulty(2).encode();
        chain.add_block(genesis, &target).unwrap();
        assert_eq!(chain.len(), 1);

        chain.add_block(next, &target).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn reject_block_with_wrong_parent() {
        let keypair = KeyPair::generate().unwrap();
        let (_, mut next) = signed_coinbase_and_spend(&keypair);
        next.header.hash_parent = Hash256::sha256(b"wrong");
        let chain = Chain::new();
        let target = Target::from_difficulty(2).encode();
        assert!(chain.validate_block(&next, &target).is_err());
    }

    #[test]
    fn longer_valid_chain_wins_reconciliation() {
        let keypair = KeyPair::generate().unwrap();
        let (genesis, next) = signed_coinbase_and_spend(&keypair);
        let target = Target::from_difficulty(2).encode();

        let mut short = Chain::new();
        short.add_block(genesis.clone(), &target).unwrap();

        let mut long = Chain::new();
        long.add_block(genesis, &target).unwrap();
        long.add_block(next, &target).unwrap();

        let replaced = short.reconcile(long).unwrap();
        assert!(replaced);
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn shorter_chain_does_not_replace_longer_one() {
        let keypair = KeyPair::generate().unwrap();
        let (genesis, next) = signed_coinbase_and_spend(&keypair);
        let target = Target::from_difficulty(2).encode();

        let mut long = Chain::new();
        long.add_block(genesis.clone(), &target).unwrap();
        long.add_block(next, &target).unwrap();

        let mut short = Chain::new();
        short.add_block(genesis, &target).unwrap();

        let replaced = long.reconcile(short).unwrap();
        assert!(!replaced);
        assert_eq!(long.len(), 2);
    }
}
