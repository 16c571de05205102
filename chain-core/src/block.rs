//! Block header, block body and Merkle-root computation (spec §3, §4.3).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared::{Hash256, Target};

use crate::transaction::Transaction;

/// A block header hashes six fields, concatenated as decimal/hex text in
/// declaration order, through double-SHA256 (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub hash_parent: Hash256,
    pub hash_merkle: Hash256,
    pub time: i64,
    pub target: String,
    pub nonce: u64,
}

impl BlockHeader {
    #[must_use]
    pub const fn new(
        version: u32,
        hash_parent: Hash256,
        hash_merkle: Hash256,
        time: i64,
        target: String,
        nonce: u64,
    ) -> Self {
        Self {
            version,
            hash_parent,
            hash_merkle,
            time,
            target,
            nonce,
        }
    }

    /// The exact byte string hashed to produce the block's identity: the six
    /// header fields concatenated in declaration order, each rendered as
    /// plain text.
    #[must_use]
    pub fn repr(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.version, self.hash_parent, self.hash_merkle, self.time, self.target, self.nonce
        )
    }

    #[must_use]
    pub fn block_hash(&self) -> Hash256 {
        Hash256::double_sha256(self.repr().as_bytes())
    }

    pub fn meets_target(&self) -> shared::Result<bool> {
        let target = Target::parse(&self.target)?;
        Ok(self.block_hash().meets_target(&target))
    }
}

/// A block pairs a header with its ordered `txid -> Transaction` map; the
/// map preserves insertion order so the coinbase transaction stays first and
/// the Merkle root is reproducible from the serialized form alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    pub header: BlockHeader,
    pub transactions: IndexMap<Hash256, Transaction>,
}

impl Block {
    #[must_use]
    pub fn new(header: BlockHeader, transactions: IndexMap<Hash256, Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    #[must_use]
    pub fn block_hash(&self) -> Hash256 {
        self.header.block_hash()
    }

    #[must_use]
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.values().find(|tx| tx.is_coinbase())
    }

    /// Recomputes the Merkle root over this block's current transaction set,
    /// for comparison against `header.hash_merkle`.
    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root(self.transactions.keys().copied())
    }
}

/// Builds a Merkle root over transaction ids, padding uniformly at every
/// level (leaf and interior) by duplicating the last element when a level
/// has an odd count, combining pairs with a single SHA256 of their
/// concatenated bytes per level, then hashing the final remaining digest
/// once more (spec §4.3 steps 3-4).
pub fn merkle_root<I>(txids: I) -> Hash256
where
    I: IntoIterator<Item = Hash256>,
{
    let mut level: Vec<Hash256> = txids.into_iter().collect();
    if level.is_empty() {
        return Hash256::zero();
    }
    if level.len() % 2 == 1 {
        level.push(*level.last().unwrap());
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(pair[0].as_bytes());
            data.extend_from_slice(pair[1].as_bytes());
            next.push(Hash256::sha256(&data));
        }
        if next.len() % 2 == 1 && next.len() > 1 {
            next.push(*next.last().unwrap());
        }
        level = next;
    }
    Hash256::sha256(level[0].as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Amount;

    fn header(nonce: u64) -> BlockHeader {
        BlockHeader::new(
            1,
            Hash256::zero(),
            Hash256::sha256(b"merkle"),
            1_700_000_000,
            Target::from_difficulty(2).encode(),
            nonce,
        )
    }

    #[test]
    fn repr_concatenates_fields_in_declaration_order() {
        let h = header(7);
        let expected = format!(
            "1{}{}{}1effffff7",
            Hash256::zero(),
            Hash256::sha256(b"merkle"),
            1_700_000_000
        );
        assert_eq!(h.repr(), expected);
    }

    #[test]
    fn block_hash_is_deterministic() {
        let h = header(1);
        assert_eq!(h.block_hash(), h.block_hash());
    }

    #[test]
    fn merkle_root_single_leaf_duplicates_to_itself() {
        let tx = Hash256::sha256(b"tx1");
        assert_eq!(merkle_root([tx]), merkle_root([tx, tx]));
    }

    #[test]
    fn merkle_root_odd_level_pads_with_last_element() {
        let a = Hash256::sha256(b"a");
        let b = Hash256::sha256(b"b");
        let c = Hash256::sha256(b"c");
        let padded = merkle_root([a, b, c]);
        let explicit = merkle_root([a, b, c, c]);
        assert_eq!(padded, explicit);
    }

    #[test]
    fn block_roundtrips_through_json() {
        let mut transactions = IndexMap::new();
        let tx = Transaction::coinbase(Amount::REWARD, "dead".to_string());
        let txid = tx.txid().unwrap();
        transactions.insert(txid, tx);

        let block = Block::new(header(0), transactions);
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(&txid.to_string()));

        let parsed: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.block_hash(), block.block_hash());
    }

    #[test]
    fn compute_merkle_root_matches_standalone_function() {
        let mut transactions = IndexMap::new();
        let tx = Transaction::coinbase(Amount::REWARD, "dead".to_string());
        let txid = tx.txid().unwrap();
        transactions.insert(txid, tx);

        let block = Block::new(header(0), transactions);
        assert_eq!(block.compute_merkle_root(), merkle_root([txid]));
    }
}
