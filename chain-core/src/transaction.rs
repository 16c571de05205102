//! Transaction data model (spec §3/§4.4). Validation lives on [`crate::chain::Chain`]
//! since it needs the UTXO set and the blocks a transaction's inputs reference.

use serde::{Deserialize, Serialize};
use shared::{Amount, Hash256, PubKeyHex, SignatureHex};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub tx_id: Hash256,
    pub v_out: u32,
    pub key: PubKeyHex,
    pub signature: SignatureHex,
}

/// A transaction output carries either a spendable `amount` or an opaque
/// `data` payload; both forms are keyed to an owner by `keyhash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxOutput {
    Amount { amount: Amount, keyhash: String },
    Data { data: String, keyhash: String },
}

impl TxOutput {
    #[must_use]
    pub fn keyhash(&self) -> &str {
        match self {
            Self::Amount { keyhash, .. } | Self::Data { keyhash, .. } => keyhash,
        }
    }

    #[must_use]
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::Amount { amount, .. } => Some(*amount),
            Self::Data { .. } => None,
        }
    }

    #[must_use]
    pub fn data(&self) -> Option<&str> {
        match self {
            Self::Data { data, .. } => Some(data),
            Self::Amount { .. } => None,
        }
    }

    /// The payload signed over by an input spending this output (spec §4.4
    /// point 5): the decimal amount string, or the raw data string.
    #[must_use]
    pub fn signature_payload(&self) -> String {
        match self {
            Self::Amount { amount, .. } => amount.to_payload_string(),
            Self::Data { data, .. } => data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<TxInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<TxOutput>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub coinbase: bool,
}

impl Transaction {
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    /// Builds the single-output coinbase transaction a miner appends to its
    /// own pool before mining (spec §4.7).
    #[must_use]
    pub fn coinbase(amount: Amount, keyhash: String) -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: vec![TxOutput::Amount { amount, keyhash }],
            coinbase: true,
        }
    }

    /// `txid = SHA256(canonicalJSON(tx))`. `serde_json`'s struct
    /// serialization follows field declaration order deterministically, so
    /// this is used everywhere as the one canonical form (spec invariant 1).
    pub fn txid(&self) -> Result<Hash256> {
        let bytes = serde_json::to_vec(self)?;
        Ok(Hash256::sha256(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txid_is_deterministic() {
        let tx = Transaction::coinbase(Amount::REWARD, "abc".to_string());
        assert_eq!(tx.txid().unwrap(), tx.txid().unwrap());
    }

    #[test]
    fn coinbase_transaction_shape() {
        let tx = Transaction::coinbase(Amount::from_millis(3125), "abc".to_string());
        assert!(tx.is_coinbase());
        assert!(tx.inputs.is_empty());
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn output_signature_payload_uses_decimal_string_for_amount() {
        let out = TxOutput::Amount {
            amount: Amount::from_millis(1000),
            keyhash: "x".into(),
        };
        assert_eq!(out.signature_payload(), "1");
    }

    #[test]
    fn output_signature_payload_uses_raw_data_string() {
        let out = TxOutput::Data {
            data: "deed".into(),
            keyhash: "x".into(),
        };
        assert_eq!(out.signature_payload(), "deed");
    }

    #[test]
    fn non_coinbase_field_is_omitted_when_false() {
        let tx = Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            coinbase: false,
        };
        let json = serde_json::to_string(&tx).unwrap();
        assert!(!json.contains("coinbase"));
    }
}
