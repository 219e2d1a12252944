//! Transaction model
//!
//! UTXO-style transactions: inputs reference outputs of previously
//! confirmed transactions, outputs lock value to a public-key hash.
//! Implements the per-input sign/verify protocol: each input is signed
//! over a trimmed copy of the transaction in which only that input's
//! referenced lock data is substituted in.

use crate::crypto::{merkle_root, sha256_concat, verify_digest, KeyError, PubKeyHash};
use crate::wallet::Address;
use chrono::{DateTime, Utc};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Amount minted by a coinbase transaction
pub const SUBSIDY: u64 = 10;

/// Output index carried by a coinbase input
const COINBASE_VOUT: i32 = -1;

/// Transaction-level errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("input references unknown transaction {0}")]
    InvalidReference(TxId),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

/// 32-byte transaction identity, a hash of the transaction's inputs,
/// outputs and creation time. Usable directly as a map key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    /// Sentinel id carried by coinbase inputs, which reference nothing
    pub const NULL: TxId = TxId([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Transaction input referencing one output of a previous transaction.
///
/// `signature` and `pub_key` stay unset until the owning transaction is
/// signed. On a coinbase input, `pub_key` carries arbitrary payload bytes
/// instead of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_tx: TxId,
    pub vout: i32,
    pub signature: Option<Vec<u8>>,
    pub pub_key: Option<Vec<u8>>,
}

impl TxInput {
    pub fn new(prev_tx: TxId, vout: i32, pub_key: Option<Vec<u8>>) -> Self {
        Self {
            prev_tx,
            vout,
            signature: None,
            pub_key,
        }
    }

    /// Content hash over the referenced output and any signing material
    pub fn hash(&self) -> [u8; 32] {
        sha256_concat(&[
            self.prev_tx.as_bytes(),
            &self.vout.to_be_bytes(),
            self.signature.as_deref().unwrap_or(&[]),
            self.pub_key.as_deref().unwrap_or(&[]),
        ])
    }

    /// Whether the stored public key hashes to the given lock value
    pub fn uses_key(&self, pub_key_hash: &PubKeyHash) -> bool {
        match &self.pub_key {
            Some(key) => PubKeyHash::of_raw(key) == *pub_key_hash,
            None => false,
        }
    }
}

/// Transaction output locking `value` units to a public-key hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: PubKeyHash,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: PubKeyHash) -> Self {
        Self {
            value,
            pub_key_hash,
        }
    }

    /// Content hash over the amount and the lock value
    pub fn hash(&self) -> [u8; 32] {
        sha256_concat(&[&self.value.to_be_bytes(), self.pub_key_hash.as_bytes()])
    }

    /// Whether this output is locked to the given public-key hash
    pub fn is_locked_with(&self, pub_key_hash: &PubKeyHash) -> bool {
        self.pub_key_hash == *pub_key_hash
    }
}

/// A ledger transaction.
///
/// The id is computed once at construction and never recomputed: the
/// signatures stored into inputs afterwards change the content hash but
/// not the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TxId,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    created: DateTime<Utc>,
}

impl Transaction {
    /// Build a transaction, fixing its identity from the initial inputs,
    /// outputs and creation time
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: TxId::NULL,
            inputs,
            outputs,
            created: Utc::now(),
        };
        tx.id = TxId(tx.content_hash());
        tx
    }

    /// Create a coinbase transaction minting the subsidy to `to`.
    ///
    /// The single input references nothing and carries `data` (or a
    /// default reward note) as payload. Coinbase transactions are never
    /// signed or verified.
    pub fn coinbase(to: &Address, data: Option<String>) -> Self {
        let payload = data.unwrap_or_else(|| format!("Reward to '{to}'"));
        let input = TxInput {
            prev_tx: TxId::NULL,
            vout: COINBASE_VOUT,
            signature: None,
            pub_key: Some(payload.into_bytes()),
        };
        let output = TxOutput::new(SUBSIDY, to.pub_key_hash());
        Self::new(vec![input], vec![output])
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_tx.is_null() && self.inputs[0].vout == COINBASE_VOUT
    }

    /// Hash of the transaction's current content: the Merkle root of its
    /// input hashes, the Merkle root of its output hashes and the
    /// creation time as a big-endian millisecond count.
    pub fn content_hash(&self) -> [u8; 32] {
        let input_root = merkle_root(self.inputs.iter().map(TxInput::hash).collect());
        let output_root = merkle_root(self.outputs.iter().map(TxOutput::hash).collect());
        sha256_concat(&[
            &input_root,
            &output_root,
            &self.created.timestamp_millis().to_be_bytes(),
        ])
    }

    /// A copy with the same id and outputs but every input's signing
    /// material cleared. Basis for the per-input sign/verify digest.
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput::new(input.prev_tx, input.vout, None))
            .collect();
        Transaction {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
            created: self.created,
        }
    }

    /// Sign every input against the transactions it references.
    ///
    /// For each input in order, the trimmed copy gets that input's
    /// referenced `pub_key_hash` substituted into its `pub_key` field, the
    /// copy's content hash is recomputed and signed, and the signature is
    /// stored on this transaction's input. The substitution is cleared
    /// before the next input, so every digest reflects exactly one
    /// input's lock data.
    pub fn sign(
        &mut self,
        secret_key: &SecretKey,
        prev_txs: &HashMap<TxId, Transaction>,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }
        self.check_references(prev_txs)?;

        let mut copy = self.trimmed_copy();
        for i in 0..self.inputs.len() {
            let lock = referenced_output(&copy.inputs[i], prev_txs)?.pub_key_hash;
            copy.inputs[i].signature = None;
            copy.inputs[i].pub_key = Some(lock.to_vec());
            let digest = copy.content_hash();
            copy.inputs[i].pub_key = None;

            let signature = crate::crypto::sign_digest(secret_key, &digest)?;
            self.inputs[i].signature = Some(signature);
        }
        Ok(())
    }

    /// Check every input's stored signature using the identical
    /// substitution performed by [`sign`](Self::sign).
    ///
    /// Returns `Ok(false)` as soon as any input fails; a missing
    /// referenced transaction is an error, never a silent `false`. Note
    /// that the stored public key is only checked against the signature,
    /// not against the referenced output's lock hash.
    pub fn verify(
        &self,
        prev_txs: &HashMap<TxId, Transaction>,
    ) -> Result<bool, TransactionError> {
        if self.is_coinbase() {
            return Ok(true);
        }
        self.check_references(prev_txs)?;

        let mut copy = self.trimmed_copy();
        for i in 0..self.inputs.len() {
            let (signature, pub_key) = match (&self.inputs[i].signature, &self.inputs[i].pub_key) {
                (Some(signature), Some(pub_key)) => (signature.clone(), pub_key.clone()),
                _ => return Ok(false),
            };

            let lock = referenced_output(&self.inputs[i], prev_txs)?.pub_key_hash;
            copy.inputs[i].signature = None;
            copy.inputs[i].pub_key = Some(lock.to_vec());
            let digest = copy.content_hash();
            copy.inputs[i].pub_key = None;

            match verify_digest(&pub_key, &digest, &signature) {
                Ok(true) => {}
                // Malformed key or signature bytes make the input
                // invalid, the same as a failed check
                Ok(false)
                | Err(KeyError::InvalidPublicKey)
                | Err(KeyError::InvalidSignature) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn check_references(
        &self,
        prev_txs: &HashMap<TxId, Transaction>,
    ) -> Result<(), TransactionError> {
        for input in &self.inputs {
            if !prev_txs.contains_key(&input.prev_tx) {
                return Err(TransactionError::InvalidReference(input.prev_tx));
            }
        }
        Ok(())
    }
}

/// Resolve the output an input references within the supplied map
fn referenced_output<'a>(
    input: &TxInput,
    prev_txs: &'a HashMap<TxId, Transaction>,
) -> Result<&'a TxOutput, TransactionError> {
    let prev = prev_txs
        .get(&input.prev_tx)
        .ok_or(TransactionError::InvalidReference(input.prev_tx))?;
    usize::try_from(input.vout)
        .ok()
        .and_then(|vout| prev.outputs.get(vout))
        .ok_or(TransactionError::InvalidReference(input.prev_tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn address_of(kp: &KeyPair) -> Address {
        Address::from_pub_key_hash(kp.pub_key_hash())
    }

    /// A coinbase to `owner` and a payment spending its single output
    fn payment_fixture(
        owner: &KeyPair,
        to: &KeyPair,
        amount: u64,
    ) -> (HashMap<TxId, Transaction>, Transaction) {
        let funding = Transaction::coinbase(&address_of(owner), None);
        let input = TxInput::new(funding.id(), 0, Some(owner.public_key_bytes()));
        let outputs = vec![
            TxOutput::new(amount, to.pub_key_hash()),
            TxOutput::new(SUBSIDY - amount, owner.pub_key_hash()),
        ];
        let payment = Transaction::new(vec![input], outputs);

        let mut prev_txs = HashMap::new();
        prev_txs.insert(funding.id(), funding);
        (prev_txs, payment)
    }

    #[test]
    fn input_key_matches_by_hash() {
        let kp = KeyPair::generate();
        let input = TxInput::new(TxId::NULL, 0, Some(kp.public_key_bytes()));

        assert!(input.uses_key(&kp.pub_key_hash()));
        assert!(!input.uses_key(&KeyPair::generate().pub_key_hash()));

        let unkeyed = TxInput::new(TxId::NULL, 0, None);
        assert!(!unkeyed.uses_key(&kp.pub_key_hash()));
    }

    #[test]
    fn coinbase_shape_is_detected() {
        let kp = KeyPair::generate();
        let tx = Transaction::coinbase(&address_of(&kp), None);

        assert!(tx.is_coinbase());
        assert_eq!(tx.outputs().len(), 1);
        assert_eq!(tx.outputs()[0].value, SUBSIDY);
        assert!(tx.outputs()[0].is_locked_with(&kp.pub_key_hash()));
    }

    #[test]
    fn coinbase_payload_defaults_to_reward_note() {
        let kp = KeyPair::generate();
        let address = address_of(&kp);
        let tx = Transaction::coinbase(&address, None);

        let payload = tx.inputs()[0].pub_key.clone().unwrap();
        assert_eq!(payload, format!("Reward to '{address}'").into_bytes());
    }

    #[test]
    fn coinbase_verifies_without_signatures() {
        let kp = KeyPair::generate();
        let tx = Transaction::coinbase(&address_of(&kp), Some("genesis".into()));
        assert!(tx.verify(&HashMap::new()).unwrap());
    }

    #[test]
    fn id_is_fixed_at_construction() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, mut payment) = payment_fixture(&owner, &to, 4);

        let id_before = payment.id();
        assert_eq!(id_before.0, payment.content_hash());

        payment.sign(&owner.secret_key, &prev_txs).unwrap();

        // Signing changed the content but not the identity
        assert_eq!(payment.id(), id_before);
        assert_ne!(payment.content_hash(), id_before.0);
    }

    #[test]
    fn trimmed_copy_clears_signing_material() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, mut payment) = payment_fixture(&owner, &to, 4);
        payment.sign(&owner.secret_key, &prev_txs).unwrap();

        let trimmed = payment.trimmed_copy();
        assert_eq!(trimmed.id(), payment.id());
        assert_eq!(trimmed.outputs(), payment.outputs());
        for input in trimmed.inputs() {
            assert!(input.signature.is_none());
            assert!(input.pub_key.is_none());
        }
    }

    #[test]
    fn signed_transaction_verifies() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, mut payment) = payment_fixture(&owner, &to, 4);

        payment.sign(&owner.secret_key, &prev_txs).unwrap();
        assert!(payment.verify(&prev_txs).unwrap());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, mut payment) = payment_fixture(&owner, &to, 4);
        payment.sign(&owner.secret_key, &prev_txs).unwrap();

        let mut signature = payment.inputs[0].signature.clone().unwrap();
        signature[7] ^= 0x01;
        payment.inputs[0].signature = Some(signature);

        assert!(!payment.verify(&prev_txs).unwrap());
    }

    #[test]
    fn unsigned_transaction_fails_verification() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, payment) = payment_fixture(&owner, &to, 4);
        assert!(!payment.verify(&prev_txs).unwrap());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, mut payment) = payment_fixture(&owner, &to, 4);

        let impostor = KeyPair::generate();
        payment.sign(&impostor.secret_key, &prev_txs).unwrap();
        assert!(!payment.verify(&prev_txs).unwrap());
    }

    #[test]
    fn missing_reference_is_an_error_not_false() {
        let owner = KeyPair::generate();
        let to = KeyPair::generate();
        let (prev_txs, mut payment) = payment_fixture(&owner, &to, 4);
        payment.sign(&owner.secret_key, &prev_txs).unwrap();

        let err = payment.verify(&HashMap::new()).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidReference(_)));

        let err = payment
            .sign(&owner.secret_key, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, TransactionError::InvalidReference(_)));
    }
}
