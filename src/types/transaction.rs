/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the transaction types and their methods.
//!
//! A [`Transaction`] ties itself to a recent block through its `ref_block_num` and
//! `ref_block_prefix` fields and carries an ordered vector of
//! [operations](crate::types::operations::Operation). A [`SignedTransaction`] adds signatures,
//! each bundling the signer's verifying key with the signature bytes. A
//! [`ProcessedTransaction`] is what applying a signed transaction yields: the transaction plus
//! one [result](crate::types::operations::OperationResult) per operation.
//!
//! ## Precomputation caches
//!
//! Computing a transaction's id and verifying its signatures are the expensive parts of
//! validation, so `SignedTransaction` carries one-shot caches for both. The caches can be filled
//! from any thread through a shared reference (see [`crate::precompute`]), are skipped by
//! serialization, and make the corresponding methods idempotent: the first call computes, later
//! calls return the cached value.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::Digest;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::types::block::CryptoHasher;
use crate::types::data_types::{
    ChainID, SignatureBytes, Timestamp, TransactionId, VerifyingKeyBytes,
};
use crate::types::operations::{MalformedOperationError, Operation, OperationResult};

/// The unsigned body of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Transaction {
    /// The low 16 bits of the number of a recent block.
    pub ref_block_num: u16,
    /// The second 32-bit word of the id of that block. Replays on chains where block
    /// `ref_block_num` has a different id fail the TaPoS check.
    pub ref_block_prefix: u32,
    /// The transaction is invalid in blocks timestamped after this point.
    pub expiration: Timestamp,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// The transaction's id: the SHA256 digest of the transaction without signatures.
    pub fn id(&self) -> TransactionId {
        let mut hasher = CryptoHasher::new();
        hasher.update(borsh::to_vec(&self).unwrap());
        TransactionId::new(hasher.finalize().into())
    }

    /// The digest that signers of this transaction sign. Commits to the chain id, so signatures
    /// made for one chain do not verify on another.
    pub fn signing_digest(&self, chain_id: ChainID) -> [u8; 32] {
        let mut hasher = CryptoHasher::new();
        hasher.update(chain_id.int().to_le_bytes());
        hasher.update(borsh::to_vec(&self).unwrap());
        hasher.finalize().into()
    }
}

/// One signature on a transaction: the signer's verifying key together with the signature bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TransactionSignature {
    pub key: VerifyingKeyBytes,
    pub signature: SignatureBytes,
}

/// A transaction together with the signatures authorizing it.
#[derive(Clone, Debug, BorshDeserialize, BorshSerialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<TransactionSignature>,
    #[borsh(skip)]
    cached_id: OnceLock<TransactionId>,
    #[borsh(skip)]
    cached_signature_keys: OnceLock<BTreeSet<VerifyingKeyBytes>>,
}

impl SignedTransaction {
    pub fn new(transaction: Transaction) -> SignedTransaction {
        SignedTransaction {
            transaction,
            signatures: Vec::new(),
            cached_id: OnceLock::new(),
            cached_signature_keys: OnceLock::new(),
        }
    }

    /// Appends a signature made with `signing_key` over the transaction's
    /// [signing digest](Transaction::signing_digest).
    pub fn sign(&mut self, chain_id: ChainID, signing_key: &SigningKey) {
        let signature = signing_key.sign(&self.transaction.signing_digest(chain_id));
        self.signatures.push(TransactionSignature {
            key: VerifyingKeyBytes::new(signing_key.verifying_key().to_bytes()),
            signature: SignatureBytes::new(signature.to_bytes()),
        });
    }

    /// The transaction's id, computed once and cached.
    pub fn id(&self) -> TransactionId {
        *self.cached_id.get_or_init(|| self.transaction.id())
    }

    /// Stateless validation: the transaction must carry at least one operation, every operation
    /// must be well-formed, and no two signatures may come from the same key.
    pub fn validate(&self) -> Result<(), MalformedTransactionError> {
        if self.transaction.operations.is_empty() {
            return Err(MalformedTransactionError::NoOperations);
        }
        for op in &self.transaction.operations {
            op.validate()
                .map_err(MalformedTransactionError::MalformedOperation)?;
        }
        let mut seen = BTreeSet::new();
        for sig in &self.signatures {
            if !seen.insert(sig.key) {
                return Err(MalformedTransactionError::DuplicateSignature { key: sig.key });
            }
        }
        Ok(())
    }

    /// Verifies every signature on the transaction and returns the set of keys that signed it.
    /// The result is computed once and cached; a failed verification is not cached, so a later
    /// call re-verifies.
    pub fn signature_keys(
        &self,
        chain_id: ChainID,
    ) -> Result<&BTreeSet<VerifyingKeyBytes>, ed25519_dalek::SignatureError> {
        if let Some(keys) = self.cached_signature_keys.get() {
            return Ok(keys);
        }
        let digest = self.transaction.signing_digest(chain_id);
        let mut keys = BTreeSet::new();
        for sig in &self.signatures {
            let key = VerifyingKey::from_bytes(&sig.key.bytes())?;
            let signature = Signature::from_bytes(&sig.signature.bytes());
            key.verify(&digest, &signature)?;
            keys.insert(sig.key);
        }
        // A concurrent precompute worker may have won the race; either value is identical.
        let _ = self.cached_signature_keys.set(keys);
        Ok(self.cached_signature_keys.get().unwrap())
    }

    /// Fills both caches from precomputed values. Values cached earlier win.
    pub(crate) fn fill_caches(
        &self,
        id: Option<TransactionId>,
        signature_keys: Option<BTreeSet<VerifyingKeyBytes>>,
    ) {
        if let Some(id) = id {
            let _ = self.cached_id.set(id);
        }
        if let Some(keys) = signature_keys {
            let _ = self.cached_signature_keys.set(keys);
        }
    }
}

impl PartialEq for SignedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.transaction == other.transaction && self.signatures == other.signatures
    }
}

impl Eq for SignedTransaction {}

/// A signed transaction after application: the transaction plus the result each of its operations
/// evaluated to. `operation_results` mirrors `transaction.operations` position by position.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ProcessedTransaction {
    pub transaction: SignedTransaction,
    pub operation_results: Vec<OperationResult>,
}

impl ProcessedTransaction {
    pub fn id(&self) -> TransactionId {
        self.transaction.id()
    }

    pub fn expiration(&self) -> Timestamp {
        self.transaction.transaction.expiration
    }

    /// The digest of this transaction as a leaf of a block's transaction merkle tree. Commits to
    /// the operation results, not only to the signed transaction.
    pub fn merkle_digest(&self) -> [u8; 32] {
        let mut hasher = CryptoHasher::new();
        hasher.update(borsh::to_vec(&self).unwrap());
        hasher.finalize().into()
    }
}

/// Ways in which a transaction can be structurally invalid, independent of chain state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedTransactionError {
    NoOperations,
    MalformedOperation(MalformedOperationError),
    DuplicateSignature { key: VerifyingKeyBytes },
}
