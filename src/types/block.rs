/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block types and their methods.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use crate::types::data_types::{
    BlockId, BlockNumber, CryptoHash, SignatureBytes, Timestamp, VerifyingKeyBytes, WitnessId,
};
use crate::types::transaction::ProcessedTransaction;

/// The header of a block, signed by the producing witness.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignedBlockHeader {
    /// The id of the block this block extends.
    pub previous: BlockId,
    pub timestamp: Timestamp,
    /// The witness scheduled for the slot this block was produced in.
    pub witness: WitnessId,
    /// Merkle root over the digests of `transactions`, in order.
    pub transaction_merkle_root: CryptoHash,
    pub witness_signature: SignatureBytes,
}

impl SignedBlockHeader {
    /// The block's number: one more than the number encoded in `previous`.
    pub fn block_num(&self) -> BlockNumber {
        self.previous.number() + 1
    }

    /// The digest the producing witness signs: the header without the signature.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = CryptoHasher::new();
        hasher.update(borsh::to_vec(&self.previous).unwrap());
        hasher.update(borsh::to_vec(&self.timestamp).unwrap());
        hasher.update(borsh::to_vec(&self.witness).unwrap());
        hasher.update(borsh::to_vec(&self.transaction_merkle_root).unwrap());
        hasher.finalize().into()
    }

    /// The block's id: the digest of the full signed header, with the first four bytes replaced
    /// by the block number in big-endian.
    pub fn compute_id(&self) -> BlockId {
        let mut hasher = CryptoHasher::new();
        hasher.update(borsh::to_vec(&self).unwrap());
        BlockId::new(self.block_num(), hasher.finalize().into())
    }

    /// Signs the header with the witness' signing key, replacing any existing signature.
    pub fn sign(&mut self, signing_key: &SigningKey) {
        let signature = signing_key.sign(&self.digest());
        self.witness_signature = SignatureBytes::new(signature.to_bytes());
    }

    /// Checks that `witness_signature` is a valid signature over this header by `signing_key`.
    pub fn verify_signee(&self, signing_key: &VerifyingKeyBytes) -> bool {
        let key = match VerifyingKey::from_bytes(&signing_key.bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = Signature::from_bytes(&self.witness_signature.bytes());
        key.verify(&self.digest(), &signature).is_ok()
    }
}

/// A signed, ordered batch of transactions extending a previous block.
#[derive(Clone, Debug, Default, BorshDeserialize, BorshSerialize)]
pub struct SignedBlock {
    pub header: SignedBlockHeader,
    pub transactions: Vec<ProcessedTransaction>,
    #[borsh(skip)]
    cached_id: OnceLock<BlockId>,
    #[borsh(skip)]
    cached_merkle_root: OnceLock<CryptoHash>,
}

impl SignedBlock {
    pub fn new(header: SignedBlockHeader, transactions: Vec<ProcessedTransaction>) -> SignedBlock {
        SignedBlock {
            header,
            transactions,
            cached_id: OnceLock::new(),
            cached_merkle_root: OnceLock::new(),
        }
    }

    /// The block's id, computed once and cached.
    ///
    /// The cache assumes the header is final. [Block generation](crate::chain) signs the header
    /// before the id is first requested.
    pub fn id(&self) -> BlockId {
        *self.cached_id.get_or_init(|| self.header.compute_id())
    }

    /// Recomputes the merkle root over the block's transactions. Computed once and cached; the
    /// cache assumes the transactions vector is final.
    ///
    /// Leaves are the [merkle digests](ProcessedTransaction::merkle_digest) of the transactions in
    /// block order. At each level pairs are hashed together and an odd leaf is carried up
    /// unchanged. An empty block has the all-zero root.
    pub fn calculate_merkle_root(&self) -> CryptoHash {
        *self.cached_merkle_root.get_or_init(|| {
            if self.transactions.is_empty() {
                return CryptoHash::default();
            }
            let mut level: Vec<[u8; 32]> = self
                .transactions
                .iter()
                .map(|trx| trx.merkle_digest())
                .collect();
            while level.len() > 1 {
                let mut next = Vec::with_capacity((level.len() + 1) / 2);
                let mut pairs = level.chunks_exact(2);
                for pair in &mut pairs {
                    let mut hasher = CryptoHasher::new();
                    hasher.update(pair[0]);
                    hasher.update(pair[1]);
                    next.push(hasher.finalize().into());
                }
                if let [odd] = pairs.remainder() {
                    next.push(*odd);
                }
                level = next;
            }
            CryptoHash::new(level[0])
        })
    }

    pub(crate) fn fill_id_cache(&self, id: BlockId) {
        let _ = self.cached_id.set(id);
    }
}

impl Deref for SignedBlock {
    type Target = SignedBlockHeader;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl DerefMut for SignedBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.header
    }
}

impl PartialEq for SignedBlock {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl Eq for SignedBlock {}
