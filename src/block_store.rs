/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable durable block storage.
//!
//! Whenever the [block pipeline](crate::chain) commits a block it writes the block here, so after
//! a restart the chain can be replayed from storage. The engine only ever appends and reads;
//! library users get to choose the backing medium by implementing [`BlockStore`] for it. Blocks
//! are stored as their packed bytes, keyed both by block id and by block number. An in-memory
//! implementation, [`MemBlockStore`], is provided for tests and ephemeral nodes.

use borsh::BorshDeserialize;
use std::collections::{BTreeMap, HashMap};

use crate::types::block::SignedBlock;
use crate::types::data_types::{BlockId, BlockNumber};

pub trait BlockStore: Send + 'static {
    /// Durably appends a block under its id and number. Overwriting an id that is already
    /// present is allowed and must replace the stored bytes.
    fn store(&mut self, id: BlockId, block: &SignedBlock);

    fn fetch_optional(&self, id: &BlockId) -> Option<SignedBlock>;

    /// The stored block with the given number, if any. At most one block per number is ever
    /// stored on the canonical chain.
    fn fetch_by_number(&self, num: BlockNumber) -> Option<SignedBlock>;

    fn fetch_block_id(&self, num: BlockNumber) -> Option<BlockId>;

    fn contains(&self, id: &BlockId) -> bool;
}

/// A [`BlockStore`] holding packed blocks in memory.
pub struct MemBlockStore {
    blocks: HashMap<BlockId, Vec<u8>>,
    id_by_number: BTreeMap<BlockNumber, BlockId>,
}

impl MemBlockStore {
    pub fn new() -> MemBlockStore {
        MemBlockStore {
            blocks: HashMap::new(),
            id_by_number: BTreeMap::new(),
        }
    }
}

impl Default for MemBlockStore {
    fn default() -> Self {
        MemBlockStore::new()
    }
}

impl BlockStore for MemBlockStore {
    fn store(&mut self, id: BlockId, block: &SignedBlock) {
        self.blocks.insert(id, borsh::to_vec(block).unwrap());
        self.id_by_number.insert(id.number(), id);
    }

    fn fetch_optional(&self, id: &BlockId) -> Option<SignedBlock> {
        let bytes = self.blocks.get(id)?;
        // Bytes written by `store` always deserialize back.
        Some(SignedBlock::deserialize(&mut bytes.as_slice()).unwrap())
    }

    fn fetch_by_number(&self, num: BlockNumber) -> Option<SignedBlock> {
        let id = self.id_by_number.get(&num)?;
        self.fetch_optional(id)
    }

    fn fetch_block_id(&self, num: BlockNumber) -> Option<BlockId> {
        self.id_by_number.get(&num).copied()
    }

    fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }
}
