/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fork database: a DAG of candidate blocks competing to extend the chain, rooted just above
//! the last irreversible block.
//!
//! The fork database holds *blocks*, not state. It answers three questions for the
//! [block pipeline](crate::chain): which block is the best head after an insertion, which two
//! branches connect a pair of competing heads to their common ancestor, and whether a block id
//! has been seen before. The pipeline owns the decision to actually move the ledger; during a
//! failed fork switch it steers this database explicitly with [`remove`](ForkDatabase::remove)
//! and [`set_head`](ForkDatabase::set_head).
//!
//! The best head is the item with the highest block number; on ties the incumbent wins, so a
//! later block at the same height never displaces the head. Items deeper below the head than the
//! configured horizon are pruned on insertion.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::types::block::SignedBlock;
use crate::types::data_types::{BlockId, BlockNumber};

/// A block known to the fork database, with its id and number cached.
pub struct ForkItem {
    pub block: SignedBlock,
    pub id: BlockId,
    pub num: BlockNumber,
}

impl ForkItem {
    fn new(block: SignedBlock) -> ForkItem {
        let id = block.id();
        ForkItem {
            id,
            num: block.block_num(),
            block,
        }
    }

    pub fn previous_id(&self) -> BlockId {
        self.block.previous
    }
}

pub struct ForkDatabase {
    index: HashMap<BlockId, Arc<ForkItem>>,
    children: HashMap<BlockId, Vec<BlockId>>,
    by_number: BTreeMap<BlockNumber, Vec<BlockId>>,
    head: Option<Arc<ForkItem>>,
    max_size: u32,
}

impl ForkDatabase {
    const DEFAULT_MAX_SIZE: u32 = 1024;

    pub fn new() -> ForkDatabase {
        ForkDatabase {
            index: HashMap::new(),
            children: HashMap::new(),
            by_number: BTreeMap::new(),
            head: None,
            max_size: Self::DEFAULT_MAX_SIZE,
        }
    }

    /// The current best head, if any block has been pushed.
    pub fn head(&self) -> Option<Arc<ForkItem>> {
        self.head.clone()
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    pub fn fetch_block(&self, id: &BlockId) -> Option<Arc<ForkItem>> {
        self.index.get(id).cloned()
    }

    /// Every known block with the given number. More than one item means competing forks at that
    /// height.
    pub fn fetch_block_by_number(&self, num: BlockNumber) -> Vec<Arc<ForkItem>> {
        match self.by_number.get(&num) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.index.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Inserts a block and returns the best head, which may or may not be the inserted block.
    ///
    /// The first block pushed into an empty database is accepted unconditionally; afterwards a
    /// block is accepted only if its parent is present.
    pub fn push_block(&mut self, block: SignedBlock) -> Result<Arc<ForkItem>, ForkDatabaseError> {
        let item = Arc::new(ForkItem::new(block));
        // A block can arrive more than once, e.g. re-delivered by a peer after being popped.
        let item = match self.index.get(&item.id) {
            Some(known) => known.clone(),
            None => {
                // A zero previous id links to the genesis state, which is never an item here.
                if self.head.is_some()
                    && item.previous_id() != BlockId::default()
                    && !self.index.contains_key(&item.previous_id())
                {
                    return Err(ForkDatabaseError::UnlinkableBlock {
                        id: item.id,
                        previous: item.previous_id(),
                    });
                }
                self.insert(item.clone());
                item
            }
        };

        let new_head = match &self.head {
            Some(head) if item.num <= head.num => head.clone(),
            _ => {
                self.head = Some(item.clone());
                item
            }
        };
        self.prune();
        Ok(new_head)
    }

    /// Moves the head back to its parent. The popped item stays in the database, so the same
    /// branch can be re-applied later.
    pub fn pop_block(&mut self) -> Result<(), ForkDatabaseError> {
        let head = self
            .head
            .take()
            .ok_or(ForkDatabaseError::EmptyForkDatabase)?;
        self.head = self.index.get(&head.previous_id()).cloned();
        Ok(())
    }

    /// Overrides the head choice. Used by the block pipeline while restoring the old branch after
    /// a failed fork switch.
    pub fn set_head(&mut self, item: Arc<ForkItem>) {
        self.head = Some(item);
    }

    /// Removes an item and all of its descendants.
    ///
    /// If the head is among the removed items the caller must follow up with
    /// [`set_head`](Self::set_head).
    pub fn remove(&mut self, id: &BlockId) {
        let mut stack = vec![*id];
        while let Some(id) = stack.pop() {
            if let Some(children) = self.children.get(&id) {
                stack.extend(children.iter().copied());
            }
            self.erase(&id);
        }
    }

    /// Returns the two disjoint branches leading from `first` and from `second` back to their
    /// common ancestor, newest first. The ancestor itself is on neither branch: the last item of
    /// each branch is a child of the ancestor, so both last items share a `previous` id.
    pub fn fetch_branch_from(
        &self,
        first: BlockId,
        second: BlockId,
    ) -> Result<(Vec<Arc<ForkItem>>, Vec<Arc<ForkItem>>), ForkDatabaseError> {
        let mut first_branch = Vec::new();
        let mut second_branch = Vec::new();
        let mut first_item = self.fetch_or_err(&first)?;
        let mut second_item = self.fetch_or_err(&second)?;

        while first_item.num > second_item.num {
            let previous = first_item.previous_id();
            first_branch.push(first_item);
            first_item = self.fetch_or_err(&previous)?;
        }
        while second_item.num > first_item.num {
            let previous = second_item.previous_id();
            second_branch.push(second_item);
            second_item = self.fetch_or_err(&previous)?;
        }
        while first_item.previous_id() != second_item.previous_id() {
            let first_previous = first_item.previous_id();
            let second_previous = second_item.previous_id();
            first_branch.push(first_item);
            second_branch.push(second_item);
            first_item = self.fetch_or_err(&first_previous)?;
            second_item = self.fetch_or_err(&second_previous)?;
        }
        first_branch.push(first_item);
        second_branch.push(second_item);
        Ok((first_branch, second_branch))
    }

    /// Sets the pruning horizon: how many block numbers below the head an item may sit before it
    /// is pruned.
    pub fn set_max_size(&mut self, max_size: u32) {
        self.max_size = max_size;
        self.prune();
    }

    fn fetch_or_err(&self, id: &BlockId) -> Result<Arc<ForkItem>, ForkDatabaseError> {
        self.fetch_block(id)
            .ok_or(ForkDatabaseError::MissingBlock { id: *id })
    }

    fn insert(&mut self, item: Arc<ForkItem>) {
        self.children
            .entry(item.previous_id())
            .or_default()
            .push(item.id);
        self.by_number.entry(item.num).or_default().push(item.id);
        self.index.insert(item.id, item);
    }

    fn erase(&mut self, id: &BlockId) {
        let item = match self.index.remove(id) {
            Some(item) => item,
            None => return,
        };
        self.children.remove(id);
        if let Some(siblings) = self.children.get_mut(&item.previous_id()) {
            siblings.retain(|sibling| sibling != id);
            if siblings.is_empty() {
                self.children.remove(&item.previous_id());
            }
        }
        if let Some(ids) = self.by_number.get_mut(&item.num) {
            ids.retain(|candidate| candidate != id);
            if ids.is_empty() {
                self.by_number.remove(&item.num);
            }
        }
    }

    fn prune(&mut self) {
        let head_num = match &self.head {
            Some(head) => head.num.int(),
            None => return,
        };
        let min_num = head_num.saturating_sub(self.max_size);
        loop {
            let oldest = self
                .by_number
                .iter()
                .next()
                .map(|(num, ids)| (*num, ids.clone()));
            match oldest {
                Some((num, ids)) if num.int() <= min_num => {
                    for id in ids {
                        self.erase(&id);
                    }
                }
                _ => return,
            }
        }
    }
}

impl Default for ForkDatabase {
    fn default() -> Self {
        ForkDatabase::new()
    }
}

/// Error when inserting into or querying the [`ForkDatabase`].
#[derive(Debug, PartialEq, Eq)]
pub enum ForkDatabaseError {
    /// The block's parent is not in the database: the block does not link to any known fork.
    UnlinkableBlock { id: BlockId, previous: BlockId },
    /// A branch walk or fetch referenced an id the database does not hold.
    MissingBlock { id: BlockId },
    /// `pop_block` was called with no head.
    EmptyForkDatabase,
}
