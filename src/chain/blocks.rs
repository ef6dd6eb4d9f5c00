/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block half of the block pipeline: ingesting candidate blocks, switching forks, producing
//! blocks, and popping the head.
//!
//! ## Atomicity
//!
//! A block applies inside exactly one undo session: either every one of its transactions applies
//! and the session commits, or the first failure discards the whole block's effects. There is
//! deliberately no per-transaction session on this path.
//!
//! A fork switch is atomic from the caller's perspective. If a block of the new branch fails to
//! apply, the already-applied part of the new branch is popped again, the invalid remainder is
//! removed from the fork database, the fork database head is steered back, the old branch is
//! re-applied, and the original error is re-raised. A failure during that restore leaves the
//! engine in an undefined state, so it aborts the process.

use std::time::SystemTime;

use ed25519_dalek::SigningKey;

use crate::block_store::BlockStore;
use crate::chain::transactions::TransactionError;
use crate::chain::Chain;
use crate::config::{
    IRREVERSIBLE_THRESHOLD_PERCENT, RECENTLY_MISSED_COUNT_DECREMENT,
    RECENTLY_MISSED_COUNT_INCREMENT,
};
use crate::events::{ApplyBlockEvent, ChangedObjectsEvent, Event, PopBlockEvent, SwitchForkEvent};
use crate::fork_db::ForkDatabaseError;
use crate::logging::first_seven_base64_chars;
use crate::types::block::{SignedBlock, SignedBlockHeader};
use crate::types::data_types::{
    BlockId, BlockNumber, CryptoHash, SkipFlags, Timestamp, VerifyingKeyBytes, WitnessId,
};
use crate::types::pack_size;
use crate::types::transaction::ProcessedTransaction;

impl<S: BlockStore> Chain<S> {
    /* ↓↓↓ push_block ↓↓↓ */

    /// Ingests a candidate block. May fail, in which case every partial change is unwound; after
    /// a successful push the block has been appended to the block store.
    ///
    /// The pending pool is set aside for the duration of the call and rebuilt against the new
    /// head afterwards: transactions that made it into a committed block are dropped, the rest
    /// are re-validated and re-admitted.
    ///
    /// Returns true if the push made the engine switch forks.
    pub fn push_block(
        &mut self,
        new_block: SignedBlock,
        skip: SkipFlags,
    ) -> Result<bool, BlockError> {
        self.with_skip_flags(skip, |chain| {
            let pending = std::mem::take(&mut chain.pending_tx);
            chain.reset_pending_session();
            let result = chain._push_block(new_block);
            // The pool is rebuilt whether the push succeeded or not.
            chain.restore_pending(pending);
            result
        })
    }

    fn _push_block(&mut self, new_block: SignedBlock) -> Result<bool, BlockError> {
        let skip = self.skip_flags;

        let new_head = self
            .fork_db
            .push_block(new_block.clone())
            .map_err(BlockError::ForkDatabase)?;

        // If the head of the longest chain does not build off our current head, we may need to
        // switch forks.
        if new_head.previous_id() != self.head_block_id() {
            // If the newly pushed block is at the same height as our head, the incumbent head
            // comes back out of the fork database. Only switch if the new head is actually
            // higher.
            if new_head.num > self.head_block_num() {
                log::warn!(
                    "SwitchingFork, {}, {}",
                    first_seven_base64_chars(&new_head.id.bytes()),
                    new_head.num
                );
                let (new_branch, old_branch) = self
                    .fork_db
                    .fetch_branch_from(new_head.id, self.head_block_id())
                    .map_err(BlockError::ForkDatabase)?;
                let common_ancestor = old_branch
                    .last()
                    .expect("a branch always holds at least one item")
                    .previous_id();

                // Pop blocks until we hit the common ancestor of the two forks.
                while self.head_block_id() != common_ancestor {
                    self.pop_block()?;
                }

                // Push all blocks on the new fork, oldest first.
                for (position, item) in new_branch.iter().enumerate().rev() {
                    log::info!(
                        "PushingForkBlock, {}, {}",
                        item.num,
                        first_seven_base64_chars(&item.id.bytes())
                    );
                    self.db.start_undo_session();
                    let applied = self.apply_block(&item.block, skip);
                    match applied {
                        Ok(()) => {
                            self.block_store.store(item.id, &item.block);
                            self.db.commit_undo_session();
                        }
                        Err(error) => {
                            log::warn!("FailedForkSwitch, {:?}", error);
                            self.db.undo_session();

                            // The failing block and everything in the new branch above it are
                            // invalid; remove them from the fork database.
                            for invalid in &new_branch[..=position] {
                                log::info!(
                                    "RemovingForkBlock, {}, {}",
                                    invalid.num,
                                    first_seven_base64_chars(&invalid.id.bytes())
                                );
                                self.fork_db.remove(&invalid.id);
                            }
                            self.fork_db.set_head(old_branch[0].clone());

                            // Pop the already-applied part of the bad fork, then restore the
                            // good fork. Neither may fail: state beyond this point would be
                            // unrecoverable.
                            while self.head_block_id() != common_ancestor {
                                if let Err(restore_error) = self.pop_block() {
                                    panic!(
                                        "unable to pop back to the fork point while restoring \
                                         the original fork: {:?}",
                                        restore_error
                                    );
                                }
                            }
                            log::info!(
                                "SwitchingBackFork, {}",
                                first_seven_base64_chars(&old_branch[0].id.bytes())
                            );
                            for item in old_branch.iter().rev() {
                                self.db.start_undo_session();
                                if let Err(restore_error) = self.apply_block(&item.block, skip) {
                                    panic!(
                                        "unable to re-apply the original fork after an aborted \
                                         switch: {:?}",
                                        restore_error
                                    );
                                }
                                self.block_store.store(item.id, &item.block);
                                self.db.commit_undo_session();
                            }

                            return Err(error);
                        }
                    }
                }

                Event::SwitchFork(SwitchForkEvent {
                    timestamp: SystemTime::now(),
                    new_head: new_head.id,
                })
                .publish(&self.event_publisher);
                return Ok(true);
            } else {
                return Ok(false);
            }
        }

        self.db.start_undo_session();
        match self.apply_block(&new_block, skip) {
            Ok(()) => {
                self.block_store.store(new_block.id(), &new_block);
                self.db.commit_undo_session();
                Ok(false)
            }
            Err(error) => {
                log::error!("FailedPushBlock, {:?}", error);
                self.db.undo_session();
                self.fork_db.remove(&new_block.id());
                Err(error)
            }
        }
    }

    /// Re-admits first the transactions of popped blocks, then the previous pending pool, each
    /// against the new head state. Transactions that are now in a committed block, or that no
    /// longer apply, are dropped.
    fn restore_pending(&mut self, pending: Vec<ProcessedTransaction>) {
        let popped: Vec<_> = self.popped_tx.drain(..).collect();
        for trx in popped {
            if self.is_known_transaction(trx.id()) {
                continue;
            }
            if let Err(error) = self._push_transaction(trx) {
                log::debug!("DroppedPoppedTransaction, {:?}", error);
            }
        }
        for processed_trx in pending {
            if self.is_known_transaction(processed_trx.id()) {
                continue;
            }
            if let Err(error) = self._push_transaction(processed_trx.transaction) {
                log::debug!("DroppedPendingTransaction, {:?}", error);
            }
        }
    }

    /* ↓↓↓ pop_block ↓↓↓ */

    /// Removes the most recent block from the head of the chain and undoes every change it made.
    /// The popped block's transactions are queued for re-admission into the pending pool.
    pub fn pop_block(&mut self) -> Result<(), BlockError> {
        self.reset_pending_session();

        let fork_head = self
            .fork_db
            .head()
            .ok_or(BlockError::EmptyForkDatabase)?;
        let head_id = self.head_block_id();
        let popped = if fork_head.id == head_id {
            self.fork_db.pop_block().map_err(BlockError::ForkDatabase)?;
            fork_head
        } else {
            // During a fork switch the fork database head is already on the other branch; pop
            // the ledger's own head instead.
            self.fork_db
                .fetch_block(&head_id)
                .ok_or(BlockError::PopBlockNotInForkDatabase { id: head_id })?
        };

        if !self.db.pop_commit() {
            return Err(BlockError::NothingToPop);
        }

        for trx in popped.block.transactions.iter().rev() {
            self.popped_tx.push_front(trx.transaction.clone());
        }

        Event::PopBlock(PopBlockEvent {
            timestamp: SystemTime::now(),
            block: popped.id,
        })
        .publish(&self.event_publisher);
        Ok(())
    }

    /* ↓↓↓ generate_block ↓↓↓ */

    /// Produces, signs, and installs a new block at the slot containing `when`, packing in as
    /// many pending transactions as fit the block size budget.
    pub fn generate_block(
        &mut self,
        when: Timestamp,
        witness_id: WitnessId,
        signing_key: &SigningKey,
        skip: SkipFlags,
    ) -> Result<SignedBlock, BlockError> {
        self.with_skip_flags(skip, |chain| {
            chain._generate_block(when, witness_id, signing_key)
        })
    }

    fn _generate_block(
        &mut self,
        when: Timestamp,
        witness_id: WitnessId,
        signing_key: &SigningKey,
    ) -> Result<SignedBlock, BlockError> {
        let skip = self.skip_flags;

        let slot_num = self.get_slot_at_time(when);
        if slot_num == 0 {
            return Err(BlockError::InvalidSlot { timestamp: when });
        }
        let scheduled_witness = self.get_scheduled_witness(slot_num);
        if scheduled_witness != witness_id {
            return Err(BlockError::NotScheduled {
                witness: witness_id,
                scheduled: scheduled_witness,
            });
        }

        // Throw away the existing pending session and rebuild it by re-applying the pending
        // transactions. The rebuild is necessary because the transactions' validity and
        // semantics may have changed since they were received: time-based semantics are
        // evaluated against the block time, which is only now known.
        self.reset_pending_session();

        if !skip.contains(SkipFlags::WITNESS_SIGNATURE) {
            let witness = self
                .db
                .witness(witness_id)
                .ok_or(BlockError::UnknownWitness {
                    witness: witness_id,
                })?;
            let offered = VerifyingKeyBytes::new(signing_key.verifying_key().to_bytes());
            if witness.signing_key != offered {
                return Err(BlockError::WrongSigningKey {
                    witness: witness_id,
                });
            }
        }

        // The byte budget starts at the packed size of the header this witness will sign, plus
        // the length prefix of the transactions vector.
        let partial_header_size = pack_size(&SignedBlockHeader::default())
            - pack_size(&WitnessId::default())
            + 4;
        let max_block_header_size = partial_header_size + pack_size(&witness_id);
        let maximum_block_size =
            self.db.global_properties().parameters.maximum_block_size as usize;
        let mut total_block_size = max_block_header_size;

        let mut included: Vec<ProcessedTransaction> = Vec::new();
        let mut postponed_tx_count: u64 = 0;

        self.db.start_undo_session();
        self.pending_session_open = true;

        let pending = std::mem::take(&mut self.pending_tx);
        for pending_trx in &pending {
            let trx = &pending_trx.transaction;
            let mut new_total_size = total_block_size + pack_size(trx);

            // Postpone the transaction if it would make the block too big.
            if new_total_size > maximum_block_size {
                postponed_tx_count += 1;
                continue;
            }

            self.db.start_undo_session();
            match self._apply_transaction(trx) {
                Ok(processed_trx) => {
                    // Re-measure with the operation results included: results can grow the
                    // transaction.
                    new_total_size = total_block_size + pack_size(&processed_trx);
                    if new_total_size > maximum_block_size {
                        postponed_tx_count += 1;
                        self.db.undo_session();
                        continue;
                    }
                    self.db.merge_undo_session();
                    total_block_size = new_total_size;
                    included.push(processed_trx);
                }
                Err(error) => {
                    // The transaction is left out of this block but stays in the pool.
                    self.db.undo_session();
                    log::warn!(
                        "SkippedGenerationTransaction, {}, {:?}",
                        first_seven_base64_chars(&trx.id().bytes()),
                        error
                    );
                }
            }
        }
        self.pending_tx = pending;
        if postponed_tx_count > 0 {
            log::warn!(
                "PostponedTransactions, {}",
                postponed_tx_count
            );
        }

        // The block-building state is thrown away: the push_block call below rebuilds the
        // pending session from the pool.
        self.reset_pending_session();

        let mut pending_block = SignedBlock::new(
            SignedBlockHeader {
                previous: self.head_block_id(),
                timestamp: when,
                witness: witness_id,
                transaction_merkle_root: CryptoHash::default(),
                witness_signature: Default::default(),
            },
            included,
        );
        pending_block.header.transaction_merkle_root = pending_block.calculate_merkle_root();
        if !skip.contains(SkipFlags::WITNESS_SIGNATURE) {
            pending_block.header.sign(signing_key);
        }

        // Skip the authority checks when pushing our own block: its transactions were fully
        // validated moments ago.
        self.push_block(pending_block.clone(), skip | SkipFlags::TRANSACTION_SIGNATURES)?;

        Ok(pending_block)
    }

    /* ↓↓↓ apply_block ↓↓↓ */

    /// Applies a block under the engine's checkpoint policy: a block that disagrees with a
    /// checkpoint fails outright, and a block at or below the highest checkpoint applies with
    /// every check skipped.
    pub(crate) fn apply_block(
        &mut self,
        next_block: &SignedBlock,
        skip: SkipFlags,
    ) -> Result<(), BlockError> {
        let block_num = next_block.block_num();
        let mut skip = skip;
        if let Some((&last_checkpoint_num, _)) = self.checkpoints.iter().next_back() {
            if let Some(checkpoint_id) = self.checkpoints.get(&block_num) {
                if next_block.id() != *checkpoint_id {
                    return Err(BlockError::CheckpointMismatch {
                        block_num,
                        checkpoint: *checkpoint_id,
                        block: next_block.id(),
                    });
                }
            }
            if last_checkpoint_num >= block_num {
                skip = SkipFlags::EVERYTHING;
            }
        }
        self.with_skip_flags(skip, |chain| chain._apply_block(next_block))
    }

    fn _apply_block(&mut self, next_block: &SignedBlock) -> Result<(), BlockError> {
        let skip = self.skip_flags;
        self.applied_ops.clear();

        if !skip.contains(SkipFlags::BLOCK_SIZE_CHECK) {
            let size = pack_size(next_block);
            let maximum = self.db.global_properties().parameters.maximum_block_size;
            if size > maximum as usize {
                return Err(BlockError::OversizedBlock { size, maximum });
            }
        }

        if !skip.contains(SkipFlags::MERKLE_CHECK) {
            let computed = next_block.calculate_merkle_root();
            if computed != next_block.transaction_merkle_root {
                return Err(BlockError::BadMerkleRoot {
                    expected: next_block.transaction_merkle_root,
                    computed,
                });
            }
        }

        let signing_witness = self.validate_block_header(skip, next_block)?;
        let maintenance_needed =
            self.db.dynamic_global_properties().next_maintenance_time <= next_block.timestamp;

        self.current_block_num = next_block.block_num();
        self.current_trx_in_block = 0;
        self.current_virtual_op = 0;

        for (trx_in_block, trx) in next_block.transactions.iter().enumerate() {
            // No per-transaction undo session here: either all transactions apply, or the whole
            // block fails and the session opened by the caller discards everything.
            self.apply_transaction(&trx.transaction, skip)
                .map_err(|source| BlockError::Transaction {
                    trx_in_block,
                    source,
                })?;
            self.current_trx_in_block += 1;
        }

        let missed = self.update_witness_missed_blocks(next_block);
        self.update_global_dynamic_data(next_block, missed);
        self.update_signing_witness(signing_witness, next_block);
        self.update_last_irreversible_block();

        if maintenance_needed {
            self.perform_chain_maintenance(next_block);
        }

        self.create_block_summary(next_block);
        self.clear_expired_transactions();
        self.clear_expired_proposals();
        self.clear_expired_orders();
        self.update_witness_schedule();

        Event::ApplyBlock(ApplyBlockEvent {
            timestamp: SystemTime::now(),
            block: next_block.clone(),
        })
        .publish(&self.event_publisher);
        self.applied_ops.clear();
        Event::ChangedObjects(ChangedObjectsEvent {
            timestamp: SystemTime::now(),
        })
        .publish(&self.event_publisher);

        Ok(())
    }

    /// Header validation: linkage, timestamp monotonicity, producer signature, and producer
    /// scheduling. Returns the id of the witness that signed the block.
    fn validate_block_header(
        &self,
        skip: SkipFlags,
        next_block: &SignedBlock,
    ) -> Result<WitnessId, BlockError> {
        if next_block.previous != self.head_block_id() {
            return Err(BlockError::BadPreviousBlock {
                head: self.head_block_id(),
                previous: next_block.previous,
            });
        }
        if next_block.timestamp <= self.head_block_time() {
            return Err(BlockError::TimestampNotLater {
                head_time: self.head_block_time(),
                timestamp: next_block.timestamp,
            });
        }
        let witness = self
            .db
            .witness(next_block.witness)
            .ok_or(BlockError::UnknownWitness {
                witness: next_block.witness,
            })?;

        if !skip.contains(SkipFlags::WITNESS_SIGNATURE)
            && !next_block.header.verify_signee(&witness.signing_key)
        {
            return Err(BlockError::BadWitnessSignature {
                witness: next_block.witness,
            });
        }

        if !skip.contains(SkipFlags::WITNESS_SCHEDULE_CHECK) {
            let slot_num = self.get_slot_at_time(next_block.timestamp);
            if slot_num == 0 {
                return Err(BlockError::InvalidSlot {
                    timestamp: next_block.timestamp,
                });
            }
            let scheduled_witness = self.get_scheduled_witness(slot_num);
            if next_block.witness != scheduled_witness {
                return Err(BlockError::WitnessScheduleMismatch {
                    block_witness: next_block.witness,
                    scheduled: scheduled_witness,
                    slot_num,
                });
            }
        }

        Ok(next_block.witness)
    }

    /* ↓↓↓ Per-block bookkeeping ↓↓↓ */

    /// Charges a missed slot to every witness that was scheduled between the head block and this
    /// one but did not produce. Returns the number of missed slots.
    fn update_witness_missed_blocks(&mut self, next_block: &SignedBlock) -> u32 {
        let missed = self.get_slot_at_time(next_block.timestamp).saturating_sub(1);
        for slot in 1..=missed {
            let witness = self.get_scheduled_witness(slot);
            if witness != next_block.witness {
                self.db.modify_witness(witness, |w| w.total_missed += 1);
            }
        }
        missed
    }

    fn update_global_dynamic_data(&mut self, next_block: &SignedBlock, missed: u32) {
        self.db.modify_dynamic_global_properties(|dgp| {
            if missed + 1 >= 128 {
                dgp.recent_slots_filled = 1;
            } else {
                dgp.recent_slots_filled = (dgp.recent_slots_filled << (missed + 1)) | 1;
            }
            dgp.head_block_number = next_block.block_num();
            dgp.head_block_id = next_block.id();
            dgp.time = next_block.timestamp;
            dgp.current_witness = next_block.witness;
            dgp.current_aslot += (missed + 1) as u64;
            if missed > 0 {
                dgp.recently_missed_count += RECENTLY_MISSED_COUNT_INCREMENT * missed;
            } else if dgp.recently_missed_count > RECENTLY_MISSED_COUNT_DECREMENT {
                dgp.recently_missed_count -= RECENTLY_MISSED_COUNT_DECREMENT;
            }
        });
    }

    fn update_signing_witness(&mut self, signing_witness: WitnessId, next_block: &SignedBlock) {
        // The dynamic globals were advanced just before this, so the head slot is the block's.
        let new_block_aslot = self.db.dynamic_global_properties().current_aslot;
        self.db.modify_witness(signing_witness, |witness| {
            witness.last_aslot = new_block_aslot;
            witness.last_confirmed_block_num = next_block.block_num();
        });
    }

    /// Advances the last irreversible block to the number confirmed by enough of the active
    /// witnesses, then tightens the fork database's pruning horizon accordingly.
    fn update_last_irreversible_block(&mut self) {
        let active = self.db.global_properties().active_witnesses.clone();
        if active.is_empty() {
            return;
        }
        let mut confirmed: Vec<BlockNumber> = active
            .iter()
            .map(|id| {
                self.db
                    .witness(*id)
                    .map(|witness| witness.last_confirmed_block_num)
                    .unwrap_or_default()
            })
            .collect();
        confirmed.sort_unstable();
        // 1/3 of the witnesses (rounded down) can stall irreversibility, no fewer.
        let offset =
            ((100 - IRREVERSIBLE_THRESHOLD_PERCENT) as usize * confirmed.len()) / 100;
        let new_last_irreversible = confirmed[offset];
        if new_last_irreversible
            > self
                .db
                .dynamic_global_properties()
                .last_irreversible_block_num
        {
            self.db.modify_dynamic_global_properties(|dgp| {
                dgp.last_irreversible_block_num = new_last_irreversible;
            });
        }

        let head = self.head_block_num();
        let last_irreversible = self
            .db
            .dynamic_global_properties()
            .last_irreversible_block_num;
        self.fork_db.set_max_size(head - last_irreversible + 1);
    }

    fn perform_chain_maintenance(&mut self, next_block: &SignedBlock) {
        let maintenance_interval = self
            .db
            .global_properties()
            .parameters
            .maintenance_interval;
        self.db.modify_dynamic_global_properties(|dgp| {
            while dgp.next_maintenance_time <= next_block.timestamp {
                dgp.next_maintenance_time = dgp.next_maintenance_time + maintenance_interval;
            }
        });
        // Witness vote tallying would rebuild the active set here; the schedule is recomputed
        // either way.
        self.shuffle_witness_schedule();
    }

    /// Writes this block's id into its slot of the block summary ring for later TaPoS lookups.
    fn create_block_summary(&mut self, next_block: &SignedBlock) {
        let slot = (next_block.block_num().int() & 0xffff) as u16;
        let id = next_block.id();
        self.db
            .modify_block_summary(slot, |summary| summary.block_id = id);
    }

    fn clear_expired_transactions(&mut self) {
        let now = self.head_block_time();
        for id in self.db.expired_transactions(now) {
            self.db.remove_transaction(id);
        }
    }

    /// Removes lapsed proposals, executing any that gathered every required approval before
    /// expiring.
    fn clear_expired_proposals(&mut self) {
        let now = self.head_block_time();
        for id in self.db.expired_proposals(now) {
            let authorized = match self.db.proposal(id) {
                Some(proposal) => proposal.is_authorized_to_execute(),
                None => continue,
            };
            if authorized {
                match self.push_proposal(id) {
                    // push_proposal removed the proposal.
                    Ok(_) => continue,
                    Err(error) => log::warn!(
                        "FailedExpiringProposal, {}, {:?}",
                        id,
                        error
                    ),
                }
            }
            self.db.remove_proposal(id);
        }
    }

    /// Removes expired limit orders, refunding the unsold balance to the seller.
    fn clear_expired_orders(&mut self) {
        let now = self.head_block_time();
        for id in self.db.expired_orders(now) {
            let order = match self.db.limit_order(id) {
                Some(order) => order.clone(),
                None => continue,
            };
            self.db.modify_account(order.seller, |account| {
                let balance = account
                    .balances
                    .entry(order.sell_price.base.asset_id)
                    .or_default();
                *balance = *balance + order.for_sale;
            });
            self.db.remove_limit_order(id);
        }
    }

    /// Reshuffles the witness production order at the end of every round.
    fn update_witness_schedule(&mut self) {
        let active_count = self.db.global_properties().active_witnesses.len() as u32;
        if active_count == 0 {
            return;
        }
        if self.head_block_num().int() % active_count == 0 {
            self.shuffle_witness_schedule();
        }
    }

    fn shuffle_witness_schedule(&mut self) {
        let mut shuffled = self.db.global_properties().active_witnesses.clone();
        let now_hi = (self.head_block_time().secs() as u64) << 32;
        for i in 0..shuffled.len() {
            // Deterministic pseudorandom permutation, seeded by the head block time.
            let mut k = now_hi.wrapping_add((i as u64).wrapping_mul(2_685_821_657_736_338_717));
            k ^= k >> 12;
            k ^= k << 25;
            k ^= k >> 27;
            k = k.wrapping_mul(2_685_821_657_736_338_717);
            let jmax = (shuffled.len() - i) as u64;
            let j = i + (k % jmax) as usize;
            shuffled.swap(i, j);
        }
        self.db.modify_witness_schedule(|schedule| {
            schedule.current_shuffled_witnesses = shuffled;
        });
    }
}

/// Ways in which pushing, generating, applying, or popping a block can fail. Whatever the
/// variant, the engine's state is unchanged by the failed call, except where
/// [a failed fork switch](Chain::push_block) removed invalid blocks from the fork database.
#[derive(Debug)]
pub enum BlockError {
    ForkDatabase(ForkDatabaseError),
    OversizedBlock {
        size: usize,
        maximum: u32,
    },
    BadMerkleRoot {
        expected: CryptoHash,
        computed: CryptoHash,
    },
    BadPreviousBlock {
        head: BlockId,
        previous: BlockId,
    },
    TimestampNotLater {
        head_time: Timestamp,
        timestamp: Timestamp,
    },
    UnknownWitness {
        witness: WitnessId,
    },
    BadWitnessSignature {
        witness: WitnessId,
    },
    /// The block's timestamp (or the requested production time) falls at or before the head
    /// block's slot.
    InvalidSlot {
        timestamp: Timestamp,
    },
    WitnessScheduleMismatch {
        block_witness: WitnessId,
        scheduled: WitnessId,
        slot_num: u32,
    },
    CheckpointMismatch {
        block_num: BlockNumber,
        checkpoint: BlockId,
        block: BlockId,
    },
    /// A transaction of the block failed; the whole block was discarded.
    Transaction {
        trx_in_block: usize,
        source: TransactionError,
    },
    /// `generate_block` was asked to produce for a witness that is not scheduled for the slot.
    NotScheduled {
        witness: WitnessId,
        scheduled: WitnessId,
    },
    /// `generate_block` was handed a key that does not match the witness' recorded signing key.
    WrongSigningKey {
        witness: WitnessId,
    },
    EmptyForkDatabase,
    PopBlockNotInForkDatabase {
        id: BlockId,
    },
    /// The undo horizon is exhausted: no committed session remains to rewind.
    NothingToPop,
}
