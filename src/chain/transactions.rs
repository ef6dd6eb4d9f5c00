/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The transaction half of the block pipeline: admitting transactions into the pending pool,
//! validating and applying a single transaction, dispatching operations to their evaluators, and
//! replaying approved proposals.
//!
//! ## Session discipline
//!
//! [`push_transaction`](super::Chain::push_transaction) keeps one long-lived *pending session*
//! open on top of the head state; each incoming transaction is tried inside a short-lived child
//! session that is merged into the pending session on success and discarded on failure. The
//! pending pool therefore always matches the pending session's effects, and a bad transaction
//! can never leave partial state behind.
//!
//! ## Operation history
//!
//! Every operation applied while a block is being processed is appended to the engine's operation
//! history buffer with its block/transaction/operation coordinates. The buffer is cleared when
//! the block finishes; observers that want durable history must capture it from the applied-block
//! notification.

use std::collections::BTreeSet;
use std::time::SystemTime;

use crate::block_store::BlockStore;
use crate::chain::Chain;
use crate::config::{HARDFORK_PROPOSAL_HISTORY_TIME, MAX_TRANSACTION_SIZE};
use crate::events::{ChangedObjectsEvent, Event, PendingTransactionEvent};
use crate::logging::first_seven_base64_chars;
use crate::state::objects::{Authority, OperationHistoryObject, TransactionObject};
use crate::types::data_types::{
    AccountId, Amount, AssetId, BlockNumber, ProposalId, SkipFlags, Timestamp, TransactionId,
    VerifyingKeyBytes,
};
use crate::types::operations::{MalformedOperationError, Operation, OperationResult};
use crate::types::pack_size;
use crate::types::transaction::{
    MalformedTransactionError, ProcessedTransaction, SignedTransaction,
};

/// Context handed to [operation evaluators](crate::evaluator::OperationEvaluator) alongside the
/// operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionEvaluationState {
    /// True while the operation is being replayed out of an approved proposal rather than a
    /// signed transaction. Authority was established through approvals in that case.
    pub is_proposed_trx: bool,
}

impl<S: BlockStore> Chain<S> {
    /// Attempts to push the transaction into the pending pool.
    ///
    /// On success, the transaction's effects live in the pending session and the processed
    /// transaction is appended to the pool; on failure, state is exactly as before the call.
    pub fn push_transaction(
        &mut self,
        trx: SignedTransaction,
        skip: SkipFlags,
    ) -> Result<ProcessedTransaction, TransactionError> {
        let size = pack_size(&trx);
        if size >= MAX_TRANSACTION_SIZE {
            return Err(TransactionError::OversizedTransaction { size });
        }
        self.with_skip_flags(skip, |chain| chain._push_transaction(trx))
    }

    pub(crate) fn _push_transaction(
        &mut self,
        trx: SignedTransaction,
    ) -> Result<ProcessedTransaction, TransactionError> {
        // If this is the first transaction pushed after applying a block, start a new pending
        // session. This allows us to quickly rewind to the clean state of the head block when a
        // new block arrives.
        if !self.pending_session_open {
            self.db.start_undo_session();
            self.pending_session_open = true;
        }

        // Try the transaction inside a temporary child session, so that a failure discards
        // exactly this transaction's effects and leaves the pending session untouched.
        self.db.start_undo_session();
        match self._apply_transaction(&trx) {
            Ok(processed_trx) => {
                self.pending_tx.push(processed_trx.clone());
                self.db.merge_undo_session();

                Event::PendingTransaction(PendingTransactionEvent {
                    timestamp: SystemTime::now(),
                    transaction: trx,
                })
                .publish(&self.event_publisher);
                Event::ChangedObjects(ChangedObjectsEvent {
                    timestamp: SystemTime::now(),
                })
                .publish(&self.event_publisher);

                Ok(processed_trx)
            }
            Err(error) => {
                self.db.undo_session();
                Err(error)
            }
        }
    }

    /// Applies the transaction speculatively and reports the result, then discards every effect.
    /// Useful for checking whether a transaction would be accepted right now.
    pub fn validate_transaction(
        &mut self,
        trx: &SignedTransaction,
    ) -> Result<ProcessedTransaction, TransactionError> {
        self.db.start_undo_session();
        let result = self._apply_transaction(trx);
        self.db.undo_session();
        result
    }

    pub(crate) fn apply_transaction(
        &mut self,
        trx: &SignedTransaction,
        skip: SkipFlags,
    ) -> Result<ProcessedTransaction, TransactionError> {
        self.with_skip_flags(skip, |chain| chain._apply_transaction(trx))
    }

    pub(crate) fn _apply_transaction(
        &mut self,
        trx: &SignedTransaction,
    ) -> Result<ProcessedTransaction, TransactionError> {
        let skip = self.skip_flags;

        trx.validate()?;

        if !skip.contains(SkipFlags::TRANSACTION_DUPE_CHECK)
            && self.db.contains_transaction(trx.id())
        {
            return Err(TransactionError::DuplicateTransaction { id: trx.id() });
        }

        if !skip.contains(SkipFlags::TRANSACTION_SIGNATURES) {
            self.verify_authority(trx)?;
        }

        // Skip all manner of expiration and TaPoS checking on block 1: it is impossible for the
        // transaction to have expired, and TaPoS makes no sense as no blocks exist yet.
        if self.head_block_num() > BlockNumber::new(0) {
            if !skip.contains(SkipFlags::TAPOS_CHECK) {
                let tapos_summary = self.db.block_summary(trx.transaction.ref_block_num);
                if trx.transaction.ref_block_prefix != tapos_summary.block_id.ref_prefix() {
                    return Err(TransactionError::TaposMismatch {
                        ref_block_num: trx.transaction.ref_block_num,
                        expected: tapos_summary.block_id.ref_prefix(),
                        actual: trx.transaction.ref_block_prefix,
                    });
                }
            }

            let now = self.head_block_time();
            let maximum_time_until_expiration = self
                .db
                .global_properties()
                .parameters
                .maximum_time_until_expiration;
            if trx.transaction.expiration > now + maximum_time_until_expiration {
                return Err(TransactionError::ExpirationTooFarInFuture {
                    expiration: trx.transaction.expiration,
                    now,
                });
            }
            if now > trx.transaction.expiration {
                return Err(TransactionError::TransactionExpired {
                    expiration: trx.transaction.expiration,
                    now,
                });
            }
        }

        // Insert into the unique-transactions index for deduplication.
        if !skip.contains(SkipFlags::TRANSACTION_DUPE_CHECK) {
            self.db.create_transaction(TransactionObject {
                trx_id: trx.id(),
                trx: trx.clone(),
            });
        }

        // Finally process the operations.
        let eval_state = TransactionEvaluationState {
            is_proposed_trx: false,
        };
        let mut operation_results = Vec::with_capacity(trx.transaction.operations.len());
        self.current_op_in_trx = 0;
        for op in &trx.transaction.operations {
            operation_results.push(self.apply_operation(&eval_state, op)?);
            self.current_op_in_trx += 1;
        }

        Ok(ProcessedTransaction {
            transaction: trx.clone(),
            operation_results,
        })
    }

    pub(crate) fn apply_operation(
        &mut self,
        eval_state: &TransactionEvaluationState,
        op: &Operation,
    ) -> Result<OperationResult, TransactionError> {
        let tag = op.tag();
        let evaluator = self
            .evaluators
            .get(tag)
            .and_then(|entry| entry.clone())
            .ok_or(TransactionError::NoRegisteredEvaluator { tag })?;
        let op_index = self.push_applied_operation(op);
        let result = evaluator.evaluate(self, eval_state, op, true)?;
        self.set_applied_operation_result(op_index, result.clone());
        Ok(result)
    }

    /* ↓↓↓ Authority verification ↓↓↓ */

    /// Checks that the transaction's signature set satisfies the active authority of every
    /// account its operations require, walking nested account authorities at most
    /// `max_authority_depth` deep. An account's owner authority satisfies in place of its active
    /// authority.
    fn verify_authority(&self, trx: &SignedTransaction) -> Result<(), TransactionError> {
        let keys = trx.signature_keys(self.chain_id)?.clone();
        let max_depth = self
            .db
            .global_properties()
            .parameters
            .max_authority_depth;

        let mut required = BTreeSet::new();
        for op in &trx.transaction.operations {
            op.required_active_accounts(&mut required);
        }

        for account_id in required {
            let account = self
                .db
                .account(account_id)
                .ok_or(TransactionError::NoSuchAccount {
                    account: account_id,
                })?;
            if !self.authority_satisfied(&account.active, &keys, max_depth)
                && !self.authority_satisfied(&account.owner, &keys, max_depth)
            {
                return Err(TransactionError::MissingActiveAuthority {
                    account: account_id,
                });
            }
        }
        Ok(())
    }

    fn authority_satisfied(
        &self,
        authority: &Authority,
        keys: &BTreeSet<VerifyingKeyBytes>,
        depth: u16,
    ) -> bool {
        let mut total_weight: u64 = 0;
        for (key, weight) in &authority.key_auths {
            if keys.contains(key) {
                total_weight += *weight as u64;
                if total_weight >= authority.weight_threshold as u64 {
                    return true;
                }
            }
        }
        for (account_id, weight) in &authority.account_auths {
            if depth == 0 {
                break;
            }
            let satisfied = match self.db.account(*account_id) {
                Some(account) => self.authority_satisfied(&account.active, keys, depth - 1),
                None => false,
            };
            if satisfied {
                total_weight += *weight as u64;
                if total_weight >= authority.weight_threshold as u64 {
                    return true;
                }
            }
        }
        total_weight >= authority.weight_threshold as u64
    }

    /* ↓↓↓ Proposals ↓↓↓ */

    /// Replays an approved proposal's transaction as an atomic sub-session of whatever session is
    /// currently open. On success the proposal object is removed; on failure every effect is
    /// discarded, the operation history entries the replay produced are repaired, and the error
    /// surfaces to the caller.
    pub fn push_proposal(
        &mut self,
        proposal_id: ProposalId,
    ) -> Result<ProcessedTransaction, TransactionError> {
        let proposal = self
            .db
            .proposal(proposal_id)
            .cloned()
            .ok_or(TransactionError::NoSuchProposal {
                proposal: proposal_id,
            })?;

        let eval_state = TransactionEvaluationState {
            is_proposed_trx: true,
        };
        let old_applied_ops_size = self.applied_ops.len();

        // Proposals may propose updates to other proposals, so replays nest. The guard bounds
        // recursion at twice the active witness count.
        let nesting_limit =
            self.db.global_properties().active_witnesses.len() as u32 * 2;
        if self.push_proposal_nesting_depth >= nesting_limit {
            return Err(TransactionError::MaxProposalNestingDepthExceeded);
        }
        self.push_proposal_nesting_depth += 1;

        self.db.start_undo_session();
        let mut operation_results =
            Vec::with_capacity(proposal.proposed_transaction.operations.len());
        let mut failure = None;
        for op in &proposal.proposed_transaction.operations {
            match self.apply_operation(&eval_state, op) {
                Ok(result) => operation_results.push(result),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        self.push_proposal_nesting_depth -= 1;

        match failure {
            None => {
                self.db.remove_proposal(proposal_id);
                self.db.merge_undo_session();
                Ok(ProcessedTransaction {
                    transaction: SignedTransaction::new(proposal.proposed_transaction),
                    operation_results,
                })
            }
            Some(error) => {
                self.db.undo_session();
                // Repair the operation history entries the failed replay appended. The repair
                // changed shape at the hardfork; both shapes must replay identically.
                if self.head_block_time() <= HARDFORK_PROPOSAL_HISTORY_TIME {
                    for entry in &mut self.applied_ops[old_applied_ops_size..] {
                        *entry = None;
                    }
                } else {
                    self.applied_ops.truncate(old_applied_ops_size);
                }
                log::warn!(
                    "FailedProposal, {}, {:?}",
                    proposal_id,
                    error
                );
                Err(error)
            }
        }
    }

    /* ↓↓↓ Operation history ↓↓↓ */

    pub(crate) fn push_applied_operation(&mut self, op: &Operation) -> usize {
        self.applied_ops.push(Some(OperationHistoryObject {
            op: op.clone(),
            result: OperationResult::Nothing,
            block_num: self.current_block_num,
            trx_in_block: self.current_trx_in_block,
            op_in_trx: self.current_op_in_trx,
            virtual_op: self.current_virtual_op,
        }));
        self.current_virtual_op += 1;
        self.applied_ops.len() - 1
    }

    pub(crate) fn set_applied_operation_result(&mut self, op_index: usize, result: OperationResult) {
        match self.applied_ops.get_mut(op_index) {
            Some(Some(entry)) => entry.result = result,
            _ => log::error!(
                "MissingAppliedOperation, {}, {}",
                op_index,
                first_seven_base64_chars(&self.head_block_id().bytes())
            ),
        }
    }

    /// The operations applied so far in the block currently being processed. Entries are `None`
    /// where a failed proposal replay blanked them out.
    pub fn applied_operations(&self) -> &[Option<OperationHistoryObject>] {
        &self.applied_ops
    }
}

/// Ways in which a transaction can fail validation or application. Whatever the variant, the
/// enclosing undo session has discarded the transaction's effects by the time the error reaches
/// the caller.
#[derive(Debug)]
pub enum TransactionError {
    Malformed(MalformedTransactionError),
    OversizedTransaction {
        size: usize,
    },
    DuplicateTransaction {
        id: TransactionId,
    },
    InvalidSignature(ed25519_dalek::SignatureError),
    MissingActiveAuthority {
        account: AccountId,
    },
    TaposMismatch {
        ref_block_num: u16,
        expected: u32,
        actual: u32,
    },
    TransactionExpired {
        expiration: Timestamp,
        now: Timestamp,
    },
    ExpirationTooFarInFuture {
        expiration: Timestamp,
        now: Timestamp,
    },
    NoRegisteredEvaluator {
        tag: usize,
    },
    /// An evaluator was handed an operation whose variant it does not handle. Indicates a
    /// misconfigured registry.
    EvaluatorMismatch {
        tag: usize,
    },
    NoSuchAccount {
        account: AccountId,
    },
    NoSuchAsset {
        asset: AssetId,
    },
    NoSuchProposal {
        proposal: ProposalId,
    },
    InsufficientBalance {
        account: AccountId,
        asset: AssetId,
        required: Amount,
        available: Amount,
    },
    ExpirationInPast {
        expiration: Timestamp,
        now: Timestamp,
    },
    ProposalLifetimeTooLong {
        expiration: Timestamp,
        maximum: Timestamp,
    },
    /// A proposal update tried to add an approval the proposal does not require.
    IrrelevantApproval {
        account: AccountId,
    },
    /// A proposal update tried to remove an approval that is not present.
    AbsentApproval {
        account: AccountId,
    },
    MaxProposalNestingDepthExceeded,
}

impl From<MalformedTransactionError> for TransactionError {
    fn from(error: MalformedTransactionError) -> Self {
        TransactionError::Malformed(error)
    }
}

impl From<MalformedOperationError> for TransactionError {
    fn from(error: MalformedOperationError) -> Self {
        TransactionError::Malformed(MalformedTransactionError::MalformedOperation(error))
    }
}

impl From<ed25519_dalek::SignatureError> for TransactionError {
    fn from(error: ed25519_dalek::SignatureError) -> Self {
        TransactionError::InvalidSignature(error)
    }
}
