/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Operation evaluators: the pluggable units of domain logic the
//! [transaction validator](crate::chain) dispatches operations to.
//!
//! The engine holds a registry indexed by [operation tag](crate::types::operations::Operation::tag).
//! When a transaction applies, each of its operations is handed to the evaluator registered for
//! its tag, which validates the operation against current state and, when `apply` is set,
//! mutates state through the chain's [object database](crate::state::object_db::ObjectDatabase).
//! Every mutation an evaluator makes is recorded by the undo session enclosing the transaction,
//! so evaluators never roll anything back themselves.
//!
//! Evaluators for the built-in operations are registered by
//! [`Chain::initialize`](crate::chain::Chain::initialize);
//! [`register_evaluator`](crate::chain::Chain::register_evaluator) replaces them or extends the
//! registry with custom ones.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::block_store::BlockStore;
use crate::chain::{Chain, TransactionError, TransactionEvaluationState};
use crate::state::objects::{LimitOrderObject, ProposalObject};
use crate::types::data_types::{ObjectId, Price};
use crate::types::operations::{Operation, OperationResult};
use crate::types::transaction::Transaction;

pub trait OperationEvaluator<S: BlockStore>: Send + Sync {
    /// Validates `op` against the chain's current state and, if `apply` is set, carries out its
    /// mutations. Returns the operation's result.
    fn evaluate(
        &self,
        chain: &mut Chain<S>,
        eval_state: &TransactionEvaluationState,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, TransactionError>;
}

pub(crate) fn register_default_evaluators<S: BlockStore>(chain: &mut Chain<S>) {
    chain.register_evaluator(0, Arc::new(TransferEvaluator));
    chain.register_evaluator(1, Arc::new(LimitOrderCreateEvaluator));
    chain.register_evaluator(2, Arc::new(ProposalCreateEvaluator));
    chain.register_evaluator(3, Arc::new(ProposalUpdateEvaluator));
}

/// Moves an asset amount between two account balances.
pub struct TransferEvaluator;

impl<S: BlockStore> OperationEvaluator<S> for TransferEvaluator {
    fn evaluate(
        &self,
        chain: &mut Chain<S>,
        _eval_state: &TransactionEvaluationState,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, TransactionError> {
        let op = match op {
            Operation::Transfer(op) => op,
            other => {
                return Err(TransactionError::EvaluatorMismatch { tag: other.tag() })
            }
        };

        let db = chain.state();
        let from = db
            .account(op.from)
            .ok_or(TransactionError::NoSuchAccount { account: op.from })?;
        if db.account(op.to).is_none() {
            return Err(TransactionError::NoSuchAccount { account: op.to });
        }
        if db.asset(op.amount.asset_id).is_none() {
            return Err(TransactionError::NoSuchAsset {
                asset: op.amount.asset_id,
            });
        }
        let available = from.balance(op.amount.asset_id);
        if available < op.amount.amount {
            return Err(TransactionError::InsufficientBalance {
                account: op.from,
                asset: op.amount.asset_id,
                required: op.amount.amount,
                available,
            });
        }

        if apply {
            let amount = op.amount;
            chain.state_mut().modify_account(op.from, |account| {
                let balance = account.balances.entry(amount.asset_id).or_default();
                *balance = *balance - amount.amount;
            });
            chain.state_mut().modify_account(op.to, |account| {
                let balance = account.balances.entry(amount.asset_id).or_default();
                *balance = *balance + amount.amount;
            });
        }
        Ok(OperationResult::Nothing)
    }
}

/// Escrows the offered amount and puts a new order on the book.
pub struct LimitOrderCreateEvaluator;

impl<S: BlockStore> OperationEvaluator<S> for LimitOrderCreateEvaluator {
    fn evaluate(
        &self,
        chain: &mut Chain<S>,
        _eval_state: &TransactionEvaluationState,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, TransactionError> {
        let op = match op {
            Operation::LimitOrderCreate(op) => op,
            other => {
                return Err(TransactionError::EvaluatorMismatch { tag: other.tag() })
            }
        };

        let now = chain.head_block_time();
        if op.expiration < now {
            return Err(TransactionError::ExpirationInPast {
                expiration: op.expiration,
                now,
            });
        }
        let db = chain.state();
        let seller = db
            .account(op.seller)
            .ok_or(TransactionError::NoSuchAccount { account: op.seller })?;
        for asset in [op.amount_to_sell.asset_id, op.min_to_receive.asset_id] {
            if db.asset(asset).is_none() {
                return Err(TransactionError::NoSuchAsset { asset });
            }
        }
        let available = seller.balance(op.amount_to_sell.asset_id);
        if available < op.amount_to_sell.amount {
            return Err(TransactionError::InsufficientBalance {
                account: op.seller,
                asset: op.amount_to_sell.asset_id,
                required: op.amount_to_sell.amount,
                available,
            });
        }

        if !apply {
            return Ok(OperationResult::Nothing);
        }

        let to_sell = op.amount_to_sell;
        chain.state_mut().modify_account(op.seller, |account| {
            let balance = account.balances.entry(to_sell.asset_id).or_default();
            *balance = *balance - to_sell.amount;
        });
        let order_id = chain.state_mut().create_limit_order(LimitOrderObject {
            seller: op.seller,
            for_sale: op.amount_to_sell.amount,
            sell_price: Price {
                base: op.amount_to_sell,
                quote: op.min_to_receive,
            },
            expiration: op.expiration,
        });
        Ok(OperationResult::NewObject(ObjectId::new(order_id.int())))
    }
}

/// Wraps the proposed operations into a proposal object waiting for approvals.
pub struct ProposalCreateEvaluator;

impl<S: BlockStore> OperationEvaluator<S> for ProposalCreateEvaluator {
    fn evaluate(
        &self,
        chain: &mut Chain<S>,
        _eval_state: &TransactionEvaluationState,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, TransactionError> {
        let op = match op {
            Operation::ProposalCreate(op) => op,
            other => {
                return Err(TransactionError::EvaluatorMismatch { tag: other.tag() })
            }
        };

        let now = chain.head_block_time();
        if op.expiration_time <= now {
            return Err(TransactionError::ExpirationInPast {
                expiration: op.expiration_time,
                now,
            });
        }
        let maximum =
            now + chain
                .state()
                .global_properties()
                .parameters
                .maximum_proposal_lifetime;
        if op.expiration_time > maximum {
            return Err(TransactionError::ProposalLifetimeTooLong {
                expiration: op.expiration_time,
                maximum,
            });
        }

        if chain.state().account(op.fee_paying_account).is_none() {
            return Err(TransactionError::NoSuchAccount {
                account: op.fee_paying_account,
            });
        }
        let mut required_active_approvals = BTreeSet::new();
        for proposed in &op.proposed_ops {
            proposed.required_active_accounts(&mut required_active_approvals);
        }
        for account in &required_active_approvals {
            if chain.state().account(*account).is_none() {
                return Err(TransactionError::NoSuchAccount { account: *account });
            }
        }

        if !apply {
            return Ok(OperationResult::Nothing);
        }

        let proposal_id = chain.state_mut().create_proposal(ProposalObject {
            expiration_time: op.expiration_time,
            proposed_transaction: Transaction {
                ref_block_num: 0,
                ref_block_prefix: 0,
                expiration: op.expiration_time,
                operations: op.proposed_ops.clone(),
            },
            required_active_approvals,
            available_active_approvals: BTreeSet::new(),
        });
        Ok(OperationResult::NewObject(ObjectId::new(proposal_id.int())))
    }
}

/// Adds or removes approvals on a proposal, executing it as soon as it is fully approved.
pub struct ProposalUpdateEvaluator;

impl<S: BlockStore> OperationEvaluator<S> for ProposalUpdateEvaluator {
    fn evaluate(
        &self,
        chain: &mut Chain<S>,
        _eval_state: &TransactionEvaluationState,
        op: &Operation,
        apply: bool,
    ) -> Result<OperationResult, TransactionError> {
        let op = match op {
            Operation::ProposalUpdate(op) => op,
            other => {
                return Err(TransactionError::EvaluatorMismatch { tag: other.tag() })
            }
        };

        let proposal = chain
            .state()
            .proposal(op.proposal)
            .ok_or(TransactionError::NoSuchProposal {
                proposal: op.proposal,
            })?;
        for account in &op.active_approvals_to_add {
            if !proposal.required_active_approvals.contains(account) {
                return Err(TransactionError::IrrelevantApproval { account: *account });
            }
        }
        for account in &op.active_approvals_to_remove {
            if !proposal.available_active_approvals.contains(account) {
                return Err(TransactionError::AbsentApproval { account: *account });
            }
        }

        if !apply {
            return Ok(OperationResult::Nothing);
        }

        let to_add = op.active_approvals_to_add.clone();
        let to_remove = op.active_approvals_to_remove.clone();
        chain.state_mut().modify_proposal(op.proposal, |proposal| {
            proposal.available_active_approvals.extend(to_add.iter());
            for account in &to_remove {
                proposal.available_active_approvals.remove(account);
            }
        });

        let authorized = chain
            .state()
            .proposal(op.proposal)
            .map(|proposal| proposal.is_authorized_to_execute())
            .unwrap_or(false);
        if authorized {
            // A failure here leaves the proposal in place; it gets another chance at its
            // expiration.
            if let Err(error) = chain.push_proposal(op.proposal) {
                log::warn!("DeferredProposal, {}, {:?}", op.proposal, error);
            }
        }
        Ok(OperationResult::Nothing)
    }
}
