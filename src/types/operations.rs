/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The operations a transaction can carry, and the results their evaluation produces.
//!
//! The engine itself does not interpret operations beyond three things: their
//! [tag](Operation::tag), which selects the registered
//! [evaluator](crate::evaluator::OperationEvaluator); their stateless
//! [well-formedness check](Operation::validate); and the
//! [accounts whose active authority they require](Operation::required_active_accounts), which the
//! transaction validator checks against the transaction's signatures.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::BTreeSet;

use crate::types::data_types::{AccountId, AssetAmount, ObjectId, ProposalId, Timestamp};

/// A single state mutation carried by a transaction. The variant order is the operation tag
/// space: the tag of a variant indexes into the evaluator registry.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum Operation {
    Transfer(TransferOperation),
    LimitOrderCreate(LimitOrderCreateOperation),
    ProposalCreate(ProposalCreateOperation),
    ProposalUpdate(ProposalUpdateOperation),
}

impl Operation {
    /// The operation's tag: its index into the evaluator registry.
    pub fn tag(&self) -> usize {
        match self {
            Operation::Transfer(_) => 0,
            Operation::LimitOrderCreate(_) => 1,
            Operation::ProposalCreate(_) => 2,
            Operation::ProposalUpdate(_) => 3,
        }
    }

    /// Stateless well-formedness check. Statefull checks belong to the operation's evaluator.
    pub fn validate(&self) -> Result<(), MalformedOperationError> {
        match self {
            Operation::Transfer(op) => op.validate(),
            Operation::LimitOrderCreate(op) => op.validate(),
            Operation::ProposalCreate(op) => op.validate(),
            Operation::ProposalUpdate(op) => op.validate(),
        }
    }

    /// Collects the accounts whose active authority must be satisfied by the signatures of any
    /// transaction carrying this operation.
    pub fn required_active_accounts(&self, accounts: &mut BTreeSet<AccountId>) {
        match self {
            Operation::Transfer(op) => {
                accounts.insert(op.from);
            }
            Operation::LimitOrderCreate(op) => {
                accounts.insert(op.seller);
            }
            Operation::ProposalCreate(op) => {
                accounts.insert(op.fee_paying_account);
            }
            Operation::ProposalUpdate(op) => {
                accounts.insert(op.fee_paying_account);
                accounts.extend(op.active_approvals_to_add.iter());
                accounts.extend(op.active_approvals_to_remove.iter());
            }
        }
    }
}

/// Moves an amount of some asset from one account's balance to another's.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TransferOperation {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: AssetAmount,
}

impl TransferOperation {
    fn validate(&self) -> Result<(), MalformedOperationError> {
        if self.amount.amount.int() <= 0 {
            return Err(MalformedOperationError::NonPositiveAmount);
        }
        if self.from == self.to {
            return Err(MalformedOperationError::TransferToSelf);
        }
        Ok(())
    }
}

/// Places a limit order offering `amount_to_sell` for at least `min_to_receive`, open until
/// `expiration`.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct LimitOrderCreateOperation {
    pub seller: AccountId,
    pub amount_to_sell: AssetAmount,
    pub min_to_receive: AssetAmount,
    pub expiration: Timestamp,
}

impl LimitOrderCreateOperation {
    fn validate(&self) -> Result<(), MalformedOperationError> {
        if self.amount_to_sell.amount.int() <= 0 || self.min_to_receive.amount.int() <= 0 {
            return Err(MalformedOperationError::NonPositiveAmount);
        }
        if self.amount_to_sell.asset_id == self.min_to_receive.asset_id {
            return Err(MalformedOperationError::SameAssetMarket);
        }
        Ok(())
    }
}

/// Creates a proposal object wrapping `proposed_ops`. The proposal executes once every account in
/// its required approval set has approved it, or lapses at `expiration_time`.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ProposalCreateOperation {
    pub fee_paying_account: AccountId,
    pub expiration_time: Timestamp,
    pub proposed_ops: Vec<Operation>,
}

impl ProposalCreateOperation {
    fn validate(&self) -> Result<(), MalformedOperationError> {
        if self.proposed_ops.is_empty() {
            return Err(MalformedOperationError::EmptyProposal);
        }
        for op in &self.proposed_ops {
            op.validate()?;
        }
        Ok(())
    }
}

/// Adds or removes active approvals on an existing proposal.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ProposalUpdateOperation {
    pub fee_paying_account: AccountId,
    pub proposal: ProposalId,
    pub active_approvals_to_add: Vec<AccountId>,
    pub active_approvals_to_remove: Vec<AccountId>,
}

impl ProposalUpdateOperation {
    fn validate(&self) -> Result<(), MalformedOperationError> {
        if self.active_approvals_to_add.is_empty() && self.active_approvals_to_remove.is_empty() {
            return Err(MalformedOperationError::EmptyProposalUpdate);
        }
        Ok(())
    }
}

/// What evaluating an operation produced. Mirrors the operations vector of a
/// [processed transaction](crate::types::transaction::ProcessedTransaction) position by position.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum OperationResult {
    /// The operation mutated state but created no object.
    Nothing,
    /// The operation created a new object with the contained instance number.
    NewObject(ObjectId),
}

/// Ways in which a single operation can be structurally invalid, independent of chain state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedOperationError {
    NonPositiveAmount,
    TransferToSelf,
    SameAssetMarket,
    EmptyProposal,
    EmptyProposalUpdate,
}
