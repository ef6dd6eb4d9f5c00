/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ledger entities stored in the [object database](crate::state::object_db::ObjectDatabase).
//!
//! Every mutation of these objects flows through the database's `create`/`modify`/`remove`
//! methods so that the [undo stack](crate::state::undo) can record inverse operations.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::data_types::{
    AccountId, Amount, AssetId, BlockId, BlockNumber, Price, Timestamp, TransactionId,
    VerifyingKeyBytes, WitnessId,
};
use crate::types::operations::{Operation, OperationResult};
use crate::types::transaction::{SignedTransaction, Transaction};

/// A weighted-threshold authority: satisfied when the weights of the signing keys present, plus
/// the weights of the satisfied nested account authorities, reach the threshold.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountId, u16>,
    pub key_auths: BTreeMap<VerifyingKeyBytes, u16>,
}

impl Authority {
    /// An authority satisfied by a single signature from `key`.
    pub fn single_key(key: VerifyingKeyBytes) -> Authority {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Authority {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths,
        }
    }
}

/// An account. Holds the owner and active authorities that transaction signatures are checked
/// against, and the account's balances.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct AccountObject {
    pub name: String,
    /// The authority that can change the account's keys. Satisfying `owner` also satisfies
    /// `active`.
    pub owner: Authority,
    /// The authority required for everyday operations such as transfers.
    pub active: Authority,
    pub balances: BTreeMap<AssetId, Amount>,
}

impl AccountObject {
    pub fn balance(&self, asset_id: AssetId) -> Amount {
        self.balances.get(&asset_id).copied().unwrap_or_default()
    }
}

/// A block-signing entity. Tracks the witness' production record, which feeds the
/// last-irreversible-block computation.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct WitnessObject {
    pub witness_account: AccountId,
    pub signing_key: VerifyingKeyBytes,
    /// The absolute slot of the last block this witness signed.
    pub last_aslot: u64,
    pub last_confirmed_block_num: BlockNumber,
    pub total_missed: u64,
}

/// An asset known to the chain.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct AssetObject {
    pub symbol: String,
    pub precision: u8,
}

/// An open limit order. Orders sit on the book until they expire; matching them is the business
/// of operation evaluators outside this crate.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct LimitOrderObject {
    pub seller: AccountId,
    /// How much of `sell_price.base` remains for sale.
    pub for_sale: Amount,
    pub sell_price: Price,
    pub expiration: Timestamp,
}

/// A proposed transaction waiting for approvals. Executes as soon as every required approval is
/// present, or lapses at `expiration_time`.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ProposalObject {
    pub expiration_time: Timestamp,
    pub proposed_transaction: Transaction,
    pub required_active_approvals: BTreeSet<AccountId>,
    pub available_active_approvals: BTreeSet<AccountId>,
}

impl ProposalObject {
    pub fn is_authorized_to_execute(&self) -> bool {
        self.required_active_approvals
            .is_subset(&self.available_active_approvals)
    }
}

/// An entry of the recent-transaction dedup index. Exists exactly as long as the transaction has
/// not expired, so the index contains the transactions of committed, non-expired blocks.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TransactionObject {
    pub trx_id: TransactionId,
    pub trx: SignedTransaction,
}

impl TransactionObject {
    pub fn expiration(&self) -> Timestamp {
        self.trx.transaction.expiration
    }
}

/// One slot of the block summary ring. Slot `n` holds the id of the most recent block whose
/// number is congruent to `n` modulo the ring size; transactions reference it for TaPoS.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BlockSummaryObject {
    pub block_id: BlockId,
}

/// The witness production order for the current round.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct WitnessScheduleObject {
    pub current_shuffled_witnesses: Vec<WitnessId>,
}

/// Chain-wide properties that change only at maintenance intervals.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct GlobalProperties {
    pub parameters: crate::config::ChainParameters,
    pub active_witnesses: Vec<WitnessId>,
}

/// Chain-wide properties that change every block.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct DynamicGlobalProperties {
    pub head_block_number: BlockNumber,
    pub head_block_id: BlockId,
    /// The timestamp of the head block. At genesis, the genesis time.
    pub time: Timestamp,
    pub current_witness: WitnessId,
    pub next_maintenance_time: Timestamp,
    /// The absolute slot number of the head block, counting every slot since genesis whether or
    /// not a block was produced in it.
    pub current_aslot: u64,
    /// Decaying count of recently missed slots.
    pub recently_missed_count: u32,
    /// A bitmap of the most recent 128 slots; bit 0 is the head block's slot, a set bit means a
    /// block was produced in that slot.
    pub recent_slots_filled: u128,
    /// Blocks at or below this number can no longer be reorganized away.
    pub last_irreversible_block_num: BlockNumber,
}

/// A record of one operation applied during the current block, kept in application order.
/// The buffer of these is cleared when the block finishes applying; observers that want history
/// must capture it from the applied-block notification.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct OperationHistoryObject {
    pub op: Operation,
    pub result: OperationResult,
    pub block_num: BlockNumber,
    /// The position of the operation's transaction in its block.
    pub trx_in_block: u16,
    /// The position of the operation in its transaction.
    pub op_in_trx: u16,
    /// Counter of every operation applied in this block, including those replayed from
    /// proposals.
    pub virtual_op: u32,
}
