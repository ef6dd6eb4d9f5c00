/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Chain parameters, genesis configuration, and engine configuration.
//!
//! [`ChainParameters`] are consensus-relevant limits every node must agree on. They live in the
//! [global properties object](crate::state::objects::GlobalProperties) and may be updated at
//! maintenance intervals. [`GenesisConfig`] describes the state the chain starts from.
//! [`Configuration`] holds node-local knobs that do not affect consensus.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::{
    AccountId, Amount, AssetId, ChainID, Timestamp, VerifyingKeyBytes,
};

/// The number of entries in the block summary ring used for TaPoS checks. A transaction's
/// `ref_block_num` indexes this ring.
pub const BLOCK_SUMMARY_SLOTS: usize = 0x10000;

/// Transactions at or above this packed size are rejected outright.
pub const MAX_TRANSACTION_SIZE: usize = 1024 * 1024;

/// Added to the recently-missed counter per slot a witness failed to produce in.
pub const RECENTLY_MISSED_COUNT_INCREMENT: u32 = 4;

/// Subtracted from the recently-missed counter when a block arrives on schedule.
pub const RECENTLY_MISSED_COUNT_DECREMENT: u32 = 3;

/// A block becomes irreversible once this percentage of the active witnesses has confirmed a
/// block at or above its number.
pub const IRREVERSIBLE_THRESHOLD_PERCENT: u32 = 70;

/// Before this time, a failed proposal application blanks out the operation history entries it
/// produced; from this time on, the entries are truncated away instead. Both behaviors must be
/// kept so that history object numbering replays identically.
pub const HARDFORK_PROPOSAL_HISTORY_TIME: Timestamp = Timestamp::new(1_600_000_000);

/// Consensus-relevant limits, agreed on by every node.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainParameters {
    /// Seconds between consecutive block production slots.
    pub block_interval: u32,
    /// Seconds between maintenance intervals.
    pub maintenance_interval: u32,
    /// Blocks above this packed size are invalid.
    pub maximum_block_size: u32,
    /// A transaction's expiration may lie at most this many seconds past the head block time.
    pub maximum_time_until_expiration: u32,
    /// Proposals may live at most this many seconds.
    pub maximum_proposal_lifetime: u32,
    /// Account authority graphs are walked at most this deep when verifying signatures.
    pub max_authority_depth: u16,
}

impl Default for ChainParameters {
    fn default() -> Self {
        ChainParameters {
            block_interval: 5,
            maintenance_interval: 60 * 60 * 24,
            maximum_block_size: 2 * 1024 * 1024,
            maximum_time_until_expiration: 60 * 60 * 24,
            maximum_proposal_lifetime: 60 * 60 * 24 * 28,
            max_authority_depth: 2,
        }
    }
}

/// An account present at genesis. Accounts are numbered in vector order starting from 0.
#[derive(Clone, Debug)]
pub struct GenesisAccount {
    pub name: String,
    pub owner_key: VerifyingKeyBytes,
    pub active_key: VerifyingKeyBytes,
}

/// A witness present at genesis. Witnesses are numbered in vector order starting from 0, and all
/// genesis witnesses start out active.
#[derive(Clone, Debug)]
pub struct GenesisWitness {
    pub account: AccountId,
    pub signing_key: VerifyingKeyBytes,
}

/// An asset present at genesis. Assets are numbered in vector order starting from 0.
#[derive(Clone, Debug)]
pub struct GenesisAsset {
    pub symbol: String,
    pub precision: u8,
}

/// An initial balance credited at genesis.
#[derive(Clone, Debug)]
pub struct GenesisBalance {
    pub account: AccountId,
    pub asset: AssetId,
    pub amount: Amount,
}

/// Everything needed to construct the state the chain starts from.
#[derive(Clone, Debug)]
pub struct GenesisConfig {
    pub chain_id: ChainID,
    /// The head block time of the empty chain. The first block must be timestamped after this.
    pub genesis_time: Timestamp,
    pub parameters: ChainParameters,
    pub initial_accounts: Vec<GenesisAccount>,
    pub initial_witnesses: Vec<GenesisWitness>,
    pub initial_assets: Vec<GenesisAsset>,
    pub initial_balances: Vec<GenesisBalance>,
}

/// Node-local engine configuration. Nothing in here affects consensus.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// How many applied blocks stay reversible for [`pop_block`](crate::chain::Chain::pop_block).
    /// When a block is applied beyond this depth, the oldest retained undo session is
    /// hard-committed and the chain can no longer rewind past it.
    pub max_undo_history: usize,
    /// Worker threads used by [`precompute_parallel`](crate::chain::Chain::precompute_parallel).
    pub precompute_workers: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            max_undo_history: 1024,
            precompute_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}
