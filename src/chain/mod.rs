/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chain engine: the single writer that owns all ledger state mutation.
//!
//! [`Chain`] ties the other components together: candidate blocks land in the
//! [fork database](crate::fork_db), state mutations flow through the
//! [object database](crate::state::object_db) under the
//! [undo stack's](crate::state::undo) discipline, committed blocks are written to the pluggable
//! [block store](crate::block_store), and operations are dispatched to the registered
//! [evaluators](crate::evaluator).
//!
//! The engine preserves one invariant above all: the object database is always the result of
//! applying the blocks from genesis to the current head, plus, optionally, one open pending
//! session holding the effects of the [pending pool](Chain::pending_transactions).
//!
//! ## Entry points
//!
//! - [`push_block`](Chain::push_block): ingest a candidate block from a peer (defined in
//!   [`blocks`](self), see `chain/blocks.rs`).
//! - [`push_transaction`](Chain::push_transaction): ingest a transaction from a client
//!   (`chain/transactions.rs`).
//! - [`generate_block`](Chain::generate_block): produce a block when this node's witness is
//!   scheduled.
//! - [`pop_block`](Chain::pop_block): undo the head block.
//!
//! ## Concurrency
//!
//! All of the entry points above must be serialized: conceptually they run on one writer thread.
//! The read-only queries in this module may run concurrently between writer operations but never
//! during one; the simplest correct arrangement is a read/write lock around the whole engine.
//! The only internal parallelism is [`precompute_parallel`](Chain::precompute_parallel), whose
//! workers touch no engine state.

pub(crate) mod blocks;

pub(crate) mod transactions;

pub use blocks::BlockError;
pub use transactions::{TransactionError, TransactionEvaluationState};

use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use threadpool::ThreadPool;

use crate::block_store::BlockStore;
use crate::config::{Configuration, GenesisConfig};
use crate::evaluator::{self, OperationEvaluator};
use crate::events::Event;
use crate::fork_db::{ForkDatabase, ForkDatabaseError};
use crate::precompute::{self, PrecomputeError};
use crate::state::object_db::ObjectDatabase;
use crate::state::objects::{
    AccountObject, AssetObject, Authority, DynamicGlobalProperties, GlobalProperties,
    LimitOrderObject, OperationHistoryObject, WitnessObject,
};
use crate::types::block::SignedBlock;
use crate::types::data_types::{
    AccountId, AssetId, BlockId, BlockNumber, ChainID, SkipFlags, Timestamp, TransactionId,
    WitnessId,
};
use crate::types::transaction::{ProcessedTransaction, SignedTransaction};

pub struct Chain<S: BlockStore> {
    pub(crate) db: ObjectDatabase,
    pub(crate) fork_db: ForkDatabase,
    pub(crate) block_store: S,
    pub(crate) chain_id: ChainID,
    pub(crate) evaluators: Vec<Option<Arc<dyn OperationEvaluator<S>>>>,

    /// The pending pool: transactions accepted but not yet in a committed block. Their combined
    /// effects live in the pending undo session.
    pub(crate) pending_tx: Vec<ProcessedTransaction>,
    pub(crate) pending_session_open: bool,
    /// Transactions of popped blocks, waiting to be re-admitted into the pending pool.
    pub(crate) popped_tx: VecDeque<SignedTransaction>,

    /// Operation history of the block currently being applied. Cleared when the block finishes.
    pub(crate) applied_ops: Vec<Option<OperationHistoryObject>>,
    pub(crate) current_block_num: BlockNumber,
    pub(crate) current_trx_in_block: u16,
    pub(crate) current_op_in_trx: u16,
    pub(crate) current_virtual_op: u32,

    pub(crate) skip_flags: SkipFlags,
    pub(crate) checkpoints: BTreeMap<BlockNumber, BlockId>,
    pub(crate) push_proposal_nesting_depth: u32,

    pub(crate) precompute_pool: ThreadPool,
    pub(crate) event_publisher: Option<Sender<Event>>,
}

impl<S: BlockStore> Chain<S> {
    /* ↓↓↓ Initialize ↓↓↓ */

    /// Builds the engine and installs the genesis state described by `genesis`: accounts,
    /// witnesses, assets, balances, the property singletons, and the initial witness schedule.
    /// Everything created here is permanent; undo sessions only begin with the first block.
    pub fn initialize(
        block_store: S,
        genesis: GenesisConfig,
        configuration: Configuration,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Chain<S>, GenesisError> {
        if genesis.initial_witnesses.is_empty() {
            return Err(GenesisError::NoInitialWitnesses);
        }

        let mut db = ObjectDatabase::new(configuration.max_undo_history);

        for account in &genesis.initial_accounts {
            db.create_account(AccountObject {
                name: account.name.clone(),
                owner: Authority::single_key(account.owner_key),
                active: Authority::single_key(account.active_key),
                balances: BTreeMap::new(),
            });
        }

        let mut active_witnesses = Vec::with_capacity(genesis.initial_witnesses.len());
        for witness in &genesis.initial_witnesses {
            if db.account(witness.account).is_none() {
                return Err(GenesisError::UnknownAccount {
                    account: witness.account,
                });
            }
            let id = db.create_witness(WitnessObject {
                witness_account: witness.account,
                signing_key: witness.signing_key,
                last_aslot: 0,
                last_confirmed_block_num: BlockNumber::new(0),
                total_missed: 0,
            });
            active_witnesses.push(id);
        }

        for asset in &genesis.initial_assets {
            db.create_asset(AssetObject {
                symbol: asset.symbol.clone(),
                precision: asset.precision,
            });
        }

        for balance in &genesis.initial_balances {
            if db.asset(balance.asset).is_none() {
                return Err(GenesisError::UnknownAsset {
                    asset: balance.asset,
                });
            }
            let credited = db.modify_account(balance.account, |account| {
                let entry = account.balances.entry(balance.asset).or_default();
                *entry = *entry + balance.amount;
            });
            if !credited {
                return Err(GenesisError::UnknownAccount {
                    account: balance.account,
                });
            }
        }

        db.set_global_properties(GlobalProperties {
            parameters: genesis.parameters.clone(),
            active_witnesses: active_witnesses.clone(),
        });
        let maintenance_interval = genesis.parameters.maintenance_interval;
        db.modify_dynamic_global_properties(|dgp: &mut DynamicGlobalProperties| {
            dgp.time = genesis.genesis_time;
            dgp.next_maintenance_time = genesis.genesis_time + maintenance_interval;
        });
        db.modify_witness_schedule(|schedule| {
            schedule.current_shuffled_witnesses = active_witnesses.clone();
        });

        let mut chain = Chain {
            db,
            fork_db: ForkDatabase::new(),
            block_store,
            chain_id: genesis.chain_id,
            evaluators: Vec::new(),
            pending_tx: Vec::new(),
            pending_session_open: false,
            popped_tx: VecDeque::new(),
            applied_ops: Vec::new(),
            current_block_num: BlockNumber::new(0),
            current_trx_in_block: 0,
            current_op_in_trx: 0,
            current_virtual_op: 0,
            skip_flags: SkipFlags::NOTHING,
            checkpoints: BTreeMap::new(),
            push_proposal_nesting_depth: 0,
            precompute_pool: ThreadPool::new(configuration.precompute_workers.max(1)),
            event_publisher,
        };
        evaluator::register_default_evaluators(&mut chain);
        Ok(chain)
    }

    /// Registers `evaluator` for the operation tag `tag`, replacing any evaluator registered for
    /// that tag before.
    pub fn register_evaluator(&mut self, tag: usize, evaluator: Arc<dyn OperationEvaluator<S>>) {
        if self.evaluators.len() <= tag {
            self.evaluators.resize_with(tag + 1, || None);
        }
        self.evaluators[tag] = Some(evaluator);
    }

    /* ↓↓↓ Head state getters ↓↓↓ */

    pub fn head_block_id(&self) -> BlockId {
        self.db.dynamic_global_properties().head_block_id
    }

    pub fn head_block_num(&self) -> BlockNumber {
        self.db.dynamic_global_properties().head_block_number
    }

    pub fn head_block_time(&self) -> Timestamp {
        self.db.dynamic_global_properties().time
    }

    pub fn chain_id(&self) -> ChainID {
        self.chain_id
    }

    /// The object database, for read access from queries and evaluators.
    pub fn state(&self) -> &ObjectDatabase {
        &self.db
    }

    /// The object database, for mutation from evaluators. All mutations made through this are
    /// recorded into the undo session of whichever application path is running.
    pub fn state_mut(&mut self) -> &mut ObjectDatabase {
        &mut self.db
    }

    /* ↓↓↓ Block and transaction queries ↓↓↓ */

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.fork_db.is_known_block(id) || self.block_store.contains(id)
    }

    /// Only returns true if the transaction has neither expired nor been invalidated. For
    /// transactions older than the expiration window, query by block instead.
    pub fn is_known_transaction(&self, id: TransactionId) -> bool {
        self.db.contains_transaction(id)
    }

    pub fn get_block_id_for_num(&self, block_num: BlockNumber) -> Option<BlockId> {
        self.block_store.fetch_block_id(block_num)
    }

    pub fn fetch_block_by_id(&self, id: &BlockId) -> Option<SignedBlock> {
        match self.fork_db.fetch_block(id) {
            Some(item) => Some(item.block.clone()),
            None => self.block_store.fetch_optional(id),
        }
    }

    pub fn fetch_block_by_number(&self, num: BlockNumber) -> Option<SignedBlock> {
        let results = self.fork_db.fetch_block_by_number(num);
        if results.len() == 1 {
            Some(results[0].block.clone())
        } else {
            self.block_store.fetch_by_number(num)
        }
    }

    /// The transaction behind an entry of the dedup index.
    pub fn get_recent_transaction(&self, id: TransactionId) -> Option<SignedTransaction> {
        self.db.transaction(id).map(|entry| entry.trx.clone())
    }

    /// The ids of the blocks on the branch from `head_of_fork` back to (and including) the common
    /// ancestor with the current head.
    pub fn get_block_ids_on_fork(
        &self,
        head_of_fork: BlockId,
    ) -> Result<Vec<BlockId>, ForkDatabaseError> {
        let (head_branch, fork_branch) = self
            .fork_db
            .fetch_branch_from(self.head_block_id(), head_of_fork)?;
        let mut result: Vec<BlockId> = fork_branch.iter().map(|item| item.id).collect();
        // Both branches end on children of the common ancestor.
        if let Some(oldest) = head_branch.last() {
            result.push(oldest.previous_id());
        }
        Ok(result)
    }

    /* ↓↓↓ Pending pool ↓↓↓ */

    /// The transactions currently in the pending pool, in application order.
    pub fn pending_transactions(&self) -> &[ProcessedTransaction] {
        &self.pending_tx
    }

    /// Transactions popped off the chain by [`pop_block`](Chain::pop_block) or a fork switch and
    /// not yet re-admitted.
    pub fn popped_transactions(&self) -> &VecDeque<SignedTransaction> {
        &self.popped_tx
    }

    /// Empties the pending pool and discards the pending session, returning the state to exactly
    /// the head block's.
    pub fn clear_pending(&mut self) {
        debug_assert!(self.pending_tx.is_empty() || self.pending_session_open);
        self.pending_tx.clear();
        self.reset_pending_session();
    }

    pub(crate) fn reset_pending_session(&mut self) {
        if self.pending_session_open {
            self.db.undo_session();
            self.pending_session_open = false;
        }
    }

    /* ↓↓↓ Checkpoints ↓↓↓ */

    /// Forces the block at each contained number to have exactly the contained id; a block that
    /// disagrees fails to apply. Blocks at or below the highest checkpoint are applied with every
    /// check skipped.
    pub fn add_checkpoints(&mut self, checkpoints: BTreeMap<BlockNumber, BlockId>) {
        self.checkpoints.extend(checkpoints);
    }

    pub fn before_last_checkpoint(&self) -> bool {
        match self.checkpoints.iter().next_back() {
            Some((&num, _)) => num >= self.head_block_num(),
            None => false,
        }
    }

    /* ↓↓↓ Slots and witness scheduling ↓↓↓ */

    /// The timestamp of the given future slot. Slot 0 is a sentinel with no time; slot 1 is the
    /// first slot after the head block.
    pub fn get_slot_time(&self, slot_num: u32) -> Timestamp {
        if slot_num == 0 {
            return Timestamp::new(0);
        }
        let interval = self.block_interval();
        let dgp = self.db.dynamic_global_properties();
        if dgp.head_block_number == BlockNumber::new(0) {
            // Before the first block, slots count up from the genesis time.
            return dgp.time + slot_num * interval;
        }
        let head_slot_time = Timestamp::new(dgp.time.secs() / interval * interval);
        head_slot_time + slot_num * interval
    }

    /// The number of the slot containing `when`, or 0 if `when` is at or before the head block's
    /// slot.
    pub fn get_slot_at_time(&self, when: Timestamp) -> u32 {
        let first_slot_time = self.get_slot_time(1);
        if when < first_slot_time {
            return 0;
        }
        (when - first_slot_time) / self.block_interval() + 1
    }

    /// The witness scheduled to produce in the given future slot.
    pub fn get_scheduled_witness(&self, slot_num: u32) -> WitnessId {
        let dgp = self.db.dynamic_global_properties();
        let schedule = &self.db.witness_schedule().current_shuffled_witnesses;
        let position = (dgp.current_aslot + slot_num as u64) % schedule.len() as u64;
        schedule[position as usize]
    }

    pub(crate) fn block_interval(&self) -> u32 {
        self.db.global_properties().parameters.block_interval
    }

    /* ↓↓↓ Precomputation ↓↓↓ */

    /// Precomputes a block's expensive stateless values in parallel on the engine's worker pool;
    /// see [`crate::precompute`]. Call this before taking the writer lock for
    /// [`push_block`](Chain::push_block).
    pub fn precompute_parallel(
        &self,
        block: &SignedBlock,
        skip: SkipFlags,
    ) -> Result<(), PrecomputeError> {
        precompute::precompute_block(&self.precompute_pool, self.chain_id, block, skip)
    }

    /// Precomputes a single transaction's id and signature keys on the calling thread.
    pub fn precompute_transaction(&self, trx: &SignedTransaction) -> Result<(), PrecomputeError> {
        precompute::precompute_transaction(self.chain_id, trx, SkipFlags::NOTHING)
    }

    /* ↓↓↓ Market queries ↓↓↓ */

    /// The open orders on both sides of the `a`/`b` market, best prices first, at most `limit`
    /// per side.
    pub fn get_limit_orders(
        &self,
        a: AssetId,
        b: AssetId,
        limit: u32,
    ) -> Result<Vec<LimitOrderObject>, QueryError> {
        if limit > 300 {
            return Err(QueryError::LimitTooLarge { limit });
        }
        let mut result = Vec::new();
        result.extend(
            self.db
                .market_orders(a, b)
                .take(limit as usize)
                .map(|(_, order)| order.clone()),
        );
        result.extend(
            self.db
                .market_orders(b, a)
                .take(limit as usize)
                .map(|(_, order)| order.clone()),
        );
        Ok(result)
    }

    /// An aggregated view of the `base`/`quote` order book with real-number prices.
    pub fn get_order_book(
        &self,
        base_id: AssetId,
        quote_id: AssetId,
        limit: u32,
    ) -> Result<LimitOrderBook, QueryError> {
        let base = self
            .db
            .asset(base_id)
            .ok_or(QueryError::NoSuchAsset { asset: base_id })?;
        let quote = self
            .db
            .asset(quote_id)
            .ok_or(QueryError::NoSuchAsset { asset: quote_id })?;
        let mut result = LimitOrderBook {
            base: base.symbol.clone(),
            quote: quote.symbol.clone(),
            bids: Vec::new(),
            asks: Vec::new(),
        };

        for order in self.get_limit_orders(base_id, quote_id, limit)? {
            let price = sell_price(
                &order.sell_price,
                base_id,
                base.precision,
                quote.precision,
            );
            let for_sale = order.for_sale.int();
            if order.sell_price.base.asset_id == base_id {
                result.bids.push(OrderBookEntry {
                    price,
                    base: for_sale,
                    quote: for_sale * order.sell_price.quote.amount.int()
                        / order.sell_price.base.amount.int(),
                });
            } else {
                result.asks.push(OrderBookEntry {
                    price,
                    base: for_sale * order.sell_price.quote.amount.int()
                        / order.sell_price.base.amount.int(),
                    quote: for_sale,
                });
            }
        }
        Ok(result)
    }

    pub fn lookup_asset_ids(&self, ids: &[AssetId]) -> Vec<Option<AssetObject>> {
        ids.iter()
            .map(|id| self.db.asset(*id).cloned())
            .collect()
    }

    /// Looks up assets by symbol. A string with a leading digit is interpreted as a numeric asset
    /// id instead of a symbol.
    pub fn lookup_asset_symbols(&self, symbols_or_ids: &[String]) -> Vec<Option<AssetObject>> {
        symbols_or_ids
            .iter()
            .map(|symbol_or_id| {
                if symbol_or_id.starts_with(|c: char| c.is_ascii_digit()) {
                    let id = symbol_or_id.parse::<u64>().ok()?;
                    self.db.asset(AssetId::new(id)).cloned()
                } else {
                    let id = self.db.asset_by_symbol(symbol_or_id)?;
                    self.db.asset(id).cloned()
                }
            })
            .collect()
    }

    /* ↓↓↓ Scoped skip flag overrides ↓↓↓ */

    /// Installs `skip` as the engine's skip flags for the duration of `f`, restoring the previous
    /// flags afterwards. Nested calls observe the innermost override.
    pub(crate) fn with_skip_flags<T>(
        &mut self,
        skip: SkipFlags,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let previous = std::mem::replace(&mut self.skip_flags, skip);
        let result = f(self);
        self.skip_flags = previous;
        result
    }
}

/// One side's row in an aggregated [order book](LimitOrderBook).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderBookEntry {
    pub price: f64,
    pub base: i64,
    pub quote: i64,
}

/// An aggregated order book over one market, as returned by
/// [`get_order_book`](Chain::get_order_book).
#[derive(Clone, Debug)]
pub struct LimitOrderBook {
    pub base: String,
    pub quote: String,
    pub bids: Vec<OrderBookEntry>,
    pub asks: Vec<OrderBookEntry>,
}

/// The price of an order as a real number of base units per quote unit, adjusted for the assets'
/// precisions. Orders selling the quote asset are inverted first.
fn sell_price(
    price: &crate::types::data_types::Price,
    base_id: AssetId,
    base_precision: u8,
    quote_precision: u8,
) -> f64 {
    let (base_amount, quote_amount) = if price.base.asset_id == base_id {
        (price.base.amount.int(), price.quote.amount.int())
    } else {
        (price.quote.amount.int(), price.base.amount.int())
    };
    if base_amount == 0 {
        return 0.0;
    }
    if quote_amount == 0 {
        return f64::MAX;
    }
    base_amount as f64 * 10f64.powi(base_precision as i32)
        / (quote_amount as f64 * 10f64.powi(quote_precision as i32))
}

/// Error when constructing a chain from a [genesis configuration](GenesisConfig).
#[derive(Debug)]
pub enum GenesisError {
    NoInitialWitnesses,
    UnknownAccount { account: AccountId },
    UnknownAsset { asset: AssetId },
}

/// Error from a read-only query.
#[derive(Debug)]
pub enum QueryError {
    LimitTooLarge { limit: u32 },
    NoSuchAsset { asset: AssetId },
}
