/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The object database: typed, indexed, in-memory tables of
//! [ledger entities](crate::state::objects), with every mutation routed through the
//! [undo stack](crate::state::undo).
//!
//! ## Tables and indexes
//!
//! |Table|Key|Secondary indexes|
//! |---|---|---|
//! |Accounts|[`AccountId`]||
//! |Witnesses|[`WitnessId`]||
//! |Assets|[`AssetId`]|by symbol|
//! |Limit orders|[`OrderId`]|by price, by expiration|
//! |Proposals|[`ProposalId`]|by expiration|
//! |Recent transactions|[`TransactionId`]|by expiration|
//! |Block summaries|ring position||
//!
//! plus the witness schedule and the global and dynamic-global property singletons.
//!
//! ## Undo discipline
//!
//! `create` and `remove` methods, and every `modify` method, record their inverse into the
//! current undo session. Secondary indexes are maintained by the table primitives themselves, so
//! replaying inverse entries restores the indexes along with the primary rows. Genesis-only
//! creators are the exception: they run before any session exists and are permanent.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::BLOCK_SUMMARY_SLOTS;
use crate::state::objects::{
    AccountObject, AssetObject, BlockSummaryObject, DynamicGlobalProperties, GlobalProperties,
    LimitOrderObject, ProposalObject, TransactionObject, WitnessObject, WitnessScheduleObject,
};
use crate::state::undo::{UndoEntry, UndoStack};
use crate::types::data_types::{
    AccountId, AssetId, OrderId, Price, ProposalId, Timestamp, TransactionId, WitnessId,
};

/// Key of the by-price order index. Orders over the same market sort best price first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderPriceKey {
    pub price: Price,
    pub id: OrderId,
}

impl Ord for OrderPriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.price.base.asset_id, self.price.quote.asset_id)
            .cmp(&(other.price.base.asset_id, other.price.quote.asset_id))
            // Descending by price, so iteration yields the best offer first.
            .then_with(|| other.price.cmp_ratio(&self.price))
            .then_with(|| {
                (self.price.base.amount, self.price.quote.amount)
                    .cmp(&(other.price.base.amount, other.price.quote.amount))
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderPriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct ObjectDatabase {
    accounts: BTreeMap<AccountId, AccountObject>,
    witnesses: BTreeMap<WitnessId, WitnessObject>,
    assets: BTreeMap<AssetId, AssetObject>,
    assets_by_symbol: BTreeMap<String, AssetId>,
    limit_orders: BTreeMap<OrderId, LimitOrderObject>,
    orders_by_price: BTreeSet<OrderPriceKey>,
    orders_by_expiration: BTreeSet<(Timestamp, OrderId)>,
    proposals: BTreeMap<ProposalId, ProposalObject>,
    proposals_by_expiration: BTreeSet<(Timestamp, ProposalId)>,
    transactions: BTreeMap<TransactionId, TransactionObject>,
    transactions_by_expiration: BTreeSet<(Timestamp, TransactionId)>,
    block_summaries: Vec<BlockSummaryObject>,
    witness_schedule: WitnessScheduleObject,
    global_properties: GlobalProperties,
    dynamic_global_properties: DynamicGlobalProperties,
    next_account_id: u64,
    next_witness_id: u64,
    next_asset_id: u64,
    next_order_id: u64,
    next_proposal_id: u64,
    undo: UndoStack,
}

impl ObjectDatabase {
    pub(crate) fn new(max_undo_history: usize) -> ObjectDatabase {
        ObjectDatabase {
            accounts: BTreeMap::new(),
            witnesses: BTreeMap::new(),
            assets: BTreeMap::new(),
            assets_by_symbol: BTreeMap::new(),
            limit_orders: BTreeMap::new(),
            orders_by_price: BTreeSet::new(),
            orders_by_expiration: BTreeSet::new(),
            proposals: BTreeMap::new(),
            proposals_by_expiration: BTreeSet::new(),
            transactions: BTreeMap::new(),
            transactions_by_expiration: BTreeSet::new(),
            block_summaries: vec![BlockSummaryObject::default(); BLOCK_SUMMARY_SLOTS],
            witness_schedule: WitnessScheduleObject {
                current_shuffled_witnesses: Vec::new(),
            },
            global_properties: GlobalProperties {
                parameters: crate::config::ChainParameters::default(),
                active_witnesses: Vec::new(),
            },
            dynamic_global_properties: DynamicGlobalProperties {
                head_block_number: Default::default(),
                head_block_id: Default::default(),
                time: Default::default(),
                current_witness: Default::default(),
                next_maintenance_time: Default::default(),
                current_aslot: 0,
                recently_missed_count: 0,
                recent_slots_filled: u128::MAX,
                last_irreversible_block_num: Default::default(),
            },
            next_account_id: 0,
            next_witness_id: 0,
            next_asset_id: 0,
            next_order_id: 0,
            next_proposal_id: 0,
            undo: UndoStack::new(max_undo_history),
        }
    }

    /* ↓↓↓ Undo sessions ↓↓↓ */

    /// Opens a new undo session as a child of the currently open session, if any.
    pub fn start_undo_session(&mut self) {
        self.undo.start_session();
    }

    /// Commits the top session: its changes fold into the parent session, or become the newest
    /// committed (block-level) session if no parent is open. Returns false if no session is open.
    pub fn commit_undo_session(&mut self) -> bool {
        self.undo.commit_session()
    }

    /// Merges the top session into its parent, leaving the parent open for more children.
    /// Identical in effect to [`commit_undo_session`](Self::commit_undo_session).
    pub fn merge_undo_session(&mut self) -> bool {
        self.undo.merge_session()
    }

    /// Discards the top session, reverting every mutation made inside it. Returns false if no
    /// session is open.
    pub fn undo_session(&mut self) -> bool {
        match self.undo.undo_session() {
            Some(entries) => {
                self.revert(entries);
                true
            }
            None => false,
        }
    }

    /// Reverts the newest committed session, rewinding the database one block. Returns false if
    /// no committed session remains within the undo horizon.
    pub fn pop_commit(&mut self) -> bool {
        match self.undo.pop_commit() {
            Some(entries) => {
                self.revert(entries);
                true
            }
            None => false,
        }
    }

    pub fn undo_sessions_active(&self) -> usize {
        self.undo.active_sessions()
    }

    pub fn committed_sessions(&self) -> usize {
        self.undo.committed_sessions()
    }

    fn revert(&mut self, entries: Vec<UndoEntry>) {
        for entry in entries.into_iter().rev() {
            self.apply_undo_entry(entry);
        }
    }

    fn apply_undo_entry(&mut self, entry: UndoEntry) {
        match entry {
            UndoEntry::AccountModified(id, old) => {
                self.accounts.insert(id, old);
            }
            UndoEntry::WitnessModified(id, old) => {
                self.witnesses.insert(id, old);
            }
            UndoEntry::LimitOrderCreated(id) => {
                self.remove_order_raw(id);
                // Creations are undone newest first, so this rolls the counter straight back.
                self.next_order_id = id.int();
            }
            UndoEntry::LimitOrderRemoved(id, old) => {
                self.insert_order_raw(id, old);
            }
            UndoEntry::ProposalCreated(id) => {
                self.remove_proposal_raw(id);
                self.next_proposal_id = id.int();
            }
            UndoEntry::ProposalModified(id, old) => {
                self.remove_proposal_raw(id);
                self.insert_proposal_raw(id, old);
            }
            UndoEntry::ProposalRemoved(id, old) => {
                self.insert_proposal_raw(id, old);
            }
            UndoEntry::TransactionCreated(id) => {
                self.remove_transaction_raw(id);
            }
            UndoEntry::TransactionRemoved(id, old) => {
                self.insert_transaction_raw(id, old);
            }
            UndoEntry::BlockSummaryModified(slot, old) => {
                self.block_summaries[slot as usize] = old;
            }
            UndoEntry::WitnessScheduleModified(old) => {
                self.witness_schedule = old;
            }
            UndoEntry::DynamicGlobalPropertiesModified(old) => {
                self.dynamic_global_properties = old;
            }
        }
    }

    /* ↓↓↓ Accounts ↓↓↓ */

    pub fn account(&self, id: AccountId) -> Option<&AccountObject> {
        self.accounts.get(&id)
    }

    pub fn modify_account(
        &mut self,
        id: AccountId,
        f: impl FnOnce(&mut AccountObject),
    ) -> bool {
        let old = match self.accounts.get(&id) {
            Some(account) => account.clone(),
            None => return false,
        };
        f(self.accounts.get_mut(&id).unwrap());
        self.undo.record(UndoEntry::AccountModified(id, old));
        true
    }

    /// Genesis-only: creates an account before any undo session exists.
    pub(crate) fn create_account(&mut self, account: AccountObject) -> AccountId {
        debug_assert!(!self.undo.is_recording());
        let id = AccountId::new(self.next_account_id);
        self.next_account_id += 1;
        self.accounts.insert(id, account);
        id
    }

    /* ↓↓↓ Witnesses ↓↓↓ */

    pub fn witness(&self, id: WitnessId) -> Option<&WitnessObject> {
        self.witnesses.get(&id)
    }

    pub fn modify_witness(
        &mut self,
        id: WitnessId,
        f: impl FnOnce(&mut WitnessObject),
    ) -> bool {
        let old = match self.witnesses.get(&id) {
            Some(witness) => witness.clone(),
            None => return false,
        };
        f(self.witnesses.get_mut(&id).unwrap());
        self.undo.record(UndoEntry::WitnessModified(id, old));
        true
    }

    /// Genesis-only: creates a witness before any undo session exists.
    pub(crate) fn create_witness(&mut self, witness: WitnessObject) -> WitnessId {
        debug_assert!(!self.undo.is_recording());
        let id = WitnessId::new(self.next_witness_id);
        self.next_witness_id += 1;
        self.witnesses.insert(id, witness);
        id
    }

    /* ↓↓↓ Assets ↓↓↓ */

    pub fn asset(&self, id: AssetId) -> Option<&AssetObject> {
        self.assets.get(&id)
    }

    pub fn asset_by_symbol(&self, symbol: &str) -> Option<AssetId> {
        self.assets_by_symbol.get(symbol).copied()
    }

    /// Genesis-only: creates an asset before any undo session exists.
    pub(crate) fn create_asset(&mut self, asset: AssetObject) -> AssetId {
        debug_assert!(!self.undo.is_recording());
        let id = AssetId::new(self.next_asset_id);
        self.next_asset_id += 1;
        self.assets_by_symbol.insert(asset.symbol.clone(), id);
        self.assets.insert(id, asset);
        id
    }

    /* ↓↓↓ Limit orders ↓↓↓ */

    pub fn limit_order(&self, id: OrderId) -> Option<&LimitOrderObject> {
        self.limit_orders.get(&id)
    }

    pub fn create_limit_order(&mut self, order: LimitOrderObject) -> OrderId {
        let id = OrderId::new(self.next_order_id);
        self.next_order_id += 1;
        self.insert_order_raw(id, order);
        self.undo.record(UndoEntry::LimitOrderCreated(id));
        id
    }

    pub fn remove_limit_order(&mut self, id: OrderId) -> bool {
        match self.remove_order_raw(id) {
            Some(old) => {
                self.undo.record(UndoEntry::LimitOrderRemoved(id, old));
                true
            }
            None => false,
        }
    }

    /// Iterates the open orders selling `base` for `quote`, best price first.
    pub fn market_orders(
        &self,
        base: AssetId,
        quote: AssetId,
    ) -> impl Iterator<Item = (OrderId, &LimitOrderObject)> {
        let lower = OrderPriceKey {
            price: Price::max(base, quote),
            id: OrderId::new(0),
        };
        let upper = OrderPriceKey {
            price: Price::min(base, quote),
            id: OrderId::new(u64::MAX),
        };
        self.orders_by_price
            .range(lower..=upper)
            .map(|key| (key.id, &self.limit_orders[&key.id]))
    }

    /// The ids of orders expired at `now`, oldest expiration first.
    pub fn expired_orders(&self, now: Timestamp) -> Vec<OrderId> {
        self.orders_by_expiration
            .iter()
            .take_while(|(expiration, _)| *expiration <= now)
            .map(|(_, id)| *id)
            .collect()
    }

    fn insert_order_raw(&mut self, id: OrderId, order: LimitOrderObject) {
        self.orders_by_price.insert(OrderPriceKey {
            price: order.sell_price,
            id,
        });
        self.orders_by_expiration.insert((order.expiration, id));
        self.limit_orders.insert(id, order);
    }

    fn remove_order_raw(&mut self, id: OrderId) -> Option<LimitOrderObject> {
        let order = self.limit_orders.remove(&id)?;
        self.orders_by_price.remove(&OrderPriceKey {
            price: order.sell_price,
            id,
        });
        self.orders_by_expiration.remove(&(order.expiration, id));
        Some(order)
    }

    /* ↓↓↓ Proposals ↓↓↓ */

    pub fn proposal(&self, id: ProposalId) -> Option<&ProposalObject> {
        self.proposals.get(&id)
    }

    pub fn create_proposal(&mut self, proposal: ProposalObject) -> ProposalId {
        let id = ProposalId::new(self.next_proposal_id);
        self.next_proposal_id += 1;
        self.insert_proposal_raw(id, proposal);
        self.undo.record(UndoEntry::ProposalCreated(id));
        id
    }

    pub fn modify_proposal(
        &mut self,
        id: ProposalId,
        f: impl FnOnce(&mut ProposalObject),
    ) -> bool {
        let old = match self.remove_proposal_raw(id) {
            Some(proposal) => proposal,
            None => return false,
        };
        let mut new = old.clone();
        f(&mut new);
        self.insert_proposal_raw(id, new);
        self.undo.record(UndoEntry::ProposalModified(id, old));
        true
    }

    pub fn remove_proposal(&mut self, id: ProposalId) -> bool {
        match self.remove_proposal_raw(id) {
            Some(old) => {
                self.undo.record(UndoEntry::ProposalRemoved(id, old));
                true
            }
            None => false,
        }
    }

    /// The ids of proposals expired at `now`, oldest expiration first.
    pub fn expired_proposals(&self, now: Timestamp) -> Vec<ProposalId> {
        self.proposals_by_expiration
            .iter()
            .take_while(|(expiration, _)| *expiration <= now)
            .map(|(_, id)| *id)
            .collect()
    }

    fn insert_proposal_raw(&mut self, id: ProposalId, proposal: ProposalObject) {
        self.proposals_by_expiration
            .insert((proposal.expiration_time, id));
        self.proposals.insert(id, proposal);
    }

    fn remove_proposal_raw(&mut self, id: ProposalId) -> Option<ProposalObject> {
        let proposal = self.proposals.remove(&id)?;
        self.proposals_by_expiration
            .remove(&(proposal.expiration_time, id));
        Some(proposal)
    }

    /* ↓↓↓ Recent transactions (dedup index) ↓↓↓ */

    pub fn contains_transaction(&self, id: TransactionId) -> bool {
        self.transactions.contains_key(&id)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&TransactionObject> {
        self.transactions.get(&id)
    }

    pub fn create_transaction(&mut self, transaction: TransactionObject) {
        let id = transaction.trx_id;
        self.insert_transaction_raw(id, transaction);
        self.undo.record(UndoEntry::TransactionCreated(id));
    }

    pub fn remove_transaction(&mut self, id: TransactionId) -> bool {
        match self.remove_transaction_raw(id) {
            Some(old) => {
                self.undo.record(UndoEntry::TransactionRemoved(id, old));
                true
            }
            None => false,
        }
    }

    /// The ids of dedup-index entries whose transactions expired strictly before `now`. An entry
    /// expiring exactly at the head block time still counts for deduplication.
    pub fn expired_transactions(&self, now: Timestamp) -> Vec<TransactionId> {
        self.transactions_by_expiration
            .iter()
            .take_while(|(expiration, _)| *expiration < now)
            .map(|(_, id)| *id)
            .collect()
    }

    fn insert_transaction_raw(&mut self, id: TransactionId, transaction: TransactionObject) {
        self.transactions_by_expiration
            .insert((transaction.expiration(), id));
        self.transactions.insert(id, transaction);
    }

    fn remove_transaction_raw(&mut self, id: TransactionId) -> Option<TransactionObject> {
        let transaction = self.transactions.remove(&id)?;
        self.transactions_by_expiration
            .remove(&(transaction.expiration(), id));
        Some(transaction)
    }

    /* ↓↓↓ Block summaries ↓↓↓ */

    pub fn block_summary(&self, slot: u16) -> &BlockSummaryObject {
        &self.block_summaries[slot as usize]
    }

    pub fn modify_block_summary(&mut self, slot: u16, f: impl FnOnce(&mut BlockSummaryObject)) {
        let old = self.block_summaries[slot as usize].clone();
        f(&mut self.block_summaries[slot as usize]);
        self.undo.record(UndoEntry::BlockSummaryModified(slot, old));
    }

    /* ↓↓↓ Witness schedule ↓↓↓ */

    pub fn witness_schedule(&self) -> &WitnessScheduleObject {
        &self.witness_schedule
    }

    pub fn modify_witness_schedule(&mut self, f: impl FnOnce(&mut WitnessScheduleObject)) {
        let old = self.witness_schedule.clone();
        f(&mut self.witness_schedule);
        self.undo.record(UndoEntry::WitnessScheduleModified(old));
    }

    /* ↓↓↓ Property singletons ↓↓↓ */

    pub fn global_properties(&self) -> &GlobalProperties {
        &self.global_properties
    }

    /// Genesis-only: installs the global properties before any undo session exists.
    pub(crate) fn set_global_properties(&mut self, global_properties: GlobalProperties) {
        debug_assert!(!self.undo.is_recording());
        self.global_properties = global_properties;
    }

    pub fn dynamic_global_properties(&self) -> &DynamicGlobalProperties {
        &self.dynamic_global_properties
    }

    pub fn modify_dynamic_global_properties(
        &mut self,
        f: impl FnOnce(&mut DynamicGlobalProperties),
    ) {
        let old = self.dynamic_global_properties.clone();
        f(&mut self.dynamic_global_properties);
        self.undo
            .record(UndoEntry::DynamicGlobalPropertiesModified(old));
    }
}
