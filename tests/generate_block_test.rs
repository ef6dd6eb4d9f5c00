//! Block generation: draining the pending pool into a block under the byte budget, postponing
//! what does not fit, dropping what no longer applies, and the production preconditions.

use log::LevelFilter;

use dpos_rs::chain::BlockError;
use dpos_rs::config::ChainParameters;
use dpos_rs::types::data_types::{
    AccountId, Amount, AssetAmount, BlockNumber, SkipFlags, WitnessId,
};
use dpos_rs::types::operations::{Operation, TransferOperation};
use dpos_rs::types::pack_size;

mod common;

use crate::common::{
    harness::{TestChain, CORE, GENESIS_TIME, INITIAL_CORE_BALANCE},
    logging::setup_logger,
};

fn small_block_parameters(maximum_block_size: u32) -> ChainParameters {
    ChainParameters {
        maximum_block_size,
        ..ChainParameters::default()
    }
}

#[test]
fn basic_generation_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    chain
        .chain
        .push_transaction(chain.transfer(1, 2, 100), SkipFlags::NOTHING)
        .unwrap();
    chain
        .chain
        .push_transaction(chain.transfer(2, 1, 30), SkipFlags::NOTHING)
        .unwrap();

    let block = chain.produce_block();
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(chain.chain.head_block_id(), block.id());
    assert_eq!(chain.chain.head_block_num(), BlockNumber::new(1));
    assert!(chain.chain.pending_transactions().is_empty());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE - 100 + 30);
}

#[test]
fn postpone_oversized_transaction_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::with_setup(1, GENESIS_TIME, small_block_parameters(400), 1024);

    // One transaction whose packed size alone busts the block budget.
    let op = Operation::Transfer(TransferOperation {
        from: AccountId::new(1),
        to: AccountId::new(2),
        amount: AssetAmount {
            amount: Amount::new(5),
            asset_id: CORE,
        },
    });
    let big = chain.sign(1, vec![op; 12]);
    assert!(pack_size(&big) > 400);
    chain
        .chain
        .push_transaction(big.clone(), SkipFlags::NOTHING)
        .unwrap();

    // The block comes out empty, within budget, and the transaction stays in the pool.
    let block = chain.produce_block();
    assert!(block.transactions.is_empty());
    assert!(pack_size(&block) <= 400);
    let pending: Vec<_> = chain
        .chain
        .pending_transactions()
        .iter()
        .map(|trx| trx.id())
        .collect();
    assert_eq!(pending, vec![big.id()]);
}

#[test]
fn size_budget_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::with_setup(1, GENESIS_TIME, small_block_parameters(700), 1024);
    for amount in [101, 102, 103, 104, 105] {
        chain
            .chain
            .push_transaction(chain.transfer(1, 2, amount), SkipFlags::NOTHING)
            .unwrap();
    }

    // Some transactions fit, the rest are postponed; the block never exceeds the budget, and
    // the postponed transactions survive in the pool.
    let block = chain.produce_block();
    assert!(pack_size(&block) <= 700);
    assert!(!block.transactions.is_empty());
    assert!(block.transactions.len() < 5);
    assert_eq!(
        chain.chain.pending_transactions().len(),
        5 - block.transactions.len()
    );
}

#[test]
fn failing_transaction_dropped_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    chain.produce_block();

    // Sneak a transaction with a bad TaPoS reference into the pool by skipping the check on
    // push. Generation re-validates with no skips, so the transaction is left out of the block,
    // and the pool rebuild afterwards drops it for good.
    let mut bad = chain.transfer(1, 2, 10);
    bad.transaction.ref_block_prefix ^= 1;
    let mut resigned =
        dpos_rs::types::transaction::SignedTransaction::new(bad.transaction.clone());
    resigned.sign(common::harness::CHAIN_ID, &chain.account_keys[1]);
    chain
        .chain
        .push_transaction(resigned.clone(), SkipFlags::TAPOS_CHECK)
        .unwrap();
    assert_eq!(chain.chain.pending_transactions().len(), 1);

    let block = chain.produce_block();
    assert!(block.transactions.is_empty());
    assert!(chain.chain.pending_transactions().is_empty());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);
}

#[test]
fn production_preconditions_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(2);
    let when = chain.chain.get_slot_time(1);
    let scheduled = chain.chain.get_scheduled_witness(1);
    let other = WitnessId::new(1 - scheduled.int());

    // Producing for a witness that is not scheduled in the slot is refused.
    let result = chain.chain.generate_block(
        when,
        other,
        &chain.witness_signing_key(other),
        SkipFlags::NOTHING,
    );
    assert!(matches!(result, Err(BlockError::NotScheduled { .. })));

    // So is producing with a key that does not match the witness' recorded signing key.
    let result = chain.chain.generate_block(
        when,
        scheduled,
        &chain.account_keys[0],
        SkipFlags::NOTHING,
    );
    assert!(matches!(result, Err(BlockError::WrongSigningKey { .. })));

    // And so is producing at or before the head block's slot.
    let result = chain.chain.generate_block(
        GENESIS_TIME,
        scheduled,
        &chain.witness_signing_key(scheduled),
        SkipFlags::NOTHING,
    );
    assert!(matches!(result, Err(BlockError::InvalidSlot { .. })));

    // Nothing moved.
    assert_eq!(chain.chain.head_block_num(), BlockNumber::new(0));
}
