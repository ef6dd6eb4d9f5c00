//! The pending pool: speculative application of incoming transactions, the validation gauntlet
//! (dedup, authority, TaPoS, expiration, size), and the pool rebuild when the head moves.

use log::LevelFilter;

use dpos_rs::chain::TransactionError;
use dpos_rs::types::data_types::{
    AccountId, Amount, AssetAmount, SignatureBytes, SkipFlags, Timestamp,
};
use dpos_rs::types::operations::{Operation, TransferOperation};
use dpos_rs::types::transaction::{SignedTransaction, Transaction};

mod common;

use crate::common::{
    harness::{TestChain, CHAIN_ID, CORE, GENESIS_TIME, INITIAL_CORE_BALANCE},
    logging::setup_logger,
};

#[test]
fn pending_pool_and_clear_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let transfer = chain.transfer(1, 2, 100);
    let processed = chain
        .chain
        .push_transaction(transfer.clone(), SkipFlags::NOTHING)
        .unwrap();
    assert_eq!(processed.id(), transfer.id());
    assert_eq!(processed.operation_results.len(), 1);

    // The pool holds the transaction and the speculative state shows its effects.
    assert_eq!(chain.chain.pending_transactions().len(), 1);
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE - 100);

    // Clearing the pool returns the state to exactly the head block's.
    chain.chain.clear_pending();
    assert!(chain.chain.pending_transactions().is_empty());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);
}

#[test]
fn duplicate_transaction_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let transfer = chain.transfer(1, 2, 100);
    chain
        .chain
        .push_transaction(transfer.clone(), SkipFlags::NOTHING)
        .unwrap();
    let result = chain.chain.push_transaction(transfer, SkipFlags::NOTHING);
    assert!(matches!(
        result,
        Err(TransactionError::DuplicateTransaction { .. })
    ));
    assert_eq!(chain.chain.pending_transactions().len(), 1);
}

#[test]
fn pending_rebuild_after_block_test() {
    setup_logger(LevelFilter::Trace);

    let (mut producer, mut receiver) = TestChain::pair(1);
    let transfer_1 = producer.transfer(1, 2, 100);
    let transfer_2 = producer.transfer(2, 1, 55);

    // The receiver accepts both transactions; the producer packs only the first into a block.
    receiver
        .chain
        .push_transaction(transfer_1.clone(), SkipFlags::NOTHING)
        .unwrap();
    receiver
        .chain
        .push_transaction(transfer_2.clone(), SkipFlags::NOTHING)
        .unwrap();
    assert_eq!(receiver.chain.pending_transactions().len(), 2);

    producer
        .chain
        .push_transaction(transfer_1.clone(), SkipFlags::NOTHING)
        .unwrap();
    let block = producer.produce_block();
    assert_eq!(block.transactions.len(), 1);

    // After the block lands, the pool contains exactly the transaction that did not make it in,
    // re-validated against the new head.
    receiver
        .chain
        .push_block(block, SkipFlags::NOTHING)
        .unwrap();
    let pending: Vec<_> = receiver
        .chain
        .pending_transactions()
        .iter()
        .map(|trx| trx.id())
        .collect();
    assert_eq!(pending, vec![transfer_2.id()]);
    assert_eq!(
        receiver.balance(1, CORE),
        INITIAL_CORE_BALANCE - 100 + 55
    );
}

#[test]
fn tapos_mismatch_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    chain.produce_block();

    let mut trx = SignedTransaction::new(Transaction {
        ref_block_num: 5,
        ref_block_prefix: 12345,
        expiration: chain.chain.head_block_time() + 3600,
        operations: vec![Operation::Transfer(TransferOperation {
            from: AccountId::new(1),
            to: AccountId::new(2),
            amount: AssetAmount {
                amount: Amount::new(10),
                asset_id: CORE,
            },
        })],
    });
    trx.sign(CHAIN_ID, &chain.account_keys[1]);

    let result = chain.chain.push_transaction(trx, SkipFlags::NOTHING);
    assert!(matches!(
        result,
        Err(TransactionError::TaposMismatch { .. })
    ));
    assert!(chain.chain.pending_transactions().is_empty());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);
}

#[test]
fn expiration_window_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    chain.produce_block();
    let now = chain.chain.head_block_time();

    let expired = {
        let mut trx = SignedTransaction::new(Transaction {
            ref_block_num: (chain.chain.head_block_num().int() & 0xffff) as u16,
            ref_block_prefix: chain.chain.head_block_id().ref_prefix(),
            expiration: Timestamp::new(now.secs() - 1),
            operations: vec![Operation::Transfer(TransferOperation {
                from: AccountId::new(1),
                to: AccountId::new(2),
                amount: AssetAmount {
                    amount: Amount::new(10),
                    asset_id: CORE,
                },
            })],
        });
        trx.sign(CHAIN_ID, &chain.account_keys[1]);
        trx
    };
    assert!(matches!(
        chain.chain.push_transaction(expired, SkipFlags::NOTHING),
        Err(TransactionError::TransactionExpired { .. })
    ));

    let maximum_time_until_expiration = chain
        .chain
        .state()
        .global_properties()
        .parameters
        .maximum_time_until_expiration;
    let too_far = {
        let mut trx = SignedTransaction::new(Transaction {
            ref_block_num: (chain.chain.head_block_num().int() & 0xffff) as u16,
            ref_block_prefix: chain.chain.head_block_id().ref_prefix(),
            expiration: now + maximum_time_until_expiration + 10,
            operations: vec![Operation::Transfer(TransferOperation {
                from: AccountId::new(1),
                to: AccountId::new(2),
                amount: AssetAmount {
                    amount: Amount::new(10),
                    asset_id: CORE,
                },
            })],
        });
        trx.sign(CHAIN_ID, &chain.account_keys[1]);
        trx
    };
    assert!(matches!(
        chain.chain.push_transaction(too_far, SkipFlags::NOTHING),
        Err(TransactionError::ExpirationTooFarInFuture { .. })
    ));
}

#[test]
fn block_one_exception_test() {
    setup_logger(LevelFilter::Trace);

    // While the head is at 0 there is nothing to reference and nothing to expire against, so
    // TaPoS and expiration checks are waived entirely.
    let mut chain = TestChain::new(1);
    let mut trx = SignedTransaction::new(Transaction {
        ref_block_num: 999,
        ref_block_prefix: 0xDEAD_BEEF,
        expiration: Timestamp::new(GENESIS_TIME.secs() - 100),
        operations: vec![Operation::Transfer(TransferOperation {
            from: AccountId::new(1),
            to: AccountId::new(2),
            amount: AssetAmount {
                amount: Amount::new(10),
                asset_id: CORE,
            },
        })],
    });
    trx.sign(CHAIN_ID, &chain.account_keys[1]);

    chain
        .chain
        .push_transaction(trx.clone(), SkipFlags::NOTHING)
        .unwrap();
    let block = chain.produce_block();
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(chain.balance(2, CORE), INITIAL_CORE_BALANCE + 10);
}

#[test]
fn oversized_transaction_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let op = Operation::Transfer(TransferOperation {
        from: AccountId::new(1),
        to: AccountId::new(2),
        amount: AssetAmount {
            amount: Amount::new(1),
            asset_id: CORE,
        },
    });
    let huge = chain.sign(1, vec![op; 40_000]);
    assert!(matches!(
        chain.chain.push_transaction(huge, SkipFlags::NOTHING),
        Err(TransactionError::OversizedTransaction { .. })
    ));
}

#[test]
fn authority_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);

    // A transfer out of account 1 signed with account 2's key carries a valid signature but does
    // not satisfy account 1's active authority.
    let mut unauthorized = SignedTransaction::new(chain.transfer(1, 2, 10).transaction.clone());
    unauthorized.sign(CHAIN_ID, &chain.account_keys[2]);
    assert!(matches!(
        chain
            .chain
            .push_transaction(unauthorized, SkipFlags::NOTHING),
        Err(TransactionError::MissingActiveAuthority { .. })
    ));

    // A corrupted signature fails outright.
    let mut corrupted = chain.transfer(1, 2, 10);
    corrupted.signatures[0].signature = SignatureBytes::new([3u8; 64]);
    assert!(matches!(
        chain.chain.push_transaction(corrupted, SkipFlags::NOTHING),
        Err(TransactionError::InvalidSignature(_))
    ));

    // Skipping signature checks admits the unauthorized transaction.
    let mut unauthorized = SignedTransaction::new(chain.transfer(1, 2, 10).transaction.clone());
    unauthorized.sign(CHAIN_ID, &chain.account_keys[2]);
    chain
        .chain
        .push_transaction(unauthorized, SkipFlags::TRANSACTION_SIGNATURES)
        .unwrap();
}

#[test]
fn dedup_window_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);

    // A transaction that expires one second into block 2's slot.
    let mut trx = SignedTransaction::new(Transaction {
        ref_block_num: 0,
        ref_block_prefix: chain.chain.head_block_id().ref_prefix(),
        expiration: chain.chain.head_block_time() + 6,
        operations: vec![Operation::Transfer(TransferOperation {
            from: AccountId::new(1),
            to: AccountId::new(2),
            amount: AssetAmount {
                amount: Amount::new(10),
                asset_id: CORE,
            },
        })],
    });
    trx.sign(CHAIN_ID, &chain.account_keys[1]);

    chain
        .chain
        .push_transaction(trx.clone(), SkipFlags::NOTHING)
        .unwrap();
    chain.produce_block();
    assert!(chain.chain.is_known_transaction(trx.id()));
    assert!(chain.chain.get_recent_transaction(trx.id()).is_some());

    // The next block's sweep trims the expired entry out of the dedup index.
    chain.produce_block();
    assert!(!chain.chain.is_known_transaction(trx.id()));
    assert!(chain.chain.get_recent_transaction(trx.id()).is_none());
}

#[test]
fn validate_transaction_leaves_no_trace_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let transfer = chain.transfer(1, 2, 100);
    let processed = chain.chain.validate_transaction(&transfer).unwrap();
    assert_eq!(processed.id(), transfer.id());

    assert!(chain.chain.pending_transactions().is_empty());
    assert!(!chain.chain.is_known_transaction(transfer.id()));
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);
}
