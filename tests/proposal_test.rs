//! Proposals: creation, approval, immediate and deferred execution, the nesting guard, expiry,
//! and the two operation-history repair behaviors around the hardfork.

use log::LevelFilter;

use dpos_rs::config::ChainParameters;
use dpos_rs::types::data_types::{
    AccountId, Amount, AssetAmount, ProposalId, SkipFlags, Timestamp,
};
use dpos_rs::types::operations::{
    Operation, OperationResult, ProposalCreateOperation, ProposalUpdateOperation,
    TransferOperation,
};
use dpos_rs::types::transaction::ProcessedTransaction;

mod common;

use crate::common::{
    harness::{TestChain, CORE, GENESIS_TIME, INITIAL_CORE_BALANCE},
    logging::setup_logger,
};

fn transfer_op(from: u64, to: u64, amount: i64) -> Operation {
    Operation::Transfer(TransferOperation {
        from: AccountId::new(from),
        to: AccountId::new(to),
        amount: AssetAmount {
            amount: Amount::new(amount),
            asset_id: CORE,
        },
    })
}

fn proposal_create_op(
    fee_payer: u64,
    expiration_time: Timestamp,
    proposed_ops: Vec<Operation>,
) -> Operation {
    Operation::ProposalCreate(ProposalCreateOperation {
        fee_paying_account: AccountId::new(fee_payer),
        expiration_time,
        proposed_ops,
    })
}

fn approve_op(fee_payer: u64, proposal: ProposalId, approvals: Vec<u64>) -> Operation {
    Operation::ProposalUpdate(ProposalUpdateOperation {
        fee_paying_account: AccountId::new(fee_payer),
        proposal,
        active_approvals_to_add: approvals.into_iter().map(AccountId::new).collect(),
        active_approvals_to_remove: Vec::new(),
    })
}

fn created_proposal_id(processed: &ProcessedTransaction) -> ProposalId {
    match processed.operation_results[0] {
        OperationResult::NewObject(id) => ProposalId::new(id.int()),
        OperationResult::Nothing => panic!("proposal creation returned no object"),
    }
}

#[test]
fn immediate_execution_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let expiration = chain.chain.head_block_time() + 3600;

    // Account 0 proposes a transfer out of account 2; the proposal waits on account 2's
    // approval.
    let create = chain.sign(0, vec![proposal_create_op(0, expiration, vec![
        transfer_op(2, 1, 500),
    ])]);
    let processed = chain
        .chain
        .push_transaction(create, SkipFlags::NOTHING)
        .unwrap();
    let proposal_id = created_proposal_id(&processed);

    let proposal = chain.chain.state().proposal(proposal_id).unwrap();
    assert!(proposal
        .required_active_approvals
        .contains(&AccountId::new(2)));
    assert!(!proposal.is_authorized_to_execute());
    assert_eq!(chain.balance(2, CORE), INITIAL_CORE_BALANCE);

    // The moment account 2 approves, the proposal executes and disappears.
    let approve = chain.sign(2, vec![approve_op(2, proposal_id, vec![2])]);
    chain
        .chain
        .push_transaction(approve, SkipFlags::NOTHING)
        .unwrap();
    assert!(chain.chain.state().proposal(proposal_id).is_none());
    assert_eq!(chain.balance(2, CORE), INITIAL_CORE_BALANCE - 500);
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE + 500);

    // And the whole thing commits.
    chain.produce_block();
    assert_eq!(chain.balance(2, CORE), INITIAL_CORE_BALANCE - 500);
}

#[test]
fn deferred_execution_at_expiry_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let expiration = chain.chain.head_block_time() + 30;

    // The proposed transfer exceeds account 2's balance, so approval cannot execute it yet.
    let create = chain.sign(0, vec![proposal_create_op(0, expiration, vec![
        transfer_op(2, 1, 1_200_000),
    ])]);
    let processed = chain
        .chain
        .push_transaction(create, SkipFlags::NOTHING)
        .unwrap();
    let proposal_id = created_proposal_id(&processed);

    let approve = chain.sign(2, vec![approve_op(2, proposal_id, vec![2])]);
    chain
        .chain
        .push_transaction(approve, SkipFlags::NOTHING)
        .unwrap();

    // Execution was deferred: the proposal survives, fully approved.
    let proposal = chain.chain.state().proposal(proposal_id).unwrap();
    assert!(proposal.is_authorized_to_execute());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);

    // Fund account 2, then let the chain run past the proposal's expiration.
    chain
        .chain
        .push_transaction(chain.transfer(0, 2, 300_000), SkipFlags::NOTHING)
        .unwrap();
    for _ in 0..6 {
        chain.produce_block();
    }
    assert!(chain.chain.head_block_time() >= expiration);

    // The expiry sweep found the proposal authorized and executed it before removal.
    assert!(chain.chain.state().proposal(proposal_id).is_none());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE + 1_200_000);
    assert_eq!(
        chain.balance(2, CORE),
        INITIAL_CORE_BALANCE + 300_000 - 1_200_000
    );
}

#[test]
fn expired_unapproved_proposal_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let expiration = chain.chain.head_block_time() + 10;

    let create = chain.sign(0, vec![proposal_create_op(0, expiration, vec![
        transfer_op(2, 1, 500),
    ])]);
    let processed = chain
        .chain
        .push_transaction(create, SkipFlags::NOTHING)
        .unwrap();
    let proposal_id = created_proposal_id(&processed);

    for _ in 0..3 {
        chain.produce_block();
    }

    // Never approved: swept away without executing.
    assert!(chain.chain.state().proposal(proposal_id).is_none());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);
    assert_eq!(chain.balance(2, CORE), INITIAL_CORE_BALANCE);
}

#[test]
fn nesting_guard_test() {
    setup_logger(LevelFilter::Trace);

    // With a single active witness the replay depth limit is 2, so a chain of three proposals
    // cannot execute in one go: the innermost replay is deferred.
    let mut chain = TestChain::new(1);
    let expiration = chain.chain.head_block_time() + 30;

    let create_3 = chain.sign(0, vec![proposal_create_op(0, expiration, vec![
        transfer_op(2, 1, 777),
    ])]);
    let proposal_3 = created_proposal_id(
        &chain
            .chain
            .push_transaction(create_3, SkipFlags::NOTHING)
            .unwrap(),
    );
    let create_2 = chain.sign(0, vec![proposal_create_op(0, expiration, vec![
        approve_op(2, proposal_3, vec![2]),
    ])]);
    let proposal_2 = created_proposal_id(
        &chain
            .chain
            .push_transaction(create_2, SkipFlags::NOTHING)
            .unwrap(),
    );
    let create_1 = chain.sign(0, vec![proposal_create_op(0, expiration, vec![
        approve_op(2, proposal_2, vec![2]),
    ])]);
    let proposal_1 = created_proposal_id(
        &chain
            .chain
            .push_transaction(create_1, SkipFlags::NOTHING)
            .unwrap(),
    );

    // Approving the outermost proposal cascades: proposals 1 and 2 execute, the replay of
    // proposal 3 trips the nesting guard and stays behind, fully approved.
    let approve = chain.sign(2, vec![approve_op(2, proposal_1, vec![2])]);
    chain
        .chain
        .push_transaction(approve, SkipFlags::NOTHING)
        .unwrap();
    assert!(chain.chain.state().proposal(proposal_1).is_none());
    assert!(chain.chain.state().proposal(proposal_2).is_none());
    let survivor = chain.chain.state().proposal(proposal_3).unwrap();
    assert!(survivor.is_authorized_to_execute());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);

    // Its expiration gives it a second chance.
    for _ in 0..6 {
        chain.produce_block();
    }
    assert!(chain.chain.state().proposal(proposal_3).is_none());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE + 777);
}

#[test]
fn failed_replay_history_repair_test() {
    setup_logger(LevelFilter::Trace);

    let insufficient = INITIAL_CORE_BALANCE + 1;

    // Before the hardfork, the entries a failed replay appended are blanked out in place.
    let mut pre = TestChain::with_setup(
        1,
        Timestamp::new(1_500_000_000),
        ChainParameters::default(),
        1024,
    );
    let expiration = pre.chain.head_block_time() + 3600;
    let create = pre.sign(0, vec![proposal_create_op(0, expiration, vec![
        transfer_op(2, 1, insufficient),
    ])]);
    let proposal_id = created_proposal_id(
        &pre.chain
            .push_transaction(create, SkipFlags::NOTHING)
            .unwrap(),
    );
    let approve = pre.sign(2, vec![approve_op(2, proposal_id, vec![2])]);
    pre.chain
        .push_transaction(approve, SkipFlags::NOTHING)
        .unwrap();
    let history = pre.chain.applied_operations();
    assert_eq!(history.len(), 3);
    assert!(history[0].is_some());
    assert!(history[1].is_some());
    assert!(history[2].is_none());

    // From the hardfork on, the entries are truncated away instead.
    let mut post = TestChain::new(1);
    let expiration = post.chain.head_block_time() + 3600;
    let create = post.sign(0, vec![proposal_create_op(0, expiration, vec![
        transfer_op(2, 1, insufficient),
    ])]);
    let proposal_id = created_proposal_id(
        &post
            .chain
            .push_transaction(create, SkipFlags::NOTHING)
            .unwrap(),
    );
    let approve = post.sign(2, vec![approve_op(2, proposal_id, vec![2])]);
    post.chain
        .push_transaction(approve, SkipFlags::NOTHING)
        .unwrap();
    let history = post.chain.applied_operations();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|entry| entry.is_some()));
}
