//! The order book: placing limit orders, the by-price index behind the market queries, asset
//! symbol lookup, and order expiry with escrow refund.

use log::LevelFilter;

use dpos_rs::types::data_types::{
    Amount, AssetAmount, OrderId, SkipFlags,
};
use dpos_rs::types::operations::{LimitOrderCreateOperation, Operation, OperationResult};

mod common;

use crate::common::{
    harness::{TestChain, CORE, INITIAL_CORE_BALANCE, USD},
    logging::setup_logger,
};

fn sell_core_op(seller: u64, core: i64, usd: i64, chain: &TestChain) -> Operation {
    Operation::LimitOrderCreate(LimitOrderCreateOperation {
        seller: dpos_rs::types::data_types::AccountId::new(seller),
        amount_to_sell: AssetAmount {
            amount: Amount::new(core),
            asset_id: CORE,
        },
        min_to_receive: AssetAmount {
            amount: Amount::new(usd),
            asset_id: USD,
        },
        expiration: chain.chain.head_block_time() + 3600,
    })
}

#[test]
fn order_book_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);

    // Three sellers of CORE at different prices, and one seller of USD on the other side.
    chain
        .chain
        .push_transaction(
            chain.sign(0, vec![sell_core_op(0, 100_000, 20_000, &chain)]),
            SkipFlags::NOTHING,
        )
        .unwrap();
    chain
        .chain
        .push_transaction(
            chain.sign(1, vec![sell_core_op(1, 100_000, 30_000, &chain)]),
            SkipFlags::NOTHING,
        )
        .unwrap();
    chain
        .chain
        .push_transaction(
            chain.sign(2, vec![sell_core_op(2, 100_000, 25_000, &chain)]),
            SkipFlags::NOTHING,
        )
        .unwrap();
    let ask = Operation::LimitOrderCreate(LimitOrderCreateOperation {
        seller: dpos_rs::types::data_types::AccountId::new(1),
        amount_to_sell: AssetAmount {
            amount: Amount::new(5_000),
            asset_id: USD,
        },
        min_to_receive: AssetAmount {
            amount: Amount::new(40_000),
            asset_id: CORE,
        },
        expiration: chain.chain.head_block_time() + 3600,
    });
    chain
        .chain
        .push_transaction(chain.sign(1, vec![ask]), SkipFlags::NOTHING)
        .unwrap();
    chain.produce_block();

    // Escrow: the sellers' balances were debited when the orders were placed.
    assert_eq!(chain.balance(0, CORE), INITIAL_CORE_BALANCE - 100_000);
    assert_eq!(chain.balance(1, USD), INITIAL_CORE_BALANCE - 5_000);

    // Both sides of the market. Within a side, the highest base-per-quote ratio iterates first.
    let orders = chain.chain.get_limit_orders(CORE, USD, 10).unwrap();
    assert_eq!(orders.len(), 4);
    assert_eq!(orders[0].sell_price.quote.amount, Amount::new(20_000));
    assert_eq!(orders[1].sell_price.quote.amount, Amount::new(25_000));
    assert_eq!(orders[2].sell_price.quote.amount, Amount::new(30_000));

    let book = chain.chain.get_order_book(CORE, USD, 10).unwrap();
    assert_eq!(book.base, "CORE");
    assert_eq!(book.quote, "USD");
    assert_eq!(book.bids.len(), 3);
    assert_eq!(book.asks.len(), 1);
    // 100000 CORE at precision 5 against 20000 USD at precision 4 prices at 50.0.
    assert_eq!(book.bids[0].price, 50.0);

    assert!(matches!(
        chain.chain.get_limit_orders(CORE, USD, 301),
        Err(dpos_rs::chain::QueryError::LimitTooLarge { .. })
    ));
}

#[test]
fn asset_lookup_test() {
    setup_logger(LevelFilter::Trace);

    let chain = TestChain::new(1);
    let assets = chain.chain.lookup_asset_symbols(&[
        "CORE".to_string(),
        "USD".to_string(),
        // A leading digit means "numeric asset id".
        "1".to_string(),
        "0".to_string(),
        "NOPE".to_string(),
    ]);
    assert_eq!(assets[0].as_ref().unwrap().symbol, "CORE");
    assert_eq!(assets[1].as_ref().unwrap().symbol, "USD");
    assert_eq!(assets[2].as_ref().unwrap().symbol, "USD");
    assert_eq!(assets[3].as_ref().unwrap().symbol, "CORE");
    assert!(assets[4].is_none());
}

#[test]
fn order_expiry_refund_test() {
    setup_logger(LevelFilter::Trace);

    let mut chain = TestChain::new(1);
    let op = Operation::LimitOrderCreate(LimitOrderCreateOperation {
        seller: dpos_rs::types::data_types::AccountId::new(1),
        amount_to_sell: AssetAmount {
            amount: Amount::new(70_000),
            asset_id: CORE,
        },
        min_to_receive: AssetAmount {
            amount: Amount::new(9_000),
            asset_id: USD,
        },
        expiration: chain.chain.head_block_time() + 12,
    });
    let processed = chain
        .chain
        .push_transaction(chain.sign(1, vec![op]), SkipFlags::NOTHING)
        .unwrap();
    let order_id = match processed.operation_results[0] {
        OperationResult::NewObject(id) => OrderId::new(id.int()),
        OperationResult::Nothing => panic!("order creation returned no object"),
    };

    chain.produce_block();
    assert!(chain.chain.state().limit_order(order_id).is_some());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE - 70_000);

    // Three more blocks pass the expiration; the escrowed amount comes back.
    for _ in 0..3 {
        chain.produce_block();
    }
    assert!(chain.chain.state().limit_order(order_id).is_none());
    assert_eq!(chain.balance(1, CORE), INITIAL_CORE_BALANCE);
}
