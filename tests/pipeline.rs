//! End-to-end pipeline tests: placement through matching workers, settlement,
//! correlation, cancellation, and redelivery.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use venue_matching_engine::{
    AccountId, CancelError, Engine, EngineConfig, InstrumentId, MatchOutcome, OrderKind,
    OrderStatus, PlaceOutcome, PlaceRequest, Side, UnmatchedReason,
};

const X: InstrumentId = InstrumentId(1);
const BUYER: AccountId = AccountId(1);
const SELLER: AccountId = AccountId(2);

fn engine() -> Engine {
    let _ = env_logger::try_init();
    let engine = Engine::new(EngineConfig {
        workers_per_instrument: 2,
        match_timeout: Duration::from_secs(5),
    });
    engine.register_instrument(X);
    engine
}

fn sell(quantity: u64, price: i64) -> PlaceRequest {
    PlaceRequest {
        account: SELLER,
        instrument: X,
        side: Side::Sell,
        kind: OrderKind::Limit,
        quantity,
        price: Some(Decimal::from(price)),
    }
}

fn buy(quantity: u64) -> PlaceRequest {
    PlaceRequest {
        account: BUYER,
        instrument: X,
        side: Side::Buy,
        kind: OrderKind::Market,
        quantity,
        price: None,
    }
}

#[tokio::test]
async fn partial_fill_worked_example() {
    // One resting sell of 100 @ 10; a buy for 60 arrives.
    let engine = engine();
    engine.deposit(BUYER, Decimal::from(1000)).unwrap();
    engine.grant_shares(SELLER, X, 100);

    let PlaceOutcome::Rested { order_id: sell_id } = engine.place(sell(100, 10)).await.unwrap()
    else {
        panic!("sell should rest");
    };
    let outcome = engine.place(buy(60)).await.unwrap();
    let PlaceOutcome::Filled { order_id: buy_id, price, quantity, trade } = outcome else {
        panic!("buy should fill, got {:?}", outcome);
    };
    assert_eq!(price, Decimal::from(10));
    assert_eq!(quantity, 60);

    // Sell reduced to 40 and partially filled.
    let parent = engine.order(sell_id).unwrap();
    assert_eq!(parent.status, OrderStatus::PartiallyFilled);
    assert_eq!(parent.quantity, 40);

    // Completed child of 60 @ 10 with lineage to the parent.
    let child = engine
        .orders_for(SELLER)
        .into_iter()
        .find(|o| o.parent == Some(sell_id))
        .expect("child order");
    assert_eq!(child.status, OrderStatus::Completed);
    assert_eq!(child.quantity, 60);
    assert_eq!(child.price, Some(Decimal::from(10)));
    assert_eq!(child.trade, Some(trade));

    // Buyer paid 600, seller received 600, buyer holds 60.
    assert_eq!(engine.balance(BUYER), Decimal::from(400));
    assert_eq!(engine.balance(SELLER), Decimal::from(600));
    assert_eq!(engine.positions(BUYER).get(&X), Some(&60));

    let stored_buy = engine.order(buy_id).unwrap();
    assert_eq!(stored_buy.status, OrderStatus::Completed);
    assert_eq!(stored_buy.price, Some(Decimal::from(10)));

    let trades = engine.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].notional, Decimal::from(600));
    engine.shutdown().await;
}

#[tokio::test]
async fn empty_book_buy_is_unfilled_and_cancelled() {
    let engine = engine();
    engine.deposit(BUYER, Decimal::from(100)).unwrap();

    let outcome = engine.place(buy(5)).await.unwrap();
    let PlaceOutcome::Unfilled { order_id, reason } = outcome else {
        panic!("expected unfilled, got {:?}", outcome);
    };
    assert_eq!(reason, UnmatchedReason::NoLiquidity);
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Cancelled);
    assert_eq!(engine.balance(BUYER), Decimal::from(100));
    assert!(engine.positions(BUYER).is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn insufficient_funds_leaves_sell_resting() {
    // Resting sell 10 @ 5; buyer holds 40 < 50.
    let engine = engine();
    engine.deposit(BUYER, Decimal::from(40)).unwrap();
    engine.grant_shares(SELLER, X, 10);

    let PlaceOutcome::Rested { order_id: sell_id } = engine.place(sell(10, 5)).await.unwrap()
    else {
        panic!("sell should rest");
    };
    let outcome = engine.place(buy(10)).await.unwrap();
    assert!(matches!(
        outcome,
        PlaceOutcome::Unfilled { reason: UnmatchedReason::InsufficientFunds, .. }
    ));
    // The sell must not have been consumed.
    assert_eq!(engine.order(sell_id).unwrap().status, OrderStatus::InProgress);
    assert_eq!(engine.balance(BUYER), Decimal::from(40));
    assert_eq!(engine.balance(SELLER), Decimal::ZERO);
    assert!(engine.trades().is_empty());

    // A funded retry clears it.
    engine.deposit(BUYER, Decimal::from(10)).unwrap();
    let outcome = engine.place(buy(10)).await.unwrap();
    assert!(matches!(outcome, PlaceOutcome::Filled { .. }));
    engine.shutdown().await;
}

#[tokio::test]
async fn insufficient_depth_never_sweeps_levels() {
    let engine = engine();
    engine.deposit(BUYER, Decimal::from(10_000)).unwrap();
    engine.grant_shares(SELLER, X, 20);
    engine.place(sell(10, 5)).await.unwrap();
    engine.place(sell(10, 6)).await.unwrap();

    // 15 > 10 at the best entry: fails even though two levels could cover it.
    let outcome = engine.place(buy(15)).await.unwrap();
    assert!(matches!(
        outcome,
        PlaceOutcome::Unfilled { reason: UnmatchedReason::InsufficientDepth, .. }
    ));
    assert!(engine.trades().is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn price_time_priority_across_placements() {
    let engine = engine();
    engine.deposit(BUYER, Decimal::from(10_000)).unwrap();
    engine.grant_shares(SELLER, X, 30);

    let PlaceOutcome::Rested { order_id: first_at_nine } =
        engine.place(sell(10, 9)).await.unwrap()
    else {
        panic!()
    };
    let PlaceOutcome::Rested { order_id: at_twelve } = engine.place(sell(10, 12)).await.unwrap()
    else {
        panic!()
    };
    let PlaceOutcome::Rested { order_id: second_at_nine } =
        engine.place(sell(10, 9)).await.unwrap()
    else {
        panic!()
    };

    // First buy takes the earlier 9; second takes the later 9; 12 still rests.
    let PlaceOutcome::Filled { price, .. } = engine.place(buy(10)).await.unwrap() else {
        panic!()
    };
    assert_eq!(price, Decimal::from(9));
    assert_eq!(engine.order(first_at_nine).unwrap().status, OrderStatus::Completed);
    assert_eq!(engine.order(second_at_nine).unwrap().status, OrderStatus::InProgress);

    let PlaceOutcome::Filled { price, .. } = engine.place(buy(10)).await.unwrap() else {
        panic!()
    };
    assert_eq!(price, Decimal::from(9));
    assert_eq!(engine.order(second_at_nine).unwrap().status, OrderStatus::Completed);
    assert_eq!(engine.order(at_twelve).unwrap().status, OrderStatus::InProgress);
    engine.shutdown().await;
}

#[tokio::test]
async fn sell_placement_reserves_inventory() {
    let engine = engine();
    engine.grant_shares(SELLER, X, 10);

    engine.place(sell(7, 5)).await.unwrap();
    assert_eq!(engine.positions(SELLER).get(&X), Some(&3));

    // Second sell exceeding the remainder is rejected with no side effects.
    let err = engine.place(sell(4, 5)).await.unwrap_err();
    assert!(matches!(
        err,
        venue_matching_engine::PlaceError::InsufficientInventory { held: 3, requested: 4, .. }
    ));
    assert_eq!(engine.positions(SELLER).get(&X), Some(&3));
    assert_eq!(engine.orders_for(SELLER).len(), 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn validation_rejects_malformed_shapes() {
    let engine = engine();
    // Buy with a price.
    let mut request = buy(5);
    request.price = Some(Decimal::from(3));
    assert!(engine.place(request).await.is_err());
    // Sell without a price.
    let mut request = sell(5, 1);
    request.price = None;
    assert!(engine.place(request).await.is_err());
    // Zero quantity.
    assert!(engine.place(buy(0)).await.is_err());
    // Nothing was recorded.
    assert!(engine.orders_for(BUYER).is_empty());
    assert!(engine.orders_for(SELLER).is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn unknown_instrument_rejected() {
    let engine = engine();
    let mut request = buy(5);
    request.instrument = InstrumentId(99);
    assert!(matches!(
        engine.place(request).await.unwrap_err(),
        venue_matching_engine::PlaceError::UnknownInstrument(InstrumentId(99))
    ));
    engine.shutdown().await;
}

#[tokio::test]
async fn cancel_releases_reserved_inventory() {
    let engine = engine();
    engine.grant_shares(SELLER, X, 10);
    let PlaceOutcome::Rested { order_id } = engine.place(sell(10, 5)).await.unwrap() else {
        panic!()
    };
    assert!(engine.positions(SELLER).is_empty());

    engine.cancel(SELLER, order_id).unwrap();
    assert_eq!(engine.positions(SELLER).get(&X), Some(&10));
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Cancelled);

    // Second cancel is rejected.
    assert!(matches!(
        engine.cancel(SELLER, order_id),
        Err(CancelError::AlreadyCancelled(_))
    ));
    // The cancelled sell is no longer matchable.
    engine.deposit(BUYER, Decimal::from(100)).unwrap();
    let outcome = engine.place(buy(10)).await.unwrap();
    assert!(matches!(
        outcome,
        PlaceOutcome::Unfilled { reason: UnmatchedReason::NoLiquidity, .. }
    ));
    engine.shutdown().await;
}

#[tokio::test]
async fn cancel_by_other_account_rejected() {
    let engine = engine();
    engine.grant_shares(SELLER, X, 10);
    let PlaceOutcome::Rested { order_id } = engine.place(sell(10, 5)).await.unwrap() else {
        panic!()
    };
    assert!(matches!(
        engine.cancel(BUYER, order_id),
        Err(CancelError::WrongAccount(_))
    ));
    // Still resting and still reserved.
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::InProgress);
    assert!(engine.positions(SELLER).is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn cancel_after_fill_is_already_matched() {
    let engine = engine();
    engine.deposit(BUYER, Decimal::from(100)).unwrap();
    engine.grant_shares(SELLER, X, 10);
    let PlaceOutcome::Rested { order_id } = engine.place(sell(10, 5)).await.unwrap() else {
        panic!()
    };
    engine.place(buy(10)).await.unwrap();

    let err = engine.cancel(SELLER, order_id).unwrap_err();
    assert!(matches!(err, CancelError::AlreadyMatched { .. }));
    // The settled trade stands and no inventory came back.
    assert_eq!(engine.trades().len(), 1);
    assert!(engine.positions(SELLER).is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn cancel_race_never_yields_both_trade_and_refund() {
    // Run the race many times: whatever interleaving occurs, exactly one of
    // the two outcomes must win.
    for _ in 0..20 {
        let engine = Arc::new(engine());
        engine.deposit(BUYER, Decimal::from(100)).unwrap();
        engine.grant_shares(SELLER, X, 10);
        let PlaceOutcome::Rested { order_id } = engine.place(sell(10, 5)).await.unwrap() else {
            panic!()
        };

        let buy_engine = Arc::clone(&engine);
        let buy_task = tokio::spawn(async move { buy_engine.place(buy(10)).await.unwrap() });
        let cancel_result = engine.cancel(SELLER, order_id);
        let buy_outcome = buy_task.await.unwrap();

        let trade_happened = matches!(buy_outcome, PlaceOutcome::Filled { .. });
        let inventory_returned = engine.positions(SELLER).get(&X) == Some(&10);
        match (&cancel_result, trade_happened) {
            (Ok(()), false) => assert!(inventory_returned, "cancel won: inventory must return"),
            (Err(_), true) => assert!(!inventory_returned, "fill won: inventory must stay spent"),
            (Ok(()), true) => panic!("both a completed trade and a successful cancel"),
            (Err(err), false) => panic!("neither trade nor cancel succeeded: {:?}", err),
        }
        engine.shutdown().await;
    }
}

#[tokio::test]
async fn timeout_leaves_order_in_progress_and_result_reconcilable() {
    use tokio::sync::watch;
    use venue_matching_engine::{
        spawn_workers, AuditSink, BookStore, Correlator, InMemoryAuditSink, InMemoryOrderLog,
        Intake, MatchBroker, OrderIdSource, OrderLog, WorkerContext,
    };

    let _ = env_logger::try_init();
    let books = Arc::new(BookStore::new());
    books.register(X);
    let ledger = Arc::new(venue_matching_engine::Ledger::new());
    let log: Arc<dyn OrderLog> = Arc::new(InMemoryOrderLog::new());
    let broker = Arc::new(MatchBroker::new());
    broker.register(X);
    let correlator = Arc::new(Correlator::new());
    let audit: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::new());
    let order_ids = Arc::new(OrderIdSource::default());
    let intake = Intake::new(
        Arc::clone(&books),
        Arc::clone(&ledger),
        Arc::clone(&log),
        Arc::clone(&broker),
        Arc::clone(&correlator),
        Arc::clone(&audit),
        Arc::clone(&order_ids),
        Duration::from_millis(50),
    );
    ledger.deposit(BUYER, Decimal::from(100)).unwrap();

    // No workers are consuming, so the correlation wait must time out and the
    // order must stay in progress.
    let PlaceOutcome::TimedOut { order_id } = intake.place(buy(5)).await.unwrap() else {
        panic!("expected a timeout");
    };
    assert_eq!(
        log.find_by_id(order_id).unwrap().unwrap().status,
        OrderStatus::InProgress
    );

    // Once workers come up, the dispatched request still completes and its
    // result is retained for out-of-band reconciliation.
    let (stop, shutdown) = watch::channel(false);
    let ctx = Arc::new(WorkerContext {
        books,
        ledger,
        log: Arc::clone(&log),
        audit,
        correlator: Arc::clone(&correlator),
        order_ids,
    });
    let handles = spawn_workers(X, 1, &broker, ctx, shutdown);
    let mut result = None;
    for _ in 0..200 {
        if let Some(found) = correlator.take_unclaimed(order_id) {
            result = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let result = result.expect("result retained for reconciliation");
    assert!(matches!(
        result.outcome,
        MatchOutcome::Unmatched { reason: UnmatchedReason::NoLiquidity }
    ));
    assert_eq!(
        log.find_by_id(order_id).unwrap().unwrap().status,
        OrderStatus::Cancelled
    );
    stop.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn self_trade_is_permitted_and_conserves_balance() {
    let engine = engine();
    engine.deposit(SELLER, Decimal::from(100)).unwrap();
    engine.grant_shares(SELLER, X, 10);
    engine.place(sell(10, 5)).await.unwrap();

    let request = PlaceRequest {
        account: SELLER,
        instrument: X,
        side: Side::Buy,
        kind: OrderKind::Market,
        quantity: 10,
        price: None,
    };
    let outcome = engine.place(request).await.unwrap();
    assert!(matches!(outcome, PlaceOutcome::Filled { .. }));
    assert_eq!(engine.balance(SELLER), Decimal::from(100));
    assert_eq!(engine.positions(SELLER).get(&X), Some(&10));
    engine.shutdown().await;
}
