//! Ledger lifecycle tests.
//!
//! Drive orders and positions through the public ledger API and check the
//! escrow, trigger and read-model bookkeeping after each step.

use perps_ledger::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);
const FEES: AccountId = AccountId(90);
const LP: AccountId = AccountId(91);
const BTC: AssetId = AssetId(1);

fn q(value: Decimal) -> Quote {
    Quote::new(value)
}

fn price(value: Decimal) -> Price {
    Price::new(value).unwrap()
}

fn ledger(alice: Decimal, reserve: Decimal) -> Ledger<InMemoryAsset> {
    let asset = InMemoryAsset::with_balances([(ALICE, alice), (BOB, dec!(10_000)), (LP, reserve)]);
    let mut ledger = Ledger::new(LedgerConfig::default(), CustodyLedger::new(asset, FEES, LP));
    if reserve > Decimal::ZERO {
        ledger.reserve_deposit(LP, q(reserve)).unwrap();
    }
    ledger
}

fn request(side: Side) -> OrderRequest {
    OrderRequest::market(BTC, side, 10, Leverage::new(5).unwrap(), q(dec!(100)), q(dec!(5)))
}

fn assert_books_balance(ledger: &Ledger<InMemoryAsset>) {
    let custody = ledger.custody();
    assert_eq!(custody.total_held(), custody.asset().custody_balance());
}

#[test]
fn deposit_of_105_against_104_leaves_nothing_behind() {
    let mut ledger = ledger(dec!(104), Decimal::ZERO);

    let err = ledger.create_order(ALICE, request(Side::Long)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.order_count(), 0);
    assert!(ledger.orders_of(ALICE).is_empty());
    assert_eq!(ledger.custody().order_escrow_count(), 0);
    assert_eq!(ledger.custody().asset().balance_of(ALICE), q(dec!(104)));
    assert!(ledger.events().is_empty());
}

#[test]
fn long_stop_loss_converts_to_short_trigger() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let req = request(Side::Long).with_stop_loss(price(dec!(95)));
    let order_id = ledger.create_order(ALICE, req).unwrap();

    let result = ledger.convert_order(order_id, price(dec!(100))).unwrap();

    assert_eq!(result.derived.len(), 1);
    let sl = &result.derived[0];
    assert_eq!(sl.kind, ClOrdKind::StopLoss);
    assert_eq!(sl.side, Side::Short);
    assert_eq!(sl.target_price, Some(price(dec!(95))));
    assert_eq!(sl.position_id, result.position_id);

    let emitted: Vec<_> = ledger
        .events()
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::DerivedOrder(d) => Some(d.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(emitted, vec![sl.clone()]);
}

#[test]
fn conversion_moves_escrow_and_commission() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let order_id = ledger.create_order(ALICE, request(Side::Short)).unwrap();

    let result = ledger.convert_order(order_id, price(dec!(2000))).unwrap();

    let custody = ledger.custody();
    assert!(custody.order_escrow(order_id).is_none());
    assert_eq!(custody.position_escrow(result.position_id).unwrap().margin, q(dec!(100)));
    assert_eq!(custody.commission_of(FEES), q(dec!(5)));
    assert_eq!(custody.asset().custody_balance(), q(dec!(105)));

    let position = ledger.position(result.position_id).unwrap();
    assert_eq!(position.open_price, price(dec!(2000)));
    assert_eq!(position.side, Side::Short);
    assert!(ledger.orders_of(ALICE).is_empty());
    assert_eq!(ledger.positions_of(ALICE), &[result.position_id]);
    assert_books_balance(&ledger);
}

#[test]
fn position_ids_do_not_collide_with_order_ids() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let first = ledger.create_order(ALICE, request(Side::Long)).unwrap();
    let position_id = ledger.convert_order(first, price(dec!(100))).unwrap().position_id;

    assert_eq!(position_id, PositionId(LedgerConfig::default().position_id_base));
    let second = ledger.create_order(ALICE, request(Side::Long)).unwrap();
    assert_eq!(second, OrderId(2));
}

#[test]
fn repeated_stop_loss_update_keeps_one_live_id() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let order_id = ledger.create_order(ALICE, request(Side::Long)).unwrap();
    let pid = ledger.convert_order(order_id, price(dec!(100))).unwrap().position_id;

    let new_price = Some(price(dec!(97)));
    let a = ledger.update_stop_loss(ALICE, pid, new_price).unwrap().unwrap();
    let b = ledger.update_stop_loss(ALICE, pid, new_price).unwrap().unwrap();

    let live: Vec<ClOrdId> = [a, b]
        .into_iter()
        .filter(|id| ledger.cl_ord_kind(*id) == Some(ClOrdKind::StopLoss))
        .collect();
    assert_eq!(live, vec![b]);
    assert_eq!(ledger.position_triggers(pid).unwrap().stop_loss.unwrap().cl_ord_id, b);

    let cancelled = ledger
        .events()
        .iter()
        .filter(|e| matches!(&e.payload, EventPayload::TriggerCancelled(t) if t.cl_ord_id == a))
        .count();
    assert_eq!(cancelled, 1);
}

#[test]
fn close_with_pnl_above_reserve_changes_nothing() {
    let mut ledger = ledger(dec!(1000), dec!(40));
    let req = request(Side::Long).with_take_profit(price(dec!(150)));
    let order_id = ledger.create_order(ALICE, req).unwrap();
    let pid = ledger.convert_order(order_id, price(dec!(100))).unwrap().position_id;
    let events_before = ledger.events().len();

    let err = ledger.close_position(pid, q(dec!(50)), q(dec!(1))).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.custody().reserve_balance(), q(dec!(40)));
    assert_eq!(ledger.custody().commission_of(FEES), q(dec!(5)));
    assert!(ledger.position(pid).is_some());
    assert!(ledger.position_triggers(pid).unwrap().take_profit.is_some());
    assert_eq!(ledger.events().len(), events_before);
    assert_books_balance(&ledger);
}

#[test]
fn loss_beyond_margin_is_capped() {
    let mut ledger = ledger(dec!(1000), dec!(10));
    let order_id = ledger.create_order(ALICE, request(Side::Short)).unwrap();
    let pid = ledger.convert_order(order_id, price(dec!(100))).unwrap().position_id;

    let settlement = ledger.close_position(pid, q(dec!(-400)), q(dec!(2))).unwrap();

    assert_eq!(settlement.to_reserve, q(dec!(98)));
    assert_eq!(settlement.to_trader, Quote::zero());
    assert_eq!(settlement.uncollected_loss, q(dec!(302)));
    assert_eq!(ledger.custody().reserve_balance(), q(dec!(108)));
    assert_eq!(ledger.custody().asset().balance_of(ALICE), q(dec!(895)));
    assert_books_balance(&ledger);
}

#[test]
fn fee_above_margin_is_rejected() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let order_id = ledger.create_order(ALICE, request(Side::Long)).unwrap();
    let pid = ledger.convert_order(order_id, price(dec!(100))).unwrap().position_id;

    let err = ledger.close_position(pid, Quote::zero(), q(dec!(100.000001))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert!(ledger.position(pid).is_some());
}

#[test]
fn read_model_tracks_each_trader() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let a1 = ledger.create_order(ALICE, request(Side::Long)).unwrap();
    let a2 = ledger.create_order(ALICE, request(Side::Short)).unwrap();
    let b1 = ledger.create_order(BOB, request(Side::Long)).unwrap();

    let mut alice_orders = ledger.orders_of(ALICE).to_vec();
    alice_orders.sort();
    assert_eq!(alice_orders, vec![a1, a2]);
    assert_eq!(ledger.orders_of(BOB), &[b1]);

    ledger.cancel_order(ALICE, a1).unwrap();
    assert_eq!(ledger.orders_of(ALICE), &[a2]);

    let pid = ledger.convert_order(b1, price(dec!(100))).unwrap().position_id;
    assert!(ledger.orders_of(BOB).is_empty());
    assert_eq!(ledger.positions_of(BOB), &[pid]);

    let cl = ledger.update_take_profit(BOB, pid, Some(price(dec!(120)))).unwrap().unwrap();
    assert_eq!(ledger.cl_ord_kind(cl), Some(ClOrdKind::TakeProfit));
    assert_eq!(ledger.cl_ord_position(cl), Some(pid));
    assert_eq!(ledger.position_view(pid).unwrap().take_profit(), Some(price(dec!(120))));

    let open_cl = ledger.order(a2).unwrap().cl_ord_id;
    assert_eq!(ledger.cl_ord_order(open_cl), Some(a2));
}

#[test]
fn market_close_request_is_once_only() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let order_id = ledger.create_order(ALICE, request(Side::Short)).unwrap();
    let pid = ledger.convert_order(order_id, price(dec!(100))).unwrap().position_id;

    assert_eq!(
        ledger.request_close_on_market(BOB, pid).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );
    let derived = ledger.request_close_on_market(ALICE, pid).unwrap();
    assert_eq!(derived.side, Side::Long);
    assert_eq!(derived.kind, ClOrdKind::MarketClose);
    assert!(ledger.position(pid).unwrap().close_requested());

    let err = ledger.request_close_on_market(ALICE, pid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRequested);
}

#[test]
fn delete_leaves_escrow_for_recovery() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);
    let req = request(Side::Long).with_stop_loss(price(dec!(90)));
    let order_id = ledger.create_order(ALICE, req).unwrap();
    let result = ledger.convert_order(order_id, price(dec!(100))).unwrap();
    let sl = result.derived[0].cl_ord_id;

    ledger.delete_position(result.position_id).unwrap();

    assert!(ledger.position(result.position_id).is_none());
    assert!(ledger.cl_ord_kind(sl).is_none());
    assert!(ledger.positions_of(ALICE).is_empty());
    assert!(ledger.custody().position_escrow(result.position_id).is_some());
    assert_eq!(ledger.custody().asset().balance_of(ALICE), q(dec!(895)));
    assert_books_balance(&ledger);
}

#[test]
fn commission_and_reserve_withdrawals_emit_events() {
    let mut ledger = ledger(dec!(1000), dec!(100));
    let order_id = ledger.create_order(ALICE, request(Side::Long)).unwrap();
    ledger.convert_order(order_id, price(dec!(100))).unwrap();

    assert_eq!(ledger.withdraw_commission(FEES, q(dec!(5))).unwrap(), Quote::zero());
    assert_eq!(ledger.reserve_withdraw(LP, q(dec!(30))).unwrap(), q(dec!(70)));
    assert_eq!(
        ledger.reserve_withdraw(ALICE, q(dec!(1))).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );

    let recent = ledger.recent_events(2);
    assert!(matches!(recent[0].payload, EventPayload::CommissionWithdrawn(_)));
    assert!(matches!(recent[1].payload, EventPayload::ReserveWithdrawn(_)));
    assert_books_balance(&ledger);
}

#[test]
fn clock_saturates_instead_of_overflowing() {
    let mut ledger = ledger(dec!(1000), Decimal::ZERO);

    ledger.set_time(Timestamp::from_millis(i64::MAX - 10));
    ledger.advance_time(3_600_000);
    assert_eq!(ledger.time(), Timestamp::from_millis(i64::MAX));

    ledger.set_time(Timestamp::from_millis(i64::MIN + 10));
    ledger.advance_time(-3_600_000);
    assert_eq!(ledger.time(), Timestamp::from_millis(i64::MIN));
    assert_eq!(
        ledger.time().elapsed_hours(&Timestamp::from_millis(i64::MAX)),
        Decimal::from(i64::MAX / 3_600_000)
    );
}

proptest! {
    /// Every derived trigger trades against the position it belongs to.
    #[test]
    fn derived_triggers_oppose_position(
        long in any::<bool>(),
        sl in proptest::option::of(1i64..10_000i64),
        tp in proptest::option::of(1i64..10_000i64),
        liq in proptest::option::of(1i64..10_000i64),
    ) {
        let side = if long { Side::Long } else { Side::Short };
        let mut req = request(side);
        req.stop_loss = sl.map(|p| price(Decimal::from(p)));
        req.take_profit = tp.map(|p| price(Decimal::from(p)));
        req.liquidation_price = liq.map(|p| price(Decimal::from(p)));

        let mut ledger = ledger(dec!(1000), Decimal::ZERO);
        let order_id = ledger.create_order(ALICE, req).unwrap();
        let result = ledger.convert_order(order_id, price(dec!(5000))).unwrap();

        let expected = [sl, tp, liq].iter().filter(|p| p.is_some()).count();
        prop_assert_eq!(result.derived.len(), expected);
        for derived in &result.derived {
            prop_assert_eq!(derived.side, side.opposite());
            prop_assert_eq!(ledger.cl_ord_position(derived.cl_ord_id), Some(result.position_id));
        }
    }
}
