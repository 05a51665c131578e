//! Venue ledger simulation.
//!
//! Walks the escrow lifecycle end to end: orders sized from the oracle,
//! attested fills converting them into positions, triggers, market close
//! requests and settlement against the liquidity reserve.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use perps_ledger::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing_subscriber::EnvFilter;

const ADMIN: AccountId = AccountId(1000);
const EXECUTOR: AccountId = AccountId(1001);
const LP: AccountId = AccountId(1002);
const FEES: AccountId = AccountId(1003);
const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);
const BTC: AssetId = AssetId(1);

const CONFIG_JSON: &str = r#"{
    "lots": { "1": { "numerator": 1, "denominator": 100 } },
    "asset_markets": { "1": 1 },
    "markets": { "1": { "commission_rate": "0.0005", "max_leverage": 50, "open": true } },
    "funding_rates": { "1": "0.00001" }
}"#;

type SimResult<T = ()> = Result<T, Box<dyn Error>>;

fn price(value: Decimal) -> SimResult<Price> {
    Ok(Price::new(value).ok_or("non-positive price")?)
}

struct Sim {
    venue: Venue<InMemoryAsset, InMemoryOracle>,
    signer: LocalWallet,
    oracle_clock: i64,
}

impl Sim {
    // the LP holds `lp_balance` externally and commits `reserve` of it up front
    fn new(lp_balance: Decimal, reserve: Decimal) -> SimResult<Self> {
        let signer = LocalWallet::from_bytes(&[7u8; 32])?;
        let domain = FillDomain::new("PerpsLedger", "1", 421614, Address::zero());
        let verifier = FillVerifier::new(ADMIN, signer.address(), domain);

        let asset = InMemoryAsset::with_balances([
            (ALICE, dec!(10_000)),
            (BOB, dec!(10_000)),
            (LP, lp_balance),
        ]);
        let ledger = Ledger::new(LedgerConfig::default(), CustodyLedger::new(asset, FEES, LP));
        let config = ConfigStore::new(ADMIN, VenueConfig::from_json(CONFIG_JSON)?)?;
        let roles = VenueRoles {
            admin: ADMIN,
            executor: EXECUTOR,
        };

        let mut sim = Self {
            venue: Venue::new(config, ledger, verifier, InMemoryOracle::new(), roles),
            signer,
            oracle_clock: 0,
        };
        sim.set_oracle(dec!(50000))?;
        if reserve > Decimal::ZERO {
            sim.venue.reserve_deposit(LP, Quote::new(reserve))?;
        }
        Ok(sim)
    }

    fn set_oracle(&mut self, price: Decimal) -> SimResult {
        self.oracle_clock += 1;
        let raw = (price * dec!(100_000_000)).trunc().mantissa();
        let sample = OracleSample::new(raw, 8, self.oracle_clock, self.oracle_clock as u64);
        self.venue.oracle_mut().submit(BTC, sample)?;
        Ok(())
    }

    fn fill(&mut self, order_id: OrderId, fill_price: Decimal, side: Side) -> SimResult<ConversionResult> {
        let attestation = FillAttestation::new(order_id, price(fill_price)?, side);
        let signature = sign_attestation(&self.signer, self.venue.verifier().domain(), &attestation)?;
        Ok(self.venue.execute_fill(&attestation, &signature)?)
    }

    fn print_balances(&self) {
        let custody = self.venue.ledger().custody();
        let asset = custody.asset();
        println!(
            "  Alice ${}  Bob ${}  reserve ${}  fees accrued ${}  custody ${}",
            asset.balance_of(ALICE),
            asset.balance_of(BOB),
            custody.reserve_balance(),
            custody.commission_of(FEES),
            asset.custody_balance()
        );
    }
}

fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Venue Ledger Simulation");
    println!("Single asset, escrowed orders, reserve-backed settlement\n");

    scenario_1_profitable_round_trip()?;
    scenario_2_stop_loss_replacement()?;
    scenario_3_market_close_request()?;
    scenario_4_insolvent_close()?;
    scenario_5_replayed_fill()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Open, fill, hold for eight hours, close in profit.
fn scenario_1_profitable_round_trip() -> SimResult {
    println!("Scenario 1: Profitable Round Trip\n");
    let mut sim = Sim::new(dec!(5000), dec!(5000))?;

    let preview = sim.venue.preview_order(BTC, Decimal::ZERO, 10, 10)?;
    println!(
        "  Preview 10 lots @ ${}: margin ${}, commission ${}",
        preview.price, preview.margin, preview.commission
    );

    let order_id = sim
        .venue
        .open_order(ALICE, OpenOrder::market(BTC, Side::Long, 10, 10))?;
    sim.print_balances();

    let result = sim.fill(order_id, dec!(50000), Side::Long)?;
    println!(
        "  Order {} filled -> position {} with {} derived triggers",
        order_id,
        result.position_id,
        result.derived.len()
    );

    sim.venue.advance_time(8 * 3_600_000);
    let settlement = sim
        .venue
        .close_position(EXECUTOR, result.position_id, price(dec!(52000))?)?;
    println!(
        "  Closed @ $52,000: paid ${}, reserve paid ${}, fee ${}",
        settlement.to_trader, settlement.from_reserve, settlement.commission
    );
    sim.print_balances();

    let accrued = sim.venue.ledger().custody().commission_of(FEES);
    let withdrawn = sim.venue.withdraw_commission(FEES, accrued)?;
    println!("  Fee receiver withdraws, remaining accrual ${}\n", withdrawn);
    Ok(())
}

/// Replacing a stop loss twice leaves exactly one live trigger id.
fn scenario_2_stop_loss_replacement() -> SimResult {
    println!("Scenario 2: Stop-Loss Replacement\n");
    let mut sim = Sim::new(dec!(5000), dec!(5000))?;

    let mut ticket = OpenOrder::market(BTC, Side::Short, 20, 5);
    ticket.stop_loss = Some(price(dec!(53000))?);
    let order_id = sim.venue.open_order(BOB, ticket)?;
    let result = sim.fill(order_id, dec!(50000), Side::Short)?;

    for derived in &result.derived {
        println!(
            "  {:?} trigger clOrdId {} -> {:?} @ {:?}",
            derived.kind, derived.cl_ord_id.0, derived.side, derived.target_price
        );
    }

    let new_sl = Some(price(dec!(52000))?);
    let first = sim.venue.update_stop_loss(BOB, result.position_id, new_sl)?;
    let second = sim.venue.update_stop_loss(BOB, result.position_id, new_sl)?;
    let view = sim
        .venue
        .ledger()
        .position_view(result.position_id)
        .ok_or("position vanished")?;

    println!(
        "  After two updates: live SL {:?} @ {:?}, first replacement retired: {}\n",
        second.map(|c| c.0),
        view.stop_loss(),
        first.map_or(true, |c| sim.venue.ledger().cl_ord_kind(c).is_none())
    );
    Ok(())
}

/// A market close can only be requested once per position.
fn scenario_3_market_close_request() -> SimResult {
    println!("Scenario 3: Market Close Request\n");
    let mut sim = Sim::new(dec!(5000), dec!(5000))?;

    let order_id = sim.venue.open_order(ALICE, OpenOrder::market(BTC, Side::Long, 5, 20))?;
    let result = sim.fill(order_id, dec!(50000), Side::Long)?;

    let derived = sim.venue.request_close_on_market(ALICE, result.position_id)?;
    println!(
        "  Close requested: clOrdId {} {:?} {} lots at market",
        derived.cl_ord_id.0, derived.side, derived.lots
    );

    match sim.venue.request_close_on_market(ALICE, result.position_id) {
        Err(e) => println!("  Second request rejected: {} ({})", e, e.kind()),
        Ok(_) => println!("  Second request unexpectedly accepted"),
    }

    sim.set_oracle(dec!(49000))?;
    let settlement = sim
        .venue
        .close_position(EXECUTOR, result.position_id, price(dec!(49000))?)?;
    println!(
        "  Executed @ $49,000: loss to reserve ${}, paid back ${}\n",
        settlement.to_reserve, settlement.to_trader
    );
    Ok(())
}

/// A profit the reserve cannot cover aborts the close; topping up lets it retry.
fn scenario_4_insolvent_close() -> SimResult {
    println!("Scenario 4: Insolvent Close Abort\n");
    let mut sim = Sim::new(dec!(140), dec!(40))?;

    let order_id = sim.venue.open_order(ALICE, OpenOrder::market(BTC, Side::Long, 10, 10))?;
    let result = sim.fill(order_id, dec!(50000), Side::Long)?;

    let exit = price(dec!(50500))?;
    match sim.venue.close_position(EXECUTOR, result.position_id, exit) {
        Err(e) => println!("  Close rejected: {} ({})", e, e.kind()),
        Ok(_) => println!("  Close unexpectedly settled"),
    }
    println!(
        "  Position still open: {}",
        sim.venue.ledger().position(result.position_id).is_some()
    );
    sim.print_balances();

    sim.venue.reserve_deposit(LP, Quote::new(dec!(100)))?;
    let settlement = sim.venue.close_position(EXECUTOR, result.position_id, exit)?;
    println!("  After top-up, retry pays ${}", settlement.to_trader);
    sim.print_balances();
    println!();
    Ok(())
}

/// The same attestation twice: the second is refused.
fn scenario_5_replayed_fill() -> SimResult {
    println!("Scenario 5: Replayed Fill Attestation\n");
    let mut sim = Sim::new(dec!(5000), dec!(5000))?;

    let order_id = sim.venue.open_order(BOB, OpenOrder::market(BTC, Side::Long, 1, 2))?;
    let attestation = FillAttestation::new(order_id, price(dec!(50000))?, Side::Long);
    let signature = sign_attestation(&sim.signer, sim.venue.verifier().domain(), &attestation)?;

    let first = sim.venue.execute_fill(&attestation, &signature)?;
    println!("  First admission opened position {}", first.position_id);

    match sim.venue.execute_fill(&attestation, &signature) {
        Err(e) => println!("  Replay rejected: {} ({})", e, e.kind()),
        Ok(_) => println!("  Replay unexpectedly admitted"),
    }
    Ok(())
}
