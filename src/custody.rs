// 9.2 custody.rs: escrow for open orders and positions, commission accrual,
// and the liquidity reserve that pays profits and absorbs losses.
//
// the fund-moving entry points take an EscrowAuthority. only the ledger holds
// one, so nothing else can deposit, refund, convert or close.
// every external push happens after the internal books are updated; a failed
// push puts the books back before the error is returned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::asset::{AssetError, ExternalAsset};
use crate::error::ErrorKind;
use crate::types::{AccountId, OrderId, PositionId, Quote};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("No escrow for order {0}")]
    OrderNotFound(OrderId),

    #[error("No escrow for position {0}")]
    PositionNotFound(PositionId),

    #[error("Escrow id {0} already in use")]
    IdCollision(u64),

    #[error("Position escrow {0} already exists")]
    PositionExists(PositionId),

    #[error("Closing fee {fee} exceeds margin {margin}")]
    FeeExceedsMargin { fee: Quote, margin: Quote },

    #[error("Reserve holds {available}, payout needs {required}")]
    ReserveInsufficient { available: Quote, required: Quote },

    #[error("Commission accrual {available} below requested {requested}")]
    CommissionInsufficient { available: Quote, requested: Quote },

    #[error("Caller {0:?} is not the reserve controller")]
    Unauthorized(AccountId),

    #[error("Amount must be non-negative")]
    InvalidAmount,

    #[error("Asset transfer failed: {0}")]
    Asset(#[from] AssetError),
}

impl CustodyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CustodyError::OrderNotFound(_) | CustodyError::PositionNotFound(_) => ErrorKind::NotFound,
            CustodyError::IdCollision(_) | CustodyError::PositionExists(_) => ErrorKind::AlreadyExists,
            CustodyError::FeeExceedsMargin { .. }
            | CustodyError::ReserveInsufficient { .. }
            | CustodyError::CommissionInsufficient { .. } => ErrorKind::InsufficientFunds,
            CustodyError::Unauthorized(_) => ErrorKind::Unauthorized,
            CustodyError::InvalidAmount => ErrorKind::InvalidInput,
            CustodyError::Asset(e) => e.kind(),
        }
    }
}

/// Capability to move escrowed funds. Constructible only inside this crate.
#[derive(Debug)]
pub struct EscrowAuthority {
    _sealed: (),
}

impl EscrowAuthority {
    pub(crate) fn issue() -> Self {
        Self { _sealed: () }
    }
}

// exists exactly while its order exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEscrow {
    pub trader: AccountId,
    pub margin: Quote,
    pub commission: Quote,
}

impl OrderEscrow {
    pub fn total(&self) -> Quote {
        self.margin.add(self.commission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEscrow {
    pub trader: AccountId,
    pub margin: Quote,
}

/// Where a closed position's margin went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSettlement {
    pub trader: AccountId,
    pub margin: Quote,
    pub commission: Quote,
    pub to_trader: Quote,
    pub to_reserve: Quote,
    pub from_reserve: Quote,
    // loss beyond margin, absorbed by the venue
    pub uncollected_loss: Quote,
}

// margin after fee caps what a loss can collect; a profit is paid in full or not at all
fn settle_close(
    trader: AccountId,
    margin: Quote,
    pnl: Quote,
    commission: Quote,
    reserve: Quote,
) -> Result<CloseSettlement, CustodyError> {
    let margin_after_fee = margin.sub(commission);

    let mut settlement = CloseSettlement {
        trader,
        margin,
        commission,
        to_trader: margin_after_fee,
        to_reserve: Quote::zero(),
        from_reserve: Quote::zero(),
        uncollected_loss: Quote::zero(),
    };

    if pnl.is_negative() {
        let loss = pnl.abs();
        let collected = loss.min(margin_after_fee);
        settlement.to_reserve = collected;
        settlement.to_trader = margin_after_fee.sub(collected);
        settlement.uncollected_loss = loss.sub(collected);
    } else if pnl.is_positive() {
        if reserve < pnl {
            return Err(CustodyError::ReserveInsufficient {
                available: reserve,
                required: pnl,
            });
        }
        settlement.from_reserve = pnl;
        settlement.to_trader = margin_after_fee.add(pnl);
    }

    Ok(settlement)
}

/** 9.2.1: the custody books. one fungible asset, balances in usd-6 */
#[derive(Debug)]
pub struct CustodyLedger<A: ExternalAsset> {
    asset: A,
    order_escrows: HashMap<OrderId, OrderEscrow>,
    position_escrows: HashMap<PositionId, PositionEscrow>,
    commission_accrual: HashMap<AccountId, Quote>,
    commission_receiver: AccountId,
    reserve_controller: AccountId,
    reserve_balance: Quote,
}

impl<A: ExternalAsset> CustodyLedger<A> {
    pub fn new(asset: A, commission_receiver: AccountId, reserve_controller: AccountId) -> Self {
        Self {
            asset,
            order_escrows: HashMap::new(),
            position_escrows: HashMap::new(),
            commission_accrual: HashMap::new(),
            commission_receiver,
            reserve_controller,
            reserve_balance: Quote::zero(),
        }
    }

    /// Pulls margin + commission from `owner` and records the order escrow.
    pub fn deposit_for_order(
        &mut self,
        _auth: &EscrowAuthority,
        order_id: OrderId,
        owner: AccountId,
        margin: Quote,
        commission: Quote,
    ) -> Result<(), CustodyError> {
        if margin.is_negative() || commission.is_negative() {
            return Err(CustodyError::InvalidAmount);
        }
        // orders and positions share one id space in custody
        if self.order_escrows.contains_key(&order_id)
            || self.position_escrows.contains_key(&PositionId(order_id.0))
        {
            return Err(CustodyError::IdCollision(order_id.0));
        }

        let escrow = OrderEscrow {
            trader: owner,
            margin,
            commission,
        };
        self.asset.pull(owner, escrow.total())?;
        debug!(order_id = order_id.0, trader = owner.0, %margin, %commission, "order escrowed");
        self.order_escrows.insert(order_id, escrow);
        Ok(())
    }

    /// Deletes the order escrow and returns margin + commission to the trader.
    pub fn refund_order(
        &mut self,
        _auth: &EscrowAuthority,
        order_id: OrderId,
    ) -> Result<OrderEscrow, CustodyError> {
        let escrow = self
            .order_escrows
            .remove(&order_id)
            .ok_or(CustodyError::OrderNotFound(order_id))?;

        if let Err(e) = self.asset.push(escrow.trader, escrow.total()) {
            warn!(order_id = order_id.0, error = %e, "refund push failed, escrow restored");
            self.order_escrows.insert(order_id, escrow);
            return Err(e.into());
        }
        debug!(order_id = order_id.0, amount = %escrow.total(), "order refunded");
        Ok(escrow)
    }

    /// Relabels order escrow as position escrow and accrues the commission.
    /// Funds never leave custody.
    pub fn convert_order_to_position(
        &mut self,
        _auth: &EscrowAuthority,
        order_id: OrderId,
        position_id: PositionId,
    ) -> Result<PositionEscrow, CustodyError> {
        if !self.order_escrows.contains_key(&order_id) {
            return Err(CustodyError::OrderNotFound(order_id));
        }
        if self.position_escrows.contains_key(&position_id) {
            return Err(CustodyError::PositionExists(position_id));
        }

        let order = self
            .order_escrows
            .remove(&order_id)
            .ok_or(CustodyError::OrderNotFound(order_id))?;
        let position = PositionEscrow {
            trader: order.trader,
            margin: order.margin,
        };
        self.position_escrows.insert(position_id, position.clone());
        self.credit_commission(order.commission);

        debug!(
            order_id = order_id.0,
            position_id = position_id.0,
            commission = %order.commission,
            "order escrow converted"
        );
        Ok(position)
    }

    /// Settles a position against the reserve. A profit the reserve cannot
    /// cover aborts the whole close.
    pub fn close_position(
        &mut self,
        _auth: &EscrowAuthority,
        position_id: PositionId,
        pnl: Quote,
        closing_commission: Quote,
    ) -> Result<CloseSettlement, CustodyError> {
        let escrow = self
            .position_escrows
            .get(&position_id)
            .cloned()
            .ok_or(CustodyError::PositionNotFound(position_id))?;

        if closing_commission.is_negative() {
            return Err(CustodyError::InvalidAmount);
        }
        if closing_commission > escrow.margin {
            return Err(CustodyError::FeeExceedsMargin {
                fee: closing_commission,
                margin: escrow.margin,
            });
        }

        let settlement = settle_close(
            escrow.trader,
            escrow.margin,
            pnl,
            closing_commission,
            self.reserve_balance,
        )?;

        let reserve_before = self.reserve_balance;
        let accrual_before = self.commission_of(self.commission_receiver);

        self.position_escrows.remove(&position_id);
        self.credit_commission(closing_commission);
        self.reserve_balance = self
            .reserve_balance
            .add(settlement.to_reserve)
            .sub(settlement.from_reserve);

        if settlement.to_trader.is_positive() {
            if let Err(e) = self.asset.push(escrow.trader, settlement.to_trader) {
                warn!(position_id = position_id.0, error = %e, "close push failed, books restored");
                self.reserve_balance = reserve_before;
                self.commission_accrual
                    .insert(self.commission_receiver, accrual_before);
                self.position_escrows.insert(position_id, escrow);
                return Err(e.into());
            }
        }

        info!(
            position_id = position_id.0,
            %pnl,
            to_trader = %settlement.to_trader,
            to_reserve = %settlement.to_reserve,
            from_reserve = %settlement.from_reserve,
            "position settled"
        );
        Ok(settlement)
    }

    /// Any account may withdraw its own accrued commission.
    pub fn withdraw_commission(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, CustodyError> {
        if amount.is_negative() {
            return Err(CustodyError::InvalidAmount);
        }
        let available = self.commission_of(caller);
        if available < amount {
            return Err(CustodyError::CommissionInsufficient {
                available,
                requested: amount,
            });
        }

        let remaining = available.sub(amount);
        self.commission_accrual.insert(caller, remaining);
        if let Err(e) = self.asset.push(caller, amount) {
            self.commission_accrual.insert(caller, available);
            return Err(e.into());
        }
        Ok(remaining)
    }

    pub fn reserve_deposit(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, CustodyError> {
        self.ensure_reserve_controller(caller)?;
        if amount.is_negative() {
            return Err(CustodyError::InvalidAmount);
        }
        self.asset.pull(caller, amount)?;
        self.reserve_balance = self.reserve_balance.add(amount);
        Ok(self.reserve_balance)
    }

    pub fn reserve_withdraw(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, CustodyError> {
        self.ensure_reserve_controller(caller)?;
        if amount.is_negative() {
            return Err(CustodyError::InvalidAmount);
        }
        if self.reserve_balance < amount {
            return Err(CustodyError::ReserveInsufficient {
                available: self.reserve_balance,
                required: amount,
            });
        }

        let before = self.reserve_balance;
        self.reserve_balance = before.sub(amount);
        if let Err(e) = self.asset.push(caller, amount) {
            self.reserve_balance = before;
            return Err(e.into());
        }
        Ok(self.reserve_balance)
    }

    pub fn order_escrow(&self, order_id: OrderId) -> Option<&OrderEscrow> {
        self.order_escrows.get(&order_id)
    }

    pub fn position_escrow(&self, position_id: PositionId) -> Option<&PositionEscrow> {
        self.position_escrows.get(&position_id)
    }

    pub fn commission_of(&self, account: AccountId) -> Quote {
        self.commission_accrual
            .get(&account)
            .copied()
            .unwrap_or_else(Quote::zero)
    }

    pub fn reserve_balance(&self) -> Quote {
        self.reserve_balance
    }

    pub fn commission_receiver(&self) -> AccountId {
        self.commission_receiver
    }

    pub fn reserve_controller(&self) -> AccountId {
        self.reserve_controller
    }

    pub fn order_escrow_count(&self) -> usize {
        self.order_escrows.len()
    }

    pub fn position_escrow_count(&self) -> usize {
        self.position_escrows.len()
    }

    /// Everything custody owes someone: escrows, accruals and the reserve.
    /// Equals the custody balance of the external asset.
    pub fn total_held(&self) -> Quote {
        let orders: Quote = self.order_escrows.values().map(|e| e.total()).sum();
        let positions: Quote = self.position_escrows.values().map(|e| e.margin).sum();
        let accrued: Quote = self.commission_accrual.values().sum();
        orders.add(positions).add(accrued).add(self.reserve_balance)
    }

    pub fn asset(&self) -> &A {
        &self.asset
    }

    #[cfg(test)]
    pub(crate) fn asset_mut(&mut self) -> &mut A {
        &mut self.asset
    }

    fn credit_commission(&mut self, amount: Quote) {
        let receiver = self.commission_receiver;
        let balance = self.commission_of(receiver);
        self.commission_accrual.insert(receiver, balance.add(amount));
    }

    fn ensure_reserve_controller(&self, caller: AccountId) -> Result<(), CustodyError> {
        if caller != self.reserve_controller {
            return Err(CustodyError::Unauthorized(caller));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::InMemoryAsset;
    use rust_decimal::Decimal;

    const TRADER: AccountId = AccountId(1);
    const FEES: AccountId = AccountId(90);
    const LP: AccountId = AccountId(91);

    fn q(val: i64) -> Quote {
        Quote::new(Decimal::from(val))
    }

    fn custody(trader_funds: i64, reserve: i64) -> (CustodyLedger<InMemoryAsset>, EscrowAuthority) {
        let asset = InMemoryAsset::with_balances([
            (TRADER, Decimal::from(trader_funds)),
            (LP, Decimal::from(reserve)),
        ]);
        let mut custody = CustodyLedger::new(asset, FEES, LP);
        if reserve > 0 {
            custody.reserve_deposit(LP, q(reserve)).unwrap();
        }
        (custody, EscrowAuthority::issue())
    }

    fn assert_books_balance(custody: &CustodyLedger<InMemoryAsset>) {
        assert_eq!(custody.total_held(), custody.asset().custody_balance());
    }

    #[test]
    fn deposit_is_atomic() {
        let (mut custody, auth) = custody(104, 0);

        let err = custody
            .deposit_for_order(&auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert!(custody.order_escrow(OrderId(1)).is_none());
        assert_eq!(custody.asset().balance_of(TRADER), q(104));
        assert_books_balance(&custody);
    }

    #[test]
    fn deposit_rejects_id_collisions() {
        let (mut custody, auth) = custody(1000, 0);
        custody
            .deposit_for_order(&auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap();
        assert_eq!(
            custody.deposit_for_order(&auth, OrderId(1), TRADER, q(1), q(1)),
            Err(CustodyError::IdCollision(1))
        );

        custody
            .convert_order_to_position(&auth, OrderId(1), PositionId(7))
            .unwrap();
        assert_eq!(
            custody.deposit_for_order(&auth, OrderId(7), TRADER, q(1), q(1)),
            Err(CustodyError::IdCollision(7))
        );
        assert_books_balance(&custody);
    }

    #[test]
    fn refund_returns_everything() {
        let (mut custody, auth) = custody(1000, 0);
        custody
            .deposit_for_order(&auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap();
        assert_eq!(custody.asset().balance_of(TRADER), q(895));

        let escrow = custody.refund_order(&auth, OrderId(1)).unwrap();
        assert_eq!(escrow.total(), q(105));
        assert_eq!(custody.asset().balance_of(TRADER), q(1000));
        assert_eq!(
            custody.refund_order(&auth, OrderId(1)),
            Err(CustodyError::OrderNotFound(OrderId(1)))
        );
    }

    #[test]
    fn refund_push_failure_keeps_escrow() {
        let (mut custody, auth) = custody(1000, 0);
        custody
            .deposit_for_order(&auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap();
        custody.asset_mut().freeze(TRADER);

        assert!(custody.refund_order(&auth, OrderId(1)).is_err());
        assert_eq!(custody.order_escrow(OrderId(1)).unwrap().total(), q(105));
        assert_books_balance(&custody);
    }

    #[test]
    fn convert_carves_out_commission() {
        let (mut custody, auth) = custody(1000, 0);
        custody
            .deposit_for_order(&auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap();

        let position = custody
            .convert_order_to_position(&auth, OrderId(1), PositionId(50))
            .unwrap();

        assert_eq!(position.margin, q(100));
        assert_eq!(custody.commission_of(FEES), q(5));
        assert!(custody.order_escrow(OrderId(1)).is_none());
        assert_eq!(custody.asset().custody_balance(), q(105));
        assert_books_balance(&custody);
    }

    #[test]
    fn convert_errors() {
        let (mut custody, auth) = custody(1000, 0);
        assert_eq!(
            custody.convert_order_to_position(&auth, OrderId(1), PositionId(50)),
            Err(CustodyError::OrderNotFound(OrderId(1)))
        );

        custody
            .deposit_for_order(&auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap();
        custody
            .deposit_for_order(&auth, OrderId(2), TRADER, q(100), q(5))
            .unwrap();
        custody
            .convert_order_to_position(&auth, OrderId(1), PositionId(50))
            .unwrap();
        assert_eq!(
            custody.convert_order_to_position(&auth, OrderId(2), PositionId(50)),
            Err(CustodyError::PositionExists(PositionId(50)))
        );
        assert!(custody.order_escrow(OrderId(2)).is_some());
    }

    fn open_position(custody: &mut CustodyLedger<InMemoryAsset>, auth: &EscrowAuthority) {
        custody
            .deposit_for_order(auth, OrderId(1), TRADER, q(100), q(5))
            .unwrap();
        custody
            .convert_order_to_position(auth, OrderId(1), PositionId(50))
            .unwrap();
    }

    #[test]
    fn close_with_loss_inside_margin() {
        let (mut custody, auth) = custody(1000, 500);
        open_position(&mut custody, &auth);

        let s = custody
            .close_position(&auth, PositionId(50), q(-30), q(2))
            .unwrap();

        // 100 - 2 fee = 98; 30 to reserve; 68 back
        assert_eq!(s.to_reserve, q(30));
        assert_eq!(s.to_trader, q(68));
        assert_eq!(custody.reserve_balance(), q(530));
        assert_eq!(custody.commission_of(FEES), q(7));
        assert_eq!(custody.asset().balance_of(TRADER), q(895 + 68));
        assert!(custody.position_escrow(PositionId(50)).is_none());
        assert_books_balance(&custody);
    }

    #[test]
    fn close_with_loss_beyond_margin_caps_at_margin() {
        let (mut custody, auth) = custody(1000, 500);
        open_position(&mut custody, &auth);

        let s = custody
            .close_position(&auth, PositionId(50), q(-250), q(10))
            .unwrap();

        assert_eq!(s.to_reserve, q(90));
        assert_eq!(s.to_trader, Quote::zero());
        assert_eq!(s.uncollected_loss, q(160));
        assert_eq!(custody.reserve_balance(), q(590));
        assert_eq!(custody.asset().balance_of(TRADER), q(895));
        assert_books_balance(&custody);
    }

    #[test]
    fn close_with_profit_draws_reserve() {
        let (mut custody, auth) = custody(1000, 500);
        open_position(&mut custody, &auth);

        let s = custody
            .close_position(&auth, PositionId(50), q(40), q(1))
            .unwrap();

        assert_eq!(s.from_reserve, q(40));
        assert_eq!(s.to_trader, q(139));
        assert_eq!(custody.reserve_balance(), q(460));
        assert_books_balance(&custody);
    }

    #[test]
    fn close_flat_returns_margin_after_fee() {
        let (mut custody, auth) = custody(1000, 0);
        open_position(&mut custody, &auth);

        let s = custody
            .close_position(&auth, PositionId(50), Quote::zero(), q(3))
            .unwrap();
        assert_eq!(s.to_trader, q(97));
        assert_books_balance(&custody);
    }

    #[test]
    fn insolvent_close_changes_nothing() {
        let (mut custody, auth) = custody(1000, 40);
        open_position(&mut custody, &auth);

        let err = custody
            .close_position(&auth, PositionId(50), q(50), q(1))
            .unwrap_err();

        assert_eq!(
            err,
            CustodyError::ReserveInsufficient {
                available: q(40),
                required: q(50)
            }
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(custody.reserve_balance(), q(40));
        assert_eq!(custody.commission_of(FEES), q(5));
        assert_eq!(custody.position_escrow(PositionId(50)).unwrap().margin, q(100));
        assert_books_balance(&custody);
    }

    #[test]
    fn fee_exceeding_margin_rejected() {
        let (mut custody, auth) = custody(1000, 0);
        open_position(&mut custody, &auth);

        assert_eq!(
            custody.close_position(&auth, PositionId(50), Quote::zero(), q(101)),
            Err(CustodyError::FeeExceedsMargin {
                fee: q(101),
                margin: q(100)
            })
        );
        assert!(custody.position_escrow(PositionId(50)).is_some());
    }

    #[test]
    fn close_push_failure_restores_books() {
        let (mut custody, auth) = custody(1000, 500);
        open_position(&mut custody, &auth);
        custody.asset_mut().freeze(TRADER);

        assert!(custody
            .close_position(&auth, PositionId(50), q(40), q(1))
            .is_err());

        assert_eq!(custody.reserve_balance(), q(500));
        assert_eq!(custody.commission_of(FEES), q(5));
        assert!(custody.position_escrow(PositionId(50)).is_some());
        assert_books_balance(&custody);
    }

    #[test]
    fn commission_withdrawal() {
        let (mut custody, auth) = custody(1000, 0);
        open_position(&mut custody, &auth);

        assert!(matches!(
            custody.withdraw_commission(FEES, q(6)),
            Err(CustodyError::CommissionInsufficient { .. })
        ));

        let remaining = custody.withdraw_commission(FEES, q(4)).unwrap();
        assert_eq!(remaining, q(1));
        assert_eq!(custody.asset().balance_of(FEES), q(4));
        assert_books_balance(&custody);
    }

    #[test]
    fn reserve_is_controller_gated() {
        let (mut custody, _) = custody(1000, 100);

        assert_eq!(
            custody.reserve_withdraw(TRADER, q(1)),
            Err(CustodyError::Unauthorized(TRADER))
        );
        assert!(matches!(
            custody.reserve_withdraw(LP, q(101)),
            Err(CustodyError::ReserveInsufficient { .. })
        ));
        assert_eq!(custody.reserve_withdraw(LP, q(60)).unwrap(), q(40));
        assert_eq!(custody.asset().balance_of(LP), q(60));
        assert_books_balance(&custody);
    }
}
