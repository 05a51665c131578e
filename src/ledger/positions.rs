//! Position lifecycle: triggers, market close requests, settlement, deletion,
//! plus the custody pass-throughs that emit events.

use super::core::{index_remove, Ledger};
use super::results::LedgerError;
use crate::asset::ExternalAsset;
use crate::custody::CloseSettlement;
use crate::events::{
    EventPayload, FundsMovedEvent, PositionClosedEvent, PositionDeletedEvent, TriggerCancelledEvent,
};
use crate::order::ClOrdKind;
use crate::position::{DerivedOrder, Position, Trigger};
use crate::types::{AccountId, ClOrdId, PositionId, Price, Quote};
use tracing::{debug, info, warn};

impl<A: ExternalAsset> Ledger<A> {
    // allocates a clOrdId for a trigger slot and emits the derived closing order
    pub(super) fn place_trigger(&mut self, position: &Position, kind: ClOrdKind, price: Price) -> DerivedOrder {
        let cl_ord_id = self.take_cl_ord_id();
        self.cl_ord_kinds.insert(cl_ord_id, kind);
        self.cl_ord_positions.insert(cl_ord_id, position.id);

        let slots = self.triggers.entry(position.id).or_default();
        if let Some(slot) = slots.slot_mut(kind) {
            *slot = Some(Trigger { cl_ord_id, price });
        }

        let derived = DerivedOrder::against(position, cl_ord_id, kind, Some(price));
        debug!(
            position_id = position.id.0,
            cl_ord_id = cl_ord_id.0,
            kind = ?kind,
            %price,
            "trigger placed"
        );
        self.emit_event(EventPayload::DerivedOrder(derived.clone()));
        derived
    }

    fn cancel_trigger(&mut self, position_id: PositionId, kind: ClOrdKind) -> Option<Trigger> {
        let trigger = self
            .triggers
            .get_mut(&position_id)
            .and_then(|slots| slots.slot_mut(kind))
            .and_then(Option::take)?;

        self.retire_cl_ord_id(trigger.cl_ord_id);
        debug!(position_id = position_id.0, cl_ord_id = trigger.cl_ord_id.0, kind = ?kind, "trigger cancelled");
        self.emit_event(EventPayload::TriggerCancelled(TriggerCancelledEvent {
            cl_ord_id: trigger.cl_ord_id,
            kind,
            position_id,
        }));
        Some(trigger)
    }

    // cancel then replace; None clears the slot
    fn replace_trigger(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        kind: ClOrdKind,
        new_price: Option<Price>,
    ) -> Result<Option<ClOrdId>, LedgerError> {
        let position = self
            .positions
            .get(&position_id)
            .cloned()
            .ok_or(LedgerError::PositionNotFound(position_id))?;
        Self::ensure_owner(caller, position.owner)?;

        self.cancel_trigger(position_id, kind);
        Ok(new_price.map(|price| self.place_trigger(&position, kind, price).cl_ord_id))
    }

    pub fn update_stop_loss(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        new_price: Option<Price>,
    ) -> Result<Option<ClOrdId>, LedgerError> {
        self.replace_trigger(caller, position_id, ClOrdKind::StopLoss, new_price)
    }

    pub fn update_take_profit(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        new_price: Option<Price>,
    ) -> Result<Option<ClOrdId>, LedgerError> {
        self.replace_trigger(caller, position_id, ClOrdKind::TakeProfit, new_price)
    }

    /// Emits an opposite-side market order for the position. Once per position.
    pub fn request_close_on_market(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
    ) -> Result<DerivedOrder, LedgerError> {
        let position = self
            .positions
            .get(&position_id)
            .ok_or(LedgerError::PositionNotFound(position_id))?;
        Self::ensure_owner(caller, position.owner)?;
        if position.close_requested() {
            return Err(LedgerError::AlreadyRequested(position_id));
        }

        let cl_ord_id = self.take_cl_ord_id();
        self.cl_ord_kinds.insert(cl_ord_id, ClOrdKind::MarketClose);
        self.cl_ord_positions.insert(cl_ord_id, position_id);

        let position = self
            .positions
            .get_mut(&position_id)
            .ok_or(LedgerError::PositionNotFound(position_id))?;
        position.close_request = Some(cl_ord_id);
        let derived = DerivedOrder::against(position, cl_ord_id, ClOrdKind::MarketClose, None);

        info!(position_id = position_id.0, cl_ord_id = cl_ord_id.0, "market close requested");
        self.emit_event(EventPayload::CloseRequested(derived.clone()));
        Ok(derived)
    }

    /// Settles a position through custody. If custody refuses (insolvent
    /// reserve, fee above margin) the position and its triggers stay as they were.
    pub fn close_position(
        &mut self,
        position_id: PositionId,
        pnl: Quote,
        closing_commission: Quote,
    ) -> Result<CloseSettlement, LedgerError> {
        if !self.positions.contains_key(&position_id) {
            return Err(LedgerError::PositionNotFound(position_id));
        }

        let settlement = self
            .custody
            .close_position(&self.authority, position_id, pnl, closing_commission)?;
        let position = self.retire_position(position_id)?;

        info!(
            position_id = position_id.0,
            owner = position.owner.0,
            %pnl,
            paid = %settlement.to_trader,
            "position closed"
        );
        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id,
            owner: position.owner,
            pnl,
            closing_commission,
            paid_to_trader: settlement.to_trader,
        }));
        Ok(settlement)
    }

    /// Drops a position without settling it. The margin stays escrowed in
    /// custody under the position id and is reported as abandoned.
    pub fn delete_position(&mut self, position_id: PositionId) -> Result<Position, LedgerError> {
        let position = self.retire_position(position_id)?;
        let abandoned_margin = self
            .custody
            .position_escrow(position_id)
            .map(|escrow| escrow.margin)
            .unwrap_or_else(Quote::zero);

        warn!(
            position_id = position_id.0,
            owner = position.owner.0,
            %abandoned_margin,
            "position deleted without settlement"
        );
        self.emit_event(EventPayload::PositionDeleted(PositionDeletedEvent {
            position_id,
            owner: position.owner,
            abandoned_margin,
        }));
        Ok(position)
    }

    // cancels every trigger and any market-close clOrdId, then drops the record
    fn retire_position(&mut self, position_id: PositionId) -> Result<Position, LedgerError> {
        let position = self
            .positions
            .remove(&position_id)
            .ok_or(LedgerError::PositionNotFound(position_id))?;

        for kind in [ClOrdKind::StopLoss, ClOrdKind::TakeProfit, ClOrdKind::Liquidation] {
            self.cancel_trigger(position_id, kind);
        }
        if let Some(cl_ord_id) = position.close_request {
            self.retire_cl_ord_id(cl_ord_id);
            self.emit_event(EventPayload::TriggerCancelled(TriggerCancelledEvent {
                cl_ord_id,
                kind: ClOrdKind::MarketClose,
                position_id,
            }));
        }

        self.triggers.remove(&position_id);
        index_remove(&mut self.owner_positions, &position.owner, &position_id);
        Ok(position)
    }

    pub fn withdraw_commission(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, LedgerError> {
        let new_balance = self.custody.withdraw_commission(caller, amount)?;
        info!(account = caller.0, %amount, %new_balance, "commission withdrawn");
        self.emit_event(EventPayload::CommissionWithdrawn(FundsMovedEvent {
            account_id: caller,
            amount,
            new_balance,
        }));
        Ok(new_balance)
    }

    pub fn reserve_deposit(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, LedgerError> {
        let new_balance = self.custody.reserve_deposit(caller, amount)?;
        info!(account = caller.0, %amount, %new_balance, "reserve funded");
        self.emit_event(EventPayload::ReserveFunded(FundsMovedEvent {
            account_id: caller,
            amount,
            new_balance,
        }));
        Ok(new_balance)
    }

    pub fn reserve_withdraw(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, LedgerError> {
        let new_balance = self.custody.reserve_withdraw(caller, amount)?;
        info!(account = caller.0, %amount, %new_balance, "reserve withdrawn");
        self.emit_event(EventPayload::ReserveWithdrawn(FundsMovedEvent {
            account_id: caller,
            amount,
            new_balance,
        }));
        Ok(new_balance)
    }
}
