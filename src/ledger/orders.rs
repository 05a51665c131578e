//! Order lifecycle: create, cancel, convert into a position.

use super::core::{index_insert, index_remove, Ledger};
use super::results::{ConversionResult, LedgerError};
use crate::asset::ExternalAsset;
use crate::events::{EventPayload, OrderCancelledEvent, OrderConvertedEvent, OrderCreatedEvent, PositionCreatedEvent};
use crate::order::{ClOrdKind, Order, OrderRequest};
use crate::position::{Position, PositionTriggers};
use crate::types::{AccountId, OrderId, Price, Quote};
use tracing::{debug, info};

impl<A: ExternalAsset> Ledger<A> {
    /// Opens an order and escrows its margin + commission. If the deposit
    /// fails nothing is recorded and no id is consumed.
    pub fn create_order(&mut self, owner: AccountId, request: OrderRequest) -> Result<OrderId, LedgerError> {
        if request.lots == 0 {
            return Err(LedgerError::ZeroLots);
        }

        let order_id = self.peek_order_id();
        self.custody.deposit_for_order(
            &self.authority,
            order_id,
            owner,
            request.margin,
            request.commission,
        )?;

        let order_id = self.take_order_id();
        let cl_ord_id = self.take_cl_ord_id();
        let order = Order::from_request(order_id, cl_ord_id, owner, request, self.current_time);

        self.cl_ord_kinds.insert(cl_ord_id, ClOrdKind::Open);
        self.cl_ord_orders.insert(cl_ord_id, order_id);
        index_insert(&mut self.owner_orders, owner, order_id);

        info!(
            order_id = order_id.0,
            cl_ord_id = cl_ord_id.0,
            owner = owner.0,
            asset = order.asset.0,
            side = ?order.side,
            lots = order.lots,
            margin = %order.margin,
            commission = %order.commission,
            "order created"
        );

        self.emit_event(EventPayload::OrderCreated(OrderCreatedEvent {
            order_id,
            cl_ord_id,
            owner,
            asset: order.asset,
            side: order.side,
            lots: order.lots,
            leverage: order.leverage,
            margin: order.margin,
            commission: order.commission,
            target_price: order.target_price,
        }));

        self.orders.insert(order_id, order);
        Ok(order_id)
    }

    /// Cancels an open order and refunds its escrow. Owner only.
    pub fn cancel_order(&mut self, caller: AccountId, order_id: OrderId) -> Result<Quote, LedgerError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        Self::ensure_owner(caller, order.owner)?;

        let escrow = self.custody.refund_order(&self.authority, order_id)?;
        let refunded = escrow.total();

        let order = self.retire_order(order_id)?;

        info!(order_id = order_id.0, owner = order.owner.0, %refunded, "order cancelled");
        self.emit_event(EventPayload::OrderCancelled(OrderCancelledEvent {
            order_id,
            cl_ord_id: order.cl_ord_id,
            owner: order.owner,
            refunded,
        }));

        Ok(refunded)
    }

    /// Turns an order into a position at an already verified execution price.
    /// Every trigger price set on the order becomes a derived closing order.
    pub fn convert_order(&mut self, order_id: OrderId, execution_price: Price) -> Result<ConversionResult, LedgerError> {
        let order = self
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(LedgerError::OrderNotFound(order_id))?;

        let position_id = self.peek_position_id();
        self.custody
            .convert_order_to_position(&self.authority, order_id, position_id)?;
        let position_id = self.take_position_id();

        let position = Position::from_order(position_id, &order, execution_price, self.current_time);
        index_insert(&mut self.owner_positions, position.owner, position_id);
        self.triggers.insert(position_id, PositionTriggers::default());

        info!(
            order_id = order_id.0,
            position_id = position_id.0,
            open_price = %execution_price,
            "order converted"
        );
        self.emit_event(EventPayload::PositionCreated(PositionCreatedEvent {
            position_id,
            owner: position.owner,
            asset: position.asset,
            side: position.side,
            lots: position.lots,
            leverage: position.leverage,
            margin: position.margin,
            open_price: execution_price,
        }));

        let mut derived = Vec::new();
        for (kind, price) in order.trigger_prices() {
            if let Some(price) = price {
                derived.push(self.place_trigger(&position, kind, price));
            }
        }
        self.positions.insert(position_id, position);

        self.retire_order(order_id)?;
        self.emit_event(EventPayload::OrderConverted(OrderConvertedEvent {
            order_id,
            cl_ord_id: order.cl_ord_id,
            position_id,
            commission: order.commission,
        }));

        Ok(ConversionResult {
            order_id,
            position_id,
            open_price: execution_price,
            derived,
        })
    }

    // drops the order record, its clOrdId and its index entry
    fn retire_order(&mut self, order_id: OrderId) -> Result<Order, LedgerError> {
        let order = self
            .orders
            .remove(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        self.retire_cl_ord_id(order.cl_ord_id);
        index_remove(&mut self.owner_orders, &order.owner, &order_id);
        debug!(order_id = order_id.0, cl_ord_id = order.cl_ord_id.0, "order retired");
        Ok(order)
    }
}
