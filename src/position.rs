// 4.0: open positions and the trigger orders hanging off them.
// a position holds margin in custody until it is closed (settled) or deleted.

use crate::order::{ClOrdKind, Order};
use crate::types::{AccountId, AssetId, ClOrdId, Leverage, PositionId, Price, Quote, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: AccountId,
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    pub leverage: Leverage,
    pub margin: Quote,
    pub open_price: Price,
    pub opened_at: Timestamp,
    // set once a market close has been requested
    pub close_request: Option<ClOrdId>,
}

impl Position {
    pub fn from_order(id: PositionId, order: &Order, open_price: Price, opened_at: Timestamp) -> Self {
        Self {
            id,
            owner: order.owner,
            asset: order.asset,
            side: order.side,
            lots: order.lots,
            leverage: order.leverage,
            margin: order.margin,
            open_price,
            opened_at,
            close_request: None,
        }
    }

    pub fn close_requested(&self) -> bool {
        self.close_request.is_some()
    }

    pub fn hours_held(&self, now: Timestamp) -> Decimal {
        self.opened_at.elapsed_hours(&now)
    }
}

/// A live trigger: its client order id and the price it fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub cl_ord_id: ClOrdId,
    pub price: Price,
}

/// SL/TP/LIQ slots of one position. Kept apart from the position record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTriggers {
    pub stop_loss: Option<Trigger>,
    pub take_profit: Option<Trigger>,
    pub liquidation: Option<Trigger>,
}

impl PositionTriggers {
    pub fn get(&self, kind: ClOrdKind) -> Option<Trigger> {
        match kind {
            ClOrdKind::StopLoss => self.stop_loss,
            ClOrdKind::TakeProfit => self.take_profit,
            ClOrdKind::Liquidation => self.liquidation,
            ClOrdKind::Open | ClOrdKind::MarketClose => None,
        }
    }

    // None for kinds that have no slot
    pub(crate) fn slot_mut(&mut self, kind: ClOrdKind) -> Option<&mut Option<Trigger>> {
        match kind {
            ClOrdKind::StopLoss => Some(&mut self.stop_loss),
            ClOrdKind::TakeProfit => Some(&mut self.take_profit),
            ClOrdKind::Liquidation => Some(&mut self.liquidation),
            ClOrdKind::Open | ClOrdKind::MarketClose => None,
        }
    }

    pub fn live(&self) -> Vec<(ClOrdKind, Trigger)> {
        [
            (ClOrdKind::StopLoss, self.stop_loss),
            (ClOrdKind::TakeProfit, self.take_profit),
            (ClOrdKind::Liquidation, self.liquidation),
        ]
        .into_iter()
        .filter_map(|(kind, trigger)| trigger.map(|t| (kind, t)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stop_loss.is_none() && self.take_profit.is_none() && self.liquidation.is_none()
    }
}

/// A closing order derived from a position: a trigger placement or a market
/// close request. Always trades against the position's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedOrder {
    pub cl_ord_id: ClOrdId,
    pub kind: ClOrdKind,
    pub position_id: PositionId,
    pub owner: AccountId,
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    // None = at market
    pub target_price: Option<Price>,
}

impl DerivedOrder {
    pub fn against(position: &Position, cl_ord_id: ClOrdId, kind: ClOrdKind, target_price: Option<Price>) -> Self {
        Self {
            cl_ord_id,
            kind,
            position_id: position.id,
            owner: position.owner,
            asset: position.asset,
            side: position.side.opposite(),
            lots: position.lots,
            target_price,
        }
    }
}

/// Position detail with its trigger prices, for front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    pub position: Position,
    pub triggers: PositionTriggers,
}

impl PositionView {
    pub fn stop_loss(&self) -> Option<Price> {
        self.triggers.stop_loss.map(|t| t.price)
    }

    pub fn take_profit(&self) -> Option<Price> {
        self.triggers.take_profit.map(|t| t.price)
    }

    pub fn liquidation_price(&self) -> Option<Price> {
        self.triggers.liquidation.map(|t| t.price)
    }
}
