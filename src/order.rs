//! Orders awaiting an attested fill.
//!
//! An order is created together with its escrow and lives until it is either
//! cancelled (escrow refunded) or converted into a position. There is no book
//! and no matching here; execution prices come from outside.

use crate::types::{AccountId, AssetId, ClOrdId, Leverage, OrderId, Price, Quote, Side, Timestamp};
use serde::{Deserialize, Serialize};

/// Why an order-like event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClOrdKind {
    /// A trader opening an order.
    Open = 0,
    TakeProfit = 1,
    StopLoss = 2,
    Liquidation = 3,
    /// Trader asked to close at market.
    MarketClose = 4,
}

impl ClOrdKind {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn is_trigger(&self) -> bool {
        !matches!(self, ClOrdKind::Open)
    }
}

/// What a caller supplies to open an order. Margin and commission are already
/// sized by the calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    pub leverage: Leverage,
    pub margin: Quote,
    pub commission: Quote,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub liquidation_price: Option<Price>,
    // None = market order
    pub target_price: Option<Price>,
}

impl OrderRequest {
    pub fn market(asset: AssetId, side: Side, lots: u64, leverage: Leverage, margin: Quote, commission: Quote) -> Self {
        Self {
            asset,
            side,
            lots,
            leverage,
            margin,
            commission,
            stop_loss: None,
            take_profit: None,
            liquidation_price: None,
            target_price: None,
        }
    }

    pub fn with_stop_loss(mut self, price: Price) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: Price) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_liquidation_price(mut self, price: Price) -> Self {
        self.liquidation_price = Some(price);
        self
    }

    pub fn with_target_price(mut self, price: Price) -> Self {
        self.target_price = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub cl_ord_id: ClOrdId,
    pub owner: AccountId,
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    pub leverage: Leverage,
    pub margin: Quote,
    pub commission: Quote,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub liquidation_price: Option<Price>,
    pub target_price: Option<Price>,
    pub created_at: Timestamp,
}

impl Order {
    pub fn from_request(
        id: OrderId,
        cl_ord_id: ClOrdId,
        owner: AccountId,
        request: OrderRequest,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            cl_ord_id,
            owner,
            asset: request.asset,
            side: request.side,
            lots: request.lots,
            leverage: request.leverage,
            margin: request.margin,
            commission: request.commission,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            liquidation_price: request.liquidation_price,
            target_price: request.target_price,
            created_at: timestamp,
        }
    }

    pub fn is_market(&self) -> bool {
        self.target_price.is_none()
    }

    /// Margin plus commission, the amount held in custody for this order.
    pub fn escrowed(&self) -> Quote {
        self.margin.add(self.commission)
    }

    // SL, TP, LIQ in the order they are placed at conversion
    pub fn trigger_prices(&self) -> [(ClOrdKind, Option<Price>); 3] {
        [
            (ClOrdKind::StopLoss, self.stop_loss),
            (ClOrdKind::TakeProfit, self.take_profit),
            (ClOrdKind::Liquidation, self.liquidation_price),
        ]
    }
}
