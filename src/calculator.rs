//! Pricing and risk calculator.
//!
//! Pure fixed-point math over the admin rate tables: lots to quantity,
//! notional, margin, commission, funding, liquidation price and pnl. Every
//! intermediate lives in the 18-digit domain; results that move money are
//! rounded to usd-6 in the direction that protects the venue:
//! margin and commission up, funding charged up and rebated toward zero,
//! trader pnl down.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::VenueConfig;
use crate::error::ErrorKind;
use crate::oracle::{fetch_price, OracleError, PriceOracle};
use crate::types::{to_wad, AssetId, Leverage, MarketId, Price, Quote, Side};

/// Share of margin a position may lose before its liquidation price is hit.
pub const LIQUIDATION_LOSS_FRACTION: Decimal = dec!(0.8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    #[error("Leverage must be non-zero")]
    BadLeverage,

    #[error("Asset {0:?} is not listed")]
    AssetNotListed(AssetId),

    #[error("No positive oracle price for asset {0:?}")]
    NoPrice(AssetId),

    #[error("Order price must be positive")]
    Price0,

    #[error("Market {0:?} is closed")]
    MarketClosed(MarketId),

    #[error("Leverage {requested}x above market cap {cap}x")]
    LeverageAboveCap { requested: u32, cap: u32 },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Oracle error: {0}")]
    Oracle(OracleError),
}

impl From<OracleError> for CalcError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::NoPrice(asset) => CalcError::NoPrice(asset),
            other => CalcError::Oracle(other),
        }
    }
}

impl CalcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalcError::Oracle(e) => e.kind(),
            _ => ErrorKind::InvalidConfig,
        }
    }
}

/// What an order at this price/size/leverage will escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPreview {
    pub price: Price,
    pub quantity: Decimal,
    pub notional: Decimal,
    pub commission: Quote,
    pub margin: Quote,
}

// 3.0: stateless per call, borrows the current config snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Calculator<'a> {
    config: &'a VenueConfig,
}

impl<'a> Calculator<'a> {
    pub fn new(config: &'a VenueConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VenueConfig {
        self.config
    }

    // 3.1: lots * numerator / denominator
    pub fn quantity(&self, asset: AssetId, lots: u64) -> Result<Decimal, CalcError> {
        let lot = self
            .config
            .lot_fraction(asset)
            .ok_or(CalcError::AssetNotListed(asset))?;

        let scaled = Decimal::from(lots)
            .checked_mul(Decimal::from(lot.numerator))
            .ok_or(CalcError::Overflow)?;
        let quantity = scaled
            .checked_div(Decimal::from(lot.denominator))
            .ok_or(CalcError::Overflow)?;
        Ok(to_wad(quantity))
    }

    pub fn commission_for_asset(&self, asset: AssetId, notional: Decimal) -> Result<Quote, CalcError> {
        let (_, params) = self
            .config
            .market_for_asset(asset)
            .ok_or(CalcError::AssetNotListed(asset))?;
        commission(notional, params.commission_rate)
    }

    pub fn funding_for_asset(
        &self,
        asset: AssetId,
        notional: Decimal,
        hours_held: Decimal,
    ) -> Result<Quote, CalcError> {
        if self.config.lot_fraction(asset).is_none() {
            return Err(CalcError::AssetNotListed(asset));
        }
        funding(notional, self.config.funding_rate(asset), hours_held)
    }

    /// Checks the admin gates an order must pass: market open, leverage within cap.
    pub fn validate_order(&self, asset: AssetId, leverage: u32) -> Result<MarketId, CalcError> {
        let (market_id, params) = self
            .config
            .market_for_asset(asset)
            .ok_or(CalcError::AssetNotListed(asset))?;

        if leverage == 0 {
            return Err(CalcError::BadLeverage);
        }
        if !params.open {
            return Err(CalcError::MarketClosed(market_id));
        }
        if leverage > params.max_leverage {
            return Err(CalcError::LeverageAboveCap {
                requested: leverage,
                cap: params.max_leverage,
            });
        }
        Ok(market_id)
    }

    /// Sizes an order. A zero `price` means market order: the oracle price is used.
    pub fn preview_order(
        &self,
        oracle: &dyn PriceOracle,
        asset: AssetId,
        price: Decimal,
        lots: u64,
        leverage: u32,
    ) -> Result<OrderPreview, CalcError> {
        if leverage == 0 {
            return Err(CalcError::BadLeverage);
        }
        if self.config.lot_fraction(asset).is_none() {
            return Err(CalcError::AssetNotListed(asset));
        }

        let price = if price.is_zero() {
            fetch_price(oracle, asset)?
        } else {
            Price::new(price).ok_or(CalcError::Price0)?
        };

        let quantity = self.quantity(asset, lots)?;
        let notional = notional(quantity, price)?;
        let commission = self.commission_for_asset(asset, notional)?;
        let margin = margin(notional, leverage)?;

        Ok(OrderPreview {
            price,
            quantity,
            notional,
            commission,
            margin,
        })
    }
}

// 3.2: quantity * price, both 18-digit
pub fn notional(quantity: Decimal, price: Price) -> Result<Decimal, CalcError> {
    quantity
        .checked_mul(price.value())
        .map(to_wad)
        .ok_or(CalcError::Overflow)
}

// 3.3: ceil(notional / leverage). margin * leverage >= notional always holds
pub fn margin(notional: Decimal, leverage: u32) -> Result<Quote, CalcError> {
    let leverage = Leverage::new(leverage).ok_or(CalcError::BadLeverage)?;
    let raw = notional
        .checked_div(leverage.as_decimal())
        .ok_or(CalcError::Overflow)?;
    Ok(Quote::round_up(raw))
}

// 3.4: notional * rate, rounded up
pub fn commission(notional: Decimal, rate: Decimal) -> Result<Quote, CalcError> {
    let raw = notional.checked_mul(rate).ok_or(CalcError::Overflow)?;
    Ok(Quote::round_up(raw))
}

// 3.5: notional * rate * hours. charges round up, rebates round toward zero
pub fn funding(notional: Decimal, rate_per_hour: Decimal, hours_held: Decimal) -> Result<Quote, CalcError> {
    let raw = notional
        .checked_mul(rate_per_hour)
        .and_then(|v| v.checked_mul(hours_held))
        .ok_or(CalcError::Overflow)?;

    if raw >= Decimal::ZERO {
        Ok(Quote::round_up(raw))
    } else {
        Ok(Quote::round_toward_zero(raw))
    }
}

/// 3.6: price at which the position has lost `LIQUIDATION_LOSS_FRACTION` of its margin.
/// delta = 0.8 / leverage; long = open * (1 - delta), short = open * (1 + delta).
pub fn liquidation_price(open_price: Price, leverage: u32, side: Side) -> Result<Price, CalcError> {
    let leverage = Leverage::new(leverage).ok_or(CalcError::BadLeverage)?;
    let delta = LIQUIDATION_LOSS_FRACTION / leverage.as_decimal();

    let factor = match side {
        Side::Long => Decimal::ONE - delta,
        Side::Short => Decimal::ONE + delta,
    };
    let liq = open_price
        .value()
        .checked_mul(factor)
        .ok_or(CalcError::Overflow)?;
    Price::new(liq).ok_or(CalcError::Price0)
}

// 3.7: realized pnl of closing at exit. profit rounds down, loss rounds up in magnitude
pub fn pnl(side: Side, quantity: Decimal, open_price: Price, exit_price: Price) -> Result<Quote, CalcError> {
    let price_move = exit_price.value() - open_price.value();
    let raw = quantity
        .checked_mul(price_move)
        .map(|v| v * side.sign())
        .ok_or(CalcError::Overflow)?;
    Ok(Quote::round_down(raw))
}
