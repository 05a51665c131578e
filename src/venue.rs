// 12.0 venue.rs: the upstream caller. sizes orders with the calculator, drives
// the ledger, and gates conversions on admitted fills. enforces the admin and
// executor roles; the ledger itself only checks record ownership.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::asset::ExternalAsset;
use crate::calculator::{self, CalcError, Calculator, OrderPreview};
use crate::config::{ConfigError, ConfigStore};
use crate::custody::CloseSettlement;
use crate::error::ErrorKind;
use crate::ledger::{ConversionResult, Ledger, LedgerError};
use crate::oracle::PriceOracle;
use crate::order::OrderRequest;
use crate::position::{DerivedOrder, Position};
use crate::types::{AccountId, AssetId, ClOrdId, Leverage, OrderId, PositionId, Price, Quote, Side, Timestamp};
use crate::verifier::{FillAttestation, FillVerifier, VerifyError};
use ethers::types::Signature;

/// Every mutating entry point runs under this one lock.
pub type SharedVenue<A, O> = Arc<Mutex<Venue<A, O>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRoles {
    pub admin: AccountId,
    // closes positions at executed prices
    pub executor: AccountId,
}

/// A trader's order ticket, before sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    pub leverage: u32,
    // None = market order, priced from the oracle
    pub limit_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
}

impl OpenOrder {
    pub fn market(asset: AssetId, side: Side, lots: u64, leverage: u32) -> Self {
        Self {
            asset,
            side,
            lots,
            leverage,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Calculator error: {0}")]
    Calc(#[from] CalcError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Verifier error: {0}")]
    Verify(#[from] VerifyError),

    #[error("Caller {0:?} lacks the required role")]
    Unauthorized(AccountId),

    #[error("Order {order_id} is {order:?} but fill attests {attested:?}")]
    SideMismatch {
        order_id: OrderId,
        order: Side,
        attested: Side,
    },
}

impl VenueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VenueError::Config(e) => e.kind(),
            VenueError::Calc(e) => e.kind(),
            VenueError::Ledger(e) => e.kind(),
            VenueError::Verify(e) => e.kind(),
            VenueError::Unauthorized(_) => ErrorKind::Unauthorized,
            VenueError::SideMismatch { .. } => ErrorKind::InvalidInput,
        }
    }
}

#[derive(Debug)]
pub struct Venue<A: ExternalAsset, O: PriceOracle> {
    config: ConfigStore,
    ledger: Ledger<A>,
    verifier: FillVerifier,
    oracle: O,
    roles: VenueRoles,
}

impl<A: ExternalAsset, O: PriceOracle> Venue<A, O> {
    pub fn new(config: ConfigStore, ledger: Ledger<A>, verifier: FillVerifier, oracle: O, roles: VenueRoles) -> Self {
        Self {
            config,
            ledger,
            verifier,
            oracle,
            roles,
        }
    }

    pub fn into_shared(self) -> SharedVenue<A, O> {
        Arc::new(Mutex::new(self))
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.ledger.set_time(timestamp);
        self.verifier.set_time(timestamp);
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.ledger.advance_time(millis);
        self.verifier.set_time(self.ledger.time());
    }

    pub fn preview_order(
        &self,
        asset: AssetId,
        price: Decimal,
        lots: u64,
        leverage: u32,
    ) -> Result<OrderPreview, VenueError> {
        let calc = Calculator::new(self.config.get());
        Ok(calc.preview_order(&self.oracle, asset, price, lots, leverage)?)
    }

    /// Sizes the ticket, derives its liquidation price and escrows the order.
    pub fn open_order(&mut self, caller: AccountId, ticket: OpenOrder) -> Result<OrderId, VenueError> {
        let calc = Calculator::new(self.config.get());
        calc.validate_order(ticket.asset, ticket.leverage)?;
        let leverage = Leverage::new(ticket.leverage).ok_or(CalcError::BadLeverage)?;

        let limit = ticket.limit_price.map(|p| p.value()).unwrap_or(Decimal::ZERO);
        let preview = calc.preview_order(&self.oracle, ticket.asset, limit, ticket.lots, ticket.leverage)?;
        let liquidation = calculator::liquidation_price(preview.price, ticket.leverage, ticket.side)?;

        debug!(
            asset = ticket.asset.0,
            price = %preview.price,
            margin = %preview.margin,
            commission = %preview.commission,
            liquidation = %liquidation,
            "order sized"
        );

        let request = OrderRequest {
            asset: ticket.asset,
            side: ticket.side,
            lots: ticket.lots,
            leverage,
            margin: preview.margin,
            commission: preview.commission,
            stop_loss: ticket.stop_loss,
            take_profit: ticket.take_profit,
            liquidation_price: Some(liquidation),
            target_price: ticket.limit_price,
        };
        Ok(self.ledger.create_order(caller, request)?)
    }

    /// Admits the fill first, so its order id is spent even if conversion
    /// then fails.
    pub fn execute_fill(
        &mut self,
        fill: &FillAttestation,
        signature: &Signature,
    ) -> Result<ConversionResult, VenueError> {
        let admitted = self.verifier.admit(fill, signature)?;

        let order = self
            .ledger
            .order(admitted.order_id)
            .ok_or(LedgerError::OrderNotFound(admitted.order_id))?;
        if order.side != admitted.side {
            return Err(VenueError::SideMismatch {
                order_id: admitted.order_id,
                order: order.side,
                attested: admitted.side,
            });
        }

        Ok(self.ledger.convert_order(admitted.order_id, admitted.price)?)
    }

    /// Settles at `exit_price`: price pnl minus funding over whole hours held,
    /// less a closing commission on exit notional capped at the margin.
    pub fn close_position(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        exit_price: Price,
    ) -> Result<CloseSettlement, VenueError> {
        self.ensure_role(caller, self.roles.executor)?;
        let position = self
            .ledger
            .position(position_id)
            .cloned()
            .ok_or(LedgerError::PositionNotFound(position_id))?;

        let (pnl, commission) = self.close_terms(&position, exit_price)?;
        info!(
            position_id = position_id.0,
            exit = %exit_price,
            %pnl,
            %commission,
            "closing position"
        );
        Ok(self.ledger.close_position(position_id, pnl, commission)?)
    }

    // (net pnl, closing commission)
    fn close_terms(&self, position: &Position, exit_price: Price) -> Result<(Quote, Quote), VenueError> {
        let calc = Calculator::new(self.config.get());
        let quantity = calc.quantity(position.asset, position.lots)?;
        let price_pnl = calculator::pnl(position.side, quantity, position.open_price, exit_price)?;

        // signed so a positive rate is charged to longs and paid to shorts
        let open_notional = calculator::notional(quantity, position.open_price)?;
        let hours = position.hours_held(self.ledger.time());
        let funding = calc.funding_for_asset(position.asset, open_notional * position.side.sign(), hours)?;

        let exit_notional = calculator::notional(quantity, exit_price)?;
        let commission = calc
            .commission_for_asset(position.asset, exit_notional)?
            .min(position.margin);

        Ok((price_pnl.sub(funding), commission))
    }

    pub fn delete_position(&mut self, caller: AccountId, position_id: PositionId) -> Result<Position, VenueError> {
        self.ensure_role(caller, self.roles.admin)?;
        Ok(self.ledger.delete_position(position_id)?)
    }

    pub fn cancel_order(&mut self, caller: AccountId, order_id: OrderId) -> Result<Quote, VenueError> {
        Ok(self.ledger.cancel_order(caller, order_id)?)
    }

    pub fn update_stop_loss(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        price: Option<Price>,
    ) -> Result<Option<ClOrdId>, VenueError> {
        Ok(self.ledger.update_stop_loss(caller, position_id, price)?)
    }

    pub fn update_take_profit(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
        price: Option<Price>,
    ) -> Result<Option<ClOrdId>, VenueError> {
        Ok(self.ledger.update_take_profit(caller, position_id, price)?)
    }

    pub fn request_close_on_market(
        &mut self,
        caller: AccountId,
        position_id: PositionId,
    ) -> Result<DerivedOrder, VenueError> {
        Ok(self.ledger.request_close_on_market(caller, position_id)?)
    }

    pub fn withdraw_commission(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, VenueError> {
        Ok(self.ledger.withdraw_commission(caller, amount)?)
    }

    pub fn reserve_deposit(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, VenueError> {
        Ok(self.ledger.reserve_deposit(caller, amount)?)
    }

    pub fn reserve_withdraw(&mut self, caller: AccountId, amount: Quote) -> Result<Quote, VenueError> {
        Ok(self.ledger.reserve_withdraw(caller, amount)?)
    }

    /// Read-only. Orders convert only through [`Venue::execute_fill`] and
    /// positions close only through the role-checked entry points.
    ///
    /// ```compile_fail
    /// use perps_ledger::{InMemoryAsset, InMemoryOracle, OrderId, Price, Venue};
    ///
    /// fn convert_unattested(venue: &mut Venue<InMemoryAsset, InMemoryOracle>, price: Price) {
    ///     let _ = venue.ledger().convert_order(OrderId(1), price);
    /// }
    /// ```
    pub fn ledger(&self) -> &Ledger<A> {
        &self.ledger
    }

    pub fn verifier(&self) -> &FillVerifier {
        &self.verifier
    }

    pub fn verifier_mut(&mut self) -> &mut FillVerifier {
        &mut self.verifier
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn roles(&self) -> VenueRoles {
        self.roles
    }

    fn ensure_role(&self, caller: AccountId, required: AccountId) -> Result<(), VenueError> {
        if caller != required {
            return Err(VenueError::Unauthorized(caller));
        }
        Ok(())
    }
}
