// 7.0 config.rs: admin-owned rate tables. lot fractions, commission rates,
// funding rates, leverage caps, market open flags.
// 7.1 ConfigStore wraps a snapshot with an admin gate and a version counter.
// the core only ever reads a snapshot; nothing here is global.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ErrorKind;
use crate::types::{AccountId, AssetId, MarketId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Caller {0:?} is not the config admin")]
    Unauthorized(AccountId),

    #[error("Lot fraction denominator must be non-zero")]
    ZeroLotDenominator,

    #[error("Market {0:?} is not configured")]
    MarketNotListed(MarketId),

    #[error("Asset {0:?} is not listed")]
    AssetNotListed(AssetId),

    #[error("Max leverage must be non-zero")]
    ZeroMaxLeverage,

    #[error("Commission rate {0} out of range")]
    InvalidCommissionRate(Decimal),

    #[error("Config parse error: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Unauthorized(_) => ErrorKind::Unauthorized,
            ConfigError::Parse(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::InvalidConfig,
        }
    }
}

/// Lots to raw quantity: `quantity = lots * numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotFraction {
    pub numerator: u64,
    pub denominator: u64,
}

impl LotFraction {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, ConfigError> {
        if denominator == 0 {
            return Err(ConfigError::ZeroLotDenominator);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    // fraction of notional, 0.0005 = 5 bps
    pub commission_rate: Decimal,
    pub max_leverage: u32,
    pub open: bool,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(5, 4),
            max_leverage: 50,
            open: true,
        }
    }
}

/// Read-only view of the admin tables handed to the calculator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    pub lots: HashMap<AssetId, LotFraction>,
    pub asset_markets: HashMap<AssetId, MarketId>,
    pub markets: HashMap<MarketId, MarketParams>,
    // signed, per hour. positive = longs pay
    pub funding_rates: HashMap<AssetId, Decimal>,
}

impl VenueConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: VenueConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for lot in self.lots.values() {
            if lot.denominator == 0 {
                return Err(ConfigError::ZeroLotDenominator);
            }
        }
        for market in self.asset_markets.values() {
            if !self.markets.contains_key(market) {
                return Err(ConfigError::MarketNotListed(*market));
            }
        }
        for params in self.markets.values() {
            validate_market_params(params)?;
        }
        Ok(())
    }

    pub fn lot_fraction(&self, asset: AssetId) -> Option<LotFraction> {
        self.lots.get(&asset).copied()
    }

    pub fn market_of(&self, asset: AssetId) -> Option<MarketId> {
        self.asset_markets.get(&asset).copied()
    }

    pub fn market(&self, market: MarketId) -> Option<&MarketParams> {
        self.markets.get(&market)
    }

    pub fn market_for_asset(&self, asset: AssetId) -> Option<(MarketId, &MarketParams)> {
        let market_id = self.market_of(asset)?;
        self.markets.get(&market_id).map(|p| (market_id, p))
    }

    // unset means no funding is charged for the asset
    pub fn funding_rate(&self, asset: AssetId) -> Decimal {
        self.funding_rates.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }
}

fn validate_market_params(params: &MarketParams) -> Result<(), ConfigError> {
    if params.max_leverage == 0 {
        return Err(ConfigError::ZeroMaxLeverage);
    }
    if params.commission_rate < Decimal::ZERO || params.commission_rate >= Decimal::ONE {
        return Err(ConfigError::InvalidCommissionRate(params.commission_rate));
    }
    Ok(())
}

/** 7.2: versioned, admin-gated store. writers copy-on-write the snapshot so
readers holding an older Arc keep a consistent view */
#[derive(Debug, Clone)]
pub struct ConfigStore {
    admin: AccountId,
    version: u64,
    current: Arc<VenueConfig>,
}

impl ConfigStore {
    pub fn new(admin: AccountId, initial: VenueConfig) -> Result<Self, ConfigError> {
        initial.validate()?;
        Ok(Self {
            admin,
            version: 1,
            current: Arc::new(initial),
        })
    }

    pub fn admin(&self) -> AccountId {
        self.admin
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> Arc<VenueConfig> {
        Arc::clone(&self.current)
    }

    pub fn get(&self) -> &VenueConfig {
        &self.current
    }

    pub fn set_market(
        &mut self,
        caller: AccountId,
        market: MarketId,
        params: MarketParams,
    ) -> Result<(), ConfigError> {
        self.ensure_admin(caller)?;
        validate_market_params(&params)?;
        self.write(|c| {
            c.markets.insert(market, params);
        });
        tracing::info!(market = market.0, version = self.version, "market configured");
        Ok(())
    }

    pub fn list_asset(
        &mut self,
        caller: AccountId,
        asset: AssetId,
        market: MarketId,
        lots: LotFraction,
    ) -> Result<(), ConfigError> {
        self.ensure_admin(caller)?;
        if lots.denominator == 0 {
            return Err(ConfigError::ZeroLotDenominator);
        }
        if !self.current.markets.contains_key(&market) {
            return Err(ConfigError::MarketNotListed(market));
        }
        self.write(|c| {
            c.lots.insert(asset, lots);
            c.asset_markets.insert(asset, market);
        });
        tracing::info!(asset = asset.0, market = market.0, version = self.version, "asset listed");
        Ok(())
    }

    pub fn set_commission_rate(
        &mut self,
        caller: AccountId,
        market: MarketId,
        rate: Decimal,
    ) -> Result<(), ConfigError> {
        self.update_market(caller, market, |p| p.commission_rate = rate)
    }

    pub fn set_max_leverage(
        &mut self,
        caller: AccountId,
        market: MarketId,
        max_leverage: u32,
    ) -> Result<(), ConfigError> {
        self.update_market(caller, market, |p| p.max_leverage = max_leverage)
    }

    pub fn set_market_open(
        &mut self,
        caller: AccountId,
        market: MarketId,
        open: bool,
    ) -> Result<(), ConfigError> {
        self.update_market(caller, market, |p| p.open = open)
    }

    pub fn set_funding_rate(
        &mut self,
        caller: AccountId,
        asset: AssetId,
        rate_per_hour: Decimal,
    ) -> Result<(), ConfigError> {
        self.ensure_admin(caller)?;
        if !self.current.lots.contains_key(&asset) {
            return Err(ConfigError::AssetNotListed(asset));
        }
        self.write(|c| {
            c.funding_rates.insert(asset, rate_per_hour);
        });
        tracing::info!(asset = asset.0, %rate_per_hour, version = self.version, "funding rate set");
        Ok(())
    }

    pub fn transfer_admin(&mut self, caller: AccountId, new_admin: AccountId) -> Result<(), ConfigError> {
        self.ensure_admin(caller)?;
        tracing::info!(from = self.admin.0, to = new_admin.0, "config admin transferred");
        self.admin = new_admin;
        Ok(())
    }

    fn update_market(
        &mut self,
        caller: AccountId,
        market: MarketId,
        apply: impl FnOnce(&mut MarketParams),
    ) -> Result<(), ConfigError> {
        self.ensure_admin(caller)?;
        let mut params = self
            .current
            .markets
            .get(&market)
            .cloned()
            .ok_or(ConfigError::MarketNotListed(market))?;
        apply(&mut params);
        validate_market_params(&params)?;
        self.write(|c| {
            c.markets.insert(market, params);
        });
        tracing::info!(market = market.0, version = self.version, "market params updated");
        Ok(())
    }

    fn ensure_admin(&self, caller: AccountId) -> Result<(), ConfigError> {
        if caller != self.admin {
            return Err(ConfigError::Unauthorized(caller));
        }
        Ok(())
    }

    fn write(&mut self, apply: impl FnOnce(&mut VenueConfig)) {
        apply(Arc::make_mut(&mut self.current));
        self.version += 1;
    }
}
