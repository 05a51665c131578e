// 9.0 oracle.rs: how the core receives reference prices. the source could be
// pyth, chainlink or a cex aggregator; the core only needs one sample per asset
// and re-expresses it in the 18-digit price domain regardless of source decimals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::types::{AssetId, Price};

/// A single sample as reported by the source, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSample {
    pub price: i128,
    pub decimals: u32,
    pub timestamp: i64,
    pub round: u64,
}

impl OracleSample {
    pub fn new(price: i128, decimals: u32, timestamp: i64, round: u64) -> Self {
        Self {
            price,
            decimals,
            timestamp,
            round,
        }
    }

    /// Re-expresses the raw sample with 18 fractional digits.
    pub fn normalized(&self, asset: AssetId) -> Result<Price, OracleError> {
        if self.price <= 0 {
            return Err(OracleError::NoPrice(asset));
        }
        // rust_decimal carries at most 28 fractional digits
        if self.decimals > 28 {
            return Err(OracleError::UnsupportedDecimals(self.decimals));
        }
        let raw = Decimal::try_from_i128_with_scale(self.price, self.decimals)
            .map_err(|_| OracleError::UnsupportedDecimals(self.decimals))?;

        // digits past the 18th are truncated; a dust price that truncates to zero is no price
        Price::new(raw).ok_or(OracleError::NoPrice(asset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("No positive price for asset {0:?}")]
    NoPrice(AssetId),

    #[error("Unsupported price decimals {0}")]
    UnsupportedDecimals(u32),

    #[error("Sample for {asset:?} at {timestamp} is not newer than {last}")]
    NonMonotonic {
        asset: AssetId,
        timestamp: i64,
        last: i64,
    },
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::NoPrice(_) | OracleError::UnsupportedDecimals(_) => ErrorKind::InvalidConfig,
            OracleError::NonMonotonic { .. } => ErrorKind::InvalidInput,
        }
    }
}

/// External price source, keyed by asset (or pair) id.
pub trait PriceOracle {
    fn get_price(&self, asset: AssetId) -> Option<OracleSample>;
}

impl<T: PriceOracle + ?Sized> PriceOracle for &T {
    fn get_price(&self, asset: AssetId) -> Option<OracleSample> {
        (**self).get_price(asset)
    }
}

/// Resolves an asset's latest sample into an 18-digit price.
pub fn fetch_price(oracle: &dyn PriceOracle, asset: AssetId) -> Result<Price, OracleError> {
    let sample = oracle.get_price(asset).ok_or(OracleError::NoPrice(asset))?;
    sample.normalized(asset)
}

// Latest-sample store. timestamps must strictly increase per asset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOracle {
    samples: HashMap<AssetId, OracleSample>,
}

impl InMemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, asset: AssetId, sample: OracleSample) -> Result<(), OracleError> {
        if let Some(last) = self.samples.get(&asset) {
            if sample.timestamp <= last.timestamp {
                return Err(OracleError::NonMonotonic {
                    asset,
                    timestamp: sample.timestamp,
                    last: last.timestamp,
                });
            }
        }
        self.samples.insert(asset, sample);
        Ok(())
    }

    pub fn latest(&self, asset: AssetId) -> Option<&OracleSample> {
        self.samples.get(&asset)
    }
}

impl PriceOracle for InMemoryOracle {
    fn get_price(&self, asset: AssetId) -> Option<OracleSample> {
        self.samples.get(&asset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BTC: AssetId = AssetId(1);

    #[test]
    fn normalizes_eight_decimal_feed() {
        // chainlink style: 50_000.12345678 with 8 decimals
        let sample = OracleSample::new(5_000_012_345_678, 8, 100, 1);
        let price = sample.normalized(BTC).unwrap();
        assert_eq!(price.value(), dec!(50000.12345678));
    }

    #[test]
    fn truncates_beyond_wad() {
        let sample = OracleSample::new(1_234_567_890_123_456_789_012, 21, 100, 1);
        let price = sample.normalized(BTC).unwrap();
        assert_eq!(price.value(), dec!(1.234567890123456789));
    }

    #[test]
    fn non_positive_is_no_price() {
        assert_eq!(
            OracleSample::new(0, 8, 1, 1).normalized(BTC),
            Err(OracleError::NoPrice(BTC))
        );
        assert_eq!(
            OracleSample::new(-10, 8, 1, 1).normalized(BTC),
            Err(OracleError::NoPrice(BTC))
        );
    }

    #[test]
    fn submit_enforces_monotonic_timestamps() {
        let mut oracle = InMemoryOracle::new();
        oracle.submit(BTC, OracleSample::new(100, 0, 10, 1)).unwrap();

        let err = oracle.submit(BTC, OracleSample::new(101, 0, 10, 2)).unwrap_err();
        assert!(matches!(err, OracleError::NonMonotonic { last: 10, .. }));

        oracle.submit(BTC, OracleSample::new(102, 0, 11, 3)).unwrap();
        assert_eq!(oracle.latest(BTC).unwrap().round, 3);
    }

    #[test]
    fn fetch_price_missing_asset() {
        let oracle = InMemoryOracle::new();
        assert_eq!(fetch_price(&oracle, BTC), Err(OracleError::NoPrice(BTC)));
    }
}
