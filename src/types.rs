// 1.0: all the primitives live here. ids, sides, prices, usd amounts, leverage, timestamps.
// each is a newtype so the compiler catches order-id/position-id mixups.
//
// two fixed-point domains: prices and notionals carry 18 fractional digits,
// anything that moves through custody is usd with 6 fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

// raised when a decoded value falls outside its type's domain
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("price must be positive after truncation to 18 decimals, got {0}")]
    NonPositivePrice(Decimal),
    #[error("leverage must be at least 1")]
    ZeroLeverage,
}

pub const WAD_DECIMALS: u32 = 18;
pub const USD_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

/// Client order id: tags why an order-like event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClOrdId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    // wire encoding used by fill attestations
    pub fn as_u8(&self) -> u8 {
        match self {
            Side::Long => 0,
            Side::Short => 1,
        }
    }
}

// 1.1: truncates to the 18-digit domain the way integer division would.
pub fn to_wad(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(WAD_DECIMALS, RoundingStrategy::ToZero)
}

// 1.2: price in usd per unit of asset, 18 fractional digits. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct Price(Decimal);

impl TryFrom<Decimal> for Price {
    type Error = ValueError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ValueError::NonPositivePrice(value))
    }
}

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        let value = to_wad(value);
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// 1.3: usd amount. margin, commission, pnl, balances all use this.
// signed: a pnl can be negative, escrowed amounts never are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quote(Decimal);

impl Quote {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Rounds an 18-digit value to usd-6 toward +inf.
    pub fn round_up(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(USD_DECIMALS, RoundingStrategy::ToPositiveInfinity))
    }

    /// Rounds an 18-digit value to usd-6 toward -inf.
    pub fn round_down(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(USD_DECIMALS, RoundingStrategy::ToNegativeInfinity))
    }

    pub fn round_toward_zero(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(USD_DECIMALS, RoundingStrategy::ToZero))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn add(&self, other: Quote) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: Quote) -> Self {
        Self(self.0 - other.0)
    }

    pub fn negate(&self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl PartialOrd for Quote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Quote {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(q))
    }
}

impl<'a> Sum<&'a Quote> for Quote {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(*q))
    }
}

// 1.4: leverage multiplier. whole numbers only, zero is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32")]
pub struct Leverage(u32);

impl TryFrom<u32> for Leverage {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ValueError::ZeroLeverage)
    }
}

impl Leverage {
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value > 0 {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

// 1.5: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    // whole hours between two timestamps, partial hours are not charged
    pub fn elapsed_hours(&self, later: &Timestamp) -> Decimal {
        let diff_ms = later.0.saturating_sub(self.0).max(0);
        Decimal::from(diff_ms / 3_600_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_truncates_to_wad() {
        let p = Price::new(dec!(1.1234567890123456789)).unwrap();
        assert_eq!(p.value(), dec!(1.123456789012345678));

        assert!(Price::new(Decimal::ZERO).is_none());
        assert!(Price::new(dec!(-5)).is_none());
        // below one wad unit truncates to zero
        assert!(Price::new(dec!(0.0000000000000000001)).is_none());
    }

    #[test]
    fn quote_rounding_directions() {
        assert_eq!(Quote::round_up(dec!(1.0000001)).value(), dec!(1.000001));
        assert_eq!(Quote::round_down(dec!(1.0000009)).value(), dec!(1.000000));
        assert_eq!(Quote::round_down(dec!(-1.0000001)).value(), dec!(-1.000001));
        assert_eq!(Quote::round_toward_zero(dec!(-1.0000009)).value(), dec!(-1.000000));
    }

    #[test]
    fn leverage_rejects_zero() {
        assert!(Leverage::new(0).is_none());
        assert_eq!(Leverage::new(5).unwrap().as_decimal(), dec!(5));
    }

    #[test]
    fn side_helpers() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.sign(), dec!(-1));
        assert_eq!(Side::Short.as_u8(), 1);
    }

    #[test]
    fn elapsed_hours_floors() {
        let t0 = Timestamp::from_millis(0);
        let t1 = Timestamp::from_millis(3 * 3_600_000 + 59 * 60_000);
        assert_eq!(t0.elapsed_hours(&t1), dec!(3));
        assert_eq!(t1.elapsed_hours(&t0), Decimal::ZERO);
    }

    #[test]
    fn elapsed_hours_saturates_at_the_extremes() {
        let first = Timestamp::from_millis(i64::MIN);
        let last = Timestamp::from_millis(i64::MAX);
        assert_eq!(first.elapsed_hours(&last), Decimal::from(i64::MAX / 3_600_000));
        assert_eq!(last.elapsed_hours(&first), Decimal::ZERO);
    }

    #[test]
    fn decoded_prices_are_validated() {
        for raw in [r#""-50000""#, r#""0""#, "0", r#""0.0000000000000000001""#] {
            assert!(serde_json::from_str::<Price>(raw).is_err(), "{raw} decoded");
        }
        assert_eq!(
            Price::try_from(dec!(-50000)),
            Err(ValueError::NonPositivePrice(dec!(-50000)))
        );

        let p: Price = serde_json::from_str(r#""50000.5""#).unwrap();
        assert_eq!(p, Price::new(dec!(50000.5)).unwrap());
        let back: Price = serde_json::from_str(&serde_json::to_string(&p).unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn decoded_leverage_is_validated() {
        assert!(serde_json::from_str::<Leverage>("0").is_err());
        assert_eq!(serde_json::from_str::<Leverage>("5").unwrap(), Leverage::new(5).unwrap());
    }
}
