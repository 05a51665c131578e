// perps-ledger: accounting core of a leveraged-trading venue.
// orders and positions, escrow and settlement against a liquidity reserve,
// fixed-point margin/commission/funding math, signed fill admission.
// deterministic; the only outside world is the oracle and the asset rail.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Side, Price (18dp), Quote (usd-6), Leverage
//   1.9  error.rs: ErrorKind taxonomy shared by every error enum
//   2.x  order.rs: orders awaiting a fill, ClOrdKind
//   3.x  calculator.rs: quantity, notional, margin, commission, funding, liq price
//   4.x  position.rs: position struct, trigger slots, derived closing orders
//   7.x  config.rs: admin rate tables, versioned ConfigStore
//   8.x  ledger/: order/position state machines, clOrdIds, owner indexes
//   9.0  oracle.rs: price source trait and decimals normalization
//   9.1  asset.rs: external fungible asset rail (pull/push)
//   9.2  custody.rs: escrow, commission accrual, liquidity reserve
//   9.4  verifier.rs: eip-712 fill attestations, at-most-once admission
//   11.x events.rs: state transition events for indexers
//   12.x venue.rs: orchestrator, roles, shared handle

// core accounting modules
pub mod calculator;
pub mod custody;
pub mod events;
pub mod ledger;
pub mod order;
pub mod position;
pub mod types;

// trust boundary
pub mod verifier;

// integration modules
pub mod asset;
pub mod config;
pub mod error;
pub mod oracle;
pub mod venue;

// re exports for convenience
pub use asset::{AssetError, ExternalAsset, InMemoryAsset};
pub use calculator::{CalcError, Calculator, OrderPreview, LIQUIDATION_LOSS_FRACTION};
pub use config::{ConfigError, ConfigStore, LotFraction, MarketParams, VenueConfig};
pub use custody::{CloseSettlement, CustodyError, CustodyLedger, OrderEscrow, PositionEscrow};
pub use error::ErrorKind;
pub use events::*;
pub use ledger::*;
pub use oracle::{fetch_price, InMemoryOracle, OracleError, OracleSample, PriceOracle};
pub use order::*;
pub use position::*;
pub use types::*;
pub use venue::{OpenOrder, SharedVenue, Venue, VenueError, VenueRoles};
pub use verifier::{
    fill_digest, sign_attestation, FillAttestation, FillDomain, FillVerifier, Upstream, VerifyError,
};
