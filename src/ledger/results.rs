// 8.0.2: result types and errors for ledger operations.

use crate::custody::CustodyError;
use crate::error::ErrorKind;
use crate::position::DerivedOrder;
use crate::types::{AccountId, OrderId, PositionId, Price};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub order_id: OrderId,
    pub position_id: PositionId,
    pub open_price: Price,
    // SL, TP, LIQ placements, in that order, skipping unset ones
    pub derived: Vec<DerivedOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Caller {caller:?} does not own this record (owner {owner:?})")]
    Unauthorized { caller: AccountId, owner: AccountId },

    #[error("Market close already requested for position {0}")]
    AlreadyRequested(PositionId),

    #[error("Order size must be at least one lot")]
    ZeroLots,

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::OrderNotFound(_) | LedgerError::PositionNotFound(_) => ErrorKind::NotFound,
            LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LedgerError::AlreadyRequested(_) => ErrorKind::AlreadyRequested,
            LedgerError::ZeroLots => ErrorKind::InvalidInput,
            LedgerError::Custody(e) => e.kind(),
        }
    }
}
