// 14.0: error taxonomy shared by every component. each module keeps its own
// thiserror enum and maps it onto one of these kinds so callers can branch on
// the class of rejection without matching every variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of a rejected operation. None of these are transient: the operation
/// was rolled back and retrying it unchanged fails the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Order, position or escrow record absent.
    NotFound,
    /// Caller is not the identity the operation requires.
    Unauthorized,
    /// Identifier already taken.
    AlreadyExists,
    /// Fill attestation replay.
    AlreadyUsed,
    /// Duplicate market-close request.
    AlreadyRequested,
    /// Asset not listed, zero leverage, non-positive price, closed market.
    InvalidConfig,
    /// Reserve, margin, accrual or external balance too low.
    InsufficientFunds,
    /// Signature does not recover to the authorized signer.
    BadSignature,
    /// Malformed request (zero lots, attestation/order mismatch).
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::AlreadyUsed => "already_used",
            ErrorKind::AlreadyRequested => "already_requested",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::BadSignature => "bad_signature",
            ErrorKind::InvalidInput => "invalid_input",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(ErrorKind::InsufficientFunds.to_string(), "insufficient_funds");
        assert_eq!(ErrorKind::AlreadyUsed.to_string(), "already_used");
    }
}
