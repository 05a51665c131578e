// 9.4 verifier.rs: admits signed (orderId, price, side) fills, at most once per
// order. the digest is eip-712 over a fixed domain so a signature for one
// deployment cannot be replayed on another.

use ethers::signers::LocalWallet;
use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{Address, Signature, H256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::events::{
    Event, EventLog, EventPayload, FillAdmittedEvent, OwnershipTransferredEvent, SignerChangedEvent,
    UpstreamChangedEvent,
};
use crate::types::{AccountId, OrderId, Price, Side, Timestamp, WAD_DECIMALS};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Fill for order {0} already admitted")]
    AlreadyUsed(OrderId),

    #[error("Signature not from authorized signer {expected:?} (recovered {recovered:?})")]
    BadSigner {
        expected: Address,
        recovered: Option<Address>,
    },

    #[error("Caller {0:?} is not the verifier owner")]
    Unauthorized(AccountId),

    #[error("Could not encode fill digest: {0}")]
    Encoding(String),

    #[error("Could not sign fill: {0}")]
    Signing(String),
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::AlreadyUsed(_) => ErrorKind::AlreadyUsed,
            VerifyError::BadSigner { .. } => ErrorKind::BadSignature,
            VerifyError::Unauthorized(_) => ErrorKind::Unauthorized,
            VerifyError::Encoding(_) | VerifyError::Signing(_) => ErrorKind::InvalidInput,
        }
    }
}

/// EIP-712 domain the fill signatures are bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl FillDomain {
    pub fn new(name: impl Into<String>, version: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }
}

/// The signed statement: order `order_id` executed at `price` on `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillAttestation {
    pub order_id: OrderId,
    pub price: Price,
    pub side: Side,
}

impl FillAttestation {
    pub fn new(order_id: OrderId, price: Price, side: Side) -> Self {
        Self { order_id, price, side }
    }
}

/// Contracts the verifier reports to. Only tracked and announced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Upstream {
    Ledger,
    Custody,
}

impl Upstream {
    fn label(&self) -> &'static str {
        match self {
            Upstream::Ledger => "ledger",
            Upstream::Custody => "custody",
        }
    }
}

// price as the integer count of 1e-18 units
fn price_units(value: Decimal) -> Result<U256, VerifyError> {
    if value <= Decimal::ZERO || value.scale() > WAD_DECIMALS {
        return Err(VerifyError::Encoding(format!("price {value} is not a positive wad amount")));
    }
    let mantissa = value.mantissa().unsigned_abs();
    Ok(U256::from(mantissa) * U256::exp10((WAD_DECIMALS - value.scale()) as usize))
}

fn typed_fill(domain: &FillDomain, fill: &FillAttestation) -> Result<TypedData, VerifyError> {
    let td_json = serde_json::json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "Fill": [
                {"name": "orderId", "type": "uint256"},
                {"name": "price", "type": "uint256"},
                {"name": "side", "type": "uint8"}
            ]
        },
        "primaryType": "Fill",
        "domain": {
            "name": domain.name,
            "version": domain.version,
            "chainId": domain.chain_id,
            "verifyingContract": format!("{:?}", domain.verifying_contract)
        },
        "message": {
            "orderId": fill.order_id.0,
            "price": price_units(fill.price.value())?.to_string(),
            "side": fill.side.as_u8()
        }
    });
    serde_json::from_value(td_json).map_err(|e| VerifyError::Encoding(e.to_string()))
}

/// Domain-separated digest of a fill.
pub fn fill_digest(domain: &FillDomain, fill: &FillAttestation) -> Result<H256, VerifyError> {
    let typed = typed_fill(domain, fill)?;
    let digest = typed
        .encode_eip712()
        .map_err(|e| VerifyError::Encoding(e.to_string()))?;
    Ok(H256::from(digest))
}

/// Signs a fill the way an executor would.
pub fn sign_attestation(
    wallet: &LocalWallet,
    domain: &FillDomain,
    fill: &FillAttestation,
) -> Result<Signature, VerifyError> {
    let digest = fill_digest(domain, fill)?;
    wallet
        .sign_hash(digest)
        .map_err(|e| VerifyError::Signing(e.to_string()))
}

#[derive(Debug)]
pub struct FillVerifier {
    domain: FillDomain,
    signer: Address,
    owner: AccountId,
    ledger: Address,
    custody: Address,
    used: HashSet<OrderId>,
    events: EventLog,
    current_time: Timestamp,
}

impl FillVerifier {
    pub fn new(owner: AccountId, signer: Address, domain: FillDomain) -> Self {
        Self {
            domain,
            signer,
            owner,
            ledger: Address::zero(),
            custody: Address::zero(),
            used: HashSet::new(),
            events: EventLog::default(),
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    fn recover(&self, fill: &FillAttestation, signature: &Signature) -> Option<Address> {
        let digest = fill_digest(&self.domain, fill).ok()?;
        signature.recover(digest).ok()
    }

    /// True iff the signature recovers to the authorized signer. No state change.
    pub fn verify(&self, fill: &FillAttestation, signature: &Signature) -> bool {
        self.recover(fill, signature) == Some(self.signer)
    }

    /// Admits a fill. The order id is burned on success whatever the caller
    /// does next; a rejected fill burns nothing.
    pub fn admit(&mut self, fill: &FillAttestation, signature: &Signature) -> Result<FillAttestation, VerifyError> {
        if self.used.contains(&fill.order_id) {
            warn!(order_id = fill.order_id.0, "replayed fill rejected");
            return Err(VerifyError::AlreadyUsed(fill.order_id));
        }

        let recovered = self.recover(fill, signature);
        if recovered != Some(self.signer) {
            warn!(order_id = fill.order_id.0, ?recovered, "fill signature rejected");
            return Err(VerifyError::BadSigner {
                expected: self.signer,
                recovered,
            });
        }

        self.used.insert(fill.order_id);
        info!(order_id = fill.order_id.0, price = %fill.price, side = ?fill.side, "fill admitted");
        self.events.emit(
            self.current_time,
            EventPayload::FillAdmitted(FillAdmittedEvent {
                order_id: fill.order_id,
                price: fill.price,
                side: fill.side,
            }),
        );
        Ok(*fill)
    }

    pub fn is_used(&self, order_id: OrderId) -> bool {
        self.used.contains(&order_id)
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn domain(&self) -> &FillDomain {
        &self.domain
    }

    pub fn upstream(&self, target: Upstream) -> Address {
        match target {
            Upstream::Ledger => self.ledger,
            Upstream::Custody => self.custody,
        }
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn set_signer(&mut self, caller: AccountId, signer: Address) -> Result<(), VerifyError> {
        self.ensure_owner(caller)?;
        let previous = std::mem::replace(&mut self.signer, signer);
        info!(?previous, current = ?signer, "fill signer changed");
        self.events.emit(
            self.current_time,
            EventPayload::SignerChanged(SignerChangedEvent {
                previous,
                current: signer,
            }),
        );
        Ok(())
    }

    pub fn set_upstream(&mut self, caller: AccountId, target: Upstream, address: Address) -> Result<(), VerifyError> {
        self.ensure_owner(caller)?;
        let slot = match target {
            Upstream::Ledger => &mut self.ledger,
            Upstream::Custody => &mut self.custody,
        };
        let previous = std::mem::replace(slot, address);
        info!(target = target.label(), ?previous, current = ?address, "upstream changed");
        self.events.emit(
            self.current_time,
            EventPayload::UpstreamChanged(UpstreamChangedEvent {
                target: target.label().to_string(),
                previous,
                current: address,
            }),
        );
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: AccountId, new_owner: AccountId) -> Result<(), VerifyError> {
        self.ensure_owner(caller)?;
        let previous = std::mem::replace(&mut self.owner, new_owner);
        info!(previous = previous.0, current = new_owner.0, "verifier ownership transferred");
        self.events.emit(
            self.current_time,
            EventPayload::OwnershipTransferred(OwnershipTransferredEvent {
                previous,
                current: new_owner,
            }),
        );
        Ok(())
    }

    fn ensure_owner(&self, caller: AccountId) -> Result<(), VerifyError> {
        if caller != self.owner {
            return Err(VerifyError::Unauthorized(caller));
        }
        Ok(())
    }
}
