// 11.0: every state change produces an event. consumed by off-core indexers,
// never read back by the core itself. the EventPayload enum lists all event types.

use crate::order::ClOrdKind;
use crate::position::DerivedOrder;
use crate::types::{
    AccountId, AssetId, ClOrdId, Leverage, OrderId, PositionId, Price, Quote, Side, Timestamp,
};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Order events
    OrderCreated(OrderCreatedEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderConverted(OrderConvertedEvent),

    // Position events
    PositionCreated(PositionCreatedEvent),
    PositionClosed(PositionClosedEvent),
    PositionDeleted(PositionDeletedEvent),
    CloseRequested(DerivedOrder),

    // Trigger events
    DerivedOrder(DerivedOrder),
    TriggerCancelled(TriggerCancelledEvent),

    // Custody events
    CommissionWithdrawn(FundsMovedEvent),
    ReserveFunded(FundsMovedEvent),
    ReserveWithdrawn(FundsMovedEvent),

    // Attestation events
    FillAdmitted(FillAdmittedEvent),
    SignerChanged(SignerChangedEvent),
    UpstreamChanged(UpstreamChangedEvent),
    OwnershipTransferred(OwnershipTransferredEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub cl_ord_id: ClOrdId,
    pub owner: AccountId,
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    pub leverage: Leverage,
    pub margin: Quote,
    pub commission: Quote,
    pub target_price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub cl_ord_id: ClOrdId,
    pub owner: AccountId,
    pub refunded: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConvertedEvent {
    pub order_id: OrderId,
    pub cl_ord_id: ClOrdId,
    pub position_id: PositionId,
    pub commission: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCreatedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub asset: AssetId,
    pub side: Side,
    pub lots: u64,
    pub leverage: Leverage,
    pub margin: Quote,
    pub open_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub pnl: Quote,
    pub closing_commission: Quote,
    pub paid_to_trader: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionDeletedEvent {
    pub position_id: PositionId,
    pub owner: AccountId,
    // escrow left behind in custody, no settlement happened
    pub abandoned_margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCancelledEvent {
    pub cl_ord_id: ClOrdId,
    pub kind: ClOrdKind,
    pub position_id: PositionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsMovedEvent {
    pub account_id: AccountId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillAdmittedEvent {
    pub order_id: OrderId,
    pub price: Price,
    pub side: Side,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerChangedEvent {
    pub previous: Address,
    pub current: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamChangedEvent {
    pub target: String,
    pub previous: Address,
    pub current: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipTransferredEvent {
    pub previous: AccountId,
    pub current: AccountId,
}

/// Bounded, id-stamped event buffer. Oldest events are dropped once
/// `max_events` is exceeded.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn emit(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;

        tracing::trace!(event_id = id.0, ?payload, "event");
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(0..drain_count);
        }
        id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100_000)
    }
}
