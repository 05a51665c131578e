// 8.0 ledger/core.rs: main ledger. holds orders, positions, triggers, clOrdId
// mappings, owner indexes and the custody books.

use super::config::LedgerConfig;
use super::results::LedgerError;
use crate::asset::ExternalAsset;
use crate::custody::{CustodyLedger, EscrowAuthority};
use crate::events::{Event, EventLog, EventPayload};
use crate::order::{ClOrdKind, Order};
use crate::position::{Position, PositionTriggers, PositionView};
use crate::types::{AccountId, ClOrdId, OrderId, PositionId, Timestamp};
use std::collections::HashMap;
use std::hash::Hash;

/** 8.1: main ledger struct. all order/position state lives here */
#[derive(Debug)]
pub struct Ledger<A: ExternalAsset> {
    pub(super) config: LedgerConfig,
    pub(super) custody: CustodyLedger<A>,
    pub(super) authority: EscrowAuthority,
    pub(super) orders: HashMap<OrderId, Order>,
    pub(super) positions: HashMap<PositionId, Position>,
    pub(super) triggers: HashMap<PositionId, PositionTriggers>,
    pub(super) cl_ord_kinds: HashMap<ClOrdId, ClOrdKind>,
    pub(super) cl_ord_orders: HashMap<ClOrdId, OrderId>,
    pub(super) cl_ord_positions: HashMap<ClOrdId, PositionId>,
    pub(super) owner_orders: HashMap<AccountId, Vec<OrderId>>,
    pub(super) owner_positions: HashMap<AccountId, Vec<PositionId>>,
    pub(super) events: EventLog,
    pub(super) next_order_id: u64,
    pub(super) next_position_id: u64,
    pub(super) next_cl_ord_id: u64,
    pub(super) current_time: Timestamp,
}

impl<A: ExternalAsset> Ledger<A> {
    pub fn new(config: LedgerConfig, custody: CustodyLedger<A>) -> Self {
        let events = EventLog::new(config.max_events);
        let next_position_id = config.position_id_base;
        Self {
            config,
            custody,
            authority: EscrowAuthority::issue(),
            orders: HashMap::new(),
            positions: HashMap::new(),
            triggers: HashMap::new(),
            cl_ord_kinds: HashMap::new(),
            cl_ord_orders: HashMap::new(),
            cl_ord_positions: HashMap::new(),
            owner_orders: HashMap::new(),
            owner_positions: HashMap::new(),
            events,
            next_order_id: 1,
            next_position_id,
            next_cl_ord_id: 1,
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        let millis = self.current_time.as_millis().saturating_add(millis);
        self.current_time = Timestamp::from_millis(millis);
    }

    // ids are peeked before the fallible custody call and only taken once it succeeded

    pub(super) fn peek_order_id(&self) -> OrderId {
        OrderId(self.next_order_id)
    }

    pub(super) fn take_order_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    pub(super) fn peek_position_id(&self) -> PositionId {
        PositionId(self.next_position_id)
    }

    pub(super) fn take_position_id(&mut self) -> PositionId {
        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;
        id
    }

    pub(super) fn take_cl_ord_id(&mut self) -> ClOrdId {
        let id = ClOrdId(self.next_cl_ord_id);
        self.next_cl_ord_id += 1;
        id
    }

    pub(super) fn retire_cl_ord_id(&mut self, cl_ord_id: ClOrdId) {
        self.cl_ord_kinds.remove(&cl_ord_id);
        self.cl_ord_orders.remove(&cl_ord_id);
        self.cl_ord_positions.remove(&cl_ord_id);
    }

    pub(super) fn ensure_owner(caller: AccountId, owner: AccountId) -> Result<(), LedgerError> {
        if caller != owner {
            return Err(LedgerError::Unauthorized { caller, owner });
        }
        Ok(())
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        self.events.emit(self.current_time, payload);
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn position(&self, position_id: PositionId) -> Option<&Position> {
        self.positions.get(&position_id)
    }

    pub fn position_view(&self, position_id: PositionId) -> Option<PositionView> {
        let position = self.positions.get(&position_id)?.clone();
        let triggers = self.triggers.get(&position_id).cloned().unwrap_or_default();
        Some(PositionView { position, triggers })
    }

    pub fn position_triggers(&self, position_id: PositionId) -> Option<&PositionTriggers> {
        self.triggers.get(&position_id)
    }

    pub fn orders_of(&self, owner: AccountId) -> &[OrderId] {
        self.owner_orders.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn positions_of(&self, owner: AccountId) -> &[PositionId] {
        self.owner_positions.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cl_ord_kind(&self, cl_ord_id: ClOrdId) -> Option<ClOrdKind> {
        self.cl_ord_kinds.get(&cl_ord_id).copied()
    }

    pub fn cl_ord_order(&self, cl_ord_id: ClOrdId) -> Option<OrderId> {
        self.cl_ord_orders.get(&cl_ord_id).copied()
    }

    pub fn cl_ord_position(&self, cl_ord_id: ClOrdId) -> Option<PositionId> {
        self.cl_ord_positions.get(&cl_ord_id).copied()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn custody(&self) -> &CustodyLedger<A> {
        &self.custody
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        self.events.recent(count)
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

pub(super) fn index_insert<K: Eq + Hash, V>(index: &mut HashMap<K, Vec<V>>, owner: K, id: V) {
    index.entry(owner).or_default().push(id);
}

// swap-and-pop; callers only rely on membership
pub(super) fn index_remove<K: Eq + Hash, V: PartialEq>(index: &mut HashMap<K, Vec<V>>, owner: &K, id: &V) {
    if let Some(ids) = index.get_mut(owner) {
        if let Some(pos) = ids.iter().position(|x| x == id) {
            ids.swap_remove(pos);
        }
        if ids.is_empty() {
            index.remove(owner);
        }
    }
}
