//! Outbound delivery.
//!
//! The engine never talks to a transport directly. Every transition returns
//! [`Effects`]; the registry hands them to a [`Broadcaster`], which owns the
//! per-match groups of subscribed connections.

use crate::api::protocol::Outbound;
use crate::models::ConnectionId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{mpsc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Add the calling connection to the match's broadcast group
    Subscribe,
    /// Deliver to every member of the match's group
    Publish(Outbound),
    /// Deliver to the calling connection only
    Reply(Outbound),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects(Vec<Effect>);

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) {
        self.0.push(Effect::Subscribe);
    }

    pub fn publish(&mut self, message: Outbound) {
        self.0.push(Effect::Publish(message));
    }

    pub fn reply(&mut self, message: Outbound) {
        self.0.push(Effect::Reply(message));
    }

    pub fn extend(&mut self, other: Effects) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Effect> {
        self.0.iter()
    }

    /// Wire names of published messages, in order.
    pub fn published_events(&self) -> Vec<&'static str> {
        self.0
            .iter()
            .filter_map(|e| match e {
                Effect::Publish(m) => Some(m.event_name()),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> impl Iterator<Item = &Outbound> {
        self.0.iter().filter_map(|e| match e {
            Effect::Publish(m) => Some(m),
            _ => None,
        })
    }

    pub fn replies(&self) -> impl Iterator<Item = &Outbound> {
        self.0.iter().filter_map(|e| match e {
            Effect::Reply(m) => Some(m),
            _ => None,
        })
    }
}

impl IntoIterator for Effects {
    type Item = Effect;
    type IntoIter = std::vec::IntoIter<Effect>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Abstract publish/subscribe channel keyed by match code.
pub trait Broadcaster: Send + Sync {
    fn subscribe(&self, code: &str, conn: &ConnectionId);

    /// Remove a connection from every group.
    fn unsubscribe(&self, conn: &ConnectionId);

    fn publish(&self, code: &str, message: &Outbound);

    fn send_to(&self, conn: &ConnectionId, message: &Outbound);

    /// Apply one batch of effects raised by `conn` against match `code`.
    fn deliver(&self, code: &str, conn: &ConnectionId, effects: Effects) {
        for effect in effects {
            match effect {
                Effect::Subscribe => self.subscribe(code, conn),
                Effect::Publish(message) => self.publish(code, &message),
                Effect::Reply(message) => self.send_to(conn, &message),
            }
        }
    }
}

// ============================================
// LocalHub: in-process fan-out over mpsc
// ============================================

/// In-process broadcaster: each connection registers an mpsc receiver.
#[derive(Default)]
pub struct LocalHub {
    inner: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    senders: HashMap<ConnectionId, mpsc::Sender<Outbound>>,
    groups: HashMap<String, BTreeSet<ConnectionId>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and obtain its inbox.
    pub fn connect(&self, conn: ConnectionId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel();
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.senders.insert(conn, tx);
        rx
    }

    pub fn members(&self, code: &str) -> Vec<ConnectionId> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state
            .groups
            .get(code)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Broadcaster for LocalHub {
    fn subscribe(&self, code: &str, conn: &ConnectionId) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state
            .groups
            .entry(code.to_string())
            .or_default()
            .insert(conn.clone());
    }

    fn unsubscribe(&self, conn: &ConnectionId) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.senders.remove(conn);
        for group in state.groups.values_mut() {
            group.remove(conn);
        }
    }

    fn publish(&self, code: &str, message: &Outbound) {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(group) = state.groups.get(code) {
            for conn in group {
                if let Some(tx) = state.senders.get(conn) {
                    // A dropped receiver just means the peer is gone.
                    let _ = tx.send(message.clone());
                }
            }
        }
    }

    fn send_to(&self, conn: &ConnectionId, message: &Outbound) {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = state.senders.get(conn) {
            let _ = tx.send(message.clone());
        }
    }
}

// ============================================
// RecordingBroadcaster
// ============================================

/// Where a recorded message went.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Group(String),
    Direct(ConnectionId),
}

/// Captures every delivery in order. Used by tests and dry runs.
#[derive(Default)]
pub struct RecordingBroadcaster {
    log: Mutex<Vec<(Delivery, Outbound)>>,
    subscriptions: Mutex<Vec<(String, ConnectionId)>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(Delivery, Outbound)> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn subscriptions(&self) -> Vec<(String, ConnectionId)> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn subscribe(&self, code: &str, conn: &ConnectionId) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((code.to_string(), conn.clone()));
    }

    fn unsubscribe(&self, conn: &ConnectionId) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(_, c)| c != conn);
    }

    fn publish(&self, code: &str, message: &Outbound) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((Delivery::Group(code.to_string()), message.clone()));
    }

    fn send_to(&self, conn: &ConnectionId, message: &Outbound) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((Delivery::Direct(conn.clone()), message.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_fans_out_to_group_members_only() {
        let hub = LocalHub::new();
        let op = ConnectionId::new("op");
        let referee = ConnectionId::new("ref");
        let stranger = ConnectionId::new("x");
        let op_rx = hub.connect(op.clone());
        let ref_rx = hub.connect(referee.clone());
        let x_rx = hub.connect(stranger.clone());

        hub.subscribe("ABC", &op);
        hub.subscribe("ABC", &referee);
        hub.publish("ABC", &Outbound::ProceedMain);
        hub.send_to(&referee, &Outbound::notice("hi"));

        assert_eq!(op_rx.try_recv().unwrap(), Outbound::ProceedMain);
        assert!(op_rx.try_recv().is_err());
        assert_eq!(ref_rx.try_recv().unwrap(), Outbound::ProceedMain);
        assert_eq!(ref_rx.try_recv().unwrap(), Outbound::notice("hi"));
        assert!(x_rx.try_recv().is_err());

        hub.unsubscribe(&referee);
        assert_eq!(hub.members("ABC"), vec![op]);
    }

    #[test]
    fn deliver_routes_each_effect_kind() {
        let rec = RecordingBroadcaster::new();
        let conn = ConnectionId::new("c");
        let mut fx = Effects::new();
        fx.subscribe();
        fx.publish(Outbound::ProceedMain);
        fx.reply(Outbound::notice("only you"));
        assert_eq!(fx.published_events(), vec!["proceed_main"]);
        rec.deliver("M1", &conn, fx);

        assert_eq!(rec.subscriptions(), vec![("M1".to_string(), conn.clone())]);
        let log = rec.take();
        assert_eq!(log[0].0, Delivery::Group("M1".into()));
        assert_eq!(log[1], (Delivery::Direct(conn), Outbound::notice("only you")));
        assert!(rec.take().is_empty());
    }
}
