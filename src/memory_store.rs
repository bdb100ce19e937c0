use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::{Rc, Weak};

use jigsync_core::{decode_value, encode_value, StorePath, StoreValue};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{DisconnectAction, RealtimeStore, StoreCallback, StoreChange, Subscription};

pub type ConnectionId = u64;

struct Entry {
    seq: u64,
    bytes: Vec<u8>,
}

struct SubscriptionEntry {
    id: u64,
    connection: ConnectionId,
    path: StorePath,
    callback: StoreCallback,
}

struct Delivery {
    subscription: u64,
    path: StorePath,
    bytes: Option<Vec<u8>>,
    seq: u64,
}

struct ConnectionState {
    open: bool,
    reachable: bool,
    disconnect_actions: Vec<(StorePath, DisconnectAction)>,
}

#[derive(Default)]
struct HubState {
    data: BTreeMap<StorePath, Entry>,
    seq: u64,
    next_subscription: u64,
    next_connection: ConnectionId,
    subscriptions: Vec<SubscriptionEntry>,
    pending: VecDeque<Delivery>,
    connections: HashMap<ConnectionId, ConnectionState>,
}

impl HubState {
    fn apply_write(&mut self, path: &StorePath, bytes: Option<Vec<u8>>) -> u64 {
        self.seq += 1;
        let seq = self.seq;
        self.data
            .retain(|existing, _| !(existing.is_within(path) && existing != path));
        match bytes.as_ref() {
            Some(bytes) => {
                self.data.insert(
                    path.clone(),
                    Entry {
                        seq,
                        bytes: bytes.clone(),
                    },
                );
            }
            None => {
                self.data.remove(path);
            }
        }
        for sub in &self.subscriptions {
            if path.is_within(&sub.path) || sub.path.is_within(path) {
                self.pending.push_back(Delivery {
                    subscription: sub.id,
                    path: path.clone(),
                    bytes: bytes.clone(),
                    seq,
                });
            }
        }
        seq
    }

    fn check_connection(&self, connection: ConnectionId) -> Result<(), StoreError> {
        match self.connections.get(&connection) {
            Some(state) if !state.open => Err(StoreError::Closed),
            Some(state) if !state.reachable => Err(StoreError::Unreachable),
            Some(_) => Ok(()),
            None => Err(StoreError::Closed),
        }
    }

    fn run_disconnect_action(&mut self, path: &StorePath, action: DisconnectAction) {
        match action {
            DisconnectAction::Write(value) => match encode_value(&value) {
                Some(bytes) => {
                    self.apply_write(path, Some(bytes));
                }
                None => warn!(%path, "disconnect action value failed to encode"),
            },
            DisconnectAction::Remove => {
                self.apply_write(path, None);
            }
            DisconnectAction::MarkOffline => {
                let current = self
                    .data
                    .get(path)
                    .and_then(|entry| decode_value(&entry.bytes));
                let Some(StoreValue::Player(mut player)) = current else {
                    return;
                };
                player.is_online = false;
                if let Some(bytes) = encode_value(&StoreValue::Player(player)) {
                    self.apply_write(path, Some(bytes));
                }
            }
        }
    }
}

/// In-process realtime store shared by any number of connections. Writes are
/// applied immediately in a single global order; deliveries to subscribers
/// queue up until [`MemoryHub::flush`], which stands in for network latency.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) -> MemoryStore {
        let mut state = self.state.borrow_mut();
        state.next_connection += 1;
        let connection = state.next_connection;
        state.connections.insert(
            connection,
            ConnectionState {
                open: true,
                reachable: true,
                disconnect_actions: Vec::new(),
            },
        );
        MemoryStore {
            hub: Rc::downgrade(&self.state),
            connection,
        }
    }

    /// Delivers every queued change, including ones queued by callbacks
    /// during the flush. Returns the number delivered.
    pub fn flush(&self) -> usize {
        self.flush_limit(usize::MAX)
    }

    pub fn flush_limit(&self, limit: usize) -> usize {
        let mut delivered = 0;
        while delivered < limit {
            let next = {
                let mut state = self.state.borrow_mut();
                let Some(delivery) = state.pending.pop_front() else {
                    break;
                };
                let callback = state
                    .subscriptions
                    .iter()
                    .find(|sub| sub.id == delivery.subscription)
                    .map(|sub| sub.callback.clone());
                callback.map(|callback| (callback, delivery))
            };
            let Some((callback, delivery)) = next else {
                continue;
            };
            let value = match delivery.bytes {
                Some(bytes) => match decode_value(&bytes) {
                    Some(value) => Some(value),
                    None => {
                        warn!(path = %delivery.path, "dropping undecodable store value");
                        continue;
                    }
                },
                None => None,
            };
            callback(StoreChange {
                path: delivery.path,
                value,
                seq: delivery.seq,
            });
            delivered += 1;
        }
        delivered
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn read(&self, path: &StorePath) -> Option<StoreValue> {
        let state = self.state.borrow();
        state
            .data
            .get(path)
            .and_then(|entry| decode_value(&entry.bytes))
    }

    /// Every stored value under `path`, in write order.
    pub fn read_tree(&self, path: &StorePath) -> Vec<(StorePath, StoreValue)> {
        let state = self.state.borrow();
        let mut entries: Vec<(u64, StorePath, StoreValue)> = state
            .data
            .iter()
            .filter(|(key, _)| key.is_within(path))
            .filter_map(|(key, entry)| {
                decode_value(&entry.bytes).map(|value| (entry.seq, key.clone(), value))
            })
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries
            .into_iter()
            .map(|(_, key, value)| (key, value))
            .collect()
    }

    /// Simulates a connection going silent: its subscriptions stop and the
    /// store runs the disconnect actions it registered.
    pub fn drop_connection(&self, connection: ConnectionId) {
        let mut state = self.state.borrow_mut();
        let actions = match state.connections.get_mut(&connection) {
            Some(conn) if conn.open => {
                conn.open = false;
                std::mem::take(&mut conn.disconnect_actions)
            }
            _ => return,
        };
        state.subscriptions.retain(|sub| sub.connection != connection);
        debug!(connection, actions = actions.len(), "connection dropped");
        for (path, action) in actions {
            state.run_disconnect_action(&path, action);
        }
    }

    pub fn set_reachable(&self, connection: ConnectionId, reachable: bool) {
        if let Some(conn) = self.state.borrow_mut().connections.get_mut(&connection) {
            conn.reachable = reachable;
        }
    }
}

/// One client's connection to a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryStore {
    hub: Weak<RefCell<HubState>>,
    connection: ConnectionId,
}

impl MemoryStore {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    fn hub(&self) -> Result<Rc<RefCell<HubState>>, StoreError> {
        self.hub.upgrade().ok_or(StoreError::Closed)
    }
}

impl RealtimeStore for MemoryStore {
    fn write(&self, path: &StorePath, value: StoreValue) -> Result<(), StoreError> {
        let hub = self.hub()?;
        let mut state = hub.borrow_mut();
        state.check_connection(self.connection)?;
        let bytes = encode_value(&value).ok_or(StoreError::Codec(value.kind()))?;
        let seq = state.apply_write(path, Some(bytes));
        debug!(%path, kind = value.kind(), seq, "store write");
        Ok(())
    }

    fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        let hub = self.hub()?;
        let mut state = hub.borrow_mut();
        state.check_connection(self.connection)?;
        state.apply_write(path, None);
        Ok(())
    }

    fn read(&self, path: &StorePath) -> Result<Option<StoreValue>, StoreError> {
        let hub = self.hub()?;
        let state = hub.borrow();
        state.check_connection(self.connection)?;
        match state.data.get(path) {
            Some(entry) => decode_value(&entry.bytes)
                .map(Some)
                .ok_or(StoreError::Codec("stored value")),
            None => Ok(None),
        }
    }

    fn subscribe(
        &self,
        path: &StorePath,
        callback: StoreCallback,
    ) -> Result<Subscription, StoreError> {
        let hub = self.hub()?;
        let mut state = hub.borrow_mut();
        state
            .check_connection(self.connection)
            .map_err(|_| StoreError::SubscriptionRejected(path.to_string()))?;
        state.next_subscription += 1;
        let id = state.next_subscription;
        let mut existing: Vec<Delivery> = state
            .data
            .iter()
            .filter(|(key, _)| key.is_within(path))
            .map(|(key, entry)| Delivery {
                subscription: id,
                path: key.clone(),
                bytes: Some(entry.bytes.clone()),
                seq: entry.seq,
            })
            .collect();
        existing.sort_by_key(|delivery| delivery.seq);
        state.pending.extend(existing);
        state.subscriptions.push(SubscriptionEntry {
            id,
            connection: self.connection,
            path: path.clone(),
            callback,
        });
        let weak = Rc::downgrade(&hub);
        Ok(Subscription::new(move || {
            if let Some(hub) = weak.upgrade() {
                hub.borrow_mut().subscriptions.retain(|sub| sub.id != id);
            }
        }))
    }

    fn register_disconnect_action(
        &self,
        path: &StorePath,
        action: DisconnectAction,
    ) -> Result<(), StoreError> {
        let hub = self.hub()?;
        let mut state = hub.borrow_mut();
        state.check_connection(self.connection)?;
        if let Some(conn) = state.connections.get_mut(&self.connection) {
            conn.disconnect_actions.push((path.clone(), action));
        }
        Ok(())
    }

    fn cancel_disconnect_actions(&self, path: &StorePath) -> Result<(), StoreError> {
        let hub = self.hub()?;
        let mut state = hub.borrow_mut();
        state.check_connection(self.connection)?;
        if let Some(conn) = state.connections.get_mut(&self.connection) {
            conn.disconnect_actions.retain(|(existing, _)| existing != path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use jigsync_core::{ClientId, PlayerRecord, SessionId};

    use super::*;

    fn session() -> SessionId {
        SessionId::parse("MemHub0001").unwrap()
    }

    fn recorder() -> (Rc<RefCell<Vec<StoreChange>>>, StoreCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Rc::new(move |change| sink.borrow_mut().push(change)))
    }

    fn player(online: bool) -> StoreValue {
        StoreValue::Player(PlayerRecord {
            id: ClientId::new(1),
            name: "ada".to_string(),
            is_host: false,
            is_online: online,
            last_active: 5,
        })
    }

    #[test]
    fn read_returns_the_value_at_the_exact_path() {
        let hub = MemoryHub::new();
        let store = hub.connect();
        let timer = StorePath::timer(&session());
        assert_eq!(store.read(&timer), Ok(None));
        store.write(&timer, StoreValue::Timer(42)).unwrap();
        assert_eq!(store.read(&timer), Ok(Some(StoreValue::Timer(42))));
        assert_eq!(store.read(&StorePath::session(&session())), Ok(None));
        hub.set_reachable(store.connection_id(), false);
        assert_eq!(store.read(&timer), Err(StoreError::Unreachable));
    }

    #[test]
    fn deliveries_wait_for_flush() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        let b = hub.connect();
        let (seen, callback) = recorder();
        let _sub = b.subscribe(&StorePath::timer(&session()), callback).unwrap();
        a.write(&StorePath::timer(&session()), StoreValue::Timer(10))
            .unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(hub.flush(), 1);
        assert_eq!(seen.borrow()[0].value, Some(StoreValue::Timer(10)));
    }

    #[test]
    fn subscribe_replays_existing_values_in_write_order() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        let id = session();
        a.write(&StorePath::progress(&id), StoreValue::Timer(1)).unwrap();
        a.write(&StorePath::timer(&id), StoreValue::Timer(2)).unwrap();
        let (seen, callback) = recorder();
        let _sub = a.subscribe(&StorePath::session(&id), callback).unwrap();
        hub.flush();
        let seqs: Vec<u64> = seen.borrow().iter().map(|change| change.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn writing_a_parent_replaces_children() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        let id = session();
        let child = StorePath::pieces(&id).child("0_0");
        a.write(&child, StoreValue::Timer(1)).unwrap();
        a.write(&StorePath::pieces(&id), StoreValue::Timer(2)).unwrap();
        assert_eq!(hub.read(&child), None);
        assert_eq!(hub.read(&StorePath::pieces(&id)), Some(StoreValue::Timer(2)));
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        let (seen, callback) = recorder();
        let sub = a.subscribe(&StorePath::timer(&session()), callback).unwrap();
        a.write(&StorePath::timer(&session()), StoreValue::Timer(1)).unwrap();
        drop(sub);
        hub.flush();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn unreachable_connection_fails_writes() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        hub.set_reachable(a.connection_id(), false);
        let err = a
            .write(&StorePath::timer(&session()), StoreValue::Timer(1))
            .unwrap_err();
        assert_eq!(err, StoreError::Unreachable);
        let (_, callback) = recorder();
        assert!(matches!(
            a.subscribe(&StorePath::timer(&session()), callback),
            Err(StoreError::SubscriptionRejected(_))
        ));
    }

    #[test]
    fn drop_connection_runs_mark_offline() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        let path = StorePath::player(&session(), ClientId::new(1));
        a.write(&path, player(true)).unwrap();
        a.register_disconnect_action(&path, DisconnectAction::MarkOffline)
            .unwrap();
        hub.drop_connection(a.connection_id());
        assert_eq!(hub.read(&path), Some(player(false)));
        assert_eq!(
            a.write(&path, player(true)).unwrap_err(),
            StoreError::Closed
        );
    }

    #[test]
    fn cancelled_disconnect_action_does_not_fire() {
        let hub = MemoryHub::new();
        let a = hub.connect();
        let path = StorePath::player(&session(), ClientId::new(1));
        a.write(&path, player(true)).unwrap();
        a.register_disconnect_action(&path, DisconnectAction::Remove)
            .unwrap();
        a.cancel_disconnect_actions(&path).unwrap();
        hub.drop_connection(a.connection_id());
        assert_eq!(hub.read(&path), Some(player(true)));
    }
}
