use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type UserId = i64;
pub type RoomId = String;
pub type ConnectionId = Uuid;

/// Sender half of a connection's outbound channel. Cloning one lets any part
/// of the system push a frame to that client; the connection's writer task
/// owns the matching receiver.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// A live connection picked as a delivery target.
#[derive(Clone)]
pub struct Recipient {
    pub connection_id: ConnectionId,
    pub sender: ConnectionSender,
}

struct Connection {
    user_id: UserId,
    sender: ConnectionSender,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, Connection>,
    /// roomId -> member connections. A room with zero members has no entry.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

/// Shared registry of live connections and room membership.
///
/// Both tables sit behind a single lock so that disconnect cleanup is atomic
/// with respect to a concurrent fan-out reading `members_of` for the same
/// room: a recipient snapshot is taken either entirely before or entirely
/// after a connection is torn down, never halfway.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly opened connection for `user_id`. A user may hold
    /// any number of simultaneous connections. On a connection-id collision
    /// the existing registration wins.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        sender: ConnectionSender,
    ) -> Result<(), HubError> {
        let mut inner = self.lock();
        if inner.connections.contains_key(&connection_id) {
            return Err(HubError::DuplicateConnection(connection_id));
        }
        inner.connections.insert(
            connection_id,
            Connection {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Tear down a connection: remove it from every room it had joined and
    /// drop it from the registry, in one critical section. Returns the rooms
    /// it was a member of.
    pub fn unregister(&self, connection_id: ConnectionId) -> Result<HashSet<RoomId>, HubError> {
        let mut inner = self.lock();
        let conn = inner
            .connections
            .remove(&connection_id)
            .ok_or(HubError::UnknownConnection(connection_id))?;
        for room_id in &conn.rooms {
            let emptied = match inner.rooms.get_mut(room_id) {
                Some(members) => {
                    members.remove(&connection_id);
                    members.is_empty()
                }
                None => false,
            };
            if emptied {
                inner.rooms.remove(room_id);
            }
        }
        Ok(conn.rooms)
    }

    /// Subscribe a connection to a room. Joining a room twice is a no-op.
    pub fn join(&self, room_id: &str, connection_id: ConnectionId) -> Result<(), HubError> {
        let mut inner = self.lock();
        let conn = inner
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::UnknownConnection(connection_id))?;
        conn.rooms.insert(room_id.to_owned());
        inner
            .rooms
            .entry(room_id.to_owned())
            .or_default()
            .insert(connection_id);
        Ok(())
    }

    /// Unsubscribe a connection from a room. Leaving a room it never joined
    /// is a no-op.
    pub fn leave(&self, room_id: &str, connection_id: ConnectionId) {
        let mut inner = self.lock();
        if let Some(conn) = inner.connections.get_mut(&connection_id) {
            conn.rooms.remove(room_id);
        }
        let emptied = match inner.rooms.get_mut(room_id) {
            Some(members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.rooms.remove(room_id);
        }
    }

    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.lock().connections.contains_key(&connection_id)
    }

    /// Snapshot of a room's current members, taken under the lock.
    pub fn members_of(&self, room_id: &str) -> Vec<Recipient> {
        let inner = self.lock();
        let Some(members) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| {
                inner.connections.get(id).map(|conn| Recipient {
                    connection_id: *id,
                    sender: conn.sender.clone(),
                })
            })
            .collect()
    }

    /// All live connections belonging to a user, across devices.
    pub fn connections_for_user(&self, user_id: UserId) -> Vec<Recipient> {
        let inner = self.lock();
        inner
            .connections
            .iter()
            .filter(|(_, conn)| conn.user_id == user_id)
            .map(|(id, conn)| Recipient {
                connection_id: *id,
                sender: conn.sender.clone(),
            })
            .collect()
    }
}
