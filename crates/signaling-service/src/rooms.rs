//! Room registry.
//!
//! Maps canonical room names to the live connections joined to them. Rooms
//! are derived state: created on first join, gone when the last member
//! leaves, never persisted.
//!
//! Both maps (room -> members, connection -> rooms) sit behind one async
//! `RwLock`, so joins, leaves and broadcasts observe a consistent membership
//! and no update is lost.

use crate::actors::ConnectionHandle;
use crate::protocol::ServerEvent;

use common::types::ConnectionId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Canonical room name.
///
/// Each variant renders with its own prefix, so two different entities can
/// never collide on the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// `staff:{staffId}`
    Staff(String),
    /// `dept:{deptCode}`
    Dept(String),
    /// `client:{clientId}`
    Client(String),
    /// `call:{callId}`
    Call(String),
}

impl Room {
    #[must_use]
    pub fn staff(staff_id: impl Into<String>) -> Self {
        Room::Staff(staff_id.into())
    }

    #[must_use]
    pub fn dept(dept_code: impl Into<String>) -> Self {
        Room::Dept(dept_code.into())
    }

    #[must_use]
    pub fn client(client_id: impl Into<String>) -> Self {
        Room::Client(client_id.into())
    }

    #[must_use]
    pub fn call(call_id: impl Into<String>) -> Self {
        Room::Call(call_id.into())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Staff(id) => write!(f, "staff:{id}"),
            Room::Dept(code) => write!(f, "dept:{code}"),
            Room::Client(id) => write!(f, "client:{id}"),
            Room::Call(id) => write!(f, "call:{id}"),
        }
    }
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<Room, HashMap<ConnectionId, ConnectionHandle>>,
    memberships: HashMap<ConnectionId, HashSet<Room>>,
}

/// Live room membership for this process.
#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Inner>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Idempotent; returns `true` if the
    /// connection was not already a member.
    pub async fn join(&self, connection: &ConnectionHandle, room: Room) -> bool {
        let mut inner = self.inner.write().await;
        let newly_joined = inner
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection.id(), connection.clone())
            .is_none();
        inner
            .memberships
            .entry(connection.id())
            .or_default()
            .insert(room.clone());

        if newly_joined {
            debug!(
                target: "sig.rooms",
                connection_id = %connection.id(),
                room = %room,
                "Joined room"
            );
        }
        newly_joined
    }

    /// Remove a connection from one room. Returns `true` if it was a member.
    pub async fn leave(&self, connection_id: ConnectionId, room: &Room) -> bool {
        let mut inner = self.inner.write().await;
        let removed = remove_member(&mut inner.rooms, room, connection_id);

        if let Some(rooms) = inner.memberships.get_mut(&connection_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                inner.memberships.remove(&connection_id);
            }
        }

        if removed {
            debug!(
                target: "sig.rooms",
                connection_id = %connection_id,
                room = %room,
                "Left room"
            );
        }
        removed
    }

    /// Remove a connection from every room it joined. Returns the number of
    /// rooms left.
    pub async fn leave_all(&self, connection_id: ConnectionId) -> usize {
        let mut inner = self.inner.write().await;
        let Some(rooms) = inner.memberships.remove(&connection_id) else {
            return 0;
        };

        for room in &rooms {
            remove_member(&mut inner.rooms, room, connection_id);
        }

        debug!(
            target: "sig.rooms",
            connection_id = %connection_id,
            rooms = rooms.len(),
            "Left all rooms"
        );
        rooms.len()
    }

    /// Deliver `event` to every current member of `room`. Returns the number
    /// of connections it was queued for.
    pub async fn broadcast(&self, room: &Room, event: &ServerEvent) -> usize {
        self.fan_out(room, event, None).await
    }

    /// As [`broadcast`](Self::broadcast), skipping `exclude`.
    pub async fn send_to_others(
        &self,
        room: &Room,
        event: &ServerEvent,
        exclude: ConnectionId,
    ) -> usize {
        self.fan_out(room, event, Some(exclude)).await
    }

    async fn fan_out(
        &self,
        room: &Room,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(room) else {
            trace!(target: "sig.rooms", room = %room, event = event.name(), "Broadcast to empty room");
            return 0;
        };

        let delivered = members
            .values()
            .filter(|member| Some(member.id()) != exclude)
            .filter(|member| member.deliver(event.clone()))
            .count();

        trace!(
            target: "sig.rooms",
            room = %room,
            event = event.name(),
            members = members.len(),
            delivered,
            "Broadcast"
        );
        delivered
    }

    pub async fn is_member(&self, room: &Room, connection_id: ConnectionId) -> bool {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .is_some_and(|members| members.contains_key(&connection_id))
    }

    pub async fn member_count(&self, room: &Room) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashMap::len)
    }

    /// Rooms a connection currently belongs to.
    pub async fn rooms_of(&self, connection_id: ConnectionId) -> HashSet<Room> {
        self.inner
            .read()
            .await
            .memberships
            .get(&connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

fn remove_member(
    rooms: &mut HashMap<Room, HashMap<ConnectionId, ConnectionHandle>>,
    room: &Room,
    connection_id: ConnectionId,
) -> bool {
    let Some(members) = rooms.get_mut(room) else {
        return false;
    };
    let removed = members.remove(&connection_id).is_some();
    if members.is_empty() {
        rooms.remove(room);
    }
    removed
}
