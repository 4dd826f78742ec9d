//! Presence tracking for Parlor.
//!
//! The presence store keeps two indexes that always agree with each other:
//! connection → user record, and room → member set. A room exists exactly
//! while its member set is non-empty.

use crate::connection::ConnectionId;
use indexmap::IndexSet;
use parlor_protocol::RoomMember;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// A joined user, keyed by the connection it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Connection the user is attached to.
    pub connection_id: ConnectionId,
    /// Display name. Not unique.
    pub username: String,
    /// Room the connection is currently in.
    pub room: String,
}

impl User {
    /// Member entry for room listings.
    #[must_use]
    pub fn to_member(&self) -> RoomMember {
        RoomMember::new(self.connection_id.as_str(), self.username.clone())
    }
}

/// Name and size of a live room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Room name.
    pub name: String,
    /// Number of members.
    pub user_count: usize,
}

/// Name and member list of a live room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomListing {
    /// Room name.
    pub name: String,
    /// Current members in join order.
    pub users: Vec<RoomMember>,
}

/// In-memory presence store.
#[derive(Debug, Default)]
pub struct PresenceStore {
    /// Connection ID → user record.
    users: HashMap<ConnectionId, User>,
    /// Room name → member connection IDs, in join order.
    rooms: HashMap<String, IndexSet<ConnectionId>>,
}

impl PresenceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a connection into a room under a display name.
    ///
    /// A connection that is already joined somewhere is first removed from
    /// its previous room, so it is never a member of two rooms. Returns the
    /// user record that was replaced, if any.
    pub fn join(
        &mut self,
        connection_id: &ConnectionId,
        username: impl Into<String>,
        room: impl Into<String>,
    ) -> Option<User> {
        let previous = self.leave(connection_id);
        let user = User {
            connection_id: connection_id.clone(),
            username: username.into(),
            room: room.into(),
        };

        self.rooms
            .entry(user.room.clone())
            .or_insert_with(|| {
                debug!(room = %user.room, "Creating room");
                IndexSet::new()
            })
            .insert(connection_id.clone());

        debug!(
            connection = %connection_id,
            username = %user.username,
            room = %user.room,
            "Presence: joined"
        );
        self.users.insert(connection_id.clone(), user);

        previous
    }

    /// Remove a connection from its room.
    ///
    /// Returns the removed user record, or `None` if the connection was not
    /// joined. Calling it again for the same connection is a no-op.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> Option<User> {
        let user = self.users.remove(connection_id)?;

        if let Some(members) = self.rooms.get_mut(&user.room) {
            members.shift_remove(connection_id);
            if members.is_empty() {
                self.rooms.remove(&user.room);
                debug!(room = %user.room, "Deleted empty room");
            }
        }

        debug!(connection = %connection_id, room = %user.room, "Presence: left");
        Some(user)
    }

    /// Get the user record for a connection.
    #[must_use]
    pub fn user(&self, connection_id: &ConnectionId) -> Option<&User> {
        self.users.get(connection_id)
    }

    /// List the members of a room in join order.
    ///
    /// An absent room lists as empty.
    #[must_use]
    pub fn list_room(&self, room: &str) -> Vec<RoomMember> {
        self.members(room)
            .filter_map(|id| self.users.get(id))
            .map(User::to_member)
            .collect()
    }

    /// Iterate over the connection IDs in a room.
    pub fn members<'a>(&'a self, room: &str) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.rooms.get(room).into_iter().flat_map(|m| m.iter())
    }

    /// Check if a room currently exists.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of joined users across all rooms.
    #[must_use]
    pub fn total_users(&self) -> usize {
        self.users.len()
    }

    /// Name and size of every live room, sorted by name.
    #[must_use]
    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<_> = self
            .rooms
            .iter()
            .map(|(name, members)| RoomSummary {
                name: name.clone(),
                user_count: members.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Member list of every live room, sorted by name.
    #[must_use]
    pub fn room_listings(&self) -> Vec<RoomListing> {
        let mut names: Vec<&String> = self.rooms.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| RoomListing {
                name: name.clone(),
                users: self.list_room(name),
            })
            .collect()
    }

    /// Check if the store holds no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    /// Both indexes agree and no room is empty.
    fn assert_consistent(store: &PresenceStore) {
        for (room, members) in &store.rooms {
            assert!(!members.is_empty(), "empty room {room} retained");
            for conn in members {
                let user = store.users.get(conn).expect("member without user");
                assert_eq!(&user.room, room);
            }
        }
        for (conn, user) in &store.users {
            assert_eq!(&user.connection_id, conn);
            let members = store.rooms.get(&user.room).expect("user without room");
            assert!(members.contains(conn));
        }
    }

    #[test]
    fn test_join_lists_member() {
        let mut store = PresenceStore::new();
        assert!(store.join(&id("A"), "alice", "general").is_none());

        assert_eq!(
            store.list_room("general"),
            vec![RoomMember::new("A", "alice")]
        );
        assert_eq!(store.room_count(), 1);
        assert_eq!(store.total_users(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn test_list_room_keeps_join_order() {
        let mut store = PresenceStore::new();
        store.join(&id("B"), "bob", "general");
        store.join(&id("A"), "alice", "general");
        store.join(&id("C"), "carol", "general");

        let names: Vec<_> = store
            .list_room("general")
            .into_iter()
            .map(|m| m.username)
            .collect();
        assert_eq!(names, ["bob", "alice", "carol"]);
    }

    #[test]
    fn test_leave_deletes_empty_room() {
        let mut store = PresenceStore::new();
        store.join(&id("A"), "alice", "general");

        let user = store.leave(&id("A")).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.room, "general");

        assert!(!store.room_exists("general"));
        assert!(store.list_room("general").is_empty());
        assert_eq!(store.total_users(), 0);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut store = PresenceStore::new();
        store.join(&id("A"), "alice", "general");
        store.join(&id("B"), "bob", "general");

        assert!(store.leave(&id("A")).is_some());
        assert!(store.leave(&id("A")).is_none());
        assert!(store.leave(&id("never-joined")).is_none());

        assert_eq!(store.list_room("general"), vec![RoomMember::new("B", "bob")]);
        assert_consistent(&store);
    }

    #[test]
    fn test_rejoin_moves_connection() {
        let mut store = PresenceStore::new();
        store.join(&id("A"), "alice", "general");
        store.join(&id("B"), "bob", "general");

        let previous = store.join(&id("A"), "alice2", "random").unwrap();
        assert_eq!(previous.room, "general");

        assert_eq!(store.list_room("general"), vec![RoomMember::new("B", "bob")]);
        assert_eq!(
            store.list_room("random"),
            vec![RoomMember::new("A", "alice2")]
        );
        assert_eq!(store.total_users(), 2);
        assert_consistent(&store);
    }

    #[test]
    fn test_duplicate_usernames_allowed() {
        let mut store = PresenceStore::new();
        store.join(&id("A"), "sam", "general");
        store.join(&id("B"), "sam", "general");
        assert_eq!(store.list_room("general").len(), 2);
    }

    #[test]
    fn test_summaries_and_listings() {
        let mut store = PresenceStore::new();
        store.join(&id("A"), "alice", "tech");
        store.join(&id("B"), "bob", "general");
        store.join(&id("C"), "carol", "general");

        assert_eq!(
            store.room_summaries(),
            vec![
                RoomSummary {
                    name: "general".into(),
                    user_count: 2
                },
                RoomSummary {
                    name: "tech".into(),
                    user_count: 1
                },
            ]
        );

        // Name order, not creation order
        let listings = store.room_listings();
        let names: Vec<&str> = listings.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["general", "tech"]);
        assert_eq!(listings[1].users, vec![RoomMember::new("A", "alice")]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join(u8, u8),
        Leave(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, 0u8..4).prop_map(|(c, r)| Op::Join(c, r)),
            (0u8..8).prop_map(Op::Leave),
        ]
    }

    proptest! {
        #[test]
        fn indexes_stay_consistent(ops in proptest::collection::vec(op(), 0..64)) {
            let mut store = PresenceStore::new();
            for op in ops {
                match op {
                    Op::Join(c, r) => {
                        store.join(&id(&format!("c{c}")), format!("user{c}"), format!("room{r}"));
                    }
                    Op::Leave(c) => {
                        let conn = id(&format!("c{c}"));
                        store.leave(&conn);
                        let rooms = store.room_count();
                        let users = store.total_users();
                        prop_assert!(store.leave(&conn).is_none());
                        prop_assert_eq!(store.room_count(), rooms);
                        prop_assert_eq!(store.total_users(), users);
                    }
                }
                assert_consistent(&store);
                let listed: usize = store.room_summaries().iter().map(|s| s.user_count).sum();
                prop_assert_eq!(listed, store.total_users());
            }
        }
    }
}
