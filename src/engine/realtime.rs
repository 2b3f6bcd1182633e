//! Per-user realtime fan-out.
//!
//! Sessions connect, authenticate, then explicitly join their own user room.
//! Only joined sessions receive targeted events; connecting alone enrolls
//! nothing. Delivery is best effort: a missing or closed session is never an
//! error for the emitting operation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::metrics;

/// Room name every session of `user_id` joins to receive that user's events.
pub fn user_room(user_id: &str) -> String {
    format!("user:{}", user_id)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("session {0} is not connected")]
    NotConnected(String),
    #[error("session {0} has not authenticated")]
    NotAuthenticated(String),
    #[error("session may not join room {0}")]
    RoomForbidden(String),
}

/// A named `{entity}:{verb}` event carrying the updated aggregate.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RealtimeEvent {
    pub name: String,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn new<T: Serialize>(entity: &str, verb: &str, payload: &T) -> Self {
        let name = format!("{}:{}", entity, verb);
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            warn!("realtime payload for {} failed to serialize: {}", name, e);
            serde_json::Value::Null
        });
        Self {
            name,
            payload,
            emitted_at: Utc::now(),
        }
    }
}

/// Returned from [`RealtimeHub::connect`]; the receiver yields events once the
/// session has joined its room.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: String,
    pub events: mpsc::UnboundedReceiver<RealtimeEvent>,
}

#[derive(Debug)]
struct SessionEntry {
    user_id: Option<String>,
    rooms: HashSet<String>,
    tx: mpsc::UnboundedSender<RealtimeEvent>,
}

pub struct RealtimeHub {
    sessions: DashMap<String, SessionEntry>,
    /// Room name to member session ids, in join order.
    rooms: DashMap<String, Vec<String>>,
    next_session: AtomicU64,
    max_sessions_per_user: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(8)
    }
}

impl RealtimeHub {
    pub fn new(max_sessions_per_user: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            next_session: AtomicU64::new(1),
            max_sessions_per_user: max_sessions_per_user.max(1),
        }
    }

    /// Register a transport connection. The session receives nothing until it
    /// authenticates and joins a room.
    pub fn connect(&self) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = format!("s{}", self.next_session.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                user_id: None,
                rooms: HashSet::new(),
                tx,
            },
        );
        debug!("realtime: session {} connected", id);
        SessionHandle { id, events: rx }
    }

    /// Bind an authenticated user id to the session. Re-authenticating as a
    /// different user drops every room membership.
    pub fn authenticate(&self, session_id: &str, user_id: &str) -> Result<(), RealtimeError> {
        let previous_rooms = {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| RealtimeError::NotConnected(session_id.to_string()))?;
            if entry.user_id.as_deref() == Some(user_id) {
                return Ok(());
            }
            entry.user_id = Some(user_id.to_string());
            std::mem::take(&mut entry.rooms)
        };
        for room in previous_rooms {
            self.remove_member(&room, session_id);
        }
        Ok(())
    }

    /// Join a room. Sessions may only join their own user room.
    pub fn join(&self, session_id: &str, room: &str) -> Result<(), RealtimeError> {
        {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| RealtimeError::NotConnected(session_id.to_string()))?;
            let user_id = entry
                .user_id
                .as_deref()
                .ok_or_else(|| RealtimeError::NotAuthenticated(session_id.to_string()))?;
            if room != user_room(user_id) {
                return Err(RealtimeError::RoomForbidden(room.to_string()));
            }
            if !entry.rooms.insert(room.to_string()) {
                return Ok(());
            }
        }

        let evicted = {
            let mut members = self.rooms.entry(room.to_string()).or_default();
            members.push(session_id.to_string());
            if members.len() > self.max_sessions_per_user {
                let overflow = members.len() - self.max_sessions_per_user;
                members.drain(..overflow).collect::<Vec<_>>()
            } else {
                Vec::new()
            }
        };
        for old in evicted {
            debug!("realtime: evicting session {} from {}", old, room);
            if let Some(mut entry) = self.sessions.get_mut(&old) {
                entry.rooms.remove(room);
            }
        }
        Ok(())
    }

    pub fn leave(&self, session_id: &str, room: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.rooms.remove(room);
        }
        self.remove_member(room, session_id);
    }

    pub fn disconnect(&self, session_id: &str) {
        if let Some((_, entry)) = self.sessions.remove(session_id) {
            for room in entry.rooms {
                self.remove_member(&room, session_id);
            }
            debug!("realtime: session {} disconnected", session_id);
        }
    }

    fn remove_member(&self, room: &str, session_id: &str) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.retain(|id| id != session_id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    /// Deliver `event` to every session joined to the user's room. Returns the
    /// number of sessions reached; sessions whose receiver is gone are pruned.
    pub fn emit(&self, user_id: &str, event: RealtimeEvent) -> usize {
        let room = user_room(user_id);
        let members = match self.rooms.get(&room) {
            Some(members) => members.value().clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for session_id in members {
            let sent = self
                .sessions
                .get(&session_id)
                .map(|entry| entry.tx.send(event.clone()).is_ok())
                .unwrap_or(false);
            if sent {
                delivered += 1;
            } else {
                closed.push(session_id);
            }
        }

        if !closed.is_empty() {
            warn!(
                "realtime: {} dropped for {} closed session(s) in {}",
                event.name,
                closed.len(),
                room
            );
            metrics::inc_deliveries_dropped(closed.len() as u64);
            for session_id in closed {
                self.disconnect(&session_id);
                self.remove_member(&room, &session_id);
            }
        }
        metrics::inc_events_delivered(delivered as u64);
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> RealtimeEvent {
        RealtimeEvent::new("test", name, &serde_json::json!({ "ok": true }))
    }

    #[test]
    fn connect_alone_receives_nothing() {
        let hub = RealtimeHub::default();
        let mut session = hub.connect();
        hub.authenticate(&session.id, "alice").unwrap();
        assert_eq!(hub.emit("alice", event("ping")), 0);
        assert!(session.events.try_recv().is_err());
    }

    #[test]
    fn join_requires_authentication_first() {
        let hub = RealtimeHub::default();
        let session = hub.connect();
        assert_eq!(
            hub.join(&session.id, "user:alice"),
            Err(RealtimeError::NotAuthenticated(session.id.clone()))
        );
    }

    #[test]
    fn cannot_join_another_users_room() {
        let hub = RealtimeHub::default();
        let session = hub.connect();
        hub.authenticate(&session.id, "alice").unwrap();
        assert_eq!(
            hub.join(&session.id, "user:bob"),
            Err(RealtimeError::RoomForbidden("user:bob".to_string()))
        );
    }

    #[test]
    fn joined_sessions_receive_events() {
        let hub = RealtimeHub::default();
        let mut first = hub.connect();
        let mut second = hub.connect();
        for s in [&first.id, &second.id] {
            hub.authenticate(s, "alice").unwrap();
            hub.join(s, &user_room("alice")).unwrap();
        }
        assert_eq!(hub.emit("alice", event("ping")), 2);
        assert_eq!(first.events.try_recv().unwrap().name, "test:ping");
        assert_eq!(second.events.try_recv().unwrap().name, "test:ping");
        assert_eq!(hub.emit("bob", event("ping")), 0);
    }

    #[test]
    fn closed_sessions_are_pruned() {
        let hub = RealtimeHub::default();
        let session = hub.connect();
        hub.authenticate(&session.id, "alice").unwrap();
        hub.join(&session.id, "user:alice").unwrap();
        drop(session.events);
        assert_eq!(hub.emit("alice", event("ping")), 0);
        assert_eq!(hub.room_size("user:alice"), 0);
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn oldest_session_is_evicted_past_the_cap() {
        let hub = RealtimeHub::new(1);
        let mut old = hub.connect();
        let mut new = hub.connect();
        for s in [&old.id, &new.id] {
            hub.authenticate(s, "alice").unwrap();
            hub.join(s, "user:alice").unwrap();
        }
        assert_eq!(hub.emit("alice", event("ping")), 1);
        assert!(old.events.try_recv().is_err());
        assert!(new.events.try_recv().is_ok());
    }
}
