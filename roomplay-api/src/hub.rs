//! Room channel hub: local fan-out for the synchronization channel
//!
//! Routes playback events to every live WebSocket connection in a room.
//! The playback service broadcasts through this hub (via the
//! `PlaybackBroadcaster` seam) only after a transition has been durably
//! written, so subscribers never see a state that could be lost on crash.

use dashmap::DashMap;
use roomplay_core::models::{RoomId, UserId};
use roomplay_core::service::{PlaybackBroadcaster, PlaybackEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle for a client connection subscription
pub type ConnectionId = String;

/// Message sender for a client connection
pub type EventSender = mpsc::UnboundedSender<PlaybackEvent>;

/// Subscriber information
#[derive(Debug, Clone)]
struct Subscriber {
    connection_id: ConnectionId,
    user_id: UserId,
    sender: EventSender,
}

#[derive(Clone, Default)]
pub struct RoomChannelHub {
    /// Map of room_id -> subscribers
    rooms: Arc<DashMap<RoomId, Vec<Subscriber>>>,

    /// Map of connection_id -> (room_id, user_id) for cleanup
    connections: Arc<DashMap<ConnectionId, (RoomId, UserId)>>,
}

impl RoomChannelHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room's playback events.
    pub fn subscribe(
        &self,
        room_id: RoomId,
        user_id: UserId,
        connection_id: ConnectionId,
        sender: EventSender,
    ) {
        let subscriber = Subscriber {
            connection_id: connection_id.clone(),
            user_id: user_id.clone(),
            sender,
        };

        self.rooms
            .entry(room_id.clone())
            .or_default()
            .push(subscriber);
        self.connections
            .insert(connection_id.clone(), (room_id.clone(), user_id.clone()));

        info!(
            room_id = %room_id,
            user_id = %user_id,
            connection_id = %connection_id,
            "Client subscribed to room channel"
        );
    }

    /// Unsubscribe a connection. Returns the (room, user) it belonged to so
    /// the caller can run disconnect side effects.
    pub fn unsubscribe(&self, connection_id: &str) -> Option<(RoomId, UserId)> {
        let (_, (room_id, user_id)) = self.connections.remove(connection_id)?;

        if let Some(mut subscribers) = self.rooms.get_mut(&room_id) {
            subscribers.retain(|sub| sub.connection_id != connection_id);
            if subscribers.is_empty() {
                drop(subscribers); // Drop the RefMut before removing
                self.rooms.remove(&room_id);
                debug!(room_id = %room_id, "Room has no more subscribers, removed");
            }
        }

        info!(
            room_id = %room_id,
            user_id = %user_id,
            connection_id = %connection_id,
            "Client unsubscribed from room channel"
        );
        Some((room_id, user_id))
    }

    /// Fan an event out to every subscriber of a room, pruning dead
    /// connections along the way. Returns the number of deliveries.
    pub fn publish(&self, room_id: &RoomId, event: &PlaybackEvent) -> usize {
        let mut sent_count = 0;
        let mut dead_connections = Vec::new();

        if let Some(subscribers) = self.rooms.get(room_id) {
            for subscriber in subscribers.iter() {
                match subscriber.sender.send(event.clone()) {
                    Ok(()) => sent_count += 1,
                    Err(err) => {
                        warn!(
                            room_id = %room_id,
                            connection_id = %subscriber.connection_id,
                            error = %err,
                            "Failed to deliver event, marking connection for cleanup"
                        );
                        dead_connections.push(subscriber.connection_id.clone());
                    }
                }
            }
        }

        for conn_id in dead_connections {
            self.unsubscribe(&conn_id);
        }

        if sent_count > 0 {
            debug!(
                room_id = %room_id,
                sent_count,
                event_type = %event.event_type(),
                "Event broadcast complete"
            );
        }
        sent_count
    }

    /// Number of subscribers in a room
    #[must_use]
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map_or(0, |subs| subs.len())
    }

    /// Number of live connections a user holds in a room. A user with several
    /// tabs or devices open counts once per connection; host-disconnect side
    /// effects only apply when this reaches zero.
    #[must_use]
    pub fn user_connection_count(&self, room_id: &RoomId, user_id: &UserId) -> usize {
        self.rooms.get(room_id).map_or(0, |subs| {
            subs.iter().filter(|sub| &sub.user_id == user_id).count()
        })
    }

    /// Number of active connections across all rooms
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl PlaybackBroadcaster for RoomChannelHub {
    fn broadcast(&self, room_id: &RoomId, event: PlaybackEvent) {
        self.publish(room_id, &event);
    }
}
