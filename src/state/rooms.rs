use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::{dto::sse::ServerEvent, state::matches::MatchId};

const LOBBY_CAPACITY: usize = 64;
const ROOM_CAPACITY: usize = 32;

/// Fan-out sub-state carved out from [`AppState`](super::AppState): one lobby hub plus one hub per
/// match room.
pub struct Rooms {
    lobby: SseHub,
    rooms: DashMap<MatchId, SseHub>,
}

impl Rooms {
    pub fn new() -> Self {
        Self {
            lobby: SseHub::new(LOBBY_CAPACITY),
            rooms: DashMap::new(),
        }
    }

    /// Hub receiving match creations and a copy of every room event.
    pub fn lobby(&self) -> &SseHub {
        &self.lobby
    }

    /// Hub of the `match_<id>` room, created on first use.
    pub fn room(&self, match_id: MatchId) -> SseHub {
        self.rooms
            .entry(match_id)
            .or_insert_with(|| SseHub::new(ROOM_CAPACITY))
            .clone()
    }

    /// Number of match rooms currently holding a hub.
    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Drop the room hub; subscribers see their stream end once the last sender clone is gone.
    pub fn close_room(&self, match_id: MatchId) {
        self.rooms.remove(&match_id);
    }

    pub fn room_name(match_id: MatchId) -> String {
        format!("match_{match_id}")
    }
}

impl Default for Rooms {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast hub wrapper shared by the SSE and WebSocket transports.
#[derive(Clone)]
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers; having none is not an error.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn room_hub_is_shared_until_closed() {
        let rooms = Rooms::new();
        let mut rx = rooms.room(4).subscribe();

        rooms.room(4).broadcast(ServerEvent::new(Some("ping".into()), "{}".into()));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.as_deref(), Some("ping"));
        assert_eq!(rooms.room(4).subscriber_count(), 1);

        rooms.close_room(4);
        assert_eq!(rooms.room(4).subscriber_count(), 0);
        assert_eq!(Rooms::room_name(4), "match_4");
    }
}
