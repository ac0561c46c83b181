use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    state::{Rooms, SharedState, matches::MatchId},
};

pub const LOBBY_ROOM: &str = "lobby";

/// Subscribe to the lobby: match creations, a copy of every room event and system status.
pub async fn subscribe_lobby(state: &SharedState) -> (broadcast::Receiver<ServerEvent>, Handshake) {
    let receiver = state.rooms().lobby().subscribe();
    let handshake = Handshake {
        room: LOBBY_ROOM.to_owned(),
        message: "subscribed to lobby".to_owned(),
        degraded: state.is_degraded().await,
    };
    (receiver, handshake)
}

/// Subscribe to the room of an existing match.
pub async fn subscribe_room(
    state: &SharedState,
    match_id: MatchId,
) -> Result<(broadcast::Receiver<ServerEvent>, Handshake), ServiceError> {
    let store = state.require_match_store().await?;
    if store.find_match(match_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("match {match_id}")));
    }

    let room = Rooms::room_name(match_id);
    let receiver = state.rooms().room(match_id).subscribe();
    let handshake = Handshake {
        message: format!("subscribed to {room}"),
        room,
        degraded: false,
    };
    Ok((receiver, handshake))
}

/// Convert a broadcast receiver into an SSE response that opens with a `handshake` event.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    handshake: Handshake,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let room = handshake.room.clone();

    tokio::spawn(async move {
        match ServerEvent::json(Some("handshake".to_owned()), &handshake) {
            Ok(first) => {
                if tx.send(Ok(to_event(first))).await.is_err() {
                    return;
                }
            }
            Err(err) => warn!(room, error = %err, "failed to serialize SSE handshake"),
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(room, skipped, "SSE subscriber lagged; events dropped");
                        }
                    }
                }
            }
        }

        info!(room, "SSE stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        services::lifecycle_service::{create_match, fixtures::*},
        state::test_support::memory_state,
    };

    #[tokio::test]
    async fn room_subscription_requires_existing_match() {
        let (state, _) = memory_state().await;
        let err = subscribe_room(&state, 42).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let created = create_match(&state, &admin(), create_request(&["a", "b", "c"], 27015))
            .await
            .unwrap();
        let (_receiver, handshake) = subscribe_room(&state, created.id).await.unwrap();
        assert_eq!(handshake.room, format!("match_{}", created.id));
        assert_eq!(state.rooms().room(created.id).subscriber_count(), 1);
    }

    #[tokio::test]
    async fn lobby_handshake_reports_store_state() {
        let (state, _) = memory_state().await;
        let (_receiver, handshake) = subscribe_lobby(&state).await;
        assert_eq!(handshake.room, LOBBY_ROOM);
        assert!(!handshake.degraded);

        state.clear_match_store().await;
        let (_receiver, handshake) = subscribe_lobby(&state).await;
        assert!(handshake.degraded);
    }
}
