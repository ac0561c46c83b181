use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        sse::ServerEvent,
        ws::{RoomInboundMessage, RoomOutboundMessage},
    },
    error::{ErrorKind, ServiceError},
    services::{auth_service, chat_service, lifecycle_service, sse_service, veto_service},
    state::{SharedState, matches::MatchId},
};

type Outbound = mpsc::UnboundedSender<Message>;

/// Whether a connection stays open after handling an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Drive one room connection: push the authoritative snapshot, relay every room event, and
/// accept veto actions and chat from authenticated captains and players.
///
/// `token` is `None` for spectators, who only receive. It is resolved again for every inbound
/// frame, so a logout or a ban ends the socket on its next action.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    match_id: MatchId,
    token: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let events = match join_room(&state, match_id, &outbound_tx).await {
        Ok(events) => events,
        Err(err) => {
            warn!(match_id, error = %err, "cannot open room socket");
            send_error(&outbound_tx, err.kind(), err.to_string());
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, None, outbound_tx).await;
            return;
        }
    };

    let forwarder = tokio::spawn(forward_room_events(
        state.clone(),
        match_id,
        events,
        outbound_tx.clone(),
    ));

    let authenticated = token.is_some();
    info!(
        match_id,
        authenticated,
        open_rooms = state.rooms().open_rooms(),
        "room socket connected"
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let flow =
                    handle_inbound(&state, match_id, token.as_deref(), &text, &outbound_tx).await;
                if flow == Flow::Close {
                    let _ = outbound_tx.send(Message::Close(None));
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(match_id, error = %err, "websocket error");
                break;
            }
        }
    }

    info!(match_id, authenticated, "room socket disconnected");
    finalize(writer_task, Some(forwarder), outbound_tx).await;
}

/// Subscribe to an existing match room, then push its snapshot.
///
/// Existence is checked before the room hub is touched, so unknown ids never allocate one. The
/// subscription precedes the snapshot read so no event falls between the two.
async fn join_room(
    state: &SharedState,
    match_id: MatchId,
    outbound_tx: &Outbound,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    let (events, _) = sse_service::subscribe_room(state, match_id).await?;
    send_snapshot(state, match_id, outbound_tx).await?;
    Ok(events)
}

async fn handle_inbound(
    state: &SharedState,
    match_id: MatchId,
    token: Option<&str>,
    text: &str,
    outbound_tx: &Outbound,
) -> Flow {
    let message = match serde_json::from_str::<RoomInboundMessage>(text) {
        Ok(RoomInboundMessage::Unknown) => {
            send_error(outbound_tx, ErrorKind::InvalidArgument, "unsupported message type".into());
            return Flow::Continue;
        }
        Ok(message) => message,
        Err(err) => {
            debug!(match_id, error = %err, "malformed room message");
            send_error(outbound_tx, ErrorKind::InvalidArgument, format!("malformed message: {err}"));
            return Flow::Continue;
        }
    };

    let Some(token) = token else {
        send_error(
            outbound_tx,
            ErrorKind::Unauthenticated,
            "connect with ?token= to act in this room".into(),
        );
        return Flow::Continue;
    };

    let actor = match auth_service::resolve_actor(state, token).await {
        Ok(actor) => actor,
        Err(err @ (ServiceError::Unauthenticated(_) | ServiceError::Forbidden(_))) => {
            info!(match_id, error = %err, "session no longer valid; closing room socket");
            send_error(outbound_tx, err.kind(), err.to_string());
            return Flow::Close;
        }
        Err(err) => {
            send_error(outbound_tx, err.kind(), err.to_string());
            return Flow::Continue;
        }
    };

    let result = match message {
        RoomInboundMessage::VetoAction { map_name, action } => {
            veto_service::perform_veto_action(state, &actor, match_id, &map_name, action)
                .await
                .map(|_| ())
        }
        RoomInboundMessage::Chat { text } => {
            chat_service::post_message(state, &actor, match_id, &text)
                .await
                .map(|_| ())
        }
        RoomInboundMessage::Unknown => Ok(()),
    };

    if let Err(err) = result {
        send_error(outbound_tx, err.kind(), err.to_string());
    }
    Flow::Continue
}

async fn forward_room_events(
    state: SharedState,
    match_id: MatchId,
    mut events: broadcast::Receiver<ServerEvent>,
    outbound_tx: Outbound,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if send_event(&outbound_tx, event).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(match_id, skipped, "room socket lagged; resending snapshot");
                if send_snapshot(&state, match_id, &outbound_tx).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_snapshot(
    state: &SharedState,
    match_id: MatchId,
    outbound_tx: &Outbound,
) -> Result<(), ServiceError> {
    let snapshot = lifecycle_service::get_match(state, match_id).await?;
    let message = RoomOutboundMessage::Snapshot {
        snapshot: Box::new(snapshot),
    };
    send_json(outbound_tx, &message)
        .map_err(|_| ServiceError::InvalidState("room socket closed".into()))
}

fn send_event(outbound_tx: &Outbound, event: ServerEvent) -> Result<(), ()> {
    let data = serde_json::from_str(&event.data).unwrap_or(serde_json::Value::String(event.data));
    let message = RoomOutboundMessage::Event {
        event: event.event.unwrap_or_default(),
        data,
    };
    send_json(outbound_tx, &message)
}

fn send_error(outbound_tx: &Outbound, kind: ErrorKind, message: String) {
    let _ = send_json(outbound_tx, &RoomOutboundMessage::Error { kind, message });
}

/// Serialisation failures are logged and swallowed; only a closed writer is an error.
fn send_json(outbound_tx: &Outbound, message: &RoomOutboundMessage) -> Result<(), ()> {
    match serde_json::to_string(message) {
        Ok(payload) => outbound_tx
            .send(Message::Text(payload.into()))
            .map_err(|_| ()),
        Err(err) => {
            warn!(error = %err, "failed to serialize room message");
            Ok(())
        }
    }
}

async fn finalize(writer_task: JoinHandle<()>, forwarder: Option<JoinHandle<()>>, outbound_tx: Outbound) {
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::{
        services::lifecycle_service::fixtures::*,
        state::{
            matches::VetoAction,
            test_support::{login_as, memory_state},
        },
    };

    const BAN_A: &str = r#"{"type":"veto_action","map_name":"A","action":"ban"}"#;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            frames.push(serde_json::from_str(text.as_str()).unwrap());
        }
        frames
    }

    fn error_kinds(frames: Vec<Value>) -> Vec<String> {
        frames
            .into_iter()
            .map(|frame| {
                assert_eq!(frame["type"], "error");
                frame["kind"].as_str().unwrap().to_owned()
            })
            .collect()
    }

    #[tokio::test]
    async fn inbound_messages_are_dispatched_or_rejected() {
        let (state, _) = memory_state().await;
        let id = in_veto(&state, &["A", "B", "C", "D", "E"], 1).await;
        let captain1 = login_as(&state, 101).await;
        let captain2 = login_as(&state, 201).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let flows = [
            handle_inbound(&state, id, None, r#"{"type":"chat","text":"hi"}"#, &tx).await,
            handle_inbound(&state, id, Some(&captain1), "not json", &tx).await,
            handle_inbound(&state, id, Some(&captain1), r#"{"type":"dance"}"#, &tx).await,
            handle_inbound(&state, id, Some(&captain2), BAN_A, &tx).await,
        ];
        assert!(flows.iter().all(|flow| *flow == Flow::Continue));
        assert_eq!(
            error_kinds(drain(&mut rx)),
            vec!["unauthenticated", "invalid_argument", "invalid_argument", "forbidden"]
        );

        let flow = handle_inbound(&state, id, Some(&captain1), BAN_A, &tx).await;
        assert_eq!(flow, Flow::Continue);
        assert!(drain(&mut rx).is_empty());

        let snapshot = lifecycle_service::get_match(&state, id).await.unwrap();
        assert_eq!(snapshot.veto_history.len(), 1);
        assert_eq!(snapshot.veto_history[0].action, VetoAction::Ban);
    }

    #[tokio::test]
    async fn banned_captain_is_cut_off_mid_socket() {
        let (state, _) = memory_state().await;
        let id = in_veto(&state, &["A", "B", "C"], 1).await;
        let captain1 = login_as(&state, 101).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        auth_service::set_banned(&state, &admin(), 101, true).await.unwrap();

        let flow = handle_inbound(&state, id, Some(&captain1), BAN_A, &tx).await;
        assert_eq!(flow, Flow::Close);
        assert_eq!(error_kinds(drain(&mut rx)), vec!["forbidden"]);

        let snapshot = lifecycle_service::get_match(&state, id).await.unwrap();
        assert!(snapshot.veto_history.is_empty());
    }

    #[tokio::test]
    async fn logged_out_session_closes_the_socket() {
        let (state, _) = memory_state().await;
        let id = in_veto(&state, &["A", "B", "C"], 1).await;
        let token = login_as(&state, 201).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        auth_service::logout(&state, &token).unwrap();

        let flow =
            handle_inbound(&state, id, Some(&token), r#"{"type":"chat","text":"gg"}"#, &tx).await;
        assert_eq!(flow, Flow::Close);
        assert_eq!(error_kinds(drain(&mut rx)), vec!["unauthenticated"]);
    }

    #[tokio::test]
    async fn unknown_match_never_allocates_a_room() {
        let (state, _) = memory_state().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let before = state.rooms().open_rooms();

        for missing in [77, 78, 79] {
            let err = join_room(&state, missing, &tx).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        assert_eq!(state.rooms().open_rooms(), before);
        assert!(drain(&mut rx).is_empty());

        let id = in_veto(&state, &["A", "B", "C"], 1).await;
        let _events = join_room(&state, id, &tx).await.unwrap();
        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "snapshot");
        assert_eq!(state.rooms().room(id).subscriber_count(), 1);
    }

    #[tokio::test]
    async fn room_events_are_wrapped_with_their_payload() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let event = ServerEvent::new(
            Some("veto_complete".into()),
            r#"{"match_id":3,"selected_map":"C"}"#.into(),
        );
        send_event(&tx, event).unwrap();

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["type"], "event");
        assert_eq!(frames[0]["event"], "veto_complete");
        assert_eq!(frames[0]["data"]["selected_map"], "C");
    }
}
