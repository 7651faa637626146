use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dao::models::RoomCode,
    dto::sse::{Handshake, ServerEvent, SystemStatus},
    error::ServiceError,
    services::room_service,
    state::{RoomSession, SharedState},
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_SYSTEM_STATUS: &str = "systemStatus";

/// Spectator subscription to one room feed.
pub struct RoomSubscription {
    session: Arc<RoomSession>,
    receiver: broadcast::Receiver<ServerEvent>,
    handshake: Handshake,
}

/// Subscribe to the feed of an existing room.
///
/// The subscription holds the room session, so the room stays in memory for
/// as long as a spectator is connected.
pub async fn subscribe_room(
    state: &SharedState,
    code: &RoomCode,
) -> Result<RoomSubscription, ServiceError> {
    let lease = state.lease_room(code);
    let snapshot = room_service::room_snapshot(state, code).await?;
    let session = lease.share();
    let receiver = session.feed().subscribe();

    Ok(RoomSubscription {
        session,
        receiver,
        handshake: Handshake {
            degraded: state.is_degraded(),
            room: snapshot,
        },
    })
}

/// Convert a room subscription into an SSE response, forwarding events and
/// releasing the room once the client disconnects.
pub fn to_sse_stream(
    state: SharedState,
    subscription: RoomSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let RoomSubscription {
        session,
        mut receiver,
        handshake,
    } = subscription;
    let mut degraded = state.degraded_watcher();

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        match ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake) {
            Ok(event) => {
                if tx.send(Ok(to_event(event))).await.is_err() {
                    release(&state, session);
                    return;
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize room handshake"),
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = SystemStatus { degraded: *degraded.borrow_and_update() };
                    match ServerEvent::json(Some(EVENT_SYSTEM_STATUS.to_string()), &status) {
                        Ok(event) => {
                            if tx.send(Ok(to_event(event))).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to serialize system status"),
                    }
                }
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(room = %session.code(), skipped, "room feed lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(room = %session.code(), "room SSE stream disconnected");
        release(&state, session);
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
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

fn release(state: &SharedState, session: Arc<RoomSession>) {
    let code = session.code().clone();
    drop(session);
    state.release_room_if_idle(&code);
}
