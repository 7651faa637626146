use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{
    dao::models::{PlayerEntity, RoomCode, name_key},
    dto::{
        sse::ServerEvent,
        ws::{PlayerList, PlayerView, ServerMessage, SubmissionProgress},
    },
    state::{ConnectionId, SharedState},
};

/// Roster merged with live presence, the single source for every room-wide view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub players: Vec<PlayerView>,
    pub active_count: usize,
    /// Players both active and submitted.
    pub submitted_count: usize,
}

impl RoomView {
    /// Merge durable roster rows with the set of active name keys.
    ///
    /// Roster order is preserved. Inactive players stay listed but never count.
    pub fn merge(roster: Vec<PlayerEntity>, active_names: &HashSet<String>) -> Self {
        let players: Vec<PlayerView> = roster
            .into_iter()
            .map(|player| PlayerView {
                active: active_names.contains(&name_key(&player.name)),
                name: player.name,
                submitted: player.submitted,
            })
            .collect();

        let active_count = players.iter().filter(|player| player.active).count();
        let submitted_count = players
            .iter()
            .filter(|player| player.active && player.submitted)
            .count();

        Self {
            players,
            active_count,
            submitted_count,
        }
    }

    /// Every active player has submitted, and there is at least one.
    pub fn all_submitted(&self) -> bool {
        self.active_count > 0 && self.submitted_count == self.active_count
    }

    pub fn player_list(&self) -> ServerMessage {
        ServerMessage::PlayerList(PlayerList {
            players: self.players.clone(),
            active_count: self.active_count,
            submitted_count: self.submitted_count,
        })
    }

    pub fn progress(&self) -> ServerMessage {
        ServerMessage::SubmissionProgress(SubmissionProgress {
            submitted_count: self.submitted_count,
            total_players: self.active_count,
        })
    }
}

/// Merge `roster` with the room's current presence.
pub fn compute_view(state: &SharedState, room: &RoomCode, roster: Vec<PlayerEntity>) -> RoomView {
    RoomView::merge(roster, &state.presence().active_names(room))
}

/// Recompute the room view and push it to every subscriber of the room.
///
/// `playerList` is always sent. Progress, and `allSubmitted` once everybody
/// answered, only follow while a round is active.
pub fn publish_view(
    state: &SharedState,
    room: &RoomCode,
    roster: Vec<PlayerEntity>,
    round_active: bool,
) -> RoomView {
    let view = compute_view(state, room, roster);
    publish_room_view(state, room, &view, round_active);
    view
}

/// Publish an already merged view, see [`publish_view`].
pub fn publish_room_view(state: &SharedState, room: &RoomCode, view: &RoomView, round_active: bool) {
    publish(state, room, &view.player_list());
    if round_active {
        publish(state, room, &view.progress());
        if view.all_submitted() {
            publish(state, room, &ServerMessage::AllSubmitted);
        }
    }
}

/// Fan a message out to every live connection bound to `room` and to the
/// room's spectator feed.
///
/// Closed connections are skipped; their socket task cleans them up.
pub fn publish(state: &SharedState, room: &RoomCode, message: &ServerMessage) {
    for connection in state.presence().connections(room) {
        send_private(state, connection, message);
    }

    state.with_room(room, |session| {
        if session.feed().subscriber_count() == 0 {
            return;
        }
        match ServerEvent::json(Some(message.event_name().to_string()), message) {
            Ok(event) => session.feed().broadcast(event),
            Err(err) => warn!(
                room = %room,
                event = message.event_name(),
                error = %err,
                "failed to serialize room feed payload"
            ),
        }
    });
}

/// Queue a message for a single connection, returning whether it was queued.
pub fn send_private(state: &SharedState, connection: ConnectionId, message: &ServerMessage) -> bool {
    let Some(tx) = state
        .connections()
        .get(&connection)
        .map(|entry| entry.tx.clone())
    else {
        debug!(%connection, event = message.event_name(), "connection gone, message dropped");
        return false;
    };

    if tx.send(message.clone()).is_err() {
        debug!(%connection, event = message.event_name(), "writer closed, message dropped");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn player(name: &str, submitted: bool) -> PlayerEntity {
        PlayerEntity {
            name: name.into(),
            submitted,
        }
    }

    #[test]
    fn merge_counts_only_active_players() {
        let active = HashSet::from(["alice".to_string(), "carol".to_string()]);
        let view = RoomView::merge(
            vec![
                player("Alice", true),
                player("Bob", true),
                player("Carol", false),
            ],
            &active,
        );

        assert_eq!(view.players.len(), 3);
        assert!(!view.players[1].active);
        assert_eq!(view.active_count, 2);
        assert_eq!(view.submitted_count, 1);
        assert!(!view.all_submitted());
    }

    #[test]
    fn nobody_active_is_never_all_submitted() {
        let view = RoomView::merge(vec![player("Alice", true)], &HashSet::new());
        assert_eq!(view.active_count, 0);
        assert!(!view.all_submitted());
    }

    #[test]
    fn submitted_inactive_player_does_not_count() {
        let active = HashSet::from(["alice".to_string()]);
        let view = RoomView::merge(vec![player("Alice", true), player("Bob", true)], &active);
        assert_eq!(view.submitted_count, 1);
        assert!(view.all_submitted());
    }

    #[tokio::test]
    async fn publish_reaches_only_connections_of_the_room() {
        let state = AppState::new(AppConfig::default());
        let (inside, mut inside_rx) = state.register_connection();
        let (outside, mut outside_rx) = state.register_connection();
        state.presence().bind(inside, RoomCode::new("AAAA"), "Alice");
        state.presence().bind(outside, RoomCode::new("BBBB"), "Bob");

        let view = publish_view(
            &state,
            &RoomCode::new("AAAA"),
            vec![player("Alice", true)],
            true,
        );
        assert!(view.all_submitted());

        assert!(matches!(inside_rx.recv().await, Some(ServerMessage::PlayerList(_))));
        assert!(matches!(
            inside_rx.recv().await,
            Some(ServerMessage::SubmissionProgress(SubmissionProgress {
                submitted_count: 1,
                total_players: 1
            }))
        ));
        assert_eq!(inside_rx.recv().await, Some(ServerMessage::AllSubmitted));
        assert!(outside_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn idle_rooms_only_get_the_player_list() {
        let state = AppState::new(AppConfig::default());
        let (connection, mut rx) = state.register_connection();
        state.presence().bind(connection, RoomCode::new("AAAA"), "Alice");

        publish_view(&state, &RoomCode::new("AAAA"), vec![player("Alice", false)], false);
        assert!(matches!(rx.recv().await, Some(ServerMessage::PlayerList(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_feed_mirrors_published_messages() {
        let state = AppState::new(AppConfig::default());
        let code = RoomCode::new("AAAA");
        let lease = state.lease_room(&code);
        let mut feed = lease.feed().subscribe();

        publish(&state, &code, &ServerMessage::AllSubmitted);
        let event = feed.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("allSubmitted"));
        assert_eq!(event.data, r#"{"type":"allSubmitted"}"#);
    }
}
