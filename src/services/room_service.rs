use crate::{
    dao::{
        models::RoomCode,
        room_store::{PlayerRoster, RoomDirectory},
    },
    dto::room::{ActiveQuestion, RoomSnapshot},
    error::ServiceError,
    services::{broadcast, round_service},
    state::SharedState,
};

/// Build a read-only snapshot of a room merged with live presence.
///
/// Does not take the room gate, the snapshot may be one event behind.
pub async fn room_snapshot(state: &SharedState, code: &RoomCode) -> Result<RoomSnapshot, ServiceError> {
    let store = state.require_room_store().await?;
    let room = store
        .find_room(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))?;

    let active_question = match room.active_question_id {
        Some(id) => Some(ActiveQuestion {
            id,
            prompt: round_service::question_prompt(store.as_ref(), id).await?,
        }),
        None => None,
    };

    let roster = store.list_players(code.clone()).await?;
    let view = broadcast::compute_view(state, code, roster);

    Ok(RoomSnapshot {
        code: room.code,
        status: room.status,
        current_round: room.current_round,
        active_question,
        players: view.players,
        active_count: view.active_count,
        submitted_count: view.submitted_count,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{QuestionEntity, RoomEntity, RoomStatus},
            room_store::InMemoryRoomStore,
        },
        state::AppState,
    };

    #[tokio::test]
    async fn snapshot_merges_roster_with_presence() {
        let store = InMemoryRoomStore::new();
        let mut room = RoomEntity::open(RoomCode::new("ABCD"));
        room.current_round = 2;
        room.active_question_id = Some(5);
        store.insert_room(room);
        store.insert_question(QuestionEntity {
            id: 5,
            prompt: "Prompt E".into(),
            sort_number: 1,
        });
        store
            .upsert_player(RoomCode::new("ABCD"), "Alice".into())
            .await
            .unwrap();
        store
            .upsert_player(RoomCode::new("ABCD"), "Bob".into())
            .await
            .unwrap();

        let state = AppState::new(AppConfig::default());
        state.install_room_store(Arc::new(store)).await;
        state
            .presence()
            .bind(Uuid::new_v4(), RoomCode::new("ABCD"), "bob");

        let snapshot = room_snapshot(&state, &RoomCode::new("abcd")).await.unwrap();
        assert_eq!(snapshot.status, RoomStatus::Open);
        assert_eq!(snapshot.current_round, 2);
        assert_eq!(
            snapshot.active_question,
            Some(ActiveQuestion {
                id: 5,
                prompt: Some("Prompt E".into()),
            })
        );
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.active_count, 1);
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(InMemoryRoomStore::new()))
            .await;

        let err = room_snapshot(&state, &RoomCode::new("NOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
