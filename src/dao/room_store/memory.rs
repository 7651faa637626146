//! Process-local room store used as the default backend and by the test-suite.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use thiserror::Error;

use super::{AnswerLedger, PlayerRoster, QuestionCatalog, RoomDirectory, RoomStore};
use crate::dao::{
    models::{
        AnswerEntity, PlayerEntity, QuestionEntity, QuestionId, RoomCode, RoomEntity, RoomStatus,
        name_key,
    },
    storage::{StorageError, StorageResult},
};

type AnswerKey = (RoomCode, String, QuestionId, u32);

/// Failure reported while the store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory store is offline")]
pub struct MemoryStoreOffline;

#[derive(Clone)]
pub struct InMemoryRoomStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    online: AtomicBool,
    rooms: DashMap<RoomCode, RoomEntity>,
    questions: RwLock<Vec<QuestionEntity>>,
    /// Roster rows in join order, keyed by lowercase name.
    players: DashMap<RoomCode, Vec<(String, PlayerEntity)>>,
    answers: DashMap<AnswerKey, AnswerEntity>,
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomStore {
    /// Empty, online store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                online: AtomicBool::new(true),
                rooms: DashMap::new(),
                questions: RwLock::new(Vec::new()),
                players: DashMap::new(),
                answers: DashMap::new(),
            }),
        }
    }

    /// Create or replace a room record. Bootstrap helper, not part of the core contracts.
    pub fn insert_room(&self, room: RoomEntity) {
        self.inner.rooms.insert(room.code.clone(), room);
    }

    /// Add a question to the catalog, keeping it ordered by sort number.
    pub fn insert_question(&self, question: QuestionEntity) {
        let mut guard = self
            .inner
            .questions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.retain(|existing| existing.id != question.id);
        guard.push(question);
        guard.sort_by_key(|q| (q.sort_number, q.id));
    }

    /// Simulate a backend outage: every operation fails while offline.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Number of ledger rows for a tuple, used to check the append-only invariant.
    pub fn answer_rows(&self, room: &RoomCode, question_id: QuestionId, round: u32) -> usize {
        self.inner
            .answers
            .iter()
            .filter(|entry| {
                let (code, _, question, answer_round) = entry.key();
                code == room && *question == question_id && *answer_round == round
            })
            .count()
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.inner.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                "in-memory store offline".into(),
                MemoryStoreOffline,
            ))
        }
    }
}

impl RoomDirectory for InMemoryRoomStore {
    fn find_room(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            Ok(store.inner.rooms.get(&code).map(|room| room.clone()))
        })
    }

    fn set_round(
        &self,
        code: RoomCode,
        round: u32,
        question_id: QuestionId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            if let Some(mut room) = store.inner.rooms.get_mut(&code) {
                room.current_round = round;
                room.active_question_id = Some(question_id);
            }
            Ok(())
        })
    }

    fn set_status(
        &self,
        code: RoomCode,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            if let Some(mut room) = store.inner.rooms.get_mut(&code) {
                room.status = status;
            }
            Ok(())
        })
    }
}

impl QuestionCatalog for InMemoryRoomStore {
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let guard = store
                .inner
                .questions
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Ok(guard.clone())
        })
    }
}

impl PlayerRoster for InMemoryRoomStore {
    fn upsert_player(&self, room: RoomCode, name: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let key = name_key(&name);
            let mut roster = store.inner.players.entry(room).or_default();
            if !roster.iter().any(|(existing, _)| *existing == key) {
                roster.push((
                    key,
                    PlayerEntity {
                        name: name.trim().to_string(),
                        submitted: false,
                    },
                ));
            }
            Ok(())
        })
    }

    fn list_players(&self, room: RoomCode) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            Ok(store
                .inner
                .players
                .get(&room)
                .map(|roster| roster.iter().map(|(_, player)| player.clone()).collect())
                .unwrap_or_default())
        })
    }

    fn set_submitted(
        &self,
        room: RoomCode,
        name: String,
        submitted: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let key = name_key(&name);
            if let Some(mut roster) = store.inner.players.get_mut(&room) {
                if let Some((_, player)) = roster.iter_mut().find(|(existing, _)| *existing == key)
                {
                    player.submitted = submitted;
                }
            }
            Ok(())
        })
    }

    fn reset_submitted(&self, room: RoomCode) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            if let Some(mut roster) = store.inner.players.get_mut(&room) {
                roster
                    .iter_mut()
                    .for_each(|(_, player)| player.submitted = false);
            }
            Ok(())
        })
    }
}

impl AnswerLedger for InMemoryRoomStore {
    fn append_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let key = (
                answer.room_code.clone(),
                answer.player_key(),
                answer.question_id,
                answer.round_number,
            );
            match store.inner.answers.entry(key) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(answer);
                    Ok(true)
                }
            }
        })
    }

    fn query_answers(
        &self,
        room: RoomCode,
        question_id: QuestionId,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let mut answers: Vec<AnswerEntity> = store
                .inner
                .answers
                .iter()
                .filter(|entry| {
                    let (code, _, question, answer_round) = entry.key();
                    *code == room && *question == question_id && *answer_round == round
                })
                .map(|entry| entry.value().clone())
                .collect();
            answers.sort_by(|a, b| {
                a.player_key()
                    .cmp(&b.player_key())
                    .then_with(|| a.player_name.cmp(&b.player_name))
            });
            Ok(answers)
        })
    }

    fn find_answer(
        &self,
        room: RoomCode,
        name: String,
        question_id: QuestionId,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Option<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let key = (room, name_key(&name), question_id, round);
            Ok(store.inner.answers.get(&key).map(|entry| entry.clone()))
        })
    }
}

impl RoomStore for InMemoryRoomStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> RoomCode {
        RoomCode::new(code)
    }

    #[tokio::test]
    async fn upsert_is_case_insensitive_and_keeps_first_casing() {
        let store = InMemoryRoomStore::new();
        store.upsert_player(room("abcd"), "alice".into()).await.unwrap();
        store.upsert_player(room("ABCD"), "Alice".into()).await.unwrap();
        store.upsert_player(room("ABCD"), "ALICE ".into()).await.unwrap();

        let players = store.list_players(room("ABCD")).await.unwrap();
        assert_eq!(
            players,
            vec![PlayerEntity {
                name: "alice".into(),
                submitted: false
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_answer_is_not_appended() {
        let store = InMemoryRoomStore::new();
        let first = AnswerEntity::new(room("ABCD"), "Bob".into(), 1, 1, "first".into());
        let second = AnswerEntity::new(room("ABCD"), "bob".into(), 1, 1, "second".into());

        assert!(store.append_answer(first).await.unwrap());
        assert!(!store.append_answer(second).await.unwrap());
        assert_eq!(store.answer_rows(&room("ABCD"), 1, 1), 1);

        let stored = store
            .find_answer(room("ABCD"), "BOB".into(), 1, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.answer, "first");
    }

    #[tokio::test]
    async fn answers_are_ordered_by_player_name() {
        let store = InMemoryRoomStore::new();
        for name in ["carol", "Alice", "bob"] {
            let answer = AnswerEntity::new(room("ABCD"), name.into(), 7, 2, format!("{name}!"));
            store.append_answer(answer).await.unwrap();
        }
        // Different round, must not leak into the query.
        let stale = AnswerEntity::new(room("ABCD"), "dave".into(), 7, 1, "old".into());
        store.append_answer(stale).await.unwrap();

        let names: Vec<String> = store
            .query_answers(room("ABCD"), 7, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|answer| answer.player_name)
            .collect();
        assert_eq!(names, vec!["Alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn reset_clears_every_submitted_flag() {
        let store = InMemoryRoomStore::new();
        for name in ["alice", "bob"] {
            store.upsert_player(room("ABCD"), name.into()).await.unwrap();
            store
                .set_submitted(room("ABCD"), name.to_uppercase(), true)
                .await
                .unwrap();
        }
        assert!(
            store
                .list_players(room("ABCD"))
                .await
                .unwrap()
                .iter()
                .all(|player| player.submitted)
        );

        store.reset_submitted(room("ABCD")).await.unwrap();
        assert!(
            store
                .list_players(room("ABCD"))
                .await
                .unwrap()
                .iter()
                .all(|player| !player.submitted)
        );
    }

    #[tokio::test]
    async fn room_round_and_status_updates() {
        let store = InMemoryRoomStore::new();
        store.insert_room(RoomEntity::open(room("ABCD")));

        store.set_round(room("abcd"), 3, 9).await.unwrap();
        store.set_status(room("ABCD"), RoomStatus::Closed).await.unwrap();

        let stored = store.find_room(room("ABCD")).await.unwrap().unwrap();
        assert_eq!(stored.current_round, 3);
        assert_eq!(stored.active_question_id, Some(9));
        assert_eq!(stored.status, RoomStatus::Closed);
    }

    #[tokio::test]
    async fn questions_are_listed_by_sort_number() {
        let store = InMemoryRoomStore::new();
        store.insert_question(QuestionEntity {
            id: 1,
            prompt: "late".into(),
            sort_number: 20,
        });
        store.insert_question(QuestionEntity {
            id: 2,
            prompt: "early".into(),
            sort_number: 10,
        });

        let prompts: Vec<String> = store
            .list_questions()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.prompt)
            .collect();
        assert_eq!(prompts, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = InMemoryRoomStore::new();
        store.set_online(false);
        assert!(store.find_room(room("ABCD")).await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_online(true);
        assert!(store.health_check().await.is_ok());
    }
}
