use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    connection::{open_database, ping},
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{MongoAnswerDocument, MongoPlayerDocument, MongoQuestionDocument, MongoRoomDocument},
};
use crate::dao::{
    models::{
        AnswerEntity, PlayerEntity, QuestionEntity, QuestionId, RoomCode, RoomEntity, RoomStatus,
        name_key,
    },
    room_store::{AnswerLedger, PlayerRoster, QuestionCatalog, RoomDirectory, RoomStore},
    storage::StorageResult,
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const QUESTION_COLLECTION_NAME: &str = "questions";
const PLAYER_COLLECTION_NAME: &str = "players";
const ANSWER_COLLECTION_NAME: &str = "answers";

/// MongoDB implementation of every room store contract.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            open_database(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure the uniqueness indexes exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            open_database(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let player_index = IndexModel::builder()
            .keys(doc! {"room_code": 1, "name_key": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_room_name_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(PLAYER_COLLECTION_NAME)
            .create_index(player_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "room_code,name_key",
                source,
            })?;

        let answer_index = IndexModel::builder()
            .keys(doc! {"room_code": 1, "player_key": 1, "question_id": 1, "round_number": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("answer_round_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(ANSWER_COLLECTION_NAME)
            .create_index(answer_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ANSWER_COLLECTION_NAME,
                index: "room_code,player_key,question_id,round_number",
                source,
            })?;

        let question_index = IndexModel::builder()
            .keys(doc! {"sort_number": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("question_sort_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(QUESTION_COLLECTION_NAME)
            .create_index(question_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: QUESTION_COLLECTION_NAME,
                index: "sort_number",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database().await.collection(ROOM_COLLECTION_NAME)
    }

    async fn questions(&self) -> Collection<MongoQuestionDocument> {
        self.database().await.collection(QUESTION_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database().await.collection(PLAYER_COLLECTION_NAME)
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database().await.collection(ANSWER_COLLECTION_NAME)
    }

    async fn find_room(&self, code: RoomCode) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc! {"_id": code.as_str()})
            .await
            .map_err(|source| MongoDaoError::LoadRoom {
                code: code.to_string(),
                source,
            })?;

        document.map(RoomEntity::try_from).transpose()
    }

    async fn set_round(&self, code: RoomCode, round: u32, question_id: QuestionId) -> MongoResult<()> {
        // The round filter keeps the counter monotonic even if two writers race.
        let result = self
            .rooms()
            .await
            .update_one(
                doc! {"_id": code.as_str(), "current_round": {"$lt": i64::from(round)}},
                doc! {"$set": {"current_round": i64::from(round), "active_question_id": question_id}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.to_string(),
                source,
            })?;

        if result.matched_count == 0 {
            warn!(room = %code, round, "round update matched no room; counter left untouched");
        }
        Ok(())
    }

    async fn set_status(&self, code: RoomCode, status: RoomStatus) -> MongoResult<()> {
        let status = match status {
            RoomStatus::Open => "open",
            RoomStatus::Closed => "closed",
        };
        self.rooms()
            .await
            .update_one(
                doc! {"_id": code.as_str()},
                doc! {"$set": {"status": status}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn list_questions(&self) -> MongoResult<Vec<QuestionEntity>> {
        let documents: Vec<MongoQuestionDocument> = self
            .questions()
            .await
            .find(doc! {})
            .sort(doc! {"sort_number": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::ListQuestions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListQuestions { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn upsert_player(&self, room: RoomCode, name: String) -> MongoResult<()> {
        let player = MongoPlayerDocument::new(&room, &name);
        let outcome = self
            .players()
            .await
            .update_one(
                doc! {"room_code": player.room_code.as_str(), "name_key": player.name_key.as_str()},
                doc! {"$setOnInsert": {
                    "name": player.name.as_str(),
                    "submitted": false,
                    "joined_at": player.joined_at,
                }},
            )
            .upsert(true)
            .await;

        match outcome {
            Ok(_) => Ok(()),
            // A concurrent upsert won the race for the unique key.
            Err(source) if is_duplicate_key(&source) => {
                debug!(room = %room, player = %name, "player already present");
                Ok(())
            }
            Err(source) => Err(MongoDaoError::WriteRoster {
                code: room.to_string(),
                source,
            }),
        }
    }

    async fn list_players(&self, room: RoomCode) -> MongoResult<Vec<PlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! {"room_code": room.as_str()})
            .sort(doc! {"joined_at": 1, "name_key": 1})
            .await
            .map_err(|source| MongoDaoError::LoadRoster {
                code: room.to_string(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRoster {
                code: room.to_string(),
                source,
            })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn set_submitted(&self, room: RoomCode, name: String, submitted: bool) -> MongoResult<()> {
        self.players()
            .await
            .update_one(
                doc! {"room_code": room.as_str(), "name_key": name_key(&name)},
                doc! {"$set": {"submitted": submitted}},
            )
            .await
            .map_err(|source| MongoDaoError::WriteRoster {
                code: room.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn reset_submitted(&self, room: RoomCode) -> MongoResult<()> {
        self.players()
            .await
            .update_many(
                doc! {"room_code": room.as_str()},
                doc! {"$set": {"submitted": false}},
            )
            .await
            .map_err(|source| MongoDaoError::WriteRoster {
                code: room.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn append_answer(&self, answer: AnswerEntity) -> MongoResult<bool> {
        let code = answer.room_code.to_string();
        let document: MongoAnswerDocument = answer.into();
        match self.answers().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(source) if is_duplicate_key(&source) => Ok(false),
            Err(source) => Err(MongoDaoError::AppendAnswer { code, source }),
        }
    }

    async fn query_answers(
        &self,
        room: RoomCode,
        question_id: QuestionId,
        round: u32,
    ) -> MongoResult<Vec<AnswerEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .await
            .find(doc! {
                "room_code": room.as_str(),
                "question_id": question_id,
                "round_number": i64::from(round),
            })
            .sort(doc! {"player_key": 1, "player_name": 1})
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                code: room.to_string(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                code: room.to_string(),
                source,
            })?;

        documents.into_iter().map(AnswerEntity::try_from).collect()
    }

    async fn find_answer(
        &self,
        room: RoomCode,
        name: String,
        question_id: QuestionId,
        round: u32,
    ) -> MongoResult<Option<AnswerEntity>> {
        let document = self
            .answers()
            .await
            .find_one(doc! {
                "room_code": room.as_str(),
                "player_key": name_key(&name),
                "question_id": question_id,
                "round_number": i64::from(round),
            })
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                code: room.to_string(),
                source,
            })?;

        document.map(AnswerEntity::try_from).transpose()
    }
}

impl RoomDirectory for MongoRoomStore {
    fn find_room(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(code).await.map_err(Into::into) })
    }

    fn set_round(
        &self,
        code: RoomCode,
        round: u32,
        question_id: QuestionId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_round(code, round, question_id)
                .await
                .map_err(Into::into)
        })
    }

    fn set_status(
        &self,
        code: RoomCode,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.set_status(code, status).await.map_err(Into::into) })
    }
}

impl QuestionCatalog for MongoRoomStore {
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_questions().await.map_err(Into::into) })
    }
}

impl PlayerRoster for MongoRoomStore {
    fn upsert_player(&self, room: RoomCode, name: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_player(room, name).await.map_err(Into::into) })
    }

    fn list_players(&self, room: RoomCode) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(room).await.map_err(Into::into) })
    }

    fn set_submitted(
        &self,
        room: RoomCode,
        name: String,
        submitted: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_submitted(room, name, submitted)
                .await
                .map_err(Into::into)
        })
    }

    fn reset_submitted(&self, room: RoomCode) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reset_submitted(room).await.map_err(Into::into) })
    }
}

impl AnswerLedger for MongoRoomStore {
    fn append_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.append_answer(answer).await.map_err(Into::into) })
    }

    fn query_answers(
        &self,
        room: RoomCode,
        question_id: QuestionId,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .query_answers(room, question_id, round)
                .await
                .map_err(Into::into)
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
            store
                .find_answer(room, name, question_id, round)
                .await
                .map_err(Into::into)
        })
    }
}

impl RoomStore for MongoRoomStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
