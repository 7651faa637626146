pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{
    models::{AnswerEntity, PlayerEntity, QuestionEntity, QuestionId, RoomCode, RoomEntity, RoomStatus},
    storage::StorageResult,
};

pub use memory::InMemoryRoomStore;

/// Durable room records. Only the round engine mutates round fields.
pub trait RoomDirectory: Send + Sync {
    fn find_room(&self, code: RoomCode) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Persist the round counter and the question bound to it.
    fn set_round(
        &self,
        code: RoomCode,
        round: u32,
        question_id: QuestionId,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn set_status(&self, code: RoomCode, status: RoomStatus)
    -> BoxFuture<'static, StorageResult<()>>;
}

/// Read-only view of the question catalog.
pub trait QuestionCatalog: Send + Sync {
    /// Questions ordered by their sort number.
    fn list_questions(&self) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
}

/// Per-room roster keyed by case-insensitive player name.
pub trait PlayerRoster: Send + Sync {
    /// Insert the player unless a row with the same case-insensitive name exists.
    fn upsert_player(&self, room: RoomCode, name: String) -> BoxFuture<'static, StorageResult<()>>;
    fn list_players(&self, room: RoomCode) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    fn set_submitted(
        &self,
        room: RoomCode,
        name: String,
        submitted: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Clear the submitted flag of every player in the room.
    fn reset_submitted(&self, room: RoomCode) -> BoxFuture<'static, StorageResult<()>>;
}

/// Append-only answer ledger.
pub trait AnswerLedger: Send + Sync {
    /// Append an answer, returning `false` when the
    /// (room, player, question, round) tuple was already recorded.
    fn append_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// All answers for a round ordered by player name.
    fn query_answers(
        &self,
        room: RoomCode,
        question_id: QuestionId,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    /// The answer of a single player for a round, matched case-insensitively.
    fn find_answer(
        &self,
        room: RoomCode,
        name: String,
        question_id: QuestionId,
        round: u32,
    ) -> BoxFuture<'static, StorageResult<Option<AnswerEntity>>>;
}

/// Complete persistence backend consumed by the room services.
pub trait RoomStore: RoomDirectory + QuestionCatalog + PlayerRoster + AnswerLedger {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
