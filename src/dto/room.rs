use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{QuestionId, RoomCode, RoomStatus},
    dto::ws::PlayerView,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Question bound to the round in progress.
pub struct ActiveQuestion {
    pub id: QuestionId,
    /// `None` once the question was removed from the catalog.
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Read-only view of a room, its round and its merged player list.
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub current_round: u32,
    pub active_question: Option<ActiveQuestion>,
    pub players: Vec<PlayerView>,
    pub active_count: usize,
    pub submitted_count: usize,
}
