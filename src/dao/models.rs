use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use utoipa::ToSchema;

/// Identifier of a question in the catalog.
pub type QuestionId = i64;

/// Room code normalised to uppercase with surrounding whitespace removed.
///
/// Every boundary (WebSocket payloads, REST paths, storage keys) goes through
/// [`RoomCode::new`] so two spellings of the same code always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalise a raw code as typed by a player.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// Borrow the normalised code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-insensitive lookup key for a player name.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whether a room accepts new players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Open,
    Closed,
}

/// Durable room record as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntity {
    /// Uppercased unique room code.
    pub code: RoomCode,
    pub status: RoomStatus,
    /// Monotonic round counter, `0` before the first round.
    pub current_round: u32,
    /// Question bound to the round in progress, `None` while no round ever started.
    pub active_question_id: Option<QuestionId>,
}

impl RoomEntity {
    /// Fresh open room with no round played yet.
    pub fn open(code: RoomCode) -> Self {
        Self {
            code,
            status: RoomStatus::Open,
            current_round: 0,
            active_question_id: None,
        }
    }
}

/// Catalog question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEntity {
    pub id: QuestionId,
    pub prompt: String,
    /// Rotation key managed outside of the core.
    pub sort_number: i32,
}

/// Roster row for a player in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntity {
    /// Name as first seen, original casing preserved.
    pub name: String,
    /// Whether the player answered the current round.
    pub submitted: bool,
}

/// Answer row appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntity {
    pub room_code: RoomCode,
    pub player_name: String,
    pub question_id: QuestionId,
    pub round_number: u32,
    pub answer: String,
    pub created_at: SystemTime,
}

impl AnswerEntity {
    /// Build a new ledger row stamped with the current time.
    pub fn new(
        room_code: RoomCode,
        player_name: String,
        question_id: QuestionId,
        round_number: u32,
        answer: String,
    ) -> Self {
        Self {
            room_code,
            player_name,
            question_id,
            round_number,
            answer,
            created_at: SystemTime::now(),
        }
    }

    /// Case-insensitive key of the author.
    pub fn player_key(&self) -> String {
        name_key(&self.player_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_are_case_normalised() {
        assert_eq!(RoomCode::new(" abcd "), RoomCode::new("ABCD"));
        assert_eq!(RoomCode::new("aBcD").as_str(), "ABCD");
    }

    #[test]
    fn name_keys_ignore_case_and_padding() {
        assert_eq!(name_key(" Alice"), name_key("aLICE "));
    }
}
