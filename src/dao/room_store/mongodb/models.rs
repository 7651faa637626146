use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use super::error::MongoDaoError;
use crate::dao::models::{
    AnswerEntity, PlayerEntity, QuestionEntity, QuestionId, RoomCode, RoomEntity, RoomStatus,
    name_key,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    pub code: String,
    pub status: RoomStatus,
    #[serde(default)]
    pub current_round: i64,
    #[serde(default)]
    pub active_question_id: Option<QuestionId>,
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> Result<Self, Self::Error> {
        let current_round = round_from_i64(value.current_round, &value.code)?;
        Ok(Self {
            code: RoomCode::new(&value.code),
            status: value.status,
            current_round,
            active_question_id: value.active_question_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    pub prompt: String,
    #[serde(default)]
    pub sort_number: i32,
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: value.id,
            prompt: value.prompt,
            sort_number: value.sort_number,
        }
    }
}

/// Roster row; `(room_code, name_key)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    pub room_code: String,
    pub name_key: String,
    pub name: String,
    pub submitted: bool,
    pub joined_at: DateTime,
}

impl MongoPlayerDocument {
    pub fn new(room: &RoomCode, name: &str) -> Self {
        Self {
            room_code: room.as_str().to_owned(),
            name_key: name_key(name),
            name: name.trim().to_owned(),
            submitted: false,
            joined_at: DateTime::now(),
        }
    }
}

impl From<MongoPlayerDocument> for PlayerEntity {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            name: value.name,
            submitted: value.submitted,
        }
    }
}

/// Ledger row; `(room_code, player_key, question_id, round_number)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    pub room_code: String,
    pub player_key: String,
    pub player_name: String,
    pub question_id: QuestionId,
    pub round_number: i64,
    pub answer: String,
    pub created_at: DateTime,
}

impl From<AnswerEntity> for MongoAnswerDocument {
    fn from(value: AnswerEntity) -> Self {
        Self {
            room_code: value.room_code.as_str().to_owned(),
            player_key: value.player_key(),
            player_name: value.player_name,
            question_id: value.question_id,
            round_number: i64::from(value.round_number),
            answer: value.answer,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoAnswerDocument> for AnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> Result<Self, Self::Error> {
        let round_number = round_from_i64(value.round_number, &value.room_code)?;
        Ok(Self {
            room_code: RoomCode::new(&value.room_code),
            player_name: value.player_name,
            question_id: value.question_id,
            round_number,
            answer: value.answer,
            created_at: value.created_at.to_system_time(),
        })
    }
}

fn round_from_i64(round: i64, code: &str) -> Result<u32, MongoDaoError> {
    u32::try_from(round).map_err(|_| MongoDaoError::Corrupt {
        message: format!("room `{code}` has an out-of-range round number {round}"),
    })
}
