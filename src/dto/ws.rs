use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dao::models::{QuestionId, RoomCode};
use crate::dto::validation::{validate_answer, validate_player_name, validate_room_code};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player and operator WebSocket clients.
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "joinLobby")]
    JoinLobby(JoinLobby),
    #[serde(rename = "startRound")]
    StartRound(RoomRef),
    #[serde(rename = "submitAnswer")]
    SubmitAnswer(SubmitAnswer),
    #[serde(rename = "showAnswers")]
    ShowAnswers(RoomRef),
    #[serde(other)]
    Unknown,
}

/// Error raised when an inbound frame cannot be turned into a [`ClientMessage`].
#[derive(Debug, Error)]
pub enum ClientMessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, ClientMessageError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Room targeted by the message, when it names one.
    pub fn room_code(&self) -> Option<RoomCode> {
        match self {
            Self::JoinLobby(payload) => Some(RoomCode::new(&payload.room_code)),
            Self::StartRound(payload) | Self::ShowAnswers(payload) => {
                Some(RoomCode::new(&payload.room_code))
            }
            Self::SubmitAnswer(payload) => Some(RoomCode::new(&payload.room_code)),
            Self::Unknown => None,
        }
    }
}

impl Validate for ClientMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::JoinLobby(payload) => payload.validate(),
            Self::StartRound(payload) | Self::ShowAnswers(payload) => payload.validate(),
            Self::SubmitAnswer(payload) => payload.validate(),
            Self::Unknown => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// A player entering a room lobby.
pub struct JoinLobby {
    pub room_code: String,
    pub name: String,
}

impl Validate for JoinLobby {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_room_code(&self.room_code) {
            errors.add("roomCode", e);
        }
        if let Err(e) = validate_player_name(&self.name) {
            errors.add("name", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Operator command addressed to a room.
pub struct RoomRef {
    pub room_code: String,
}

impl Validate for RoomRef {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_room_code(&self.room_code) {
            errors.add("roomCode", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Answer to the question currently shown to the player.
pub struct SubmitAnswer {
    pub room_code: String,
    pub name: String,
    pub question_id: QuestionId,
    pub answer: String,
}

impl Validate for SubmitAnswer {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_room_code(&self.room_code) {
            errors.add("roomCode", e);
        }
        if let Err(e) = validate_player_name(&self.name) {
            errors.add("name", e);
        }
        if let Err(e) = validate_answer(&self.answer) {
            errors.add("answer", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Messages pushed to WebSocket clients (and mirrored on the room feed).
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "playerList")]
    PlayerList(PlayerList),
    #[serde(rename = "roundStarted")]
    RoundStarted(RoundStarted),
    #[serde(rename = "submissionProgress")]
    SubmissionProgress(SubmissionProgress),
    #[serde(rename = "allSubmitted")]
    AllSubmitted,
    #[serde(rename = "answersRevealed")]
    AnswersRevealed(AnswersRevealed),
    #[serde(rename = "joinRejected")]
    JoinRejected(JoinRejected),
}

impl ServerMessage {
    /// Event name used when the message is forwarded on an SSE stream.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PlayerList(_) => "playerList",
            Self::RoundStarted(_) => "roundStarted",
            Self::SubmissionProgress(_) => "submissionProgress",
            Self::AllSubmitted => "allSubmitted",
            Self::AnswersRevealed(_) => "answersRevealed",
            Self::JoinRejected(_) => "joinRejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// A roster entry merged with live presence.
pub struct PlayerView {
    pub name: String,
    pub submitted: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Canonical player list of a room.
pub struct PlayerList {
    pub players: Vec<PlayerView>,
    pub active_count: usize,
    /// Players that are both connected and submitted.
    pub submitted_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// New round announcement, or the private replay sent to a (re)joining connection.
pub struct RoundStarted {
    pub question_id: QuestionId,
    pub prompt: String,
    pub player_count: usize,
    pub round_number: u32,
    /// The receiving player's answer for this round, only set on replays.
    pub my_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionProgress {
    pub submitted_count: usize,
    pub total_players: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevealedAnswer {
    pub name: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Answers of the current round ordered by player name.
pub struct AnswersRevealed {
    pub answers: Vec<RevealedAnswer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Why a join request was refused.
pub enum JoinRejection {
    NotFound,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Sent privately to a connection whose join was refused.
pub struct JoinRejected {
    pub room_code: RoomCode,
    pub reason: JoinRejection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_join_lobby() {
        let message =
            ClientMessage::from_json_str(r#"{"type":"joinLobby","roomCode":"abcd","name":"Alice"}"#)
                .unwrap();
        match &message {
            ClientMessage::JoinLobby(payload) => assert_eq!(payload.name, "Alice"),
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(message.room_code(), Some(RoomCode::new("ABCD")));
    }

    #[test]
    fn parses_submit_answer() {
        let message = ClientMessage::from_json_str(
            r#"{"type":"submitAnswer","roomCode":"ABCD","name":"Bob","questionId":2,"answer":"foo"}"#,
        )
        .unwrap();
        assert!(matches!(
            message,
            ClientMessage::SubmitAnswer(SubmitAnswer { question_id: 2, .. })
        ));
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let message = ClientMessage::from_json_str(r#"{"type":"dance","roomCode":"ABCD"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
        assert_eq!(message.room_code(), None);
    }

    #[test]
    fn invalid_payload_is_rejected() {
        let err = ClientMessage::from_json_str(r#"{"type":"joinLobby","roomCode":"AB CD","name":""}"#)
            .unwrap_err();
        assert!(matches!(err, ClientMessageError::Invalid(_)));

        let err = ClientMessage::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ClientMessageError::Malformed(_)));
    }

    #[test]
    fn outbound_messages_use_camel_case_tags() {
        let progress = ServerMessage::SubmissionProgress(SubmissionProgress {
            submitted_count: 1,
            total_players: 1,
        });
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            json!({"type": "submissionProgress", "submittedCount": 1, "totalPlayers": 1})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::AllSubmitted).unwrap(),
            json!({"type": "allSubmitted"})
        );

        let replay = ServerMessage::RoundStarted(RoundStarted {
            question_id: 1,
            prompt: "Prompt A".into(),
            player_count: 2,
            round_number: 3,
            my_answer: None,
        });
        assert_eq!(
            serde_json::to_value(&replay).unwrap(),
            json!({
                "type": "roundStarted",
                "questionId": 1,
                "prompt": "Prompt A",
                "playerCount": 2,
                "roundNumber": 3,
                "myAnswer": null
            })
        );

        let rejected = ServerMessage::JoinRejected(JoinRejected {
            room_code: RoomCode::new("zz"),
            reason: JoinRejection::NotFound,
        });
        assert_eq!(
            serde_json::to_value(&rejected).unwrap(),
            json!({"type": "joinRejected", "roomCode": "ZZ", "reason": "notFound"})
        );
    }
}
