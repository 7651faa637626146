use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{AnswerEntity, QuestionId, RoomCode, RoomEntity, RoomStatus},
        room_store::{AnswerLedger, PlayerRoster, QuestionCatalog, RoomDirectory, RoomStore},
    },
    dto::ws::{
        AnswersRevealed, JoinLobby, JoinRejected, JoinRejection, RevealedAnswer, RoomRef,
        RoundStarted, ServerMessage, SubmitAnswer,
    },
    error::ServiceError,
    services::broadcast,
    state::{
        ConnectionId, SharedState,
        round::{RoundEvent, RoundMachine, RoundPhase},
    },
};

/// Result of a `joinLobby` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Connection bound to the room; `replayed` tells whether a round was replayed to it.
    Joined { replayed: bool },
    Rejected(JoinRejection),
}

/// Result of a `startRound` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { round: u32, question_id: QuestionId },
    /// Nothing to ask, the room is left untouched.
    EmptyCatalog,
}

/// Result of a `submitAnswer` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// The player already answered this round; the first answer is kept.
    Duplicate,
    /// The answer targets a question that is not the active one.
    Stale,
}

/// Result of a `showAnswers` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Revealed { answers: usize },
    NoActiveRound,
}

/// Bind a connection to a room/player and bring it up to date.
///
/// Every store access happens before the connection is bound, so a store
/// failure leaves presence exactly as it was.
pub async fn join_lobby(
    state: &SharedState,
    connection: ConnectionId,
    request: &JoinLobby,
) -> Result<JoinOutcome, ServiceError> {
    let code = RoomCode::new(&request.room_code);
    let name = request.name.trim().to_string();
    let store = state.require_room_store().await?;

    let (replayed, previous) = {
        let room_lease = state.lease_room(&code);
        let _gate = room_lease.lock().await;

        let room = match store.find_room(code.clone()).await? {
            Some(room) if room.status == RoomStatus::Open => room,
            found => {
                let reason = if found.is_some() {
                    JoinRejection::Closed
                } else {
                    JoinRejection::NotFound
                };
                info!(room = %code, player = %name, ?reason, "join rejected");
                broadcast::send_private(
                    state,
                    connection,
                    &ServerMessage::JoinRejected(JoinRejected {
                        room_code: code.clone(),
                        reason,
                    }),
                );
                return Ok(JoinOutcome::Rejected(reason));
            }
        };

        store.upsert_player(code.clone(), name.clone()).await?;

        let machine = RoundMachine::from_room(&room);
        let replay = match machine.phase() {
            RoundPhase::Active { round, question_id } => {
                replay_for(store.as_ref(), &code, &name, round, question_id).await?
            }
            RoundPhase::Idle => None,
        };
        let roster = store.list_players(code.clone()).await?;

        let previous = state.presence().bind(connection, code.clone(), &name);
        let view = broadcast::compute_view(state, &code, roster);

        let replayed = match replay {
            Some(mut replay) => {
                replay.player_count = view.active_count;
                broadcast::send_private(state, connection, &ServerMessage::RoundStarted(replay));
                true
            }
            None => false,
        };
        broadcast::publish_room_view(state, &code, &view, machine.is_active());
        info!(room = %code, player = %name, replayed, "player joined");

        (replayed, previous.filter(|binding| binding.room != code))
    };

    if let Some(previous) = previous {
        debug!(from = %previous.room, to = %code, "connection moved to another room");
        if let Err(err) = refresh_room(state, &previous.room).await {
            warn!(room = %previous.room, error = %err, "failed to refresh room after move");
        }
    }

    Ok(JoinOutcome::Joined { replayed })
}

/// Start the next round of a room with the question picked by its rotation.
pub async fn start_round(
    state: &SharedState,
    request: &RoomRef,
) -> Result<StartOutcome, ServiceError> {
    let code = RoomCode::new(&request.room_code);
    let store = state.require_room_store().await?;
    let room_lease = state.lease_room(&code);
    let mut scratch = room_lease.lock().await;

    let room = find_existing_room(store.as_ref(), &code).await?;
    let catalog = store.list_questions().await?;
    // Committed back to the room only once the new round is stored.
    let mut rotation = scratch.rotation.clone();
    let picked = {
        let mut rng = rand::rng();
        rotation.next(
            state.config().rotation(),
            &catalog,
            room.active_question_id,
            &mut rng,
        )
    };
    let Some(question) = picked else {
        debug!(room = %code, "start ignored: question catalog is empty");
        return Ok(StartOutcome::EmptyCatalog);
    };

    let mut machine = RoundMachine::from_room(&room);
    machine.apply(RoundEvent::Start {
        question_id: question.id,
    })?;
    let round = machine.current_round();

    // Flags are cleared before the round moves so a failure in between never
    // leaves a new round with last round's submissions.
    store.reset_submitted(code.clone()).await?;
    store.set_round(code.clone(), round, question.id).await?;
    scratch.rotation = rotation;
    let roster = store.list_players(code.clone()).await?;

    let view = broadcast::compute_view(state, &code, roster);
    broadcast::publish(
        state,
        &code,
        &ServerMessage::RoundStarted(RoundStarted {
            question_id: question.id,
            prompt: question.prompt,
            player_count: view.active_count,
            round_number: round,
            my_answer: None,
        }),
    );
    broadcast::publish_room_view(state, &code, &view, true);
    info!(room = %code, round, question_id = question.id, "round started");

    Ok(StartOutcome::Started {
        round,
        question_id: question.id,
    })
}

/// Record a player's answer for the active round.
pub async fn submit_answer(
    state: &SharedState,
    request: &SubmitAnswer,
) -> Result<SubmitOutcome, ServiceError> {
    let code = RoomCode::new(&request.room_code);
    let name = request.name.trim().to_string();
    let store = state.require_room_store().await?;
    let room_lease = state.lease_room(&code);
    let _gate = room_lease.lock().await;

    let room = find_existing_room(store.as_ref(), &code).await?;
    let mut machine = RoundMachine::from_room(&room);
    if let Err(err) = machine.apply(RoundEvent::Submit {
        question_id: request.question_id,
    }) {
        debug!(
            room = %code,
            player = %name,
            question_id = request.question_id,
            error = %err,
            "stale submission dropped"
        );
        return Ok(SubmitOutcome::Stale);
    }
    let round = machine.current_round();

    let inserted = store
        .append_answer(AnswerEntity::new(
            code.clone(),
            name.clone(),
            request.question_id,
            round,
            request.answer.trim().to_string(),
        ))
        .await?;
    if !inserted {
        debug!(room = %code, player = %name, round, "duplicate submission ignored");
    }

    store.set_submitted(code.clone(), name.clone(), true).await?;
    let roster = store.list_players(code.clone()).await?;
    let view = broadcast::publish_view(state, &code, roster, true);
    debug!(
        room = %code,
        player = %name,
        submitted = view.submitted_count,
        active = view.active_count,
        "answer recorded"
    );

    Ok(if inserted {
        SubmitOutcome::Accepted
    } else {
        SubmitOutcome::Duplicate
    })
}

/// Publish every answer of the active round, ordered by player name.
pub async fn reveal_answers(
    state: &SharedState,
    request: &RoomRef,
) -> Result<RevealOutcome, ServiceError> {
    let code = RoomCode::new(&request.room_code);
    let store = state.require_room_store().await?;
    let room_lease = state.lease_room(&code);
    let _gate = room_lease.lock().await;

    let room = find_existing_room(store.as_ref(), &code).await?;
    let mut machine = RoundMachine::from_room(&room);
    let (round, question_id) = match machine.apply(RoundEvent::Reveal) {
        Ok(RoundPhase::Active { round, question_id }) => (round, question_id),
        Ok(RoundPhase::Idle) | Err(_) => {
            debug!(room = %code, "reveal ignored: no active round");
            return Ok(RevealOutcome::NoActiveRound);
        }
    };

    let answers: Vec<RevealedAnswer> = store
        .query_answers(code.clone(), question_id, round)
        .await?
        .into_iter()
        .map(|answer| RevealedAnswer {
            name: answer.player_name,
            answer: answer.answer,
        })
        .collect();
    let count = answers.len();

    broadcast::publish(
        state,
        &code,
        &ServerMessage::AnswersRevealed(AnswersRevealed { answers }),
    );
    info!(room = %code, round, answers = count, "answers revealed");

    Ok(RevealOutcome::Revealed { answers: count })
}

/// Unbind a closed connection and refresh the room it was part of.
///
/// The binding is always removed, even when the store cannot be reached.
pub async fn leave(state: &SharedState, connection: ConnectionId) {
    let Some(binding) = state.presence().unbind(connection) else {
        return;
    };
    info!(room = %binding.room, player = %binding.name, "player left");

    if let Err(err) = refresh_room(state, &binding.room).await {
        warn!(room = %binding.room, error = %err, "failed to publish room view after departure");
    }
    state.release_room_if_idle(&binding.room);
}

/// Re-broadcast the merged view of a room under its gate.
pub async fn refresh_room(state: &SharedState, code: &RoomCode) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room_lease = state.lease_room(code);
    let _gate = room_lease.lock().await;

    let round_active = store
        .find_room(code.clone())
        .await?
        .is_some_and(|room| RoundMachine::from_room(&room).is_active());
    let roster = store.list_players(code.clone()).await?;
    broadcast::publish_view(state, code, roster, round_active);
    Ok(())
}

/// Prompt of a catalog question, `None` once it was removed from the catalog.
pub async fn question_prompt(
    store: &dyn RoomStore,
    question_id: QuestionId,
) -> Result<Option<String>, ServiceError> {
    Ok(store
        .list_questions()
        .await?
        .into_iter()
        .find(|question| question.id == question_id)
        .map(|question| question.prompt))
}

async fn find_existing_room(
    store: &dyn RoomStore,
    code: &RoomCode,
) -> Result<RoomEntity, ServiceError> {
    store
        .find_room(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}` not found")))
}

/// Private replay of the active round for a (re)joining player.
async fn replay_for(
    store: &dyn RoomStore,
    code: &RoomCode,
    name: &str,
    round: u32,
    question_id: QuestionId,
) -> Result<Option<RoundStarted>, ServiceError> {
    let Some(prompt) = question_prompt(store, question_id).await? else {
        warn!(room = %code, question_id, "active question missing from catalog, no replay");
        return Ok(None);
    };
    let my_answer = store
        .find_answer(code.clone(), name.to_string(), question_id, round)
        .await?
        .map(|answer| answer.answer);

    Ok(Some(RoundStarted {
        question_id,
        prompt,
        player_count: 0,
        round_number: round,
        my_answer,
    }))
}
