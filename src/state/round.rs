use thiserror::Error;

use crate::dao::models::{QuestionId, RoomEntity};

/// Lifecycle of a room's current round.
///
/// Revealing answers does not leave [`RoundPhase::Active`]; only the next
/// start moves the room forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No question has been bound yet.
    Idle,
    /// A question is bound and submissions are accepted.
    Active {
        round: u32,
        question_id: QuestionId,
    },
}

/// Events that can be applied to the round machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Operator starts a new round with the question picked by the rotation.
    Start { question_id: QuestionId },
    /// A player answers the given question.
    Submit { question_id: QuestionId },
    /// Operator reveals the answers of the current round.
    Reveal,
}

/// Error returned when an event does not apply to the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the event was received.
    pub from: RoundPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoundEvent,
}

/// Round state machine rebuilt from the durable room record on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundMachine {
    phase: RoundPhase,
    /// Highest round number ever started, kept while idle as well.
    round: u32,
}

impl RoundMachine {
    /// Hydrate the machine from the persisted round fields.
    pub fn from_room(room: &RoomEntity) -> Self {
        let phase = match room.active_question_id {
            Some(question_id) => RoundPhase::Active {
                round: room.current_round,
                question_id,
            },
            None => RoundPhase::Idle,
        };
        Self {
            phase,
            round: room.current_round,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.round
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, RoundPhase::Active { .. })
    }

    /// Apply an event, returning the phase the room is in afterwards.
    ///
    /// The machine is left untouched when the transition is rejected.
    pub fn apply(&mut self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        if let RoundPhase::Active { round, .. } = next {
            self.round = round;
        }
        self.phase = next;
        Ok(next)
    }

    fn compute_transition(&self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let invalid = || InvalidTransition {
            from: self.phase,
            event,
        };

        let next = match (self.phase, event) {
            (_, RoundEvent::Start { question_id }) => RoundPhase::Active {
                round: self.round.checked_add(1).ok_or_else(invalid)?,
                question_id,
            },
            (
                RoundPhase::Active {
                    round,
                    question_id: active,
                },
                RoundEvent::Submit { question_id },
            ) if active == question_id => RoundPhase::Active {
                round,
                question_id: active,
            },
            (active @ RoundPhase::Active { .. }, RoundEvent::Reveal) => active,
            _ => return Err(invalid()),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::RoomCode;

    fn idle_room() -> RoomEntity {
        RoomEntity::open(RoomCode::new("ABCD"))
    }

    #[test]
    fn initial_state_is_idle() {
        let machine = RoundMachine::from_room(&idle_room());
        assert_eq!(machine.phase(), RoundPhase::Idle);
        assert_eq!(machine.current_round(), 0);
    }

    #[test]
    fn start_submit_reveal_and_restart() {
        let mut machine = RoundMachine::from_room(&idle_room());

        assert_eq!(
            machine.apply(RoundEvent::Start { question_id: 1 }),
            Ok(RoundPhase::Active {
                round: 1,
                question_id: 1
            })
        );
        assert!(machine.apply(RoundEvent::Submit { question_id: 1 }).is_ok());
        assert_eq!(
            machine.apply(RoundEvent::Reveal),
            Ok(RoundPhase::Active {
                round: 1,
                question_id: 1
            })
        );
        assert_eq!(
            machine.apply(RoundEvent::Start { question_id: 2 }),
            Ok(RoundPhase::Active {
                round: 2,
                question_id: 2
            })
        );
    }

    #[test]
    fn hydrates_active_round_from_room() {
        let mut room = idle_room();
        room.current_round = 4;
        room.active_question_id = Some(9);

        let machine = RoundMachine::from_room(&room);
        assert_eq!(
            machine.phase(),
            RoundPhase::Active {
                round: 4,
                question_id: 9
            }
        );
    }

    #[test]
    fn submit_for_another_question_is_rejected() {
        let mut machine = RoundMachine::from_room(&idle_room());
        machine.apply(RoundEvent::Start { question_id: 1 }).unwrap();

        let err = machine
            .apply(RoundEvent::Submit { question_id: 2 })
            .unwrap_err();
        assert_eq!(err.event, RoundEvent::Submit { question_id: 2 });
        assert_eq!(machine.current_round(), 1);
    }

    #[test]
    fn reveal_and_submit_require_an_active_round() {
        let mut machine = RoundMachine::from_room(&idle_room());
        let err = machine.apply(RoundEvent::Reveal).unwrap_err();
        assert_eq!(err.from, RoundPhase::Idle);
        assert!(machine.apply(RoundEvent::Submit { question_id: 1 }).is_err());
        assert_eq!(machine.phase(), RoundPhase::Idle);
    }

    #[test]
    fn round_counter_never_wraps() {
        let mut room = idle_room();
        room.current_round = u32::MAX;
        room.active_question_id = Some(1);

        let mut machine = RoundMachine::from_room(&room);
        assert!(machine.apply(RoundEvent::Start { question_id: 2 }).is_err());
        assert_eq!(machine.current_round(), u32::MAX);
    }
}
