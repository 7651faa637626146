use std::collections::VecDeque;

use rand::{Rng, seq::IndexedRandom, seq::SliceRandom};

use crate::{
    config::RotationPolicy,
    dao::models::{QuestionEntity, QuestionId},
};

/// Per-room cursor over the question catalog.
///
/// Only scratch state: losing it (room reclaimed, process restart) starts a
/// fresh cycle and never affects durable round data. The question still bound
/// to the room is passed to [`QuestionRotation::next`] so a fresh cycle does
/// not open with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionRotation {
    queue: VecDeque<QuestionId>,
    last: Option<QuestionId>,
}

impl QuestionRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the question for the next round, or `None` when the catalog is empty.
    ///
    /// `current` is the question the room is bound to right now, if any.
    pub fn next<R: Rng + ?Sized>(
        &mut self,
        policy: RotationPolicy,
        catalog: &[QuestionEntity],
        current: Option<QuestionId>,
        rng: &mut R,
    ) -> Option<QuestionEntity> {
        if catalog.is_empty() {
            return None;
        }
        if current.is_some() {
            self.last = current;
        }

        let picked = match policy {
            RotationPolicy::Random => catalog.choose(rng).cloned(),
            RotationPolicy::Shuffle => self.next_shuffled(catalog, rng),
        }?;
        self.last = Some(picked.id);
        Some(picked)
    }

    fn next_shuffled<R: Rng + ?Sized>(
        &mut self,
        catalog: &[QuestionEntity],
        rng: &mut R,
    ) -> Option<QuestionEntity> {
        loop {
            if self.queue.is_empty() {
                self.refill(catalog, rng);
            }
            let id = self.queue.pop_front()?;
            // Questions removed from the catalog since the last refill are skipped.
            if let Some(question) = catalog.iter().find(|question| question.id == id) {
                return Some(question.clone());
            }
        }
    }

    fn refill<R: Rng + ?Sized>(&mut self, catalog: &[QuestionEntity], rng: &mut R) {
        let mut ids: Vec<QuestionId> = catalog.iter().map(|question| question.id).collect();
        ids.shuffle(rng);

        // No back-to-back repeat across a cycle boundary.
        if ids.len() > 1 && ids.first() == self.last.as_ref() {
            let end = ids.len() - 1;
            ids.swap(0, end);
        }
        self.queue = ids.into();
    }
}
