use std::{ops::Deref, sync::Arc};

use tokio::sync::{Mutex, MutexGuard};

use crate::{
    dao::models::RoomCode,
    state::{SharedState, rotation::QuestionRotation, sse::SseHub},
};

const ROOM_FEED_CAPACITY: usize = 32;

/// Mutable per-room data guarded by the room gate.
#[derive(Debug, Default)]
pub struct RoomScratch {
    pub rotation: QuestionRotation,
}

/// In-memory companion of a room with live activity.
///
/// The mutex doubles as the room gate: every event touching the room holds
/// it from its first store read to its last broadcast, so events of one room
/// are applied one at a time while other rooms proceed in parallel.
pub struct RoomSession {
    code: RoomCode,
    scratch: Mutex<RoomScratch>,
    feed: SseHub,
}

impl RoomSession {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            scratch: Mutex::new(RoomScratch::default()),
            feed: SseHub::new(ROOM_FEED_CAPACITY),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Wait for exclusive access to the room.
    pub async fn lock(&self) -> MutexGuard<'_, RoomScratch> {
        self.scratch.lock().await
    }

    /// Spectator feed of the room.
    pub fn feed(&self) -> &SseHub {
        &self.feed
    }
}

/// Handle on a [`RoomSession`] that lets the registry reclaim the session
/// once the last handle is dropped and nobody is present in the room.
pub struct RoomLease {
    state: SharedState,
    session: Option<Arc<RoomSession>>,
}

impl RoomLease {
    pub(super) fn new(state: SharedState, session: Arc<RoomSession>) -> Self {
        Self {
            state,
            session: Some(session),
        }
    }

    /// Extra handle on the session that outlives the lease.
    pub fn share(&self) -> Arc<RoomSession> {
        match &self.session {
            Some(session) => Arc::clone(session),
            None => unreachable!("room lease used after release"),
        }
    }
}

impl Deref for RoomLease {
    type Target = RoomSession;

    fn deref(&self) -> &Self::Target {
        // Only taken in `drop`.
        self.session
            .as_deref()
            .unwrap_or_else(|| unreachable!("room lease used after release"))
    }
}

impl Drop for RoomLease {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let code = session.code().clone();
            drop(session);
            self.state.release_room_if_idle(&code);
        }
    }
}
