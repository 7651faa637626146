pub mod presence;
pub mod room;
pub mod rotation;
pub mod round;
mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::models::RoomCode, dao::room_store::RoomStore, dto::ws::ServerMessage,
    error::ServiceError,
};

pub use self::presence::{ConnectionId, PresenceBinding, PresenceTracker};
pub use self::room::{RoomLease, RoomSession};
pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected WebSocket client.
pub struct ClientConnection {
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Central application state: storage handle, live connections and room sessions.
pub struct AppState {
    config: Arc<AppConfig>,
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    presence: PresenceTracker,
    connections: DashMap<ConnectionId, ClientConnection>,
    rooms: DashMap<RoomCode, Arc<RoomSession>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            presence: PresenceTracker::new(),
            connections: DashMap::new(),
            rooms: DashMap::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Room store handle, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Registry of live WebSocket connections.
    pub fn connections(&self) -> &DashMap<ConnectionId, ClientConnection> {
        &self.connections
    }

    /// Register a new WebSocket client and hand back its outbound queue.
    pub fn register_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id, ClientConnection { tx });
        (id, rx)
    }

    pub fn unregister_connection(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Get or create the session of `code`, wrapped in a lease that releases
    /// the session again once it is idle.
    pub fn lease_room(self: &Arc<Self>, code: &RoomCode) -> RoomLease {
        let session = self
            .rooms
            .entry(code.clone())
            .or_insert_with(|| Arc::new(RoomSession::new(code.clone())))
            .value()
            .clone();
        RoomLease::new(Arc::clone(self), session)
    }

    /// Run `f` against the session of `code` if one is currently held in memory.
    ///
    /// `f` runs under the registry shard guard and must not lease or release rooms.
    pub fn with_room<T>(&self, code: &RoomCode, f: impl FnOnce(&RoomSession) -> T) -> Option<T> {
        self.rooms.get(code).map(|entry| f(entry.value()))
    }

    /// Number of room sessions held in memory.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop the session of `code` when no lease, spectator or player holds it.
    ///
    /// Runs under the registry shard lock, so a concurrent [`Self::lease_room`]
    /// either sees the old session before removal or creates a fresh one.
    pub fn release_room_if_idle(&self, code: &RoomCode) -> bool {
        self.rooms
            .remove_if(code, |_, session| {
                Arc::strong_count(session) == 1 && !self.presence.is_room_live(code)
            })
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_room_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_room_store(Arc::new(crate::dao::room_store::InMemoryRoomStore::new()))
            .await;
        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow());
        assert!(state.require_room_store().await.is_ok());

        state.clear_room_store().await;
        assert!(state.is_degraded());
    }

    #[test]
    fn idle_room_sessions_are_reclaimed() {
        let state = AppState::new(AppConfig::default());
        let code = RoomCode::new("ABCD");

        let lease = state.lease_room(&code);
        assert_eq!(state.room_count(), 1);
        drop(lease);
        assert_eq!(state.room_count(), 0);
    }

    #[test]
    fn rooms_with_presence_are_kept() {
        let state = AppState::new(AppConfig::default());
        let code = RoomCode::new("ABCD");
        let connection = Uuid::new_v4();

        let lease = state.lease_room(&code);
        state.presence().bind(connection, code.clone(), "Alice");
        drop(lease);
        assert_eq!(state.room_count(), 1);

        state.presence().unbind(connection);
        assert!(state.release_room_if_idle(&code));
        assert_eq!(state.room_count(), 0);
    }

    #[test]
    fn outstanding_handles_keep_the_session() {
        let state = AppState::new(AppConfig::default());
        let code = RoomCode::new("ABCD");

        let first = state.lease_room(&code);
        let second = state.lease_room(&code);
        drop(first);
        assert_eq!(state.room_count(), 1);

        let spectator = second.share();
        drop(second);
        assert_eq!(state.room_count(), 1);
        drop(spectator);
        assert!(state.release_room_if_idle(&code));
    }

    #[test]
    fn peeking_at_a_room_does_not_pin_it() {
        let state = AppState::new(AppConfig::default());
        let code = RoomCode::new("ABCD");
        assert_eq!(state.with_room(&code, |session| session.code().clone()), None);

        let lease = state.lease_room(&code);
        let seen = state.with_room(&code, |session| {
            assert_eq!(Arc::strong_count(&lease.share()), 3);
            session.code().clone()
        });
        assert_eq!(seen, Some(code.clone()));

        drop(lease);
        assert_eq!(state.room_count(), 0);
    }
}
