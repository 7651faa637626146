/// Durable record definitions shared across layers.
pub mod models;
/// Collaborator contracts and their backends.
pub mod room_store;
/// Backend-agnostic storage errors.
pub mod storage;
