/// Merged room views and fan-out to sockets and spectator feeds.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only room snapshots.
pub mod room_service;
/// Round engine: joins, rounds, submissions and reveals.
pub mod round_service;
/// Server-Sent Events room feeds.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
