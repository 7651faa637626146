use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Prompt Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::get_room,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::ActiveQuestion,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::PlayerView,
            crate::dto::ws::JoinRejection,
            crate::dao::models::RoomStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room snapshots and the player/operator WebSocket"),
        (name = "sse", description = "Server-sent events streams for spectator screens"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_public_route() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/rooms/{code}", "/sse/rooms/{code}", "/ws"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
