use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    dao::models::RoomCode,
    dto::validation::validate_room_code,
    error::{AppError, ServiceError},
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/rooms/{code}",
    tag = "sse",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    responses(
        (status = 200, description = "Room spectator stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown room")
    )
)]
/// Stream the room-wide events of a room to a spectator screen.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    validate_room_code(&code).map_err(ServiceError::from)?;
    let code = RoomCode::new(&code);
    let subscription = sse_service::subscribe_room(&state, &code).await?;
    info!(room = %code, "new room SSE connection");
    Ok(sse_service::to_sse_stream(state, subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/rooms/{code}", get(room_stream))
}
