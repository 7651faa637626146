use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use tracing::debug;

use crate::{
    dao::models::RoomCode,
    dto::{room::RoomSnapshot, validation::validate_room_code},
    error::{AppError, ServiceError},
    services::room_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    responses(
        (status = 200, description = "Current room state", body = RoomSnapshot),
        (status = 400, description = "Malformed room code"),
        (status = 404, description = "Unknown room"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Read-only snapshot of a room with its merged player list.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    validate_room_code(&code).map_err(ServiceError::from)?;
    let code = RoomCode::new(&code);
    debug!(room = %code, "room snapshot requested");
    let snapshot = room_service::room_snapshot(&state, &code).await?;
    Ok(Json(snapshot))
}

/// Configure the room routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{code}", get(get_room))
}
