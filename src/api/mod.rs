mod groups;
mod users;

use std::sync::Arc;

use axum::{Json, Router, debug_handler, extract::State, routing::get};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    AppResult, AppState,
    appresult::AppError,
    rooms::{Presence, SignalingRelay},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", get(rooms))
        .nest("/users", users::router())
        .nest("/groups", groups::router())
}

#[derive(Serialize)]
pub(crate) struct Health {
    status: &'static str,
    time: String,
}

#[debug_handler]
pub(crate) async fn health() -> AppResult<Json<Health>> {
    Ok(Json(Health {
        status: "OK",
        time: OffsetDateTime::now_utc().format(&Rfc3339)?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn rooms(State(relay): State<Arc<SignalingRelay>>) -> Json<Presence> {
    Json(relay.presence().await)
}

pub(crate) async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}
