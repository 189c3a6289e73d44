use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;

use crate::{
    AppResult, AppState,
    appresult::{AppError, AppJson},
    store::{SharedStore, User},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{username}", get(get_user).delete(delete_user))
}

#[derive(Deserialize)]
pub(crate) struct NewUser {
    username: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_users(State(store): State<SharedStore>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(store.list_users().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_user(
    State(store): State<SharedStore>,
    AppJson(NewUser { username }): AppJson<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("username must not be empty"));
    }

    let user = store.create_user(username).await?;
    tracing::info!(username, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_user(
    Path(username): Path<String>,
    State(store): State<SharedStore>,
) -> AppResult<Json<User>> {
    let Some(user) = store.find_user(&username).await? else {
        return Err(AppError::not_found(format!("user {username} not found")));
    };
    Ok(Json(user))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_user(
    Path(username): Path<String>,
    State(store): State<SharedStore>,
) -> AppResult<StatusCode> {
    if !store.delete_user(&username).await? {
        return Err(AppError::not_found(format!("user {username} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
