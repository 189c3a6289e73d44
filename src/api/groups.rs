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
    rooms::registry::{LINKABLE_CODE_LEN, is_linkable},
    store::{ChatRecord, Group, SharedStore},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/{group_id}", get(get_group).delete(delete_group))
        .route("/{group_id}/messages", get(group_messages))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewGroup {
    group_id: String,
    #[serde(default)]
    members: Vec<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_groups(State(store): State<SharedStore>) -> AppResult<Json<Vec<Group>>> {
    Ok(Json(store.list_groups().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_group(
    State(store): State<SharedStore>,
    AppJson(NewGroup { group_id, members }): AppJson<NewGroup>,
) -> AppResult<(StatusCode, Json<Group>)> {
    if !is_linkable(&group_id) {
        return Err(AppError::bad_request(format!(
            "groupId must be a {LINKABLE_CODE_LEN}-character room code"
        )));
    }

    let mut members = members.iter().map(|m| m.trim()).filter(|m| !m.is_empty());
    let mut group = store.create_group(&group_id, members.next()).await?;
    for member in members {
        if store.add_group_member(&group_id, member).await? {
            group.add_member(member);
        }
    }

    tracing::info!(group_id = %group_id, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

async fn find_group(store: &SharedStore, group_id: &str) -> AppResult<Group> {
    store
        .find_group(group_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("group {group_id} not found")))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_group(
    Path(group_id): Path<String>,
    State(store): State<SharedStore>,
) -> AppResult<Json<Group>> {
    Ok(Json(find_group(&store, &group_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn group_messages(
    Path(group_id): Path<String>,
    State(store): State<SharedStore>,
) -> AppResult<Json<Vec<ChatRecord>>> {
    let group = find_group(&store, &group_id).await?;
    Ok(Json(store.chat_records(&group.messages).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_group(
    Path(group_id): Path<String>,
    State(store): State<SharedStore>,
) -> AppResult<StatusCode> {
    if !store.delete_group(&group_id).await? {
        return Err(AppError::not_found(format!("group {group_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
