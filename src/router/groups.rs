//! Group handlers. Thin: decode, call the service, encode.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::group::CreateGroup;

#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub gid: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UserRef {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    pub gid: i64,
    pub name: String,
    /// Supplementary members from the members column.
    pub members: Vec<String>,
    /// Users whose primary group this is.
    pub primary_users: Vec<UserRef>,
}

#[derive(Debug, Serialize)]
pub struct GroupCreated {
    pub gid: i64,
}

#[derive(Debug, Deserialize)]
pub struct Renumber {
    pub gid: i64,
}

/// `GET /groups`
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupSummary>>> {
    let groups = state
        .provisioner
        .groups
        .list()
        .await?
        .into_iter()
        .map(|(gid, name)| GroupSummary { gid, name })
        .collect();
    Ok(Json(groups))
}

/// `GET /groups/{gid}`
pub async fn get(
    State(state): State<AppState>,
    Path(gid): Path<i64>,
) -> Result<Json<GroupDetail>> {
    let group = state
        .provisioner
        .groups
        .by_gid(gid)
        .await?
        .ok_or(ServerError::NotFound)?;
    let primary_users = state
        .provisioner
        .users
        .by_primary_group(gid)
        .await?
        .into_iter()
        .map(|(id, login)| UserRef { id, login })
        .collect();

    Ok(Json(GroupDetail {
        gid: group.gid,
        members: group
            .member_logins()
            .into_iter()
            .map(str::to_owned)
            .collect(),
        name: group.name,
        primary_users,
    }))
}

/// `POST /groups`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateGroup>,
) -> Result<(StatusCode, Json<GroupCreated>)> {
    let gid = state.provisioner.create_group(body).await?;
    Ok((StatusCode::CREATED, Json(GroupCreated { gid })))
}

/// `PATCH /groups/{gid}` renumbers the group.
pub async fn renumber(
    State(state): State<AppState>,
    Path(gid): Path<i64>,
    Json(body): Json<Renumber>,
) -> Result<StatusCode> {
    state.provisioner.renumber_group(gid, body.gid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /groups/{gid}`
pub async fn remove(
    State(state): State<AppState>,
    Path(gid): Path<i64>,
) -> Result<StatusCode> {
    state.provisioner.delete_group(gid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /groups/{gid}/members/{login}`
pub async fn add_member(
    State(state): State<AppState>,
    Path((gid, login)): Path<(i64, String)>,
) -> Result<StatusCode> {
    state.provisioner.add_member(&login, gid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /groups/{gid}/members/{login}`
pub async fn remove_member(
    State(state): State<AppState>,
    Path((gid, login)): Path<(i64, String)>,
) -> Result<StatusCode> {
    state.provisioner.remove_member(&login, gid).await?;
    Ok(StatusCode::NO_CONTENT)
}
