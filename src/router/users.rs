//! User account handlers. Thin: decode, call the service, encode.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::provision::{Created, NewUserDefaults};
use crate::user::{CreateUser, UpdateUser, User};

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    /// Supplementary memberships, `gid -> group name`.
    pub groups: BTreeMap<i64, String>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub warnings: Vec<String>,
}

/// `POST /users`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateUser>,
) -> Result<(StatusCode, Json<Created>)> {
    let created = state.provisioner.create_user(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /users`
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.provisioner.users.list().await?))
}

/// `GET /users/{login}`
pub async fn get(
    State(state): State<AppState>,
    Path(login): Path<String>,
) -> Result<Json<UserDetail>> {
    let user = state
        .provisioner
        .users
        .by_login(&login)
        .await?
        .ok_or(ServerError::NotFound)?;
    let groups = state.provisioner.groups.groups_of(&login).await?;

    Ok(Json(UserDetail { user, groups }))
}

/// `GET /users/defaults`
pub async fn defaults(
    State(state): State<AppState>,
) -> Result<Json<NewUserDefaults>> {
    Ok(Json(state.provisioner.defaults().await?))
}

/// `PATCH /users/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUser>,
) -> Result<StatusCode> {
    state.provisioner.update_user(id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /users/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Removed>> {
    let warnings = state.provisioner.remove_user(id).await?;
    Ok(Json(Removed { warnings }))
}
