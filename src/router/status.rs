//! Instance status endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::Result;
use crate::provision::Status;

#[derive(Debug, Serialize)]
pub struct StatusPayload {
    pub name: String,
    #[serde(flatten)]
    pub counters: Status,
}

/// `GET /status.json`
pub async fn status(
    State(state): State<AppState>,
) -> Result<Json<StatusPayload>> {
    let counters = state.provisioner.status().await?;

    Ok(Json(StatusPayload {
        name: state.config.name.clone(),
        counters,
    }))
}
