// Copyright 2023 Remi Bernotavicius

use super::extract::JsonBody;
use super::{AppState, AuthUser};
use crate::error::AppResult;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    confirmation_code: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    auth_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let auth_token = state
        .run(move |conn| {
            crate::users::issue_token(conn, &request.email, &request.confirmation_code)
        })
        .await?;
    Ok(Json(TokenResponse { auth_token }))
}

pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    state
        .run(move |conn| crate::users::revoke_token(conn, &auth.token))
        .await?;
    log::debug!("user {} logged out", auth.user.id);
    Ok(StatusCode::NO_CONTENT)
}
