// Copyright 2023 Remi Bernotavicius

use super::extract::{JsonBody, UrlPath, UrlQuery};
use super::{AppState, AuthUser};
use crate::database::models::{Ingredient, IngredientChanges, IngredientId, Tag, TagChanges, TagId};
use crate::error::AppResult;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<Vec<Tag>>> {
    Ok(Json(state.run(crate::catalog::list_tags).await?))
}

pub async fn get_tag(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<TagId>,
) -> AppResult<Json<Tag>> {
    Ok(Json(
        state
            .run(move |conn| crate::catalog::get_tag(conn, id))
            .await?,
    ))
}

pub async fn create_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(new): JsonBody<TagChanges>,
) -> AppResult<(StatusCode, Json<Tag>)> {
    let tag = state
        .run(move |conn| crate::catalog::create_tag(conn, &auth.user, &new))
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<TagId>,
    JsonBody(changes): JsonBody<TagChanges>,
) -> AppResult<Json<Tag>> {
    Ok(Json(
        state
            .run(move |conn| crate::catalog::update_tag(conn, &auth.user, id, &changes))
            .await?,
    ))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<TagId>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| crate::catalog::delete_tag(conn, &auth.user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct IngredientQuery {
    name: Option<String>,
}

pub async fn list_ingredients(
    State(state): State<AppState>,
    UrlQuery(query): UrlQuery<IngredientQuery>,
) -> AppResult<Json<Vec<Ingredient>>> {
    Ok(Json(
        state
            .run(move |conn| crate::catalog::list_ingredients(conn, query.name.as_deref()))
            .await?,
    ))
}

pub async fn get_ingredient(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<IngredientId>,
) -> AppResult<Json<Ingredient>> {
    Ok(Json(
        state
            .run(move |conn| crate::catalog::get_ingredient(conn, id))
            .await?,
    ))
}

pub async fn create_ingredient(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(new): JsonBody<IngredientChanges>,
) -> AppResult<(StatusCode, Json<Ingredient>)> {
    let ingredient = state
        .run(move |conn| crate::catalog::create_ingredient(conn, &auth.user, &new))
        .await?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

pub async fn update_ingredient(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<IngredientId>,
    JsonBody(changes): JsonBody<IngredientChanges>,
) -> AppResult<Json<Ingredient>> {
    Ok(Json(
        state
            .run(move |conn| crate::catalog::update_ingredient(conn, &auth.user, id, &changes))
            .await?,
    ))
}

pub async fn delete_ingredient(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<IngredientId>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| crate::catalog::delete_ingredient(conn, &auth.user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
