// Copyright 2023 Remi Bernotavicius

use super::extract::{JsonBody, UrlPath};
use super::{AppState, AuthUser, MaybeUser};
use crate::database::models::{RecipeId, UserId};
use crate::document::{self, DocumentFormat};
use crate::error::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};
use crate::recipes::{RecipeFilter, RecipePayload, RecipeSummary, RecipeView};
use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use std::str::FromStr as _;

fn query_pairs(raw: Option<&str>) -> AppResult<Vec<(String, String)>> {
    raw.map(serde_urlencoded::from_str::<Vec<(String, String)>>)
        .transpose()
        .map_err(|e| AppError::invalid("query", e.to_string()))
        .map(Option::unwrap_or_default)
}

fn flag(field: &'static str, value: &str) -> AppResult<bool> {
    match value {
        "1" | "true" | "True" => Ok(true),
        "0" | "false" | "False" => Ok(false),
        _ => Err(AppError::invalid(field, "must be one of 0, 1, true or false")),
    }
}

/// Reads the recipe filters from the query string. `tags` may repeat.
fn parse_filter(pairs: &[(String, String)]) -> AppResult<RecipeFilter> {
    let mut filter = RecipeFilter::default();
    for (key, value) in pairs {
        match key.as_str() {
            "tags" => filter.tags.push(value.clone()),
            "is_favorited" => filter.is_favorited = flag("is_favorited", value)?,
            "is_in_shopping_cart" => {
                filter.is_in_shopping_cart = flag("is_in_shopping_cart", value)?
            }
            "author" => {
                let author = value
                    .parse::<i32>()
                    .map_err(|_| AppError::invalid("author", "must be a user id"))?;
                filter.author = Some(UserId::from(author));
            }
            _ => {}
        }
    }
    Ok(filter)
}

fn last_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    uri: Uri,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Page<RecipeView>>> {
    let pairs = query_pairs(raw.as_deref())?;
    let filter = parse_filter(&pairs)?;
    let page = PageRequest::parse(
        last_value(&pairs, "page"),
        last_value(&pairs, "limit"),
        state.page_size,
    )?;

    let viewer = viewer.id();
    let (count, recipes) = state
        .run(move |conn| crate::recipes::list_recipes(conn, viewer, &filter, page))
        .await?;
    Ok(Json(Page::new(uri.path(), uri.query(), page, count, recipes)))
}

pub async fn detail(
    State(state): State<AppState>,
    viewer: MaybeUser,
    UrlPath(id): UrlPath<RecipeId>,
) -> AppResult<Json<RecipeView>> {
    let viewer = viewer.id();
    Ok(Json(
        state
            .run(move |conn| crate::recipes::get_recipe(conn, viewer, id))
            .await?,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<RecipePayload>,
) -> AppResult<(StatusCode, Json<RecipeView>)> {
    let media_root = state.media_root.clone();
    let view = state
        .run(move |conn| crate::recipes::create_recipe(conn, &media_root, &auth.user, payload))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<RecipeId>,
    JsonBody(payload): JsonBody<RecipePayload>,
) -> AppResult<Json<RecipeView>> {
    let media_root = state.media_root.clone();
    Ok(Json(
        state
            .run(move |conn| {
                crate::recipes::update_recipe(conn, &media_root, &auth.user, id, payload)
            })
            .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<RecipeId>,
) -> AppResult<StatusCode> {
    let media_root = state.media_root.clone();
    state
        .run(move |conn| crate::recipes::delete_recipe(conn, &media_root, &auth.user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<RecipeId>,
) -> AppResult<(StatusCode, Json<RecipeSummary>)> {
    let user = auth.user.id;
    let summary = state
        .run(move |conn| crate::relations::add_favorite(conn, user, id))
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<RecipeId>,
) -> AppResult<StatusCode> {
    let user = auth.user.id;
    state
        .run(move |conn| crate::relations::remove_favorite(conn, user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<RecipeId>,
) -> AppResult<(StatusCode, Json<RecipeSummary>)> {
    let user = auth.user.id;
    let summary = state
        .run(move |conn| crate::relations::add_to_cart(conn, user, id))
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(id): UrlPath<RecipeId>,
) -> AppResult<StatusCode> {
    let user = auth.user.id;
    state
        .run(move |conn| crate::relations::remove_from_cart(conn, user, id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_shopping_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    RawQuery(raw): RawQuery,
) -> AppResult<Response> {
    let pairs = query_pairs(raw.as_deref())?;
    let format = match last_value(&pairs, "format") {
        Some(value) => DocumentFormat::from_str(value)
            .map_err(|_| AppError::invalid("format", "must be pdf or txt"))?,
        None => DocumentFormat::default(),
    };

    let owner = auth.user.id;
    let lines = state
        .run(move |conn| crate::shopping_list::shopping_list_lines(conn, owner))
        .await?;
    let body = document::render(
        format,
        "Shopping list",
        chrono::Local::now().date_naive(),
        &lines,
    )?;
    log::info!(
        "user {owner} downloaded a {format} shopping list with {} lines",
        lines.len()
    );

    let disposition = format!(
        "attachment; filename=\"{}\"",
        format.file_name("shopping_list")
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
