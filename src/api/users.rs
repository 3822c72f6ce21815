// Copyright 2023 Remi Bernotavicius

use super::extract::{JsonBody, UrlPath, UrlQuery};
use super::{AppState, AuthUser, MaybeUser};
use crate::database::models::UserId;
use crate::error::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};
use crate::relations::SubscriptionView;
use crate::users::{SignupRequest, UserChanges, UserView};
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    Json,
};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
    recipes_limit: Option<String>,
}

impl PageQuery {
    fn page(&self, state: &AppState) -> AppResult<PageRequest> {
        PageRequest::parse(self.page.as_deref(), self.limit.as_deref(), state.page_size)
    }

    fn recipes_limit(&self) -> AppResult<Option<i64>> {
        self.recipes_limit
            .as_deref()
            .map(|l| {
                l.parse::<i64>()
                    .ok()
                    .filter(|l| *l >= 0)
                    .ok_or_else(|| AppError::invalid("recipes_limit", "must be a non-negative integer"))
            })
            .transpose()
    }
}

pub async fn signup(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SignupRequest>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = state
        .run(move |conn| crate::users::signup(conn, &request))
        .await?;
    Ok((StatusCode::CREATED, Json(UserView::new(&user, false))))
}

pub async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    uri: Uri,
    UrlQuery(query): UrlQuery<PageQuery>,
) -> AppResult<Json<Page<UserView>>> {
    let page = query.page(&state)?;
    let viewer = viewer.id();
    let (count, users) = state
        .run(move |conn| crate::users::list_users(conn, viewer, page))
        .await?;
    Ok(Json(Page::new(uri.path(), uri.query(), page, count, users)))
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserView>> {
    let id = auth.user.id;
    let view = state
        .run(move |conn| crate::users::user_view(conn, Some(id), id))
        .await?;
    Ok(Json(view))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(changes): JsonBody<UserChanges>,
) -> AppResult<Json<UserView>> {
    let view = state
        .run(move |conn| crate::users::update_user(conn, &auth.user, &changes))
        .await?;
    Ok(Json(view))
}

pub async fn detail(
    State(state): State<AppState>,
    viewer: MaybeUser,
    UrlPath(id): UrlPath<UserId>,
) -> AppResult<Json<UserView>> {
    let viewer = viewer.id();
    let view = state
        .run(move |conn| crate::users::user_view(conn, viewer, id))
        .await?;
    Ok(Json(view))
}

pub async fn subscriptions(
    State(state): State<AppState>,
    auth: AuthUser,
    uri: Uri,
    UrlQuery(query): UrlQuery<PageQuery>,
) -> AppResult<Json<Page<SubscriptionView>>> {
    let page = query.page(&state)?;
    let recipes_limit = query.recipes_limit()?;
    let user = auth.user.id;
    let (count, authors) = state
        .run(move |conn| crate::relations::subscriptions(conn, user, page, recipes_limit))
        .await?;
    Ok(Json(Page::new(uri.path(), uri.query(), page, count, authors)))
}

pub async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(author): UrlPath<UserId>,
    UrlQuery(query): UrlQuery<PageQuery>,
) -> AppResult<(StatusCode, Json<SubscriptionView>)> {
    let recipes_limit = query.recipes_limit()?;
    let user = auth.user.id;
    let view = state
        .run(move |conn| crate::relations::subscribe(conn, user, author, recipes_limit))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    UrlPath(author): UrlPath<UserId>,
) -> AppResult<StatusCode> {
    let user = auth.user.id;
    state
        .run(move |conn| crate::relations::unsubscribe(conn, user, author))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
