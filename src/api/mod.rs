// Copyright 2023 Remi Bernotavicius

//! The HTTP surface: routing, authentication and the request-per-call bridge
//! into the synchronous database layer.

use crate::config::ServeConfig;
use crate::database::{self, models::User};
use crate::error::{AppError, AppResult};
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

mod auth;
mod catalog;
mod extract;
mod recipes;
mod users;

#[derive(Clone)]
pub struct AppState {
    pool: database::ConnectionPool,
    media_root: Arc<PathBuf>,
    page_size: i64,
}

impl AppState {
    pub fn new(pool: database::ConnectionPool, media_root: PathBuf, page_size: i64) -> Self {
        Self {
            pool,
            media_root: Arc::new(media_root),
            page_size,
        }
    }

    /// Runs `f` on a blocking thread with a pooled connection.
    async fn run<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut database::Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn: database::PooledConnectionHandle = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

fn token_from(parts: &Parts) -> AppResult<Option<String>> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AppError::Unauthorized)?;
    let key = value
        .strip_prefix("Token ")
        .or_else(|| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(AppError::Unauthorized)?;
    Ok(Some(key.to_owned()))
}

/// The caller behind a valid `Authorization: Token <key>` header.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let token = token_from(parts)?.ok_or(AppError::Unauthorized)?;
        let key = token.clone();
        let user = state
            .run(move |conn| crate::users::authenticate(conn, &key))
            .await?;
        Ok(Self { user, token })
    }
}

/// Like `AuthUser`, but anonymous requests are let through. A header carrying
/// an unknown token is still rejected.
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<database::models::UserId> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        match token_from(parts)? {
            Some(key) => {
                let user = state
                    .run(move |conn| crate::users::authenticate(conn, &key))
                    .await?;
                Ok(Self(Some(user)))
            }
            None => Ok(Self(None)),
        }
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{method} {path} {} {:.1?}",
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

fn cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let media = ServeDir::new(state.media_root.as_path());
    Router::new()
        .route("/api/users/", get(users::list).post(users::signup))
        .route("/api/users/me/", get(users::me).patch(users::update_me))
        .route("/api/users/subscriptions/", get(users::subscriptions))
        .route("/api/users/{id}/", get(users::detail))
        .route(
            "/api/users/{id}/subscribe/",
            get(users::subscribe)
                .post(users::subscribe)
                .delete(users::unsubscribe),
        )
        .route("/api/auth/token/login/", post(auth::login))
        .route("/api/auth/token/logout/", post(auth::logout))
        .route("/api/tags/", get(catalog::list_tags).post(catalog::create_tag))
        .route(
            "/api/tags/{id}/",
            get(catalog::get_tag)
                .patch(catalog::update_tag)
                .delete(catalog::delete_tag),
        )
        .route(
            "/api/ingredients/",
            get(catalog::list_ingredients).post(catalog::create_ingredient),
        )
        .route(
            "/api/ingredients/{id}/",
            get(catalog::get_ingredient)
                .patch(catalog::update_ingredient)
                .delete(catalog::delete_ingredient),
        )
        .route("/api/recipes/", get(recipes::list).post(recipes::create))
        .route(
            "/api/recipes/download_shopping_cart/",
            get(recipes::download_shopping_cart),
        )
        .route(
            "/api/recipes/{id}/",
            get(recipes::detail)
                .patch(recipes::update)
                .delete(recipes::delete),
        )
        .route(
            "/api/recipes/{id}/favorite/",
            get(recipes::add_favorite)
                .post(recipes::add_favorite)
                .delete(recipes::remove_favorite),
        )
        .route(
            "/api/recipes/{id}/shopping_cart/",
            get(recipes::add_to_cart)
                .post(recipes::add_to_cart)
                .delete(recipes::remove_from_cart),
        )
        .nest_service("/media", media)
        .layer(middleware::from_fn(log_requests))
        .layer(cors(cors_origins))
        .with_state(state)
}

pub async fn serve(state: AppState, config: &ServeConfig) -> crate::Result<()> {
    let app = router(state, &config.cors_origins);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    log::info!("listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests;
