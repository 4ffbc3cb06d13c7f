use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::info;

use crate::context::Context;
use crate::db::Database;
use crate::error::{ApiError, StoreError};
use crate::model::{CreateArticle, UpdateArticle};
use crate::router::Router;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub static_dir: Arc<PathBuf>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(db: Arc<Database>, static_dir: impl Into<PathBuf>, max_body_bytes: usize) -> Self {
        AppState {
            db,
            static_dir: Arc::new(static_dir.into()),
            max_body_bytes,
        }
    }
}

/// The service route table. Order matters: the static catch-all is last.
pub fn routes() -> Result<Router<AppState>, regex::Error> {
    Router::new(not_found)
        .route(r"^/api/save$", save_article)?
        .route(r"^/api/article/([\w\._-]+)$", article)?
        .route(r"^/api/index$", list_articles)?
        .route(r"^/", serve_static)
}

pub async fn not_found(_state: AppState, ctx: Context) -> Response {
    let path = ctx.path().to_string();
    ctx.fail(ApiError::NotFound(path))
}

pub async fn list_articles(state: AppState, ctx: Context) -> Response {
    match state.db.list_all().await {
        Ok(articles) => {
            info!(count = articles.len(), "listed articles");
            ctx.json(StatusCode::OK, articles)
        }
        Err(e) => ctx.fail(e.into()),
    }
}

pub async fn save_article(state: AppState, mut ctx: Context) -> Response {
    let input: CreateArticle = match ctx.decode_json(state.max_body_bytes).await {
        Ok(input) => input,
        Err(e) => return ctx.fail(e),
    };

    let article = input.into_article();
    if let Err(e) = state.db.insert(&article).await {
        return ctx.fail(e.into());
    }

    info!(id = %article.id, "created article");
    ctx.json(StatusCode::CREATED, article)
}

/// `/api/article/{id}`: read, replace or remove one article.
pub async fn article(state: AppState, ctx: Context) -> Response {
    match ctx.method().clone() {
        Method::GET | Method::HEAD => get_article(state, ctx).await,
        Method::PUT => update_article(state, ctx).await,
        Method::DELETE => delete_article(state, ctx).await,
        _ => ctx.error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    }
}

fn article_id(ctx: &Context) -> Result<String, ApiError> {
    ctx.param(0)
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation("missing article id".to_string()))
}

pub async fn get_article(state: AppState, ctx: Context) -> Response {
    let id = match article_id(&ctx) {
        Ok(id) => id,
        Err(e) => return ctx.fail(e),
    };

    // Any lookup failure reads as a missing article on this route.
    match state.db.find_by_id(&id).await {
        Ok(article) => ctx.json(StatusCode::OK, article),
        Err(StoreError::InvalidId(_) | StoreError::NotFound(_)) => ctx.fail(ApiError::NotFound(id)),
        Err(e) => {
            tracing::error!(error = %crate::unpack_error(&e), id = %id, "failed to get article");
            ctx.fail(ApiError::NotFound(id))
        }
    }
}

pub async fn update_article(state: AppState, mut ctx: Context) -> Response {
    let id = match article_id(&ctx) {
        Ok(id) => id,
        Err(e) => return ctx.fail(e),
    };
    let mut article = match state.db.find_by_id(&id).await {
        Ok(article) => article,
        Err(e) => return ctx.fail(e.into()),
    };

    let input: UpdateArticle = match ctx.decode_json(state.max_body_bytes).await {
        Ok(input) => input,
        Err(e) => return ctx.fail(e),
    };
    input.apply(&mut article);

    match state.db.update(&article).await {
        Ok(()) => {
            info!(id = %article.id, "updated article");
            ctx.json(StatusCode::OK, article)
        }
        Err(e) => ctx.fail(e.into()),
    }
}

pub async fn delete_article(state: AppState, ctx: Context) -> Response {
    let id = match article_id(&ctx) {
        Ok(id) => id,
        Err(e) => return ctx.fail(e),
    };

    let article = match state.db.find_by_id(&id).await {
        Ok(article) => article,
        Err(e) => return ctx.fail(e.into()),
    };

    match state.db.delete(&article.id).await {
        Ok(()) => {
            info!(id = %article.id, "deleted article");
            ctx.empty(StatusCode::NO_CONTENT)
        }
        Err(e) => ctx.fail(e.into()),
    }
}

/// Serves `<static_dir><path>` straight from disk.
pub async fn serve_static(state: AppState, ctx: Context) -> Response {
    let service = ServeDir::new(state.static_dir.as_path());
    let result: Result<_, Infallible> = service.oneshot(ctx.into_request()).await;
    match result {
        Ok(res) => res.into_response(),
        Err(never) => match never {},
    }
}
