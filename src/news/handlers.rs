use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AdminUser,
    error::AppError,
    news::{
        dto::{DeletedResponse, ListQuery},
        extract::PostSubmission,
        repo_types::Post,
        services,
    },
    state::AppState,
};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// `GET /news/:key` takes a slug; `PUT` and `DELETE` take an id.
pub fn news_routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(list_posts).post(create_post))
        .route(
            "/news/:key",
            get(get_post).put(update_post).delete(delete_post),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(services::list(&state, query).await?))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(services::get_by_slug(&state, &slug).await?))
}

#[instrument(skip(state, body))]
pub async fn create_post(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    body: PostSubmission,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = services::create(&state, body, &identity).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state, body))]
pub async fn update_post(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    Path(id): Path<String>,
    body: PostSubmission,
) -> Result<Json<Post>, AppError> {
    Ok(Json(services::update(&state, &id, body, &identity).await?))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    services::delete(&state, &id, &identity).await?;
    Ok(Json(DeletedResponse {
        message: "Post deleted",
    }))
}
