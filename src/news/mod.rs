use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod extract;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tags;

pub fn router() -> Router<AppState> {
    handlers::news_routes()
}
