use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::AppError,
    forms::{
        dto::{FormAccepted, FormSubmission},
        services::{self, FormKind},
    },
    state::AppState,
};

pub fn form_routes() -> Router<AppState> {
    Router::new()
        .route("/volunteer-application", post(volunteer_application))
        .route("/partnership-volunteer", post(partnership_volunteer))
        .route("/send-email", post(contact))
}

async fn relay(
    state: &AppState,
    kind: FormKind,
    body: Result<Json<FormSubmission>, JsonRejection>,
) -> Result<Json<FormAccepted>, AppError> {
    let Json(form) = body?;
    let accepted =
        services::submit(state.mailer.as_ref(), &state.config.email, kind, form).await?;
    Ok(Json(accepted))
}

#[instrument(skip_all)]
pub async fn volunteer_application(
    State(state): State<AppState>,
    body: Result<Json<FormSubmission>, JsonRejection>,
) -> Result<Json<FormAccepted>, AppError> {
    relay(&state, FormKind::Volunteer, body).await
}

#[instrument(skip_all)]
pub async fn partnership_volunteer(
    State(state): State<AppState>,
    body: Result<Json<FormSubmission>, JsonRejection>,
) -> Result<Json<FormAccepted>, AppError> {
    relay(&state, FormKind::Partnership, body).await
}

#[instrument(skip_all)]
pub async fn contact(
    State(state): State<AppState>,
    body: Result<Json<FormSubmission>, JsonRejection>,
) -> Result<Json<FormAccepted>, AppError> {
    relay(&state, FormKind::Contact, body).await
}
