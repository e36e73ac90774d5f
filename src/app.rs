use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, request::Parts, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{auth, config::StorageConfig, error::UpstreamDetail, forms, news, state::AppState};

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(news::router())
        .merge(forms::router())
        .route("/health", get(health));

    let mut app = Router::new().nest("/api", api);
    if let StorageConfig::Local { dir, url_base } = &state.config.storage {
        if url_base.starts_with('/') && url_base.len() > 1 {
            app = app.nest_service(url_base, ServeDir::new(dir));
        }
    }

    let cors = cors_layer(&state.config.cors_allowed_origins);
    app.with_state(state.clone())
        .layer(middleware::map_response_with_state(
            state,
            expose_upstream_detail,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// In development, puts the upstream error chain back into 500 bodies.
async fn expose_upstream_detail(State(state): State<AppState>, mut response: Response) -> Response {
    let Some(UpstreamDetail(detail)) = response.extensions_mut().remove::<UpstreamDetail>() else {
        return response;
    };
    if !state.config.expose_error_details {
        return response;
    }
    let body = json!({
        "error": "Internal Server Error",
        "code": "INTERNAL_ERROR",
        "detail": detail,
    });
    (response.status(), Json(body)).into_response()
}

/// Exact origins, or `*.example.org` for any subdomain. An empty list allows all.
pub fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    let origin = origin.trim_end_matches('/');
    allowed.iter().any(|entry| match entry.strip_prefix("*.") {
        Some(domain) => origin
            .split_once("://")
            .map(|(_, host)| host.ends_with(&format!(".{domain}")))
            .unwrap_or(false),
        None => entry.eq_ignore_ascii_case(origin),
    })
}

fn cors_layer(allowed: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(600));

    if allowed.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed = allowed.to_vec();
    layer.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _req: &Parts| {
            origin
                .to_str()
                .map(|o| origin_allowed(&allowed, o))
                .unwrap_or(false)
        },
    ))
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
