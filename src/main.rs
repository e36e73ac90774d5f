use anyhow::Context;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod forms;
mod images;
mod mail;
mod news;
mod state;
mod storage;
#[cfg(test)]
mod testing;

use crate::{
    auth::{
        repo::PgUserStore,
        services::{seed_admin, AdminSeed, SeedOutcome},
    },
    config::AppConfig,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let db = db::connect(&config.database_url).await?;
    db::migrate(&db).await?;

    let result = match std::env::args().nth(1).as_deref() {
        None | Some("serve") => run_server(config, db.clone()).await,
        Some("seed-admin") => run_seed(db.clone()).await,
        Some(other) => Err(anyhow::anyhow!(
            "unknown command {other:?}; expected `serve` or `seed-admin`"
        )),
    };

    db.close().await;
    result
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "amani_center=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn run_server(config: AppConfig, db: sqlx::PgPool) -> anyhow::Result<()> {
    let (host, port) = (config.host.clone(), config.port);
    let state = AppState::init(config, db).await?;
    app::serve(app::build_app(state), &host, port).await
}

async fn run_seed(db: sqlx::PgPool) -> anyhow::Result<()> {
    let var = |key: &str| {
        std::env::var(key)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .with_context(|| format!("{key} must be set for seed-admin"))
    };
    let seed = AdminSeed {
        username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
        email: var("ADMIN_EMAIL")?,
        password: var("ADMIN_PASSWORD")?,
    };

    let users = PgUserStore::new(db);
    match seed_admin(&users, seed).await? {
        SeedOutcome::Created => tracing::info!("admin account created"),
        SeedOutcome::AlreadyExists => {
            tracing::info!("admin account already present; left unchanged")
        }
    }
    Ok(())
}
