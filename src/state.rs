use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{PgUserStore, UserStore},
    },
    config::AppConfig,
    images::services::ImageUrlPolicy,
    mail::{build_mailer, Mailer},
    news::repo::{PgPostStore, PostStore},
    storage::{self, StorageClient},
};

/// Everything handlers share. Built once at startup; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub keys: JwtKeys,
    pub image_policy: Arc<ImageUrlPolicy>,
}

impl AppState {
    pub async fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let storage = storage::connect(&config.storage).await?;
        let mailer = build_mailer(&config.email)?;

        Self::from_parts(
            Arc::new(config),
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgPostStore::new(db)),
            storage,
            mailer,
        )
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        storage: Arc<dyn StorageClient>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt);
        let image_policy = Arc::new(ImageUrlPolicy::new(
            &config.image_url_pattern,
            config.uploads_url_base(),
        )?);

        Ok(Self {
            config,
            users,
            posts,
            storage,
            mailer,
            keys,
            image_policy,
        })
    }
}
