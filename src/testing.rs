//! In-memory doubles for the stores, storage and mailer.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::UserStore,
        repo_types::{NewUser, User},
    },
    config::{AppConfig, EmailConfig, JwtConfig, StorageConfig},
    mail::{Mailer, OutboundEmail},
    news::{
        repo::{PostStore, StoreError},
        repo_types::{NewPost, Post, PostFilter},
    },
    state::AppState,
    storage::StorageClient,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: "postgres://localhost/unused".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "amani-center".into(),
            audience: "amani-center-admin".into(),
            ttl_seconds: 3600,
        },
        storage: StorageConfig::Local {
            dir: "uploads".into(),
            url_base: "/uploads".into(),
        },
        email: EmailConfig {
            api_url: "http://127.0.0.1:9/v3/smtp/email".into(),
            api_key: None,
            from_address: "no-reply@x.org".into(),
            from_name: "Amani Center".into(),
            operator_address: "office@x.org".into(),
        },
        cors_allowed_origins: Vec::new(),
        image_url_pattern: r"^https://res\.cloudinary\.com/[^/]+/image/upload/.+".into(),
        expose_error_details: false,
    }
}

pub fn test_keys() -> JwtKeys {
    JwtKeys::new(&test_config().jwt)
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email.to_lowercase(),
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }
}

/// Enforces slug uniqueness on write, like the database's unique index.
#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<Vec<Post>>,
    skip_precheck: AtomicBool,
}

impl MemoryPostStore {
    pub fn len(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    /// Makes `slug_exists` always answer `false`, as a concurrent writer would see it.
    pub fn skip_slug_precheck(&self, skip: bool) {
        self.skip_precheck.store(skip, Ordering::SeqCst);
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn list(&self, filter: &PostFilter) -> anyhow::Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| filter.category.map_or(true, |c| p.category == c))
            .filter(|p| filter.exclude != Some(p.id))
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        posts.truncate(usize::try_from(filter.limit).unwrap_or(0));
        Ok(posts)
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Post>> {
        let posts = self.posts.lock().unwrap();
        Ok(posts.iter().find(|p| p.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let posts = self.posts.lock().unwrap();
        Ok(posts.iter().find(|p| p.id == id).cloned())
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> anyhow::Result<bool> {
        if self.skip_precheck.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let posts = self.posts.lock().unwrap();
        Ok(posts
            .iter()
            .any(|p| p.slug == slug && Some(p.id) != exclude))
    }

    async fn image_in_use(&self, image: &str, exclude: Option<Uuid>) -> anyhow::Result<bool> {
        let posts = self.posts.lock().unwrap();
        Ok(posts
            .iter()
            .any(|p| p.image.as_deref() == Some(image) && Some(p.id) != exclude))
    }

    async fn insert(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut posts = self.posts.lock().unwrap();
        if posts.iter().any(|p| p.slug == post.slug) {
            return Err(StoreError::SlugTaken(post.slug));
        }
        let now = OffsetDateTime::now_utc();
        let created = Post {
            id: Uuid::new_v4(),
            title: post.title,
            slug: post.slug,
            content: post.content,
            excerpt: post.excerpt,
            date: post.date,
            read_time: post.read_time,
            category: post.category,
            tags: post.tags,
            image: post.image,
            author: post.author,
            created_at: now,
            updated_at: now,
        };
        posts.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, post: NewPost) -> Result<Option<Post>, StoreError> {
        let mut posts = self.posts.lock().unwrap();
        if posts.iter().any(|p| p.slug == post.slug && p.id != id) {
            return Err(StoreError::SlugTaken(post.slug));
        }
        let Some(existing) = posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        existing.title = post.title;
        existing.slug = post.slug;
        existing.content = post.content;
        existing.excerpt = post.excerpt;
        existing.date = post.date;
        existing.read_time = post.read_time;
        existing.category = post.category;
        existing.tags = post.tags;
        existing.image = post.image;
        existing.author = post.author;
        existing.updated_at = OffsetDateTime::now_utc();
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let mut posts = self.posts.lock().unwrap();
        Ok(posts
            .iter()
            .position(|p| p.id == id)
            .map(|idx| posts.remove(idx)))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => anyhow::bail!("no object {key}"),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("/uploads/{key}")
    }
}

/// Keeps every delivered email. Sends to `fail_to` are rejected and not kept.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_to: Option<String>,
}

impl RecordingMailer {
    pub fn failing_to(address: &str) -> Self {
        Self {
            sent: Mutex::default(),
            fail_to: Some(address.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> anyhow::Result<()> {
        if self.fail_to.as_deref() == Some(email.to.as_str()) {
            anyhow::bail!("provider rejected {}", email.to);
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub users: Arc<MemoryUserStore>,
    pub posts: Arc<MemoryPostStore>,
    pub storage: Arc<MemoryStorage>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn harness() -> Harness {
    harness_with(test_config(), RecordingMailer::default())
}

pub fn harness_with(config: AppConfig, mailer: RecordingMailer) -> Harness {
    let users = Arc::new(MemoryUserStore::default());
    let posts = Arc::new(MemoryPostStore::default());
    let storage = Arc::new(MemoryStorage::default());
    let mailer = Arc::new(mailer);
    let state = AppState::from_parts(
        Arc::new(config),
        users.clone(),
        posts.clone(),
        storage.clone(),
        mailer.clone(),
    )
    .expect("test state");
    Harness {
        state,
        users,
        posts,
        storage,
        mailer,
    }
}
