use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::news::repo_types::{NewPost, Post, PostFilter, PostRow};

const POST_COLUMNS: &str = "id, title, slug, content, excerpt, date, read_time, category, tags, \
                            image, author_id, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The unique index on `slug` rejected the write.
    #[error("slug {0:?} is already taken")]
    SlugTaken(String),
    /// The author row is gone (account removed while its token is still valid).
    #[error("author {0} does not exist")]
    UnknownAuthor(Uuid),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence for news posts. Slug uniqueness is enforced by the store itself.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn list(&self, filter: &PostFilter) -> anyhow::Result<Vec<Post>>;
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Post>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// Whether another post (not `exclude`) already uses `slug`.
    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> anyhow::Result<bool>;
    /// Whether any post other than `exclude` references `image`.
    async fn image_in_use(&self, image: &str, exclude: Option<Uuid>) -> anyhow::Result<bool>;
    async fn insert(&self, post: NewPost) -> Result<Post, StoreError>;
    async fn update(&self, id: Uuid, post: NewPost) -> Result<Option<Post>, StoreError>;
    /// Returns the removed post, if there was one.
    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
}

#[derive(Clone)]
pub struct PgPostStore {
    db: PgPool,
}

impl PgPostStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(err: sqlx::Error, post: &NewPost, what: &'static str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::SlugTaken(post.slug.clone())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            StoreError::UnknownAuthor(post.author)
        }
        _ => StoreError::Other(anyhow::Error::new(err).context(what)),
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn list(&self, filter: &PostFilter) -> anyhow::Result<Vec<Post>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        qb.push(POST_COLUMNS).push(" FROM posts WHERE TRUE");
        if let Some(category) = filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(exclude) = filter.exclude {
            qb.push(" AND id <> ").push_bind(exclude);
        }
        qb.push(" ORDER BY date DESC, created_at DESC LIMIT ")
            .push_bind(filter.limit);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(&self.db)
            .await
            .context("list posts")?;
        rows.into_iter().map(Post::try_from).collect()
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.db)
        .await
        .context("find post by slug")?;
        row.map(Post::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find post by id")?;
        row.map(Post::try_from).transpose()
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<Uuid>) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM posts
                WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(slug)
        .bind(exclude)
        .fetch_one(&self.db)
        .await
        .context("check slug")?;
        Ok(exists)
    }

    async fn image_in_use(&self, image: &str, exclude: Option<Uuid>) -> anyhow::Result<bool> {
        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM posts
                WHERE image = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(image)
        .bind(exclude)
        .fetch_one(&self.db)
        .await
        .context("check image references")?;
        Ok(in_use)
    }

    async fn insert(&self, post: NewPost) -> Result<Post, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            INSERT INTO posts
                (title, slug, content, excerpt, date, read_time, category, tags, image, author_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(post.date)
        .bind(&post.read_time)
        .bind(post.category.as_str())
        .bind(&post.tags)
        .bind(&post.image)
        .bind(post.author)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, &post, "insert post"))?;
        Ok(Post::try_from(row)?)
    }

    async fn update(&self, id: Uuid, post: NewPost) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            UPDATE posts SET
                title = $2, slug = $3, content = $4, excerpt = $5, date = $6,
                read_time = $7, category = $8, tags = $9, image = $10, author_id = $11,
                updated_at = now()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(post.date)
        .bind(&post.read_time)
        .bind(post.category.as_str())
        .bind(&post.tags)
        .bind(&post.image)
        .bind(post.author)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, &post, "update post"))?;
        Ok(row.map(Post::try_from).transpose()?)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("delete post")?;
        row.map(Post::try_from).transpose()
    }
}
