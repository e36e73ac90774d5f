use lazy_static::lazy_static;
use regex::Regex;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::claims::Identity,
    error::AppError,
    images::services::{discard_image, store_image, StoredImage},
    news::{
        dto::{ListQuery, PostPayload},
        extract::PostSubmission,
        repo::StoreError,
        repo_types::{Category, NewPost, Post, PostFilter},
        tags::{parse_tags, TagsInput},
    },
    state::AppState,
};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlugTaken(slug) => AppError::DuplicateSlug(slug),
            StoreError::UnknownAuthor(_) => AppError::Forbidden("Account no longer exists".into()),
            StoreError::Other(e) => AppError::Upstream(e),
        }
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed to one hyphen.
pub fn slugify(raw: &str) -> String {
    lazy_static! {
        static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    }
    NON_SLUG
        .replace_all(&raw.trim().to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_post_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

pub fn parse_limit(raw: Option<&str>) -> i64 {
    match raw.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// What the request asks for in the `image` field.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ImageChoice {
    Keep,
    Clear,
    Url(String),
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Checks the body and turns it into storable fields. The image is left
/// empty; callers resolve it from the returned choice.
fn validate(
    state: &AppState,
    payload: PostPayload,
    author: Uuid,
) -> Result<(NewPost, ImageChoice), AppError> {
    let mut missing = Vec::new();
    let mut required = |name: &'static str, value: Option<String>| {
        non_blank(value).unwrap_or_else(|| {
            missing.push(name);
            String::new()
        })
    };
    let title = required("title", payload.title);
    let excerpt = required("excerpt", payload.excerpt);
    let content = required("content", payload.content);
    let date = required("date", payload.date);
    let read_time = required("readTime", payload.read_time);
    let category = required("category", payload.category);
    let slug = required("slug", payload.slug);

    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let slug = slugify(&slug);
    if slug.is_empty() {
        return Err(AppError::validation("Slug must contain letters or digits"));
    }
    let date = parse_post_date(&date)
        .ok_or_else(|| AppError::validation("Invalid date, expected YYYY-MM-DD or RFC 3339"))?;
    let category: Category = category
        .parse()
        .map_err(|_| AppError::validation(format!("Invalid category: {category}")))?;
    let tags = parse_tags(payload.tags.unwrap_or(TagsInput::List(Vec::new())))
        .map_err(|e| AppError::validation(e.to_string()))?;

    let image = match payload.image.map(|s| s.trim().to_string()) {
        None => ImageChoice::Keep,
        Some(url) if url.is_empty() => ImageChoice::Clear,
        Some(url) if state.image_policy.allows(&url) => ImageChoice::Url(url),
        Some(_) => return Err(AppError::validation("Image URL is not from an allowed host")),
    };

    Ok((
        NewPost {
            title,
            slug,
            content,
            excerpt,
            date,
            read_time,
            category,
            tags,
            image: None,
            author,
        },
        image,
    ))
}

fn parse_post_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found("Post not found"))
}

pub async fn list(state: &AppState, query: ListQuery) -> Result<Vec<Post>, AppError> {
    let category = match non_blank(query.category) {
        Some(c) => Some(
            c.parse::<Category>()
                .map_err(|_| AppError::validation(format!("Invalid category: {c}")))?,
        ),
        None => None,
    };
    let exclude = match non_blank(query.exclude) {
        Some(id) => Some(
            Uuid::parse_str(&id)
                .map_err(|_| AppError::validation(format!("Invalid exclude id: {id}")))?,
        ),
        None => None,
    };
    let filter = PostFilter {
        category,
        exclude,
        limit: parse_limit(query.limit.as_deref()),
    };
    Ok(state.posts.list(&filter).await?)
}

/// Looks up the canonical form of `slug`, so `Hello-World` finds `hello-world`.
pub async fn get_by_slug(state: &AppState, slug: &str) -> Result<Post, AppError> {
    let slug = slugify(slug);
    if slug.is_empty() {
        return Err(AppError::not_found("Post not found"));
    }
    state
        .posts
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))
}

async fn ensure_slug_free(
    state: &AppState,
    slug: &str,
    exclude: Option<Uuid>,
) -> Result<(), AppError> {
    if state.posts.slug_exists(slug, exclude).await? {
        warn!(slug = %slug, "slug already in use");
        return Err(AppError::DuplicateSlug(slug.to_string()));
    }
    Ok(())
}

async fn store_upload(
    state: &AppState,
    submission: &mut PostSubmission,
) -> Result<Option<StoredImage>, AppError> {
    match submission.upload.take() {
        Some(upload) => Ok(Some(store_image(state.storage.as_ref(), upload).await?)),
        None => Ok(None),
    }
}

/// Removes a freshly stored upload when the write that would reference it failed.
async fn rollback_upload(state: &AppState, uploaded: Option<StoredImage>) {
    if let Some(img) = uploaded {
        discard_image(state.storage.as_ref(), &img.key).await;
    }
}

pub async fn create(
    state: &AppState,
    mut submission: PostSubmission,
    identity: &Identity,
) -> Result<Post, AppError> {
    let payload = std::mem::take(&mut submission.payload);
    let (mut post, image) = validate(state, payload, identity.user_id)?;
    ensure_slug_free(state, &post.slug, None).await?;

    let uploaded = store_upload(state, &mut submission).await?;
    post.image = match (&uploaded, image) {
        (Some(img), _) => Some(img.url.clone()),
        (None, ImageChoice::Url(url)) => Some(url),
        (None, ImageChoice::Keep | ImageChoice::Clear) => None,
    };

    match state.posts.insert(post).await {
        Ok(created) => {
            info!(
                post_id = %created.id,
                slug = %created.slug,
                author = %created.author,
                "post created"
            );
            Ok(created)
        }
        Err(e) => {
            rollback_upload(state, uploaded).await;
            Err(e.into())
        }
    }
}

pub async fn update(
    state: &AppState,
    id: &str,
    mut submission: PostSubmission,
    identity: &Identity,
) -> Result<Post, AppError> {
    let id = parse_post_id(id)?;
    let existing = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))?;

    let payload = std::mem::take(&mut submission.payload);
    let (mut post, image) = validate(state, payload, identity.user_id)?;
    ensure_slug_free(state, &post.slug, Some(id)).await?;

    let uploaded = store_upload(state, &mut submission).await?;
    post.image = match (&uploaded, image) {
        (Some(img), _) => Some(img.url.clone()),
        (None, ImageChoice::Url(url)) => Some(url),
        (None, ImageChoice::Clear) => None,
        (None, ImageChoice::Keep) => existing.image.clone(),
    };

    let updated = match state.posts.update(id, post).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            rollback_upload(state, uploaded).await;
            return Err(AppError::not_found("Post not found"));
        }
        Err(e) => {
            rollback_upload(state, uploaded).await;
            return Err(e.into());
        }
    };

    if existing.image != updated.image {
        release_own_image(state, existing.image.as_deref(), id).await;
    }
    info!(
        post_id = %updated.id,
        slug = %updated.slug,
        author = %updated.author,
        "post updated"
    );
    Ok(updated)
}

pub async fn delete(state: &AppState, id: &str, identity: &Identity) -> Result<(), AppError> {
    let id = parse_post_id(id)?;
    let removed = state
        .posts
        .delete(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))?;

    release_own_image(state, removed.image.as_deref(), id).await;
    info!(
        post_id = %removed.id,
        slug = %removed.slug,
        by = %identity.user_id,
        "post deleted"
    );
    Ok(())
}

/// Drops an image that lived in our own storage once no post other than
/// `released_by` points at it. Hosted URLs are left alone.
async fn release_own_image(state: &AppState, url: Option<&str>, released_by: Uuid) {
    let Some(url) = url else {
        return;
    };
    let Some(key) = state.image_policy.own_key(url) else {
        return;
    };
    match state.posts.image_in_use(url, Some(released_by)).await {
        Ok(false) => discard_image(state.storage.as_ref(), key).await,
        Ok(true) => debug!(key = %key, "image still referenced; kept"),
        Err(e) => warn!(error = ?e, key = %key, "could not check image references; kept"),
    }
}
