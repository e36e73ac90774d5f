use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Education,
    Environment,
    Partnerships,
    Sports,
    Politics,
    Health,
    Weather,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Education,
        Category::Environment,
        Category::Partnerships,
        Category::Sports,
        Category::Politics,
        Category::Health,
        Category::Weather,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Education => "Education",
            Category::Environment => "Environment",
            Category::Partnerships => "Partnerships",
            Category::Sports => "Sports",
            Category::Politics => "Politics",
            Category::Health => "Health",
            Category::Weather => "Weather",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    /// Case-insensitive, so `education` and `Education` are the same filter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown category {s:?}"))
    }
}

/// News post as served to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub read_time: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub author: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub date: OffsetDateTime,
    pub read_time: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub author_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<PostRow> for Post {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            content: row.content,
            excerpt: row.excerpt,
            date: row.date,
            read_time: row.read_time,
            category: row.category.parse()?,
            tags: row.tags,
            image: row.image,
            author: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Validated fields for an insert or a full update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub date: OffsetDateTime,
    pub read_time: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub author: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    pub category: Option<Category>,
    pub exclude: Option<Uuid>,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("education".parse::<Category>().unwrap(), Category::Education);
        assert_eq!(" Weather ".parse::<Category>().unwrap(), Category::Weather);
        assert!("Gossip".parse::<Category>().is_err());
    }

    #[test]
    fn post_serializes_camel_case() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let post = Post {
            id: Uuid::nil(),
            title: "Hi".into(),
            slug: "hi".into(),
            content: "<p>x</p>".into(),
            excerpt: "x".into(),
            date: now,
            read_time: "2 min".into(),
            category: Category::Health,
            tags: vec!["a".into()],
            image: None,
            author: Uuid::nil(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["readTime"], "2 min");
        assert_eq!(json["category"], "Health");
        assert_eq!(json["date"], "1970-01-01T00:00:00Z");
        assert!(json["image"].is_null());
    }
}
