use serde::{Deserialize, Serialize};

use crate::news::tags::TagsInput;

/// Create/update body. Everything is optional here so that missing fields
/// surface as validation errors rather than JSON rejections. An `author`
/// sent by the client is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub date: Option<String>,
    pub read_time: Option<String>,
    pub category: Option<String>,
    pub tags: Option<TagsInput>,
    pub image: Option<String>,
}

/// Query string of `GET /news`. Kept as strings so bad values get our own
/// error messages (or, for `limit`, the default).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub exclude: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
}
