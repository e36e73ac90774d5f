use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};

use crate::{
    error::AppError,
    images::services::ImageUpload,
    news::{dto::PostPayload, tags::TagsInput},
};

/// A create/update body, sent either as JSON or as multipart form data with
/// an optional `image` file part.
#[derive(Debug, Default)]
pub struct PostSubmission {
    pub payload: PostPayload,
    pub upload: Option<ImageUpload>,
}

#[async_trait]
impl<S> FromRequest<S> for PostSubmission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| {
                ct.trim_start()
                    .to_ascii_lowercase()
                    .starts_with("multipart/form-data")
            });

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| AppError::validation(rejection.body_text()))?;
            read_multipart(multipart).await
        } else {
            let Json(payload) = Json::<PostPayload>::from_request(req, state).await?;
            Ok(PostSubmission {
                payload,
                upload: None,
            })
        }
    }
}

async fn read_multipart(mut mp: Multipart) -> Result<PostSubmission, AppError> {
    let mut out = PostSubmission::default();

    while let Some(field) = mp.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" && field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = field.bytes().await?;
            // Browsers send an empty part when no file was picked.
            if !body.is_empty() {
                out.upload = Some(ImageUpload {
                    body,
                    content_type,
                    file_name,
                });
            }
            continue;
        }

        let text = field.text().await?;
        let p = &mut out.payload;
        match name.as_str() {
            "title" => p.title = Some(text),
            "slug" => p.slug = Some(text),
            "content" => p.content = Some(text),
            "excerpt" => p.excerpt = Some(text),
            "date" => p.date = Some(text),
            "readTime" => p.read_time = Some(text),
            "category" => p.category = Some(text),
            "tags" => p.tags = Some(TagsInput::Text(text)),
            "image" => p.image = Some(text),
            _ => {}
        }
    }

    Ok(out)
}
