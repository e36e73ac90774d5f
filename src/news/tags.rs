use serde::Deserialize;

/// Tags as clients send them: a JSON array, or a single string holding either
/// a comma list or a JSON-encoded array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TagsError {
    #[error("tags must be a JSON array of strings: {0}")]
    MalformedArray(String),
}

pub fn parse_tags(input: TagsInput) -> Result<Vec<String>, TagsError> {
    let raw = match input {
        TagsInput::List(items) => items,
        TagsInput::Text(text) => {
            let text = text.trim();
            if text.starts_with('[') {
                serde_json::from_str::<Vec<String>>(text)
                    .map_err(|e| TagsError::MalformedArray(e.to_string()))?
            } else {
                text.split(',').map(str::to_string).collect()
            }
        }
    };

    Ok(raw
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}
