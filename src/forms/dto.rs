use serde::{Deserialize, Serialize};

/// Body shared by the volunteer, partnership and contact forms. The
/// volunteer form calls its list `opportunities`, the partnership form
/// `partnershipInterests`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub skills: Option<String>,
    #[serde(default, alias = "opportunities", alias = "partnershipInterests")]
    pub interests: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FormAccepted {
    pub success: bool,
    pub message: &'static str,
}
