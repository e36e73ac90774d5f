use std::fmt::Write as _;

use tracing::{error, info, warn};

use crate::{
    auth::services::is_valid_email,
    config::EmailConfig,
    error::AppError,
    forms::dto::{FormAccepted, FormSubmission},
    mail::{Mailer, OutboundEmail},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Volunteer,
    Partnership,
    Contact,
}

impl FormKind {
    fn operator_subject(self) -> &'static str {
        match self {
            FormKind::Volunteer => "New Volunteer Application",
            FormKind::Partnership => "New Partnership Volunteer Application",
            FormKind::Contact => "New Contact from Amani Center Website",
        }
    }

    fn confirmation_subject(self) -> &'static str {
        match self {
            FormKind::Volunteer => "Thank You for Your Application",
            FormKind::Partnership => "Thank You for Your Partnership Interest",
            FormKind::Contact => "We Received Your Message",
        }
    }

    fn interests_label(self) -> &'static str {
        match self {
            FormKind::Partnership => "Partnership interests",
            _ => "Opportunities",
        }
    }

    fn accepted_message(self) -> &'static str {
        match self {
            FormKind::Volunteer => {
                "Volunteer application submitted successfully. A confirmation has been sent to your email."
            }
            FormKind::Partnership => {
                "Partnership volunteer application submitted successfully. A confirmation has been sent to your email."
            }
            FormKind::Contact => {
                "Message sent successfully. A confirmation has been sent to your email."
            }
        }
    }
}

/// A submission that passed validation. Optional fields are trimmed and
/// empty when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: Option<String>,
    pub skills: String,
    pub interests: Vec<String>,
    pub message: String,
}

fn trimmed(v: Option<String>) -> String {
    v.map(|s| s.trim().to_string()).unwrap_or_default()
}

pub fn validate(kind: FormKind, form: FormSubmission) -> Result<ValidForm, AppError> {
    let name = trimmed(form.name);
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    let email = trimmed(form.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email format"));
    }
    let message = trimmed(form.message);
    if kind == FormKind::Contact && message.is_empty() {
        return Err(AppError::validation("Message is required"));
    }

    Ok(ValidForm {
        name,
        email,
        phone: trimmed(form.phone),
        subject: Some(trimmed(form.subject)).filter(|s| !s.is_empty()),
        skills: trimmed(form.skills),
        interests: form
            .interests
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect(),
        message,
    })
}

pub fn operator_email(kind: FormKind, form: &ValidForm, operator: &str) -> OutboundEmail {
    let mut text = String::new();
    let _ = writeln!(text, "Name: {}", form.name);
    let _ = writeln!(text, "Email: {}", form.email);
    let _ = writeln!(text, "Phone: {}", form.phone);
    if kind != FormKind::Contact {
        let _ = writeln!(text, "Skills: {}", form.skills);
        let _ = writeln!(text, "{}: {}", kind.interests_label(), form.interests.join(", "));
    }
    let _ = write!(text, "Message: {}", form.message);

    let subject = match (kind, &form.subject) {
        (FormKind::Contact, Some(s)) => s.clone(),
        _ => kind.operator_subject().to_string(),
    };

    OutboundEmail {
        to: operator.to_string(),
        to_name: None,
        reply_to: Some(form.email.clone()),
        subject,
        text,
    }
}

pub fn confirmation_email(kind: FormKind, form: &ValidForm) -> OutboundEmail {
    let body = match kind {
        FormKind::Volunteer => {
            "Thank you for applying to volunteer. We'll review your application shortly."
        }
        FormKind::Partnership => {
            "Thank you for your interest in partnering with us. Our team will be in touch soon."
        }
        FormKind::Contact => {
            "Thank you for reaching out. We have received your message and will reply soon."
        }
    };
    OutboundEmail {
        to: form.email.clone(),
        to_name: Some(form.name.clone()),
        reply_to: None,
        subject: kind.confirmation_subject().to_string(),
        text: format!("Dear {},\n\n{}\n\nAmani Center Team", form.name, body),
    }
}

/// Validates, then sends the operator notification and the submitter
/// confirmation. Both sends are always attempted; any failure is returned.
pub async fn submit(
    mailer: &dyn Mailer,
    email_cfg: &EmailConfig,
    kind: FormKind,
    form: FormSubmission,
) -> Result<FormAccepted, AppError> {
    let form = validate(kind, form)?;
    let to_operator = operator_email(kind, &form, &email_cfg.operator_address);
    let to_submitter = confirmation_email(kind, &form);

    let (operator, confirmation) =
        tokio::join!(mailer.send(&to_operator), mailer.send(&to_submitter));

    if let Err(e) = &operator {
        error!(error = %e, kind = ?kind, "operator notification failed");
    }
    if let Err(e) = &confirmation {
        warn!(error = %e, kind = ?kind, to = %form.email, "confirmation email failed");
    }
    if operator.is_err() || confirmation.is_err() {
        return Err(AppError::Delivery {
            operator_notified: operator.is_ok(),
            confirmation_sent: confirmation.is_ok(),
        });
    }

    info!(kind = ?kind, from = %form.email, "form relayed");
    Ok(FormAccepted {
        success: true,
        message: kind.accepted_message(),
    })
}
