use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> anyhow::Result<()>;
}

pub fn build_mailer(cfg: &EmailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match &cfg.api_key {
        Some(key) => Ok(Arc::new(HttpMailer::new(cfg, key)?)),
        None => {
            warn!("EMAIL_API_KEY not set; form submissions will fail to deliver");
            Ok(Arc::new(DisabledMailer))
        }
    }
}

/// Transactional email over a Brevo-style JSON API.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_address: String,
    from_name: String,
}

impl HttpMailer {
    pub fn new(cfg: &EmailConfig, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build email http client")?;
        Ok(Self {
            client,
            api_url: cfg.api_url.clone(),
            api_key: api_key.to_string(),
            from_address: cfg.from_address.clone(),
            from_name: cfg.from_name.clone(),
        })
    }
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender: Address<'a>,
    to: [Address<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Address<'a>>,
    subject: &'a str,
    text_content: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutboundEmail) -> anyhow::Result<()> {
        let body = SendRequest {
            sender: Address {
                email: &self.from_address,
                name: Some(&self.from_name),
            },
            to: [Address {
                email: &email.to,
                name: email.to_name.as_deref(),
            }],
            reply_to: email.reply_to.as_deref().map(|addr| Address {
                email: addr,
                name: None,
            }),
            subject: &email.subject,
            text_content: &email.text,
        };

        let res = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("email provider request")?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            anyhow::bail!("email provider returned {status}: {detail}");
        }
        debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Used when no provider is configured. Every send fails so callers report it.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _email: &OutboundEmail) -> anyhow::Result<()> {
        anyhow::bail!("email transport is not configured")
    }
}
