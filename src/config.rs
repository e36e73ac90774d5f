use anyhow::{bail, Context};
use serde::Deserialize;

const DEFAULT_IMAGE_URL_PATTERN: &str = r"^https://res\.cloudinary\.com/[^/]+/image/upload/.+";
const DEFAULT_EMAIL_API_URL: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Local {
        dir: String,
        url_base: String,
    },
    S3 {
        endpoint: String,
        bucket: String,
        region: String,
        access_key: String,
        secret_key: String,
        public_url_base: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_url: String,
    /// `None` leaves the relay running with a mailer that rejects every send.
    pub api_key: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub operator_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub cors_allowed_origins: Vec<String>,
    pub image_url_pattern: String,
    /// Upstream error details are only echoed to clients in development.
    pub expose_error_details: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let database_url = require("DATABASE_URL")?;
        let port = match get("APP_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("APP_PORT must be a port number, got {v:?}"))?,
            None => 8080,
        };

        // Refuse to boot rather than sign tokens with an empty key.
        let jwt = JwtConfig {
            secret: require("JWT_SECRET")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "amani-center".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "amani-center-admin".into()),
            ttl_seconds: match get("JWT_TTL_SECONDS") {
                Some(v) => v
                    .parse::<i64>()
                    .ok()
                    .filter(|ttl| *ttl > 0)
                    .with_context(|| {
                        format!("JWT_TTL_SECONDS must be a positive integer, got {v:?}")
                    })?,
                None => 3600,
            },
        };

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                dir: get("UPLOADS_DIR").unwrap_or_else(|| "uploads".into()),
                url_base: get("UPLOADS_URL_BASE")
                    .unwrap_or_else(|| "/uploads".into())
                    .trim_end_matches('/')
                    .to_string(),
            },
            "s3" => {
                let endpoint = require("S3_ENDPOINT")?;
                let bucket = require("S3_BUCKET")?;
                let public_url_base = get("S3_PUBLIC_URL_BASE")
                    .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket))
                    .trim_end_matches('/')
                    .to_string();
                StorageConfig::S3 {
                    endpoint,
                    bucket,
                    region: get("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                    access_key: require("S3_ACCESS_KEY")?,
                    secret_key: require("S3_SECRET_KEY")?,
                    public_url_base,
                }
            }
            other => bail!("STORAGE_BACKEND must be `local` or `s3`, got {other:?}"),
        };

        let from_address =
            get("EMAIL_FROM").unwrap_or_else(|| "no-reply@amanicentercbo.org".into());
        let email = EmailConfig {
            api_url: get("EMAIL_API_URL").unwrap_or_else(|| DEFAULT_EMAIL_API_URL.into()),
            api_key: get("EMAIL_API_KEY"),
            from_name: get("EMAIL_FROM_NAME").unwrap_or_else(|| "Amani Center".into()),
            operator_address: get("EMAIL_TO").unwrap_or_else(|| from_address.clone()),
            from_address,
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let image_url_pattern =
            get("IMAGE_URL_PATTERN").unwrap_or_else(|| DEFAULT_IMAGE_URL_PATTERN.into());
        regex::Regex::new(&image_url_pattern).context("IMAGE_URL_PATTERN is not a valid regex")?;

        Ok(Self {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database_url,
            jwt,
            storage,
            email,
            cors_allowed_origins,
            image_url_pattern,
            expose_error_details: get("APP_ENV").as_deref() == Some("development"),
        })
    }

    pub fn uploads_url_base(&self) -> &str {
        match &self.storage {
            StorageConfig::Local { url_base, .. } => url_base,
            StorageConfig::S3 { public_url_base, .. } => public_url_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/amani"),
        ("JWT_SECRET", "s3cr3t"),
    ];

    #[test]
    fn missing_jwt_secret_is_fatal() {
        let err = load(&[("DATABASE_URL", "postgres://localhost/amani")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn blank_jwt_secret_is_fatal() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/amani"),
            ("JWT_SECRET", "   "),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(BASE).expect("config");
        assert_eq!(cfg.jwt.ttl_seconds, 3600);
        assert_eq!((cfg.host.as_str(), cfg.port), ("0.0.0.0", 8080));
        assert_eq!(cfg.uploads_url_base(), "/uploads");
        assert!(cfg.email.api_key.is_none());
        assert_eq!(cfg.email.operator_address, cfg.email.from_address);
        assert!(cfg.cors_allowed_origins.is_empty());
        assert!(!cfg.expose_error_details);
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let mut vars = BASE.to_vec();
        vars.push(("JWT_TTL_SECONDS", "0"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn s3_backend_requires_credentials() {
        let mut vars = BASE.to_vec();
        vars.push(("STORAGE_BACKEND", "s3"));
        vars.push(("S3_ENDPOINT", "http://minio:9000"));
        vars.push(("S3_BUCKET", "news"));
        assert!(load(&vars).is_err());

        vars.push(("S3_ACCESS_KEY", "key"));
        vars.push(("S3_SECRET_KEY", "secret"));
        let cfg = load(&vars).expect("config");
        assert_eq!(cfg.uploads_url_base(), "http://minio:9000/news");
    }

    #[test]
    fn parses_cors_origins() {
        let mut vars = BASE.to_vec();
        vars.push((
            "CORS_ALLOWED_ORIGINS",
            "https://amanicentercbo.org/, *.vercel.app ,,",
        ));
        let cfg = load(&vars).expect("config");
        assert_eq!(
            cfg.cors_allowed_origins,
            vec!["https://amanicentercbo.org".to_string(), "*.vercel.app".to_string()]
        );
    }
}
