use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::claims::{Claims, Identity},
    config::JwtConfig,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature or claims are invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Signing and verification keys plus the fixed claims every token carries.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::seconds(cfg.ttl_seconds),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.whole_seconds()
    }

    pub fn issue(&self, identity: &Identity) -> anyhow::Result<IssuedToken> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        now: OffsetDateTime,
    ) -> anyhow::Result<IssuedToken> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: identity.user_id,
            email: identity.email.clone(),
            role: identity.role,
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %identity.user_id, role = %identity.role, "jwt signed");
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Expiry is checked here instead of by `jsonwebtoken` so the boundary is
    /// exact: valid while `now < exp`, no leeway.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::Invalid
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;
    use uuid::Uuid;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_seconds: 3600,
        })
    }

    fn admin() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "admin@x.org".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let who = admin();
        let issued = keys.issue(&who).expect("sign");
        let claims = keys.verify(&issued.token).expect("verify");
        assert_eq!(claims.sub, who.user_id);
        assert_eq!(claims.email, "admin@x.org");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(Identity::from(claims), who);
    }

    #[test]
    fn accepted_until_max_age_then_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let t = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let issued = keys.issue_at(&admin(), t).expect("sign");

        assert!(keys.verify_at(&issued.token, t).is_ok());
        assert!(keys
            .verify_at(&issued.token, t + Duration::seconds(3599))
            .is_ok());
        assert_eq!(
            keys.verify_at(&issued.token, t + Duration::seconds(3600))
                .unwrap_err(),
            TokenError::Expired
        );
        assert_eq!(
            keys.verify_at(&issued.token, t + Duration::days(2)).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn verify_rejects_other_secret() {
        let good = make_keys("secret-a", "iss", "aud");
        let bad = make_keys("secret-b", "iss", "aud");
        let issued = good.issue(&admin()).unwrap();
        assert_eq!(bad.verify(&issued.token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let other_iss = make_keys("same-secret", "bad-iss", "good-aud");
        let other_aud = make_keys("same-secret", "good-iss", "bad-aud");
        let issued = good.issue(&admin()).unwrap();
        assert_eq!(other_iss.verify(&issued.token).unwrap_err(), TokenError::Invalid);
        assert_eq!(other_aud.verify(&issued.token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let issued = keys.issue(&admin()).unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        parts[1] = "eyJzdWIiOiJ4In0";
        let forged = parts.join(".");
        assert_eq!(keys.verify(&forged).unwrap_err(), TokenError::Invalid);
        assert_eq!(keys.verify("not-a-jwt").unwrap_err(), TokenError::Invalid);
    }
}
