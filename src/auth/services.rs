use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        claims::Identity,
        dto::LoginResponse,
        jwt::JwtKeys,
        password::{burn_hash, hash_password, verify_password},
        repo::UserStore,
        repo_types::{NewUser, Role},
    },
    error::AppError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::Store(e) => AppError::Upstream(e),
        }
    }
}

/// Resolves credentials to an identity. Unknown email and wrong password are
/// indistinguishable to the caller.
pub async fn authenticate(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<Identity, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let Some(user) = users.find_by_email(&email).await? else {
        burn_hash(password);
        warn!(email = %email, "login unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    Ok(Identity::from(&user))
}

/// `authenticate` followed by token issuance.
pub async fn login(
    users: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<LoginResponse, AppError> {
    let identity = authenticate(users, email, password).await?;
    let issued = keys.issue(&identity)?;

    info!(
        user_id = %identity.user_id,
        role = %identity.role,
        expires_at = %issued.expires_at,
        "user logged in"
    );
    Ok(LoginResponse {
        token: issued.token,
        user_id: identity.user_id,
        email: identity.email,
        role: identity.role,
        expires_in: keys.ttl_seconds(),
    })
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    AlreadyExists,
}

/// One-time creation of the admin account. Existing accounts are left untouched.
pub async fn seed_admin(users: &dyn UserStore, seed: AdminSeed) -> anyhow::Result<SeedOutcome> {
    let email = seed.email.trim().to_lowercase();
    let username = seed.username.trim().to_string();

    anyhow::ensure!(!username.is_empty(), "admin username must not be empty");
    anyhow::ensure!(is_valid_email(&email), "admin email {email:?} is not valid");
    anyhow::ensure!(
        seed.password.len() >= 8,
        "admin password must be at least 8 characters"
    );

    if users.find_by_email(&email).await?.is_some()
        || users.find_by_username(&username).await?.is_some()
    {
        warn!(email = %email, username = %username, "admin already exists; nothing to do");
        return Ok(SeedOutcome::AlreadyExists);
    }

    let user = users
        .create(NewUser {
            username,
            email,
            password_hash: hash_password(&seed.password)?,
            role: Role::Admin,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "admin user created");
    Ok(SeedOutcome::Created)
}
