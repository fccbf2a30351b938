//! Password hashing, bearer credentials, and the account operations built on
//! them. Everything here is synchronous; handlers call it through
//! [`crate::error::blocking`].

use anyhow::{Context, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use uuid::Uuid;

use txtme_db::Database;
use txtme_db::models::UserRow;
use txtme_types::api::Claims;
use txtme_types::models::PublicProfile;

use crate::error::ApiError;

/// Credentials are valid for 30 days from issuance.
pub const TOKEN_TTL_DAYS: i64 = 30;

// -- Passwords --

/// Argon2id with a fresh random salt, encoded as a PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Constant-time check of `password` against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// -- Credentials --

pub fn issue_token(secret: &str, user_id: Uuid) -> anyhow::Result<String> {
    issue_token_at(secret, user_id, Utc::now())
}

pub fn issue_token_at(secret: &str, user_id: Uuid, issued_at: DateTime<Utc>) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        exp: (issued_at + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Check signature and expiry. A pure function of the token and the key.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::Expired,
            _ => ApiError::Unauthenticated,
        })
}

// -- Accounts --

pub fn register(db: &Database, username: &str, password: &str) -> Result<Uuid, ApiError> {
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidPayload("Missing fields".into()));
    }

    if db.get_user_by_username(username)?.is_some() {
        return Err(ApiError::HandleTaken);
    }

    let password_hash = hash_password(password)?;
    let user_id = Uuid::new_v4();

    // The unique index settles races between two concurrent registrations.
    if !db.create_user(&user_id.to_string(), username, &password_hash)? {
        return Err(ApiError::HandleTaken);
    }

    Ok(user_id)
}

/// On success, a supplied push token replaces the stored one before the
/// credential is issued.
pub fn login(
    db: &Database,
    secret: &str,
    username: &str,
    password: &str,
    push_token: Option<&str>,
) -> Result<(UserRow, String), ApiError> {
    let mut user = db
        .get_user_by_username(username)?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(password, &user.password)? {
        return Err(ApiError::InvalidCredentials);
    }

    if let Some(token) = push_token.filter(|t| !t.is_empty()) {
        db.set_push_token(&user.id, token)?;
        user.push_token = Some(token.to_string());
    }

    let token = issue_token(secret, user_uuid(&user)?)?;
    Ok((user, token))
}

pub fn lookup_public(db: &Database, username: &str) -> Result<PublicProfile, ApiError> {
    let user = db
        .get_user_by_username(username)?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(PublicProfile {
        id: user_uuid(&user)?,
        username: user.username,
        theme_id: user.theme_id,
        avatar_id: user.avatar_id,
    })
}

pub fn update_profile(db: &Database, user_id: Uuid, theme_id: u32, avatar_id: u32) -> Result<(), ApiError> {
    if !db.update_profile(&user_id.to_string(), theme_id, avatar_id)? {
        return Err(ApiError::NotFound("User"));
    }
    Ok(())
}

pub fn user_uuid(user: &UserRow) -> anyhow::Result<Uuid> {
    user.id
        .parse()
        .with_context(|| format!("corrupt user id '{}'", user.id))
}
