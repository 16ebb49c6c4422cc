// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError};

/// JWT Claims structure. Tokens are issued by the portal's auth provider.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the portal user id.
    pub sub: String,
    /// Portal role (e.g., 'donor', 'staff', 'admin').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// What a caller may do in the LMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Learner,
    Staff,
    Admin,
}

/// Portal role names. Anything not listed is treated as a learner.
const ROLE_TABLE: &[(&str, Role)] = &[
    ("admin", Role::Admin),
    ("lms_admin", Role::Admin),
    ("staff", Role::Staff),
    ("relationship_manager", Role::Staff),
    ("donor", Role::Learner),
    ("partner", Role::Learner),
    ("learner", Role::Learner),
];

impl Role {
    pub fn from_claim(role: &str) -> Role {
        ROLE_TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(role))
            .map(|(_, r)| *r)
            .unwrap_or(Role::Learner)
    }

    /// Risk review and interventions.
    pub fn can_manage_learners(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

impl Claims {
    pub fn role(&self) -> Role {
        Role::from_claim(&self.role)
    }
}

/// Signs a JWT. The service only verifies tokens; this exists for local
/// tooling and tests.
pub fn sign_jwt(
    user_id: &str,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user_id.to_owned(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects `Claims`
/// into the request extensions. Returns 401 otherwise.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    match verify_jwt(token, &config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: staff/admin authorization.
///
/// Must be used AFTER `auth_middleware`. Returns 403 for learners.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !claims.role().can_manage_learners() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
