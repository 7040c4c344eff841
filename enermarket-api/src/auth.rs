use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use enermarket_shared::{Participant, Submarket};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState, state::AuthConfig};

/// Token claims; `sub` is the participant's numeric user id
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub submarket: Submarket,
    pub exp: usize,
}

/// The caller, taken from a bearer token
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Participant);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("missing bearer token".to_string()))?;

        let token_data = decode::<Claims>(
            bearer.token(),
            &DecodingKey::from_secret(state.auth.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))?;

        let claims = token_data.claims;
        let id = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized(format!("invalid subject: {}", claims.sub)))?;

        Ok(AuthUser(Participant {
            id,
            submarket: claims.submarket,
        }))
    }
}

/// Sign a token for `participant`. Tokens normally come from the user service.
pub fn issue_token(auth: &AuthConfig, participant: &Participant) -> Result<String, AppError> {
    let claims = Claims {
        sub: participant.id.to_string(),
        submarket: participant.submarket,
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
}
