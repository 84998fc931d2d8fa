use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const TOKEN_LIFETIME_DAYS: i64 = 30;

/// JWT claims shared by the REST middleware and the websocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

/// The caller behind a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no authentication token, access denied")]
    Missing,
    #[error("token verification failed")]
    Invalid,
    #[error("failed to issue token: {0}")]
    Issue(#[from] jsonwebtoken::errors::Error),
}

/// Validates an opaque bearer credential.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, IdentityError>;
}

/// HS256 tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> Result<String, IdentityError> {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, IdentityError> {
        let data = decode::<Claims>(credential, &self.decoding, &Validation::default())
            .map_err(|_| IdentityError::Invalid)?;
        Ok(Identity {
            user_id: data.claims.sub,
            username: data.claims.username,
        })
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, IdentityError> {
    let header = header.ok_or(IdentityError::Missing)?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(IdentityError::Missing)?;
    if token.is_empty() {
        return Err(IdentityError::Missing);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let verifier = JwtVerifier::new("test-secret");
        let user_id = Uuid::new_v4();
        let token = verifier.issue(user_id, "xavier").unwrap();

        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "xavier");
    }

    #[test]
    fn foreign_or_garbled_tokens_are_rejected() {
        let token = JwtVerifier::new("one").issue(Uuid::new_v4(), "x").unwrap();
        assert!(matches!(
            JwtVerifier::new("two").verify(&token),
            Err(IdentityError::Invalid)
        ));
        assert!(JwtVerifier::new("one").verify("not.a.jwt").is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(matches!(bearer_token(None), Err(IdentityError::Missing)));
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
    }
}
