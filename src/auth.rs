// 🔐 Import Authentication - bearer token in, verdict out
// Only the allow-listed service account may trigger an import.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingToken,

    #[error("invalid Authorization format, expected: Bearer <token>")]
    MalformedHeader,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("token has no verified email")]
    UnverifiedEmail,

    #[error("email `{0}` is not allowed to trigger imports")]
    EmailNotAllowed(String),
}

/// Claims read from the identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportClaims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub exp: i64,
}

/// Token part of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedHeader)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Verdict on an import trigger's identity.
pub trait ImportAuthorizer: Send + Sync {
    /// Returns the verified email on success.
    fn authorize(&self, authorization: Option<&str>) -> Result<String, AuthError>;
}

/// HS256 verifier with a single allow-listed email.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    allowed_email: String,
}

impl JwtVerifier {
    pub fn new(secret: &str, allowed_email: impl Into<String>) -> Self {
        JwtVerifier {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            allowed_email: allowed_email.into(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<ImportClaims, AuthError> {
        let data = decode::<ImportClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AuthError::InvalidToken
        })?;
        Ok(data.claims)
    }
}

impl ImportAuthorizer for JwtVerifier {
    fn authorize(&self, authorization: Option<&str>) -> Result<String, AuthError> {
        let claims = self.verify(bearer_token(authorization)?)?;
        let email = match claims.email {
            Some(email) if claims.email_verified => email,
            _ => return Err(AuthError::UnverifiedEmail),
        };
        if email != self.allowed_email {
            return Err(AuthError::EmailNotAllowed(email));
        }
        Ok(email)
    }
}

/// Accepts everything. For the CLI, which runs with local credentials.
#[derive(Debug, Clone, Default)]
pub struct AllowAll;

impl ImportAuthorizer for AllowAll {
    fn authorize(&self, _authorization: Option<&str>) -> Result<String, AuthError> {
        Ok("local".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";
    const SERVICE_ACCOUNT: &str = "importer@example.iam.gserviceaccount.com";

    fn token(email: Option<&str>, verified: bool) -> String {
        let claims = ImportClaims {
            email: email.map(str::to_string),
            email_verified: verified,
            exp: chrono::Utc::now().timestamp() + 600,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(AuthError::MissingToken));
        assert_eq!(bearer_token(Some("Basic abc")), Err(AuthError::MalformedHeader));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::MalformedHeader));
    }

    #[test]
    fn test_allow_listed_verified_email_passes() {
        let verifier = JwtVerifier::new(SECRET, SERVICE_ACCOUNT);
        let header = format!("Bearer {}", token(Some(SERVICE_ACCOUNT), true));
        assert_eq!(verifier.authorize(Some(&header)).unwrap(), SERVICE_ACCOUNT);
    }

    #[test]
    fn test_rejections() {
        let verifier = JwtVerifier::new(SECRET, SERVICE_ACCOUNT);

        let unverified = format!("Bearer {}", token(Some(SERVICE_ACCOUNT), false));
        assert_eq!(verifier.authorize(Some(&unverified)), Err(AuthError::UnverifiedEmail));

        let no_email = format!("Bearer {}", token(None, true));
        assert_eq!(verifier.authorize(Some(&no_email)), Err(AuthError::UnverifiedEmail));

        let other = format!("Bearer {}", token(Some("someone@example.com"), true));
        assert_eq!(
            verifier.authorize(Some(&other)),
            Err(AuthError::EmailNotAllowed("someone@example.com".into()))
        );

        let wrong_secret = JwtVerifier::new("other-secret", SERVICE_ACCOUNT);
        let header = format!("Bearer {}", token(Some(SERVICE_ACCOUNT), true));
        assert_eq!(wrong_secret.authorize(Some(&header)), Err(AuthError::InvalidToken));
    }
}
