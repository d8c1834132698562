use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use huddle_types::api::Claims;

/// Why a bearer credential was refused. The `Display` form doubles as the
/// WebSocket close reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("missing_token")]
    MissingToken,
    #[error("invalid_token")]
    InvalidToken,
    #[error("expired_token")]
    ExpiredToken,
}

impl AuthFailure {
    /// Application close code sent when a gateway handshake is refused.
    pub const CLOSE_CODE: u16 = 4001;

    pub fn reason(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::ExpiredToken => "expired_token",
        }
    }
}

/// Validate an HS256 JWT and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AuthFailure> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthFailure::MissingToken);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthFailure::ExpiredToken,
        _ => AuthFailure::InvalidToken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    fn token(secret: &str, exp: i64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "ada@example.com".into(),
            exp: exp as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_a_valid_token() {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp();
        let claims = verify_token("secret", &token("secret", exp)).unwrap();
        assert_eq!(claims.email, "ada@example.com");
    }

    #[test]
    fn rejections_are_typed() {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp();
        assert_eq!(verify_token("secret", "").unwrap_err(), AuthFailure::MissingToken);
        assert_eq!(
            verify_token("other", &token("secret", exp)).unwrap_err(),
            AuthFailure::InvalidToken
        );
        assert_eq!(verify_token("secret", "garbage").unwrap_err(), AuthFailure::InvalidToken);

        let expired = (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp();
        assert_eq!(
            verify_token("secret", &token("secret", expired)).unwrap_err(),
            AuthFailure::ExpiredToken
        );
    }
}
