//! JWT token handling

use crate::auth::models::Role;
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Username
    pub username: String,
    /// User role
    pub role: String,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

impl Claims {
    /// Get user role; unknown strings read as the least-privileged role
    pub fn get_role(&self) -> Role {
        self.role.parse().unwrap_or(Role::Parent)
    }

    /// Check if token is expired
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() > self.exp
    }
}

/// Refresh token claims. Deliberately a different shape from [`Claims`]:
/// an access token lacks `token_use` and a refresh token lacks `role`, so
/// neither ever decodes as the other.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub username: String,
    pub token_use: String,
    pub iat: i64,
    pub exp: i64,
}

const REFRESH_USE: &str = "refresh";

/// Issues and verifies both token kinds with a config-supplied secret
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, auth: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs: auth.access_token_hours * 3600,
            refresh_ttl_secs: auth.refresh_token_days * 24 * 3600,
        }
    }

    /// Mint an access token embedding subject, username and role
    pub fn create_access_token(&self, id: i64, username: &str, role: Role) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Config(format!("Failed to create token: {}", e)))
    }

    /// Mint a refresh token with the minimal claim set
    pub fn create_refresh_token(&self, id: i64, username: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: id.to_string(),
            username: username.to_string(),
            token_use: REFRESH_USE.to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Config(format!("Failed to create token: {}", e)))
    }

    /// Validate and decode an access token
    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| Error::Forbidden(format!("access token invalid: {}", e)))
    }

    /// Validate and decode a refresh token
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims> {
        let claims = decode::<RefreshClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| Error::Forbidden(format!("refresh token invalid: {}", e)))?;
        if claims.token_use != REFRESH_USE {
            return Err(Error::Forbidden("refresh token invalid".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", &AuthConfig::default())
    }

    #[test]
    fn test_create_and_validate_token() {
        let issuer = issuer();
        let token = issuer
            .create_access_token(1, "teacher1", Role::Teacher)
            .expect("Failed to create token");
        let claims = issuer.validate_access_token(&token).expect("Failed to validate token");

        assert_eq!(claims.sub, "1");
        assert_eq!(claims.username, "teacher1");
        assert_eq!(claims.get_role(), Role::Teacher);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_invalid_token() {
        let result = issuer().validate_access_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issuer()
            .create_access_token(1, "teacher1", Role::Teacher)
            .expect("Failed to create token");
        let other = TokenIssuer::new("other-secret", &AuthConfig::default());
        assert!(other.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let issuer = issuer();
        let token = issuer
            .create_refresh_token(7, "parent1")
            .expect("Failed to create refresh token");
        let claims = issuer.validate_refresh_token(&token).expect("Failed to validate");
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.token_use, "refresh");
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let issuer = issuer();
        let refresh = issuer.create_refresh_token(7, "parent1").unwrap();
        assert!(issuer.validate_access_token(&refresh).is_err());
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let issuer = issuer();
        let access = issuer.create_access_token(7, "parent1", Role::Parent).unwrap();
        assert!(issuer.validate_refresh_token(&access).is_err());
    }

    #[test]
    fn test_unknown_role_defaults_to_parent() {
        let claims = Claims {
            sub: "1".to_string(),
            username: "x".to_string(),
            role: "principal".to_string(),
            iat: 0,
            exp: 9999999999,
        };
        assert_eq!(claims.get_role(), Role::Parent);
    }
}
