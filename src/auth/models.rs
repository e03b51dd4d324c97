//! Authentication models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Uploads photos, manages rosters and bindings
    Teacher,
    /// Views photos of bound children
    Parent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Teacher => write!(f, "teacher"),
            Role::Parent => write!(f, "parent"),
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            _ => Err(()),
        }
    }
}

/// Resolved user attached to the request after token verification.
///
/// Re-fetched from the database on every request so role or name changes
/// since token issuance are honored immediately.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub full_name: String,
    pub class_id: Option<i32>,
}

/// Identity produced by any credential verifier, local or external
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// Credentials a verifier may be handed
#[derive(Debug, Clone)]
pub enum Credentials<'a> {
    Password { username: &'a str, password: &'a str },
    PhoneCode { phone: &'a str, code: &'a str },
}

/// A way of checking credentials and producing a normalized identity.
///
/// The token issuer and everything downstream is oblivious to which
/// implementation (local store or external bridge) authenticated the caller.
pub trait CredentialVerifier {
    async fn verify(&self, credentials: Credentials<'_>)
        -> crate::error::Result<VerifiedIdentity>;
}

/// Login credentials
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.username.is_empty() {
            return Err(crate::error::Error::Validation("username is required".into()));
        }
        if self.password.chars().count() < 6 {
            return Err(crate::error::Error::Validation(
                "password must be at least 6 characters".into(),
            ));
        }
        Ok(())
    }
}

/// Phone + SMS code credentials for the external bridge
#[derive(Debug, Deserialize)]
pub struct PhoneLoginRequest {
    pub phone: String,
    pub code: String,
}

/// Registration payload. `role` stays a raw string so a bad value is a
/// validation failure, not a body-decoding one.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: String,
    pub full_name: String,
    pub telephone_number: String,
    pub class_id: Option<i32>,
}

impl RegisterRequest {
    pub fn validate(&self) -> crate::error::Result<Role> {
        use crate::error::Error;
        if self.username.chars().count() < 3 {
            return Err(Error::Validation("username must be at least 3 characters".into()));
        }
        if self.password.chars().count() < 6 {
            return Err(Error::Validation("password must be at least 6 characters".into()));
        }
        let role: Role = self
            .role
            .parse()
            .map_err(|_| Error::Validation("role must be teacher or parent".into()))?;
        if self.full_name.is_empty() {
            return Err(Error::Validation("full name is required".into()));
        }
        if !is_mobile_number(&self.telephone_number) {
            return Err(Error::Validation("telephone number is not a valid mobile number".into()));
        }
        Ok(role)
    }
}

/// Mainland mobile format: 11 digits, 1 then 3-9
fn is_mobile_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 11
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
        && bytes.iter().all(|b| b.is_ascii_digit())
}

/// Password rotation payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;
        if self.current_password.is_empty() {
            return Err(Error::Validation("current password is required".into()));
        }
        if self.new_password.chars().count() < 6 {
            return Err(Error::Validation(
                "new password must be at least 6 characters".into(),
            ));
        }
        Ok(())
    }
}

/// Refresh request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Login response with tokens
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    pub user: UserInfo,
}

/// User information in responses
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub full_name: Option<String>,
    pub class_id: Option<i32>,
}

impl From<&AuthUser> for UserInfo {
    fn from(user: &AuthUser) -> Self {
        Self {
            id: user.id as i64,
            username: user.username.clone(),
            role: user.role.to_string(),
            full_name: Some(user.full_name.clone()),
            class_id: user.class_id,
        }
    }
}

impl From<&VerifiedIdentity> for UserInfo {
    fn from(identity: &VerifiedIdentity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            role: identity.role.to_string(),
            full_name: None,
            class_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Teacher.to_string(), "teacher");
        assert_eq!(Role::Parent.to_string(), "parent");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("teacher".parse::<Role>(), Ok(Role::Teacher));
        assert_eq!("parent".parse::<Role>(), Ok(Role::Parent));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_register_validation() {
        let mut req = RegisterRequest {
            username: "teacher9".to_string(),
            password: "123456".to_string(),
            role: "teacher".to_string(),
            full_name: "王老师".to_string(),
            telephone_number: "13812345678".to_string(),
            class_id: None,
        };
        assert_eq!(req.validate().unwrap(), Role::Teacher);

        req.username = "ab".to_string();
        assert!(req.validate().is_err());
        req.username = "teacher9".to_string();

        req.password = "12345".to_string();
        assert!(req.validate().is_err());
        req.password = "123456".to_string();

        req.role = "principal".to_string();
        assert!(req.validate().is_err());
        req.role = "teacher".to_string();

        req.telephone_number = "12812345678".to_string();
        assert!(req.validate().is_err());
        req.telephone_number = "138123".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_mobile_number_format() {
        assert!(is_mobile_number("13912345678"));
        assert!(is_mobile_number("19912345678"));
        assert!(!is_mobile_number("12912345678"));
        assert!(!is_mobile_number("1391234567"));
        assert!(!is_mobile_number("139123456789"));
        assert!(!is_mobile_number("1391234567a"));
    }
}
