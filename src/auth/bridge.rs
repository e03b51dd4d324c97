//! External identity bridge
//!
//! Delegates credential checking to a third-party login service and maps
//! its role vocabulary onto the local role model. Calls are never retried:
//! a rejection is surfaced with the upstream message, a transport failure
//! as service-unavailable.

use crate::auth::models::{CredentialVerifier, Credentials, Role, VerifiedIdentity};
use crate::config::IdentityBridgeConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Translate the vendor's role names into the local model.
///
/// Unrecognized strings map to parent; the default is explicit, not
/// inferred.
pub fn map_external_role(raw: &str) -> Role {
    match raw {
        "老师" => Role::Teacher,
        "家长" => Role::Parent,
        _ => Role::Parent,
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    code: i64,
    message: Option<String>,
    data: Option<BridgeUser>,
}

#[derive(Debug, Deserialize)]
struct BridgeUser {
    id: i64,
    username: String,
    role: Option<String>,
}

/// HTTP client for the external login service
pub struct IdentityBridge {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityBridge {
    pub fn new(config: &IdentityBridgeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<VerifiedIdentity> {
        self.post_credentials(
            "login",
            serde_json::json!({ "username": username, "password": password }),
        )
        .await
    }

    pub async fn phone_login(&self, phone: &str, code: &str) -> Result<VerifiedIdentity> {
        self.post_credentials(
            "phone_login",
            serde_json::json!({ "phone": phone, "code": code }),
        )
        .await
    }

    async fn post_credentials(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<VerifiedIdentity> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            tracing::error!("identity bridge call to {} failed: {}", url, e);
            Error::ServiceUnavailable("login service unreachable".to_string())
        })?;

        let status = response.status();
        match response.json::<BridgeResponse>().await {
            Ok(payload) if status.is_success() && payload.code == 0 => {
                let user = payload.data.ok_or_else(|| {
                    Error::Unauthenticated("identity service returned no user".to_string())
                })?;
                Ok(VerifiedIdentity {
                    id: user.id,
                    username: user.username,
                    role: map_external_role(user.role.as_deref().unwrap_or("")),
                })
            }
            Ok(payload) => {
                let message = payload
                    .message
                    .unwrap_or_else(|| "login rejected by identity service".to_string());
                Err(Error::Unauthenticated(message))
            }
            Err(_) if status.is_success() => Err(Error::ServiceUnavailable(
                "login service returned an invalid response".to_string(),
            )),
            Err(_) => Err(Error::Unauthenticated(
                "login rejected by identity service".to_string(),
            )),
        }
    }
}

impl CredentialVerifier for IdentityBridge {
    async fn verify(&self, credentials: Credentials<'_>) -> Result<VerifiedIdentity> {
        match credentials {
            Credentials::Password { username, password } => self.login(username, password).await,
            Credentials::PhoneCode { phone, code } => self.phone_login(phone, code).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping_teacher() {
        assert_eq!(map_external_role("老师"), Role::Teacher);
    }

    #[test]
    fn test_role_mapping_parent() {
        assert_eq!(map_external_role("家长"), Role::Parent);
    }

    #[test]
    fn test_role_mapping_defaults_to_parent() {
        assert_eq!(map_external_role("园长"), Role::Parent);
        assert_eq!(map_external_role(""), Role::Parent);
        assert_eq!(map_external_role("admin"), Role::Parent);
    }

    #[test]
    fn test_response_decoding() {
        let raw = r#"{"code":0,"message":"ok","data":{"id":42,"username":"wang","role":"老师"}}"#;
        let payload: BridgeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.code, 0);
        let user = payload.data.unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(map_external_role(user.role.as_deref().unwrap()), Role::Teacher);
    }

    #[test]
    fn test_rejection_decoding() {
        let raw = r#"{"code":1001,"message":"密码错误"}"#;
        let payload: BridgeResponse = serde_json::from_str(raw).unwrap();
        assert_ne!(payload.code, 0);
        assert_eq!(payload.message.as_deref(), Some("密码错误"));
        assert!(payload.data.is_none());
    }
}
