//! Local credential verification against the user store

use crate::auth::models::{CredentialVerifier, Credentials, Role, VerifiedIdentity};
use crate::db::Queries;
use crate::error::{Error, Result};

const BAD_CREDENTIALS: &str = "username or password incorrect";

/// Fetch the live user row for a subject id, through the retrying reader.
///
/// Shared by the authentication gate and the login/refresh handlers; the
/// per-request re-fetch is what keeps stale tokens honest.
pub async fn fetch_auth_user(
    queries: &Queries,
    user_id: i32,
) -> Result<Option<crate::auth::models::AuthUser>> {
    let pool = queries.pool().clone();
    let row = queries
        .read("user by id", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id, username, role, full_name, class_id \
                         FROM users WHERE id = $1",
                        &[&user_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(row.map(|row| {
        let role: String = row.get("role");
        crate::auth::models::AuthUser {
            id: row.get("id"),
            username: row.get("username"),
            role: role.parse().unwrap_or(Role::Parent),
            full_name: row.get("full_name"),
            class_id: row.get("class_id"),
        }
    }))
}

/// Checks a username/password pair against the stored bcrypt hash
pub struct LocalVerifier<'a> {
    queries: &'a Queries,
}

impl<'a> LocalVerifier<'a> {
    pub fn new(queries: &'a Queries) -> Self {
        Self { queries }
    }
}

impl CredentialVerifier for LocalVerifier<'_> {
    async fn verify(&self, credentials: Credentials<'_>) -> Result<VerifiedIdentity> {
        let (username, password) = match credentials {
            Credentials::Password { username, password } => (username, password),
            Credentials::PhoneCode { .. } => {
                return Err(Error::Unauthenticated(
                    "phone login requires the external login service".to_string(),
                ))
            }
        };

        let pool = self.queries.pool().clone();
        let lookup = username.to_string();
        let row = self
            .queries
            .read("user by username", || {
                let pool = pool.clone();
                let username = lookup.clone();
                async move {
                    let client = pool.get().await?;
                    client
                        .query_opt(
                            "SELECT id, username, password, role FROM users WHERE username = $1",
                            &[&username],
                        )
                        .await
                }
            })
            .await?
            .ok_or_else(|| Error::Unauthenticated(BAD_CREDENTIALS.to_string()))?;

        let hash: String = row.get("password");
        if !bcrypt::verify(password, &hash)? {
            return Err(Error::Unauthenticated(BAD_CREDENTIALS.to_string()));
        }

        let id: i32 = row.get("id");
        let role: String = row.get("role");
        Ok(VerifiedIdentity {
            id: id as i64,
            username: row.get("username"),
            role: role.parse().unwrap_or(Role::Parent),
        })
    }
}
