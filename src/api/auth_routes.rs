//! Authentication route handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use crate::auth::{
    fetch_auth_user, AuthUser, ChangePasswordRequest, CredentialVerifier, Credentials,
    LocalVerifier, LoginRequest, LoginResponse, PhoneLoginRequest, RefreshRequest,
    RegisterRequest, UserInfo,
};
use crate::error::{Error, Result};

use super::SharedState;

/// Local username/password login; issues both token kinds
pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    req.validate()?;

    let verifier = LocalVerifier::new(&state.queries);
    let identity = verifier
        .verify(Credentials::Password {
            username: &req.username,
            password: &req.password,
        })
        .await?;

    let user = fetch_auth_user(&state.queries, identity.id as i32)
        .await?
        .ok_or_else(|| Error::Unauthenticated("username or password incorrect".to_string()))?;

    let token = state
        .tokens
        .create_access_token(identity.id, &identity.username, identity.role)?;
    let refresh = state
        .tokens
        .create_refresh_token(identity.id, &identity.username)?;

    tracing::info!("user {} logged in", user.username);
    Ok(Json(LoginResponse {
        message: "login successful".to_string(),
        token,
        refresh_token: Some(refresh),
        user: UserInfo::from(&user),
    }))
}

/// Delegated login through the external identity bridge.
///
/// No refresh token exists on this path; the response carries an explicit
/// null so clients cannot mistake it for an omission.
pub async fn login_external(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    req.validate()?;

    let bridge = state
        .bridge
        .as_ref()
        .ok_or_else(|| Error::ServiceUnavailable("login service not configured".to_string()))?;

    let identity = bridge
        .verify(Credentials::Password {
            username: &req.username,
            password: &req.password,
        })
        .await?;

    let token = state
        .tokens
        .create_access_token(identity.id, &identity.username, identity.role)?;

    Ok(Json(LoginResponse {
        message: "login successful".to_string(),
        token,
        refresh_token: None,
        user: UserInfo::from(&identity),
    }))
}

/// Phone + SMS code login through the external identity bridge
pub async fn phone_login(
    State(state): State<SharedState>,
    Json(req): Json<PhoneLoginRequest>,
) -> Result<Json<LoginResponse>> {
    let bridge = state
        .bridge
        .as_ref()
        .ok_or_else(|| Error::ServiceUnavailable("login service not configured".to_string()))?;

    let identity = bridge
        .verify(Credentials::PhoneCode {
            phone: &req.phone,
            code: &req.code,
        })
        .await?;

    let token = state
        .tokens
        .create_access_token(identity.id, &identity.username, identity.role)?;

    Ok(Json(LoginResponse {
        message: "login successful".to_string(),
        token,
        refresh_token: None,
        user: UserInfo::from(&identity),
    }))
}

/// Mint a fresh access token from a refresh token.
///
/// The only endpoint that accepts refresh tokens; the subject is still
/// resolved against the live user store.
pub async fn refresh(
    State(state): State<SharedState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<serde_json::Value>> {
    let claims = state.tokens.validate_refresh_token(&req.refresh_token)?;

    let user_id: i32 = claims
        .sub
        .parse()
        .map_err(|_| Error::Unauthenticated("user does not exist".to_string()))?;
    let user = fetch_auth_user(&state.queries, user_id)
        .await?
        .ok_or_else(|| Error::Unauthenticated("user does not exist".to_string()))?;

    let token = state
        .tokens
        .create_access_token(user.id as i64, &user.username, user.role)?;

    Ok(Json(serde_json::json!({
        "message": "token refreshed",
        "token": token,
    })))
}

/// Create a user account
pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let role = req.validate()?;

    let pool = state.queries.pool().clone();

    let username = req.username.clone();
    let existing = state
        .queries
        .read("username exists", || {
            let pool = pool.clone();
            let username = username.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM users WHERE username = $1", &[&username])
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("username already exists".to_string()));
    }

    let telephone = req.telephone_number.clone();
    let existing = state
        .queries
        .read("telephone exists", || {
            let pool = pool.clone();
            let telephone = telephone.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id FROM users WHERE telephone_number = $1",
                        &[&telephone],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("telephone number already exists".to_string()));
    }

    let hashed = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)?;
    let role_str = role.to_string();
    let row = state
        .queries
        .write("insert user", || {
            let pool = pool.clone();
            let username = req.username.clone();
            let hashed = hashed.clone();
            let role = role_str.clone();
            let full_name = req.full_name.clone();
            let telephone = req.telephone_number.clone();
            let class_id = req.class_id;
            async move {
                let client = pool.get().await?;
                client
                    .query_one(
                        "INSERT INTO users \
                         (username, password, role, full_name, telephone_number, class_id) \
                         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                        &[&username, &hashed, &role, &full_name, &telephone, &class_id],
                    )
                    .await
            }
        })
        .await?;

    let id: i32 = row.get("id");
    tracing::info!("registered user {} ({})", req.username, role);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "registration successful",
            "user": {
                "id": id,
                "username": req.username,
                "role": role.to_string(),
                "full_name": req.full_name,
                "telephone_number": req.telephone_number,
                "class_id": req.class_id,
            },
        })),
    ))
}

/// Rotate the caller's password; requires proof of the current one
pub async fn change_password(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    req.validate()?;

    let pool = state.queries.pool().clone();
    let user_id = user.id;

    let row = state
        .queries
        .read("password by id", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT password FROM users WHERE id = $1", &[&user_id])
                    .await
            }
        })
        .await?
        .ok_or_else(|| Error::NotFound("user does not exist".to_string()))?;

    let current_hash: String = row.get("password");
    if !bcrypt::verify(&req.current_password, &current_hash)? {
        return Err(Error::Validation("current password incorrect".to_string()));
    }

    let new_hash = bcrypt::hash(&req.new_password, bcrypt::DEFAULT_COST)?;
    state
        .queries
        .write("update password", || {
            let pool = pool.clone();
            let new_hash = new_hash.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute(
                        "UPDATE users SET password = $1 WHERE id = $2",
                        &[&new_hash, &user_id],
                    )
                    .await
            }
        })
        .await?;

    tracing::info!("user {} changed password", user.username);
    Ok(Json(serde_json::json!({ "message": "password changed successfully" })))
}
