//! Authentication and role-authorization gates

use crate::auth::models::{AuthUser, Role};
use crate::error::{Error, Result};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::SharedState;

pub const TEACHER_ONLY: &[Role] = &[Role::Teacher];
pub const PARENT_ONLY: &[Role] = &[Role::Parent];

/// Extract the bearer token from the Authorization header
fn bearer_token(req: &Request) -> Option<String> {
    let auth_header = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(|t| t.to_string())
}

/// Authentication gate for every protected route.
///
/// Verifies the presented access token, then re-fetches the live user row
/// so role or name changes since issuance are honored and deleted users
/// are locked out immediately. Attaches the resolved [`AuthUser`] to the
/// request and never mutates any state.
pub async fn authenticate(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(&req)
        .ok_or_else(|| Error::Unauthenticated("access token missing".to_string()))?;

    let claims = state
        .tokens
        .validate_access_token(&token)
        .map_err(|_| Error::Forbidden("access token invalid".to_string()))?;

    // Subjects issued by the external bridge may not resolve locally;
    // they fail here exactly like deleted users
    let user_id: i32 = claims
        .sub
        .parse()
        .map_err(|_| Error::Unauthenticated("user does not exist".to_string()))?;

    let user = crate::auth::verify::fetch_auth_user(&state.queries, user_id)
        .await?
        .ok_or_else(|| Error::Unauthenticated("user does not exist".to_string()))?;

    tracing::debug!("authenticated {} ({})", user.username, user.role);
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Role gate; compose strictly after [`authenticate`]
pub async fn require_role(allowed: &[Role], req: Request, next: Next) -> Result<Response> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| Error::Unauthenticated("unauthenticated user".to_string()))?;

    if !allowed.contains(&user.role) {
        return Err(Error::Forbidden("insufficient permission".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_header(value: Option<&str>) -> Request {
        let mut builder = Request::builder().method("GET").uri("/");
        if let Some(v) = value {
            builder = builder.header("Authorization", v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_missing() {
        assert!(bearer_token(&request_with_header(None)).is_none());
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        assert!(bearer_token(&request_with_header(Some("Basic abc"))).is_none());
    }

    #[test]
    fn test_bearer_token_extracted() {
        let req = request_with_header(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def.ghi"));
    }
}
