//! Authentication and authorization tests

use classpix::auth::{map_external_role, Role, TokenIssuer};
use classpix::config::AuthConfig;

fn issuer() -> TokenIssuer {
    TokenIssuer::new("integration-test-secret", &AuthConfig::default())
}

#[test]
fn test_jwt_token_creation() {
    let token = issuer()
        .create_access_token(1, "teacher1", Role::Teacher)
        .expect("Failed to create token");
    assert!(!token.is_empty());
    assert_eq!(token.split('.').count(), 3); // JWT format: header.payload.signature
}

#[test]
fn test_jwt_token_validation() {
    let issuer = issuer();
    let token = issuer
        .create_access_token(2, "parent1", Role::Parent)
        .expect("Failed to create token");
    let claims = issuer.validate_access_token(&token).expect("Failed to validate token");

    assert_eq!(claims.sub, "2");
    assert_eq!(claims.username, "parent1");
    assert_eq!(claims.get_role(), Role::Parent);
    assert!(!claims.is_expired());
    assert!(claims.iat > 0);
    assert!(claims.exp > claims.iat);
}

#[test]
fn test_invalid_token_rejection() {
    assert!(issuer().validate_access_token("invalid.token.here").is_err());
}

#[test]
fn test_malformed_token_rejection() {
    assert!(issuer().validate_access_token("not-a-jwt-token").is_err());
}

#[test]
fn test_token_from_other_secret_rejected() {
    let token = issuer()
        .create_access_token(1, "teacher1", Role::Teacher)
        .expect("Failed to create token");
    let other = TokenIssuer::new("a-different-secret", &AuthConfig::default());
    assert!(other.validate_access_token(&token).is_err());
}

#[test]
fn test_refresh_token_only_usable_for_refresh() {
    let issuer = issuer();
    let refresh = issuer
        .create_refresh_token(5, "parent1")
        .expect("Failed to create refresh token");

    // The refresh endpoint accepts it
    let claims = issuer.validate_refresh_token(&refresh).expect("Failed to validate");
    assert_eq!(claims.sub, "5");

    // Every other endpoint must not
    assert!(issuer.validate_access_token(&refresh).is_err());
}

#[test]
fn test_access_token_rejected_by_refresh_endpoint() {
    let issuer = issuer();
    let access = issuer
        .create_access_token(5, "parent1", Role::Parent)
        .expect("Failed to create token");
    assert!(issuer.validate_refresh_token(&access).is_err());
}

#[test]
fn test_access_token_lifetime_follows_config() {
    let auth = AuthConfig {
        secret: None,
        access_token_hours: 1,
        refresh_token_days: 7,
    };
    let issuer = TokenIssuer::new("s", &auth);
    let token = issuer.create_access_token(1, "u", Role::Parent).unwrap();
    let claims = issuer.validate_access_token(&token).unwrap();
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[test]
fn test_multiple_token_generation() {
    let issuer = issuer();
    let token1 = issuer
        .create_access_token(1, "alice", Role::Teacher)
        .expect("Failed to create token1");
    let token2 = issuer
        .create_access_token(2, "bob", Role::Parent)
        .expect("Failed to create token2");

    assert_ne!(token1, token2);

    let claims1 = issuer.validate_access_token(&token1).expect("Failed to validate token1");
    let claims2 = issuer.validate_access_token(&token2).expect("Failed to validate token2");

    assert_eq!(claims1.username, "alice");
    assert_eq!(claims2.username, "bob");
}

#[test]
fn test_role_display() {
    assert_eq!(Role::Teacher.to_string(), "teacher");
    assert_eq!(Role::Parent.to_string(), "parent");
}

#[test]
fn test_external_role_mapping() {
    assert_eq!(map_external_role("老师"), Role::Teacher);
    assert_eq!(map_external_role("家长"), Role::Parent);
}

#[test]
fn test_external_role_mapping_default_is_parent() {
    // Explicit default, not inferred: anything unrecognized is a parent
    assert_eq!(map_external_role("园长"), Role::Parent);
    assert_eq!(map_external_role("teacher"), Role::Parent);
    assert_eq!(map_external_role(""), Role::Parent);
}
