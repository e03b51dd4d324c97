//! Authentication: tokens, gates, credential verification

pub mod bridge;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod verify;

pub use bridge::{map_external_role, IdentityBridge};
pub use jwt::{Claims, RefreshClaims, TokenIssuer};
pub use middleware::{authenticate, require_role, PARENT_ONLY, TEACHER_ONLY};
pub use models::{
    AuthUser, ChangePasswordRequest, CredentialVerifier, Credentials, LoginRequest,
    LoginResponse, PhoneLoginRequest, RefreshRequest, RegisterRequest, Role, UserInfo,
    VerifiedIdentity,
};
pub use verify::{fetch_auth_user, LocalVerifier};
