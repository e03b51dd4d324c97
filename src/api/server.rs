//! HTTP API server

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{self, IdentityBridge, TokenIssuer, PARENT_ONLY, TEACHER_ONLY};
use crate::config::Config;
use crate::db::{Pool, Queries};
use crate::error::Result;
use crate::recognition::RecognitionClient;

use super::{auth_routes, classes, photos, users};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub queries: Queries,
    pub tokens: TokenIssuer,
    pub bridge: Option<IdentityBridge>,
    pub recognition: Option<RecognitionClient>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the full state from validated configuration
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = Pool::new(&config.database);
        let queries = Queries::new(pool, config.database.max_retries);
        let tokens = TokenIssuer::new(config.secret(), &config.auth);
        let bridge = config
            .identity_bridge
            .as_ref()
            .map(IdentityBridge::new)
            .transpose()?;
        let recognition = config
            .recognition
            .as_ref()
            .map(RecognitionClient::new)
            .transpose()?;

        Ok(Self { config, queries, tokens, bridge, recognition })
    }
}

/// Run the HTTP API server
pub async fn run_server(config: Config, host: &str, port: u16) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);

    std::fs::create_dir_all(&state.config.server.uploads_dir)?;

    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    let public = Router::new()
        .route("/api/health", get(super::health))
        .route("/api/auth/login", post(auth_routes::login))
        .route("/api/auth/login2", post(auth_routes::login_external))
        .route("/api/auth/phoneLogin", post(auth_routes::phone_login))
        .route("/api/auth/refresh", post(auth_routes::refresh))
        .route("/api/auth/register", post(auth_routes::register));

    // Any authenticated role
    let any_role = Router::new()
        .route("/api/auth/change-password", post(auth_routes::change_password))
        .route("/api/users/profile", get(users::profile))
        .route("/api/users/profile", put(users::update_profile))
        .route("/api/classes", get(classes::list_classes))
        .route("/api/classes/students", get(classes::list_students))
        .route("/api/classes/{id}", get(classes::class_detail))
        .route("/api/classes/{id}/children", get(classes::class_children))
        .route("/api/photos/public", get(photos::public_wall))
        .route("/api/photos/like", post(photos::toggle_like))
        .route("/api/photos/search", get(photos::search));

    let teacher_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/users/parents", get(users::list_parents))
        .route("/api/users/parent-child", post(users::bind_pair))
        .route("/api/users/parent-child", delete(users::unbind_pair))
        .route("/api/users/{id}/children", put(users::rebind_children))
        .route("/api/classes", post(classes::create_class))
        .route("/api/classes/students", post(classes::add_student))
        .route("/api/classes/students/{id}", put(classes::update_student))
        .route("/api/classes/students/{id}", delete(classes::delete_student))
        .route("/api/classes/{id}/children", post(classes::add_child_to_class))
        .route(
            "/api/classes/{id}/children/{child_id}",
            delete(classes::remove_child_from_class),
        )
        .route(
            "/api/photos",
            post(photos::upload).layer(DefaultBodyLimit::max(photos::MAX_UPLOAD_BYTES)),
        )
        .route("/api/recognition/health", get(photos::recognition_health))
        .route_layer(middleware::from_fn(|req, next| {
            auth::require_role(TEACHER_ONLY, req, next)
        }));

    let parent_routes = Router::new()
        .route("/api/users/children", get(users::my_children))
        .route("/api/users/bind-child", post(users::bind_child))
        .route("/api/photos/private", get(photos::private_wall))
        .route_layer(middleware::from_fn(|req, next| {
            auth::require_role(PARENT_ONLY, req, next)
        }));

    let protected = any_role
        .merge(teacher_routes)
        .merge(parent_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .merge(public)
        .merge(protected)
        .nest_service(
            "/uploads",
            ServeDir::new(&state.config.server.uploads_dir),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
