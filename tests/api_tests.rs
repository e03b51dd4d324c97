//! HTTP API integration tests
//!
//! These start a real server on a local port. Tests that only exercise the
//! gates (missing/garbage tokens, validation, unconfigured bridge) need no
//! database; tests marked #[ignore] expect a seeded PostgreSQL reachable
//! with the default config.
//!
//! Run ignored tests with: cargo test --test api_tests -- --ignored

use classpix::api::run_server;
use classpix::config::Config;
use std::time::Duration;
use tokio::time::sleep;

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.secret = Some("api-test-secret".to_string());
    config.server.uploads_dir = std::env::temp_dir().join("classpix-test-uploads");
    config
}

async fn start_test_server(port: u16) -> tokio::task::JoinHandle<()> {
    let config = test_config();
    tokio::spawn(async move {
        let _ = run_server(config, "127.0.0.1", port).await;
    })
}

async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = reqwest::Client::new();
    for attempt in 0..max_attempts {
        match client
            .get(format!("http://127.0.0.1:{}/api/health", port))
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => return true,
            _ => {
                if attempt < max_attempts - 1 {
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
    false
}

#[tokio::test]
async fn test_health_endpoint() {
    let port = 4801u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/api/health", port))
        .send()
        .await
        .expect("health request failed")
        .json()
        .await
        .expect("health body not json");

    assert_eq!(body["status"], "OK");
    server.abort();
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let port = 4802u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/api/users/profile", port))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.expect("body not json");
    assert_eq!(body["error"], "access token missing");
    server.abort();
}

#[tokio::test]
async fn test_protected_route_with_garbage_token() {
    let port = 4803u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/api/users/profile", port))
        .header("Authorization", "Bearer not-a-real-token")
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.expect("body not json");
    assert_eq!(body["error"], "access token invalid");
    server.abort();
}

#[tokio::test]
async fn test_wrong_auth_scheme_counts_as_missing() {
    let port = 4804u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/api/users/profile", port))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 401);
    server.abort();
}

#[tokio::test]
async fn test_login_validation_rejects_short_password() {
    let port = 4805u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/auth/login", port))
        .json(&serde_json::json!({ "username": "teacher1", "password": "123" }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 400);
    server.abort();
}

#[tokio::test]
async fn test_register_validation_rejects_bad_phone() {
    let port = 4806u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/auth/register", port))
        .json(&serde_json::json!({
            "username": "newparent",
            "password": "123456",
            "role": "parent",
            "full_name": "王家长",
            "telephone_number": "not-a-phone",
        }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 400);
    server.abort();
}

#[tokio::test]
async fn test_external_login_unconfigured_returns_503() {
    let port = 4807u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{}/api/auth/login2", port))
        .json(&serde_json::json!({ "username": "teacher1", "password": "123456" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 503);

    let response = client
        .post(format!("http://127.0.0.1:{}/api/auth/phoneLogin", port))
        .json(&serde_json::json!({ "phone": "13812345678", "code": "0000" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 503);
    server.abort();
}

#[tokio::test]
async fn test_refresh_with_garbage_token_rejected() {
    let port = 4808u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/auth/refresh", port))
        .json(&serde_json::json!({ "refreshToken": "garbage" }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 403);
    server.abort();
}

#[tokio::test]
#[ignore] // Needs a seeded database: cargo test --test api_tests -- --ignored
async fn test_seeded_teacher_login() {
    let port = 4810u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/auth/login", port))
        .json(&serde_json::json!({ "username": "teacher1", "password": "123456" }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("body not json");
    assert!(body["token"].as_str().is_some());
    assert!(body["refreshToken"].as_str().is_some());
    assert_eq!(body["user"]["role"], "teacher");
    server.abort();
}

#[tokio::test]
#[ignore] // Needs a seeded database
async fn test_parent_blocked_from_teacher_route() {
    let port = 4811u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let client = reqwest::Client::new();
    let login: serde_json::Value = client
        .post(format!("http://127.0.0.1:{}/api/auth/login", port))
        .json(&serde_json::json!({ "username": "parent1", "password": "123456" }))
        .send()
        .await
        .expect("login failed")
        .json()
        .await
        .expect("login body not json");
    let token = login["token"].as_str().expect("no token");

    let response = client
        .get(format!("http://127.0.0.1:{}/api/users", port))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.expect("body not json");
    assert_eq!(body["error"], "insufficient permission");
    server.abort();
}

#[tokio::test]
#[ignore] // Needs a seeded database
async fn test_change_password_round_trip() {
    let port = 4813u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let client = reqwest::Client::new();
    let login = |password: &str| {
        let client = client.clone();
        let password = password.to_string();
        async move {
            client
                .post(format!("http://127.0.0.1:{}/api/auth/login", port))
                .json(&serde_json::json!({ "username": "teacher1", "password": password }))
                .send()
                .await
                .expect("login request failed")
        }
    };

    let token: String = login("123456")
        .await
        .json::<serde_json::Value>()
        .await
        .expect("login body not json")["token"]
        .as_str()
        .expect("no token")
        .to_string();

    // Wrong current password: 400 and no mutation
    let response = client
        .post(format!("http://127.0.0.1:{}/api/auth/change-password", port))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "currentPassword": "wrong1", "newPassword": "654321" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 400);
    assert_eq!(login("123456").await.status(), 200);

    // Correct current password: old stops working, new works
    let response = client
        .post(format!("http://127.0.0.1:{}/api/auth/change-password", port))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "currentPassword": "123456", "newPassword": "654321" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 200);
    assert_eq!(login("123456").await.status(), 401);
    assert_eq!(login("654321").await.status(), 200);

    // Restore the seeded password for other tests
    let response = client
        .post(format!("http://127.0.0.1:{}/api/auth/change-password", port))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "currentPassword": "654321", "newPassword": "123456" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 200);
    server.abort();
}

#[tokio::test]
#[ignore] // Needs a seeded database
async fn test_bulk_rebind_to_empty_removes_bindings() {
    let port = 4814u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let client = reqwest::Client::new();
    let teacher: serde_json::Value = client
        .post(format!("http://127.0.0.1:{}/api/auth/login", port))
        .json(&serde_json::json!({ "username": "teacher1", "password": "123456" }))
        .send()
        .await
        .expect("login failed")
        .json()
        .await
        .expect("login body not json");
    let token = teacher["token"].as_str().expect("no token");

    let parents: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/users/parents", port))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("parents failed")
        .json()
        .await
        .expect("parents body not json");
    let parent = &parents.as_array().expect("not an array")[0];
    let parent_id = parent["id"].as_i64().expect("no parent id");
    let original: Vec<i64> = parent["children"]
        .as_array()
        .expect("no children")
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();

    // Rebind to the empty list: all bindings removed, none inserted
    let response = client
        .put(format!("http://127.0.0.1:{}/api/users/{}/children", port, parent_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "children": [] }))
        .send()
        .await
        .expect("rebind failed");
    assert_eq!(response.status(), 200);

    let after: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/users/parents", port))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("parents failed")
        .json()
        .await
        .expect("parents body not json");
    assert!(after.as_array().unwrap()[0]["children"]
        .as_array()
        .unwrap()
        .is_empty());

    // A rebind that references a missing child changes nothing
    let response = client
        .put(format!("http://127.0.0.1:{}/api/users/{}/children", port, parent_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "children": [999999] }))
        .send()
        .await
        .expect("rebind failed");
    assert_eq!(response.status(), 400);

    // Restore the seeded bindings
    let response = client
        .put(format!("http://127.0.0.1:{}/api/users/{}/children", port, parent_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "children": original }))
        .send()
        .await
        .expect("rebind failed");
    assert_eq!(response.status(), 200);
    server.abort();
}

#[tokio::test]
#[ignore] // Needs a seeded database
async fn test_refresh_round_trip() {
    let port = 4812u16;
    let server = start_test_server(port).await;
    assert!(wait_for_server(port, 50).await, "Server failed to start");

    let client = reqwest::Client::new();
    let login: serde_json::Value = client
        .post(format!("http://127.0.0.1:{}/api/auth/login", port))
        .json(&serde_json::json!({ "username": "teacher1", "password": "123456" }))
        .send()
        .await
        .expect("login failed")
        .json()
        .await
        .expect("login body not json");
    let refresh_token = login["refreshToken"].as_str().expect("no refresh token");

    let response = client
        .post(format!("http://127.0.0.1:{}/api/auth/refresh", port))
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .expect("refresh failed");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("body not json");
    let new_access = body["token"].as_str().expect("no token");

    // The fresh access token works against a protected route
    let profile = client
        .get(format!("http://127.0.0.1:{}/api/users/profile", port))
        .header("Authorization", format!("Bearer {}", new_access))
        .send()
        .await
        .expect("profile failed");
    assert_eq!(profile.status(), 200);
    server.abort();
}
