//! User and parent-child binding route handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, Role};
use crate::db::Queries;
use crate::error::{Error, Result};

use super::SharedState;

#[derive(Debug, Serialize)]
pub struct ChildSummary {
    pub id: i32,
    pub name: String,
    pub class_name: String,
}

/// Children bound to a parent, with class names
async fn children_of(queries: &Queries, parent_id: i32) -> Result<Vec<ChildSummary>> {
    let pool = queries.pool().clone();
    let rows = queries
        .read("children of parent", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT c.id, c.name, cl.name AS class_name \
                         FROM children c \
                         JOIN parent_child pc ON c.id = pc.child_id \
                         JOIN classes cl ON c.class_id = cl.id \
                         WHERE pc.parent_id = $1",
                        &[&parent_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(rows
        .iter()
        .map(|row| ChildSummary {
            id: row.get("id"),
            name: row.get("name"),
            class_name: row.get("class_name"),
        })
        .collect())
}

/// Resolved identity plus role-specific extras
pub async fn profile(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>> {
    let pool = state.queries.pool().clone();
    let user_id = user.id;
    let row = state
        .queries
        .read("profile created_at", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_one("SELECT created_at FROM users WHERE id = $1", &[&user_id])
                    .await
            }
        })
        .await?;
    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");

    let mut body = serde_json::json!({
        "id": user.id,
        "username": user.username,
        "role": user.role.to_string(),
        "full_name": user.full_name,
        "class_id": user.class_id,
        "created_at": created_at.to_rfc3339(),
    });

    if user.role == Role::Parent {
        let children = children_of(&state.queries, user.id).await?;
        body["children"] = serde_json::to_value(children)?;
    }

    if user.role == Role::Teacher {
        if let Some(class_id) = user.class_id {
            let row = state
                .queries
                .read("class by id", || {
                    let pool = pool.clone();
                    async move {
                        let client = pool.get().await?;
                        client
                            .query_opt(
                                "SELECT id, name FROM classes WHERE id = $1",
                                &[&class_id],
                            )
                            .await
                    }
                })
                .await?;
            if let Some(row) = row {
                body["class"] = serde_json::json!({
                    "id": row.get::<_, i32>("id"),
                    "name": row.get::<_, String>("name"),
                });
            }
        }
    }

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: String,
}

/// Update the caller's display name
pub async fn update_profile(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.full_name.is_empty() {
        return Err(Error::Validation("full name is required".to_string()));
    }

    let pool = state.queries.pool().clone();
    let user_id = user.id;
    state
        .queries
        .write("update full_name", || {
            let pool = pool.clone();
            let full_name = req.full_name.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute(
                        "UPDATE users SET full_name = $1 WHERE id = $2",
                        &[&full_name, &user_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(Json(serde_json::json!({ "message": "profile updated" })))
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserRow {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub full_name: String,
    pub class_id: Option<i32>,
    pub class_name: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildSummary>>,
}

fn user_row(row: &tokio_postgres::Row) -> UserRow {
    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
    UserRow {
        id: row.get("id"),
        username: row.get("username"),
        role: row.get("role"),
        full_name: row.get("full_name"),
        class_id: row.get("class_id"),
        class_name: row.get("class_name"),
        created_at: created_at.to_rfc3339(),
        children: None,
    }
}

/// All users, optionally filtered by role; parents carry their children
pub async fn list_users(
    State(state): State<SharedState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserRow>>> {
    let pool = state.queries.pool().clone();
    let role_filter = query.role.clone();
    let rows = state
        .queries
        .read("list users", || {
            let pool = pool.clone();
            let role_filter = role_filter.clone();
            async move {
                let client = pool.get().await?;
                match role_filter {
                    Some(role) => {
                        client
                            .query(
                                "SELECT u.id, u.username, u.role, u.full_name, u.class_id, \
                                        u.created_at, c.name AS class_name \
                                 FROM users u \
                                 LEFT JOIN classes c ON u.class_id = c.id \
                                 WHERE u.role = $1 \
                                 ORDER BY u.created_at DESC",
                                &[&role],
                            )
                            .await
                    }
                    None => {
                        client
                            .query(
                                "SELECT u.id, u.username, u.role, u.full_name, u.class_id, \
                                        u.created_at, c.name AS class_name \
                                 FROM users u \
                                 LEFT JOIN classes c ON u.class_id = c.id \
                                 ORDER BY u.created_at DESC",
                                &[],
                            )
                            .await
                    }
                }
            }
        })
        .await?;

    let mut users = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut user = user_row(row);
        if user.role == "parent" {
            user.children = Some(children_of(&state.queries, user.id).await?);
        }
        users.push(user);
    }

    Ok(Json(users))
}

/// All parent accounts with their children
pub async fn list_parents(
    State(state): State<SharedState>,
) -> Result<Json<Vec<UserRow>>> {
    let pool = state.queries.pool().clone();
    let rows = state
        .queries
        .read("list parents", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT u.id, u.username, u.role, u.full_name, u.class_id, \
                                u.created_at, c.name AS class_name \
                         FROM users u \
                         LEFT JOIN classes c ON u.class_id = c.id \
                         WHERE u.role = 'parent' \
                         ORDER BY u.full_name",
                        &[],
                    )
                    .await
            }
        })
        .await?;

    let mut parents = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut parent = user_row(row);
        parent.children = Some(children_of(&state.queries, parent.id).await?);
        parents.push(parent);
    }

    Ok(Json(parents))
}

/// The calling parent's bound children
pub async fn my_children(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<serde_json::Value>>> {
    let pool = state.queries.pool().clone();
    let parent_id = user.id;
    let rows = state
        .queries
        .read("my children", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT c.id, c.name, c.class_id, c.created_at, \
                                cl.name AS class_name \
                         FROM children c \
                         JOIN parent_child pc ON c.id = pc.child_id \
                         JOIN classes cl ON c.class_id = cl.id \
                         WHERE pc.parent_id = $1 \
                         ORDER BY c.name",
                        &[&parent_id],
                    )
                    .await
            }
        })
        .await?;

    let children = rows
        .iter()
        .map(|row| {
            let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
            serde_json::json!({
                "id": row.get::<_, i32>("id"),
                "name": row.get::<_, String>("name"),
                "class_id": row.get::<_, i32>("class_id"),
                "class_name": row.get::<_, String>("class_name"),
                "created_at": created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(children))
}

#[derive(Debug, Deserialize)]
pub struct BindChildRequest {
    #[serde(alias = "studentNo")]
    pub student_no: String,
}

/// Bind a child to the calling parent by student number
pub async fn bind_child(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<BindChildRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.student_no.is_empty() {
        return Err(Error::Validation("student number is required".to_string()));
    }

    let pool = state.queries.pool().clone();
    let student_no = req.student_no.clone();
    let child = state
        .queries
        .read("child by student_no", || {
            let pool = pool.clone();
            let student_no = student_no.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id, name FROM children WHERE student_no = $1",
                        &[&student_no],
                    )
                    .await
            }
        })
        .await?
        .ok_or_else(|| Error::NotFound("student not found".to_string()))?;

    let child_id: i32 = child.get("id");
    let parent_id = user.id;

    let existing = state
        .queries
        .read("binding exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT 1 FROM parent_child WHERE parent_id = $1 AND child_id = $2",
                        &[&parent_id, &child_id],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("child already bound".to_string()));
    }

    state
        .queries
        .write("insert binding", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute(
                        "INSERT INTO parent_child (parent_id, child_id) VALUES ($1, $2)",
                        &[&parent_id, &child_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(Json(serde_json::json!({
        "message": "child bound successfully",
        "child": {
            "id": child_id,
            "name": child.get::<_, String>("name"),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct PairRequest {
    #[serde(rename = "parentId")]
    pub parent_id: i32,
    #[serde(rename = "childId")]
    pub child_id: i32,
}

async fn ensure_parent_exists(queries: &Queries, parent_id: i32) -> Result<()> {
    let pool = queries.pool().clone();
    let parent = queries
        .read("parent exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id FROM users WHERE id = $1 AND role = 'parent'",
                        &[&parent_id],
                    )
                    .await
            }
        })
        .await?;
    if parent.is_none() {
        return Err(Error::NotFound("parent does not exist".to_string()));
    }
    Ok(())
}

/// Bind one parent-child pair
pub async fn bind_pair(
    State(state): State<SharedState>,
    Json(req): Json<PairRequest>,
) -> Result<Json<serde_json::Value>> {
    ensure_parent_exists(&state.queries, req.parent_id).await?;

    let pool = state.queries.pool().clone();
    let child_id = req.child_id;
    let child = state
        .queries
        .read("child exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM children WHERE id = $1", &[&child_id])
                    .await
            }
        })
        .await?;
    if child.is_none() {
        return Err(Error::NotFound("child does not exist".to_string()));
    }

    let parent_id = req.parent_id;
    let existing = state
        .queries
        .read("binding exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT 1 FROM parent_child WHERE parent_id = $1 AND child_id = $2",
                        &[&parent_id, &child_id],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("parent and child already bound".to_string()));
    }

    state
        .queries
        .write("insert binding", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute(
                        "INSERT INTO parent_child (parent_id, child_id) VALUES ($1, $2)",
                        &[&parent_id, &child_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(Json(serde_json::json!({ "message": "parent and child bound successfully" })))
}

/// Remove one parent-child pair
pub async fn unbind_pair(
    State(state): State<SharedState>,
    Json(req): Json<PairRequest>,
) -> Result<Json<serde_json::Value>> {
    let pool = state.queries.pool().clone();
    let parent_id = req.parent_id;
    let child_id = req.child_id;

    let existing = state
        .queries
        .read("binding exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT 1 FROM parent_child WHERE parent_id = $1 AND child_id = $2",
                        &[&parent_id, &child_id],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_none() {
        return Err(Error::NotFound("binding does not exist".to_string()));
    }

    state
        .queries
        .write("delete binding", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute(
                        "DELETE FROM parent_child WHERE parent_id = $1 AND child_id = $2",
                        &[&parent_id, &child_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(Json(serde_json::json!({ "message": "binding removed" })))
}

#[derive(Debug, Deserialize)]
pub struct RebindRequest {
    pub children: Vec<i32>,
}

/// Replace a parent's entire children list atomically.
///
/// The one multi-statement transaction in the system: delete plus inserts
/// commit together or roll back together on a dedicated pooled connection.
pub async fn rebind_children(
    State(state): State<SharedState>,
    Path(parent_id): Path<i32>,
    Json(req): Json<RebindRequest>,
) -> Result<Json<serde_json::Value>> {
    ensure_parent_exists(&state.queries, parent_id).await?;

    if !req.children.is_empty() {
        let pool = state.queries.pool().clone();
        let ids = req.children.clone();
        let rows = state
            .queries
            .read("children exist", || {
                let pool = pool.clone();
                let ids = ids.clone();
                async move {
                    let client = pool.get().await?;
                    client
                        .query("SELECT id FROM children WHERE id = ANY($1)", &[&ids])
                        .await
                }
            })
            .await?;
        if rows.len() != req.children.len() {
            return Err(Error::Validation("some children do not exist".to_string()));
        }
    }

    let mut client = state.queries.pool().get().await?;
    let tx = client.transaction().await?;

    tx.execute("DELETE FROM parent_child WHERE parent_id = $1", &[&parent_id])
        .await?;
    for child_id in &req.children {
        tx.execute(
            "INSERT INTO parent_child (parent_id, child_id) VALUES ($1, $2)",
            &[&parent_id, child_id],
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "rebound parent {} to {} children",
        parent_id,
        req.children.len()
    );
    Ok(Json(serde_json::json!({ "message": "bindings updated" })))
}
