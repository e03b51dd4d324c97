//! Class and roster route handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

use crate::auth::{AuthUser, Role};
use crate::db::Queries;
use crate::error::{Error, Result};

use super::SharedState;

async fn class_exists(queries: &Queries, class_id: i32) -> Result<bool> {
    let pool = queries.pool().clone();
    let row = queries
        .read("class exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM classes WHERE id = $1", &[&class_id])
                    .await
            }
        })
        .await?;
    Ok(row.is_some())
}

/// All classes with teacher name and student count
pub async fn list_classes(
    State(state): State<SharedState>,
) -> Result<Json<Vec<serde_json::Value>>> {
    let pool = state.queries.pool().clone();
    let rows = state
        .queries
        .read("list classes", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT c.id, c.name, c.created_at, u.full_name AS teacher_name, \
                                COUNT(ch.id) AS student_count \
                         FROM classes c \
                         LEFT JOIN users u ON c.teacher_id = u.id \
                         LEFT JOIN children ch ON c.id = ch.class_id \
                         GROUP BY c.id, c.name, c.created_at, u.full_name \
                         ORDER BY c.name",
                        &[],
                    )
                    .await
            }
        })
        .await?;

    let classes = rows
        .iter()
        .map(|row| {
            let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
            serde_json::json!({
                "id": row.get::<_, i32>("id"),
                "name": row.get::<_, String>("name"),
                "created_at": created_at.to_rfc3339(),
                "teacher_name": row.get::<_, Option<String>>("teacher_name"),
                "student_count": row.get::<_, i64>("student_count"),
            })
        })
        .collect();

    Ok(Json(classes))
}

#[derive(Debug, Deserialize)]
pub struct CreateClassRequest {
    pub name: String,
}

/// Create a class owned by the calling teacher
pub async fn create_class(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateClassRequest>,
) -> Result<impl IntoResponse> {
    if req.name.is_empty() {
        return Err(Error::Validation("class name is required".to_string()));
    }

    let pool = state.queries.pool().clone();
    let name = req.name.clone();
    let existing = state
        .queries
        .read("class name exists", || {
            let pool = pool.clone();
            let name = name.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM classes WHERE name = $1", &[&name])
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("class name already exists".to_string()));
    }

    let teacher_id = user.id;
    let row = state
        .queries
        .write("insert class", || {
            let pool = pool.clone();
            let name = req.name.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_one(
                        "INSERT INTO classes (name, teacher_id) VALUES ($1, $2) RETURNING id",
                        &[&name, &teacher_id],
                    )
                    .await
            }
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "class created",
            "class": {
                "id": row.get::<_, i32>("id"),
                "name": req.name,
                "teacher_id": teacher_id,
            },
        })),
    ))
}

/// All students across classes
pub async fn list_students(
    State(state): State<SharedState>,
) -> Result<Json<Vec<serde_json::Value>>> {
    let pool = state.queries.pool().clone();
    let rows = state
        .queries
        .read("list students", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT c.id, c.name, c.class_id, c.student_no, c.created_at, \
                                cl.name AS class_name \
                         FROM children c \
                         LEFT JOIN classes cl ON c.class_id = cl.id \
                         ORDER BY cl.name, c.name",
                        &[],
                    )
                    .await
            }
        })
        .await?;

    let students = rows
        .iter()
        .map(|row| {
            let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
            serde_json::json!({
                "id": row.get::<_, i32>("id"),
                "name": row.get::<_, String>("name"),
                "class_id": row.get::<_, i32>("class_id"),
                "student_no": row.get::<_, Option<String>>("student_no"),
                "class_name": row.get::<_, Option<String>>("class_name"),
                "created_at": created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(students))
}

#[derive(Debug, Deserialize)]
pub struct StudentRequest {
    pub name: String,
    pub class_id: i32,
    pub student_no: Option<String>,
}

/// Add a student to any class
pub async fn add_student(
    State(state): State<SharedState>,
    Json(req): Json<StudentRequest>,
) -> Result<impl IntoResponse> {
    if req.name.is_empty() {
        return Err(Error::Validation("student name is required".to_string()));
    }
    if !class_exists(&state.queries, req.class_id).await? {
        return Err(Error::NotFound("class does not exist".to_string()));
    }

    let pool = state.queries.pool().clone();
    let name = req.name.clone();
    let class_id = req.class_id;
    let existing = state
        .queries
        .read("student exists in class", || {
            let pool = pool.clone();
            let name = name.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id FROM children WHERE name = $1 AND class_id = $2",
                        &[&name, &class_id],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("student already exists in class".to_string()));
    }

    let row = state
        .queries
        .write("insert student", || {
            let pool = pool.clone();
            let name = req.name.clone();
            let student_no = req.student_no.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_one(
                        "INSERT INTO children (name, class_id, student_no) \
                         VALUES ($1, $2, $3) RETURNING id",
                        &[&name, &class_id, &student_no],
                    )
                    .await
            }
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "student added",
            "child": {
                "id": row.get::<_, i32>("id"),
                "name": req.name,
                "class_id": req.class_id,
                "student_no": req.student_no,
            },
        })),
    ))
}

/// Update a student's name and class
pub async fn update_student(
    State(state): State<SharedState>,
    Path(student_id): Path<i32>,
    Json(req): Json<StudentRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.name.is_empty() {
        return Err(Error::Validation("student name is required".to_string()));
    }

    let pool = state.queries.pool().clone();
    let existing = state
        .queries
        .read("student exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM children WHERE id = $1", &[&student_id])
                    .await
            }
        })
        .await?;
    if existing.is_none() {
        return Err(Error::NotFound("student does not exist".to_string()));
    }

    if !class_exists(&state.queries, req.class_id).await? {
        return Err(Error::NotFound("class does not exist".to_string()));
    }

    let class_id = req.class_id;
    state
        .queries
        .write("update student", || {
            let pool = pool.clone();
            let name = req.name.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute(
                        "UPDATE children SET name = $1, class_id = $2 WHERE id = $3",
                        &[&name, &class_id, &student_id],
                    )
                    .await
            }
        })
        .await?;

    Ok(Json(serde_json::json!({ "message": "student updated" })))
}

/// Remove a student and their bindings
async fn delete_child(queries: &Queries, child_id: i32) -> Result<()> {
    let pool = queries.pool().clone();
    queries
        .write("delete child bindings", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute("DELETE FROM parent_child WHERE child_id = $1", &[&child_id])
                    .await
            }
        })
        .await?;
    queries
        .write("delete child", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .execute("DELETE FROM children WHERE id = $1", &[&child_id])
                    .await
            }
        })
        .await?;
    Ok(())
}

/// Delete a student from any class
pub async fn delete_student(
    State(state): State<SharedState>,
    Path(student_id): Path<i32>,
) -> Result<Json<serde_json::Value>> {
    let pool = state.queries.pool().clone();
    let existing = state
        .queries
        .read("student exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM children WHERE id = $1", &[&student_id])
                    .await
            }
        })
        .await?;
    if existing.is_none() {
        return Err(Error::NotFound("student does not exist".to_string()));
    }

    delete_child(&state.queries, student_id).await?;

    Ok(Json(serde_json::json!({ "message": "student deleted" })))
}

/// Class detail: info, roster, photo count
pub async fn class_detail(
    State(state): State<SharedState>,
    Path(class_id): Path<i32>,
) -> Result<Json<serde_json::Value>> {
    let pool = state.queries.pool().clone();
    let info = state
        .queries
        .read("class detail", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT c.id, c.name, c.created_at, \
                                u.full_name AS teacher_name, u.id AS teacher_id \
                         FROM classes c \
                         LEFT JOIN users u ON c.teacher_id = u.id \
                         WHERE c.id = $1",
                        &[&class_id],
                    )
                    .await
            }
        })
        .await?
        .ok_or_else(|| Error::NotFound("class does not exist".to_string()))?;

    let students = state
        .queries
        .read("class roster", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT id, name, student_no, created_at FROM children \
                         WHERE class_id = $1 ORDER BY name",
                        &[&class_id],
                    )
                    .await
            }
        })
        .await?;

    let photo_count = state
        .queries
        .read("class photo count", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_one(
                        "SELECT COUNT(*) FROM photos WHERE class_id = $1",
                        &[&class_id],
                    )
                    .await
            }
        })
        .await?;

    let created_at: chrono::DateTime<chrono::Utc> = info.get("created_at");
    let students: Vec<serde_json::Value> = students
        .iter()
        .map(|row| {
            let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
            serde_json::json!({
                "id": row.get::<_, i32>("id"),
                "name": row.get::<_, String>("name"),
                "student_no": row.get::<_, Option<String>>("student_no"),
                "created_at": created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "id": info.get::<_, i32>("id"),
        "name": info.get::<_, String>("name"),
        "created_at": created_at.to_rfc3339(),
        "teacher_name": info.get::<_, Option<String>>("teacher_name"),
        "teacher_id": info.get::<_, Option<i32>>("teacher_id"),
        "students": students,
        "photo_count": photo_count.get::<_, i64>(0),
    })))
}

/// Teachers may only read their own class roster; parents may read any
fn check_roster_access(user: &AuthUser, class_id: i32) -> Result<()> {
    if user.role == Role::Teacher && user.class_id != Some(class_id) {
        return Err(Error::Forbidden(
            "not allowed to view this class roster".to_string(),
        ));
    }
    Ok(())
}

/// Children of one class
pub async fn class_children(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(class_id): Path<i32>,
) -> Result<Json<Vec<serde_json::Value>>> {
    check_roster_access(&user, class_id)?;

    let pool = state.queries.pool().clone();
    let rows = state
        .queries
        .read("class children", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT id, name, student_no, created_at FROM children \
                         WHERE class_id = $1 ORDER BY name",
                        &[&class_id],
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
                "student_no": row.get::<_, Option<String>>("student_no"),
                "created_at": created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(children))
}

#[derive(Debug, Deserialize)]
pub struct AddChildRequest {
    pub name: String,
    pub student_no: Option<String>,
}

/// Add a child to the calling teacher's own class
pub async fn add_child_to_class(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(class_id): Path<i32>,
    Json(req): Json<AddChildRequest>,
) -> Result<impl IntoResponse> {
    if req.name.is_empty() {
        return Err(Error::Validation("student name is required".to_string()));
    }
    if user.class_id != Some(class_id) {
        return Err(Error::Forbidden(
            "not allowed to add students to this class".to_string(),
        ));
    }

    let pool = state.queries.pool().clone();
    let name = req.name.clone();
    let existing = state
        .queries
        .read("student exists in class", || {
            let pool = pool.clone();
            let name = name.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id FROM children WHERE name = $1 AND class_id = $2",
                        &[&name, &class_id],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_some() {
        return Err(Error::Validation("student already exists in class".to_string()));
    }

    let row = state
        .queries
        .write("insert student", || {
            let pool = pool.clone();
            let name = req.name.clone();
            let student_no = req.student_no.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_one(
                        "INSERT INTO children (name, class_id, student_no) \
                         VALUES ($1, $2, $3) RETURNING id",
                        &[&name, &class_id, &student_no],
                    )
                    .await
            }
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "student added",
            "child": {
                "id": row.get::<_, i32>("id"),
                "name": req.name,
                "class_id": class_id,
            },
        })),
    ))
}

/// Remove a child from the calling teacher's own class
pub async fn remove_child_from_class(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path((class_id, child_id)): Path<(i32, i32)>,
) -> Result<Json<serde_json::Value>> {
    if user.class_id != Some(class_id) {
        return Err(Error::Forbidden(
            "not allowed to remove students from this class".to_string(),
        ));
    }

    let pool = state.queries.pool().clone();
    let existing = state
        .queries
        .read("student in class", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT id FROM children WHERE id = $1 AND class_id = $2",
                        &[&child_id, &class_id],
                    )
                    .await
            }
        })
        .await?;
    if existing.is_none() {
        return Err(Error::NotFound("student does not exist".to_string()));
    }

    delete_child(&state.queries, child_id).await?;

    Ok(Json(serde_json::json!({ "message": "student deleted" })))
}
