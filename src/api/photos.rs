//! Photo upload, walls, likes and search

use axum::{
    extract::{Multipart, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::Queries;
use crate::error::{Error, Result};
use crate::recognition::{to_data_url, Recognition};

use super::SharedState;

/// Request body cap for the upload route: 10 files of 10 MB plus headroom
pub const MAX_UPLOAD_BYTES: usize = 110 * 1024 * 1024;

const MAX_FILES: usize = 10;
const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => ".png",
        "image/gif" => ".gif",
        _ => ".jpg",
    }
}

struct UploadedFile {
    content_type: String,
    bytes: Vec<u8>,
}

/// Upload one or more class photos.
///
/// Each stored photo carries whatever detected-child list the recognition
/// service returned for it; when the service is unconfigured or failing
/// the photo is stored untagged.
pub async fn upload(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut class_id: Option<i32> = None;
    let mut is_public = true;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("invalid upload body: {}", e)))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("classId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("invalid classId: {}", e)))?;
                class_id = Some(
                    text.parse()
                        .map_err(|_| Error::Validation("invalid classId".to_string()))?,
                );
            }
            Some("isPublic") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("invalid isPublic: {}", e)))?;
                is_public = text != "false" && text != "0";
            }
            Some("images") => {
                if files.len() >= MAX_FILES {
                    return Err(Error::Validation(format!(
                        "at most {} images per upload",
                        MAX_FILES
                    )));
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !ALLOWED_TYPES.contains(&content_type.as_str()) {
                    return Err(Error::Validation(
                        "only JPEG, PNG and GIF images are allowed".to_string(),
                    ));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("failed to read image: {}", e)))?;
                if bytes.len() > MAX_FILE_BYTES {
                    return Err(Error::Validation("image exceeds the 10 MB limit".to_string()));
                }
                files.push(UploadedFile { content_type, bytes: bytes.to_vec() });
            }
            _ => {}
        }
    }

    let class_id = class_id.ok_or_else(|| Error::Validation("classId is required".to_string()))?;
    if files.is_empty() {
        return Err(Error::Validation("select at least one image to upload".to_string()));
    }

    let uploads_dir = state.config.server.uploads_dir.clone();
    tokio::fs::create_dir_all(&uploads_dir).await?;

    let pool = state.queries.pool().clone();
    let uploader_id = user.id;
    let mut uploaded = Vec::with_capacity(files.len());

    for file in &files {
        let filename = format!(
            "images-{}-{}{}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>(),
            extension_for(&file.content_type)
        );
        tokio::fs::write(uploads_dir.join(&filename), &file.bytes).await?;
        let path = format!("/uploads/{}", filename);

        let recognition = match &state.recognition {
            Some(client) => {
                let image = to_data_url(&file.content_type, &file.bytes);
                match client.batch_recognize(class_id, &[image]).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::warn!("recognition skipped for {}: {}", filename, e);
                        None
                    }
                }
            }
            None => None,
        };
        let recognition_json = recognition
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let row = state
            .queries
            .write("insert photo", || {
                let pool = pool.clone();
                let path = path.clone();
                let recognition_json = recognition_json.clone();
                async move {
                    let client = pool.get().await?;
                    client
                        .query_one(
                            "INSERT INTO photos \
                             (path, uploader_id, class_id, is_public, recognition) \
                             VALUES ($1, $2, $3, $4, $5) RETURNING id",
                            &[&path, &uploader_id, &class_id, &is_public, &recognition_json],
                        )
                        .await
                }
            })
            .await?;

        uploaded.push(serde_json::json!({
            "id": row.get::<_, i32>("id"),
            "path": path,
            "recognition_data": recognition,
        }));
    }

    tracing::info!(
        "user {} uploaded {} photos to class {}",
        user.username,
        uploaded.len(),
        class_id
    );
    Ok(Json(serde_json::json!({
        "message": "photos uploaded",
        "photos": uploaded,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    fn resolve(&self) -> Result<(i64, i64)> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(20);
        if limit <= 0 {
            return Err(Error::Validation("invalid limit parameter".to_string()));
        }
        if page <= 0 {
            return Err(Error::Validation("invalid page parameter".to_string()));
        }
        Ok((page, limit))
    }
}

struct PhotoRow {
    id: i32,
    path: String,
    created_at: chrono::DateTime<chrono::Utc>,
    uploader_name: Option<String>,
    class_name: Option<String>,
    recognition: Option<Recognition>,
    like_count: i64,
}

fn photo_row(row: &tokio_postgres::Row) -> PhotoRow {
    let recognition = row
        .get::<_, Option<serde_json::Value>>("recognition")
        .and_then(|value| serde_json::from_value(value).ok());
    PhotoRow {
        id: row.get("id"),
        path: row.get("path"),
        created_at: row.get("created_at"),
        uploader_name: row.get("uploader_name"),
        class_name: row.get("class_name"),
        recognition,
        like_count: row.get("like_count"),
    }
}

/// Names for the children a photo's recognition data points at
async fn children_named(
    queries: &Queries,
    recognition: Option<&Recognition>,
) -> Result<Vec<serde_json::Value>> {
    let ids = match recognition {
        Some(r) if !r.child_ids.is_empty() => r.child_ids.clone(),
        _ => return Ok(Vec::new()),
    };

    let pool = queries.pool().clone();
    let rows = queries
        .read("children by ids", || {
            let pool = pool.clone();
            let ids = ids.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query("SELECT id, name FROM children WHERE id = ANY($1)", &[&ids])
                    .await
            }
        })
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "id": row.get::<_, i32>("id"),
                "name": row.get::<_, String>("name"),
            })
        })
        .collect())
}

async fn photo_json(queries: &Queries, photo: &PhotoRow) -> Result<serde_json::Value> {
    let children = children_named(queries, photo.recognition.as_ref()).await?;
    Ok(serde_json::json!({
        "id": photo.id,
        "path": photo.path,
        "created_at": photo.created_at.to_rfc3339(),
        "uploader_name": photo.uploader_name,
        "class_name": photo.class_name,
        "recognition_data": photo.recognition,
        "like_count": photo.like_count,
        "children": children,
    }))
}

const PHOTO_SELECT: &str = "SELECT p.id, p.path, p.created_at, \
    u.full_name AS uploader_name, c.name AS class_name, p.recognition, \
    (SELECT COUNT(*) FROM likes l WHERE l.photo_id = p.id) AS like_count \
    FROM photos p \
    LEFT JOIN users u ON p.uploader_id = u.id \
    LEFT JOIN classes c ON p.class_id = c.id";

/// Paginated wall of public photos
pub async fn public_wall(
    State(state): State<SharedState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>> {
    let (page, limit) = query.resolve()?;
    let offset = (page - 1) * limit;

    let pool = state.queries.pool().clone();
    let rows = state
        .queries
        .read("public photos", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        &format!(
                            "{} WHERE p.is_public = true \
                             ORDER BY p.created_at DESC LIMIT $1 OFFSET $2",
                            PHOTO_SELECT
                        ),
                        &[&limit, &offset],
                    )
                    .await
            }
        })
        .await?;

    let mut photos = Vec::with_capacity(rows.len());
    for row in &rows {
        photos.push(photo_json(&state.queries, &photo_row(row)).await?);
    }

    let total = state
        .queries
        .read("public photo count", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_one("SELECT COUNT(*) FROM photos WHERE is_public = true", &[])
                    .await
            }
        })
        .await?;

    Ok(Json(serde_json::json!({
        "photos": photos,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total.get::<_, i64>(0),
        },
    })))
}

/// Photos whose detected-child list intersects the calling parent's children
pub async fn private_wall(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>> {
    let (page, limit) = query.resolve()?;
    let offset = (page - 1) * limit;

    let pool = state.queries.pool().clone();
    let parent_id = user.id;
    let bound = state
        .queries
        .read("bound child ids", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        "SELECT child_id FROM parent_child WHERE parent_id = $1",
                        &[&parent_id],
                    )
                    .await
            }
        })
        .await?;

    let child_ids: Vec<i32> = bound.iter().map(|row| row.get("child_id")).collect();
    if child_ids.is_empty() {
        return Ok(Json(serde_json::json!({
            "photos": [],
            "pagination": { "page": page, "limit": limit, "total": 0 },
        })));
    }

    let rows = state
        .queries
        .read("recognized photos", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        &format!(
                            "{} WHERE p.recognition IS NOT NULL \
                             ORDER BY p.created_at DESC LIMIT $1 OFFSET $2",
                            PHOTO_SELECT
                        ),
                        &[&limit, &offset],
                    )
                    .await
            }
        })
        .await?;

    let mut photos = Vec::new();
    for row in &rows {
        let photo = photo_row(row);
        let matches = photo
            .recognition
            .as_ref()
            .map(|r| r.child_ids.iter().any(|id| child_ids.contains(id)))
            .unwrap_or(false);
        if matches {
            photos.push(photo_json(&state.queries, &photo).await?);
        }
    }

    let total = photos.len();
    Ok(Json(serde_json::json!({
        "photos": photos,
        "pagination": { "page": page, "limit": limit, "total": total },
    })))
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    #[serde(rename = "photoId")]
    pub photo_id: i32,
}

/// Toggle the caller's like on a photo
pub async fn toggle_like(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<serde_json::Value>> {
    let pool = state.queries.pool().clone();
    let photo_id = req.photo_id;
    let user_id = user.id;

    let photo = state
        .queries
        .read("photo exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt("SELECT id FROM photos WHERE id = $1", &[&photo_id])
                    .await
            }
        })
        .await?;
    if photo.is_none() {
        return Err(Error::NotFound("photo does not exist".to_string()));
    }

    let existing = state
        .queries
        .read("like exists", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query_opt(
                        "SELECT 1 FROM likes WHERE user_id = $1 AND photo_id = $2",
                        &[&user_id, &photo_id],
                    )
                    .await
            }
        })
        .await?;

    if existing.is_some() {
        state
            .queries
            .write("delete like", || {
                let pool = pool.clone();
                async move {
                    let client = pool.get().await?;
                    client
                        .execute(
                            "DELETE FROM likes WHERE user_id = $1 AND photo_id = $2",
                            &[&user_id, &photo_id],
                        )
                        .await
                }
            })
            .await?;
        Ok(Json(serde_json::json!({ "message": "like removed", "liked": false })))
    } else {
        state
            .queries
            .write("insert like", || {
                let pool = pool.clone();
                async move {
                    let client = pool.get().await?;
                    client
                        .execute(
                            "INSERT INTO likes (user_id, photo_id) VALUES ($1, $2)",
                            &[&user_id, &photo_id],
                        )
                        .await
                }
            })
            .await?;
        Ok(Json(serde_json::json!({ "message": "photo liked", "liked": true })))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

/// Keyword search over the public wall
pub async fn search(
    State(state): State<SharedState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>> {
    let pool = state.queries.pool().clone();
    let rows = state
        .queries
        .read("search photos", || {
            let pool = pool.clone();
            async move {
                let client = pool.get().await?;
                client
                    .query(
                        &format!(
                            "{} WHERE p.is_public = true \
                             ORDER BY p.created_at DESC LIMIT 20",
                            PHOTO_SELECT
                        ),
                        &[],
                    )
                    .await
            }
        })
        .await?;

    let mut photos = Vec::with_capacity(rows.len());
    for row in &rows {
        photos.push(photo_json(&state.queries, &photo_row(row)).await?);
    }

    let query = params.query.unwrap_or_default();
    let message = format!("found {} photos for \"{}\"", photos.len(), query);
    Ok(Json(serde_json::json!({
        "photos": photos,
        "query": query,
        "message": message,
    })))
}

/// Proxy health check of the recognition service
pub async fn recognition_health(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>> {
    let client = state.recognition.as_ref().ok_or_else(|| {
        Error::ServiceUnavailable("recognition service not configured".to_string())
    })?;
    let status = client.health().await?;
    Ok(Json(status))
}
