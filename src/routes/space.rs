/**
 * Space Routes
 * Per-user file storage: uploads with thumbnail generation, a nested
 * directory tree and storage accounting. Studio users manage their own
 * space; players can only download files of channels they subscribe to.
 */
use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;
use std::pin::Pin;

use axum::{
    extract::{Multipart, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{
    self,
    models::{SpaceDir, SpaceFile},
};
use crate::response::{created, ok, ApiError, Envelope, Msg};
use crate::routes::auth::authenticate;

const UPLOAD_DIR: &str = "uploads/space";
const THUMBNAIL_DIR: &str = "uploads/space/thumbs";
const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const TOTAL_SPACE_MB: i64 = 1024;
const MAX_TREE_DEPTH: u32 = 5;
const THUMBNAIL_EDGE: u32 = 256;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SpaceQuery {
    pub directory_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryCreateRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryUpdateRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FileMoveRequest {
    pub parent_id: Option<Uuid>,
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn sanitize_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

fn file_format(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => "unknown".to_string(),
    }
}

fn storage_stats(total_size: i64) -> (i64, i64, i64) {
    let used_mb = total_size / (1024 * 1024);
    let free_mb = (TOTAL_SPACE_MB - used_mb).max(0);
    let percentage = used_mb * 100 / TOTAL_SPACE_MB;
    (used_mb, free_mb, percentage)
}

fn file_json(file: &SpaceFile) -> Value {
    let has_thumbnail = file.thumbnail_name.is_some();
    json!({
        "kind": "file",
        "id": file.id,
        "name": file.name,
        "content_type": file.content_type,
        "file_format": file_format(&file.name),
        "size": file.size,
        "owner": file.owner_id,
        "directory_id": file.directory_id,
        "created_at": file.created_at,
        "has_thumbnail": has_thumbnail,
        "thumbnail_url": file
            .thumbnail_name
            .as_ref()
            .map(|_| format!("/studio/space/file/{}/thumbnail", file.id)),
    })
}

async fn list_files(
    pool: &PgPool,
    owner_id: Uuid,
    directory_id: Option<Uuid>,
) -> Result<Vec<SpaceFile>, sqlx::Error> {
    sqlx::query_as::<_, SpaceFile>(
        "SELECT * FROM space_files WHERE owner_id = $1 AND directory_id IS NOT DISTINCT FROM $2 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .bind(directory_id)
    .fetch_all(pool)
    .await
}

async fn list_dirs(
    pool: &PgPool,
    owner_id: Uuid,
    parent_id: Option<Uuid>,
) -> Result<Vec<SpaceDir>, sqlx::Error> {
    sqlx::query_as::<_, SpaceDir>(
        "SELECT * FROM space_dirs WHERE owner_id = $1 AND parent_id IS NOT DISTINCT FROM $2 ORDER BY name",
    )
    .bind(owner_id)
    .bind(parent_id)
    .fetch_all(pool)
    .await
}

/// Builds the JSON node of a directory, recursing into subdirectories up to
/// `MAX_TREE_DEPTH` levels. Boxed because the future is recursive.
fn dir_node<'a>(
    pool: &'a PgPool,
    dir: &'a SpaceDir,
    depth: u32,
) -> Pin<Box<dyn Future<Output = Result<Value, sqlx::Error>> + Send + 'a>> {
    Box::pin(async move {
        let files = list_files(pool, dir.owner_id, Some(dir.id)).await?;
        let subdirs = list_dirs(pool, dir.owner_id, Some(dir.id)).await?;

        let total_size: i64 = files.iter().map(|f| f.size).sum();
        let files_count = files.len();
        let directories_count = subdirs.len();

        let contents = if depth < MAX_TREE_DEPTH {
            let mut entries: Vec<Value> = files.iter().map(file_json).collect();
            for subdir in &subdirs {
                entries.push(dir_node(pool, subdir, depth + 1).await?);
            }
            Value::Array(entries)
        } else {
            Value::Null
        };

        Ok(json!({
            "kind": "directory",
            "id": dir.id,
            "name": dir.name,
            "owner": dir.owner_id,
            "parent_id": dir.parent_id,
            "created_at": dir.created_at,
            "files_count": files_count,
            "directories_count": directories_count,
            "total_size": total_size,
            "contents": contents,
        }))
    })
}

/// Storage stats plus the content listing of one directory level (root when
/// `directory_id` is None).
async fn space_summary(
    pool: &PgPool,
    owner_id: Uuid,
    directory_id: Option<Uuid>,
) -> Result<Value, sqlx::Error> {
    let total_size: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM space_files WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(pool)
            .await?;

    let files = list_files(pool, owner_id, directory_id).await?;
    let dirs = list_dirs(pool, owner_id, directory_id).await?;

    let mut content: Vec<Value> = files.iter().map(file_json).collect();
    for dir in &dirs {
        content.push(dir_node(pool, dir, 0).await?);
    }

    let (used_mb, free_mb, percentage) = storage_stats(total_size);
    Ok(json!({
        "used_space_mb": used_mb,
        "free_space_mb": free_mb,
        "total_space_mb": TOTAL_SPACE_MB,
        "used_space_percentage": percentage,
        "content": content,
    }))
}

async fn find_owned_file(
    pool: &PgPool,
    file_id: Uuid,
    owner_id: Uuid,
) -> Result<SpaceFile, ApiError> {
    sqlx::query_as::<_, SpaceFile>("SELECT * FROM space_files WHERE id = $1 AND owner_id = $2")
        .bind(file_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("File".to_string()))
}

async fn find_owned_dir(
    pool: &PgPool,
    dir_id: Uuid,
    owner_id: Uuid,
) -> Result<SpaceDir, ApiError> {
    sqlx::query_as::<_, SpaceDir>("SELECT * FROM space_dirs WHERE id = $1 AND owner_id = $2")
        .bind(dir_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Directory".to_string()))
}

/// Encodes a JPEG thumbnail, or None when the payload is not a decodable
/// image.
fn encode_thumbnail(bytes: &[u8]) -> Option<Vec<u8>> {
    let img = image::load_from_memory(bytes).ok()?;
    let thumb = img.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);
    let mut out = Vec::new();
    thumb
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .ok()?;
    Some(out)
}

fn attachment_response(file: &SpaceFile, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.name),
            ),
        ],
        bytes,
    )
        .into_response()
}

// ============================================================================
// Studio endpoints
// ============================================================================

/// GET /studio/space
pub async fn get_space(
    headers: HeaderMap,
    Query(query): Query<SpaceQuery>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let summary = space_summary(pool.as_ref(), user.id, query.directory_id).await?;
    Ok(ok(
        summary,
        Msg::new("Space retrieved", "Espace récupéré"),
    ))
}

/// POST /studio/space/file
/// Multipart upload: a `file` part plus an optional `directory_id` part.
/// Decodable images get a JPEG thumbnail rendered next to the stored file.
pub async fn upload_file(
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let mut file_name: Option<String> = None;
    let mut content_type = "application/octet-stream".to_string();
    let mut bytes: Option<Vec<u8>> = None;
    let mut directory_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("multipart: {e}")))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                if let Some(ct) = field.content_type() {
                    content_type = ct.to_string();
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("file: {e}")))?;
                bytes = Some(data.to_vec());
            }
            Some("directory_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("directory_id: {e}")))?;
                if !raw.is_empty() {
                    directory_id = Some(
                        Uuid::parse_str(&raw)
                            .map_err(|_| ApiError::Validation("directory_id".to_string()))?,
                    );
                }
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::Validation("file".to_string()))?;
    let name = file_name.ok_or_else(|| ApiError::Validation("file".to_string()))?;
    if !sanitize_filename(&name) {
        return Err(ApiError::Validation("file name".to_string()));
    }
    if bytes.is_empty() {
        return Err(ApiError::domain("Empty file", "Fichier vide"));
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::domain(
            "File too large. Maximum size is 5MB",
            "Fichier trop volumineux. La taille maximale est de 5 Mo",
        ));
    }

    if let Some(dir_id) = directory_id {
        find_owned_dir(pool.as_ref(), dir_id, user.id).await?;
    }

    tokio::fs::create_dir_all(UPLOAD_DIR)
        .await
        .map_err(ApiError::internal)?;

    let file_id = Uuid::new_v4();
    let stored_name = format!("{}.{}", file_id, file_format(&name));
    tokio::fs::write(PathBuf::from(UPLOAD_DIR).join(&stored_name), &bytes)
        .await
        .map_err(ApiError::internal)?;

    // Thumbnail is best effort: an undecodable payload just gets none.
    let mut thumbnail_name = None;
    if validate_image_magic_bytes(&bytes).is_some() {
        let thumb_bytes = {
            let bytes = bytes.clone();
            tokio::task::spawn_blocking(move || encode_thumbnail(&bytes))
                .await
                .map_err(ApiError::internal)?
        };
        if let Some(thumb_bytes) = thumb_bytes {
            let thumb_name = format!("{}.jpg", file_id);
            if let Err(e) = tokio::fs::create_dir_all(THUMBNAIL_DIR).await {
                tracing::warn!("thumbnail dir creation failed: {}", e);
            } else if let Err(e) =
                tokio::fs::write(PathBuf::from(THUMBNAIL_DIR).join(&thumb_name), &thumb_bytes).await
            {
                tracing::warn!("thumbnail write failed for {}: {}", name, e);
            } else {
                thumbnail_name = Some(thumb_name);
            }
        }
    }

    let file = sqlx::query_as::<_, SpaceFile>(
        r#"
        INSERT INTO space_files (id, owner_id, directory_id, name, content_type, size, stored_name, thumbnail_name)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(file_id)
    .bind(user.id)
    .bind(directory_id)
    .bind(&name)
    .bind(&content_type)
    .bind(bytes.len() as i64)
    .bind(&stored_name)
    .bind(&thumbnail_name)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!("file uploaded: {} ({} bytes)", file.name, file.size);

    Ok(created(
        file_json(&file),
        Msg::new("File uploaded", "Fichier téléversé"),
    ))
}

/// GET /studio/space/file/{file_id}
pub async fn download_file(
    headers: HeaderMap,
    Path(file_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let file = find_owned_file(pool.as_ref(), file_id, user.id).await?;
    let bytes = tokio::fs::read(PathBuf::from(UPLOAD_DIR).join(&file.stored_name))
        .await
        .map_err(ApiError::internal)?;

    Ok(attachment_response(&file, bytes))
}

/// GET /studio/space/file/{file_id}/thumbnail
pub async fn get_file_thumbnail(
    headers: HeaderMap,
    Path(file_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let file = find_owned_file(pool.as_ref(), file_id, user.id).await?;
    serve_thumbnail(&file).await
}

async fn serve_thumbnail(file: &SpaceFile) -> Result<Response, ApiError> {
    let thumb_name = file
        .thumbnail_name
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Thumbnail".to_string()))?;
    let bytes = tokio::fs::read(PathBuf::from(THUMBNAIL_DIR).join(thumb_name))
        .await
        .map_err(|_| ApiError::NotFound("Thumbnail".to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// PUT /studio/space/file/{file_id}
/// Move a file into another directory (or back to the root).
pub async fn move_file(
    headers: HeaderMap,
    Path(file_id): Path<Uuid>,
    Json(payload): Json<FileMoveRequest>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    find_owned_file(pool.as_ref(), file_id, user.id).await?;
    if let Some(parent_id) = payload.parent_id {
        find_owned_dir(pool.as_ref(), parent_id, user.id)
            .await
            .map_err(|_| ApiError::NotFound("Target directory".to_string()))?;
    }

    sqlx::query("UPDATE space_files SET directory_id = $1 WHERE id = $2")
        .bind(payload.parent_id)
        .bind(file_id)
        .execute(pool.as_ref())
        .await?;

    let summary = space_summary(pool.as_ref(), user.id, None).await?;
    Ok(ok(summary, Msg::new("File moved", "Fichier déplacé")))
}

/// DELETE /studio/space/file/{file_id}
pub async fn delete_file(
    headers: HeaderMap,
    Path(file_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let file = find_owned_file(pool.as_ref(), file_id, user.id).await?;
    remove_file_row(pool.as_ref(), &file).await?;

    let summary = space_summary(pool.as_ref(), user.id, None).await?;
    Ok(ok(summary, Msg::new("File deleted", "Fichier supprimé")))
}

/// Removes the row and the on-disk payloads. Disk cleanup is best effort.
async fn remove_file_row(pool: &PgPool, file: &SpaceFile) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM space_files WHERE id = $1")
        .bind(file.id)
        .execute(pool)
        .await?;

    if let Err(e) = tokio::fs::remove_file(PathBuf::from(UPLOAD_DIR).join(&file.stored_name)).await
    {
        tracing::warn!("disk cleanup failed for {}: {}", file.stored_name, e);
    }
    if let Some(thumb) = &file.thumbnail_name {
        let _ = tokio::fs::remove_file(PathBuf::from(THUMBNAIL_DIR).join(thumb)).await;
    }
    Ok(())
}

/// POST /studio/space/dir
pub async fn create_directory(
    headers: HeaderMap,
    Json(payload): Json<DirectoryCreateRequest>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name".to_string()));
    }

    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    if let Some(parent_id) = payload.parent_id {
        find_owned_dir(pool.as_ref(), parent_id, user.id)
            .await
            .map_err(|_| ApiError::NotFound("Parent directory".to_string()))?;
    }

    let dir = sqlx::query_as::<_, SpaceDir>(
        "INSERT INTO space_dirs (id, owner_id, parent_id, name) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(payload.parent_id)
    .bind(payload.name.trim())
    .fetch_one(pool.as_ref())
    .await?;

    let node = dir_node(pool.as_ref(), &dir, 0).await?;
    Ok(created(node, Msg::new("Directory created", "Répertoire créé")))
}

/// GET /studio/space/dir/{dir_id}
pub async fn get_directory(
    headers: HeaderMap,
    Path(dir_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    find_owned_dir(pool.as_ref(), dir_id, user.id).await?;
    let summary = space_summary(pool.as_ref(), user.id, Some(dir_id)).await?;
    Ok(ok(summary, Msg::new("Directory retrieved", "Répertoire récupéré")))
}

/// PUT /studio/space/dir/{dir_id}
pub async fn update_directory(
    headers: HeaderMap,
    Path(dir_id): Path<Uuid>,
    Json(payload): Json<DirectoryUpdateRequest>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name".to_string()));
    }

    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    find_owned_dir(pool.as_ref(), dir_id, user.id).await?;
    sqlx::query("UPDATE space_dirs SET name = $1 WHERE id = $2")
        .bind(payload.name.trim())
        .bind(dir_id)
        .execute(pool.as_ref())
        .await?;

    let summary = space_summary(pool.as_ref(), user.id, None).await?;
    Ok(ok(summary, Msg::new("Directory updated", "Répertoire mis à jour")))
}

/// DELETE /studio/space/dir/{dir_id}
/// Deletes the directory and everything under it.
pub async fn delete_directory(
    headers: HeaderMap,
    Path(dir_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    find_owned_dir(pool.as_ref(), dir_id, user.id).await?;

    // Walk the subtree iteratively, collecting every directory to drop.
    let mut pending = vec![dir_id];
    let mut doomed = Vec::new();
    while let Some(current) = pending.pop() {
        doomed.push(current);
        let subdirs = list_dirs(pool.as_ref(), user.id, Some(current)).await?;
        pending.extend(subdirs.iter().map(|d| d.id));
    }

    for dir in &doomed {
        let files = list_files(pool.as_ref(), user.id, Some(*dir)).await?;
        for file in &files {
            remove_file_row(pool.as_ref(), file).await?;
        }
    }

    sqlx::query("DELETE FROM space_dirs WHERE id = ANY($1) AND owner_id = $2")
        .bind(&doomed)
        .bind(user.id)
        .execute(pool.as_ref())
        .await?;

    let summary = space_summary(pool.as_ref(), user.id, None).await?;
    Ok(ok(summary, Msg::new("Directory deleted", "Répertoire supprimé")))
}

// ============================================================================
// Player endpoints
// ============================================================================

/// Players may read a file only when subscribed to a channel of the file's
/// owner.
async fn verify_subscription_access(
    pool: &PgPool,
    file_id: Uuid,
    player_id: Uuid,
) -> Result<SpaceFile, ApiError> {
    let file = sqlx::query_as::<_, SpaceFile>("SELECT * FROM space_files WHERE id = $1")
        .bind(file_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("File".to_string()))?;

    let subscribed: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT pp.id FROM player_progress pp
        JOIN channels c ON pp.channel_id = c.channel_id
        WHERE c.user_id = $1 AND pp.player_id = $2
        LIMIT 1
        "#,
    )
    .bind(file.owner_id)
    .bind(player_id)
    .fetch_optional(pool)
    .await?;

    if subscribed.is_none() {
        return Err(ApiError::Forbidden(Msg::new(
            "Access denied, subscription required",
            "Accès refusé, abonnement requis",
        )));
    }

    Ok(file)
}

/// GET /play/space/file/{file_id}
pub async fn player_download_file(
    headers: HeaderMap,
    Path(file_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let file = verify_subscription_access(pool.as_ref(), file_id, user.id).await?;
    let bytes = tokio::fs::read(PathBuf::from(UPLOAD_DIR).join(&file.stored_name))
        .await
        .map_err(ApiError::internal)?;

    Ok(attachment_response(&file, bytes))
}

/// GET /play/space/file/{file_id}/thumbnail
pub async fn player_file_thumbnail(
    headers: HeaderMap,
    Path(file_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let file = verify_subscription_access(pool.as_ref(), file_id, user.id).await?;
    serve_thumbnail(&file).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_jpeg() {
        assert_eq!(
            validate_image_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg")
        );
    }

    #[test]
    fn test_magic_bytes_png() {
        assert_eq!(
            validate_image_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some("image/png")
        );
    }

    #[test]
    fn test_magic_bytes_webp() {
        let header = [
            0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50,
        ];
        assert_eq!(validate_image_magic_bytes(&header), Some("image/webp"));
    }

    #[test]
    fn test_magic_bytes_rejects_text() {
        assert_eq!(validate_image_magic_bytes(b"hello world"), None);
    }

    #[test]
    fn test_magic_bytes_rejects_short_input() {
        assert_eq!(validate_image_magic_bytes(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_sanitize_filename_rejects_traversal() {
        assert!(!sanitize_filename("../etc/passwd"));
        assert!(!sanitize_filename("a/b.png"));
        assert!(!sanitize_filename("a\\b.png"));
        assert!(!sanitize_filename(""));
        assert!(sanitize_filename("photo.png"));
    }

    #[test]
    fn test_file_format_lowercases_extension() {
        assert_eq!(file_format("Photo.PNG"), "png");
        assert_eq!(file_format("archive.tar.gz"), "gz");
        assert_eq!(file_format("README"), "unknown");
    }

    #[test]
    fn test_storage_stats_rounding() {
        let (used, free, pct) = storage_stats(512 * 1024 * 1024);
        assert_eq!(used, 512);
        assert_eq!(free, 512);
        assert_eq!(pct, 50);
    }

    #[test]
    fn test_storage_stats_never_negative_free() {
        let (_, free, _) = storage_stats(4096 * 1024 * 1024);
        assert_eq!(free, 0);
    }
}
