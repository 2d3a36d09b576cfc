/**
 * Studio Content Routes
 * Outline and content CRUD for sections, units, activities, lessons,
 * quizzes and questions. Every mutation rebuilds the channel snapshot.
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{
    self,
    models::{
        Activity, ActivityOutline, Lesson, LessonOutline, Question, QuizOutline, Section,
        SectionOutline, Unit, UnitOutline,
    },
};
use crate::outline::{aggregate_channel, section_descendants};
use crate::response::{created, ok, ApiError, Envelope, Msg};
use crate::routes::auth::authenticate;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct OutlineRequest {
    pub name: String,
    /// Used by updates; creates take the order from the path.
    #[serde(default)]
    pub order: i32,
    pub section_outline_id: Option<Uuid>,
    pub unit_outline_id: Option<Uuid>,
    pub activity_outline_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuizOutlineRequest {
    pub name: String,
    #[serde(default)]
    pub order: i32,
    pub activity_outline_id: Option<Uuid>,
    #[serde(default)]
    pub quiz_count: i32,
    #[serde(default)]
    pub is_launched: bool,
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SectionContentRequest {
    pub section_outline_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UnitContentRequest {
    pub unit_outline_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ActivityContentRequest {
    pub activity_outline_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
    pub difficulty_level: Option<String>,
    #[serde(default)]
    pub is_launched: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LessonRequest {
    pub lesson_outline_id: Option<Uuid>,
    pub lesson_type: String,
    pub text: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<String>,
    pub question_lesson: Option<Value>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub is_launched: bool,
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuestionRequest {
    pub quiz_outline_id: Option<Uuid>,
    pub time_limit: Option<i32>,
    pub points: Option<i32>,
    pub template: Option<Value>,
    pub generated_question: Option<Value>,
    pub file_id: Option<String>,
    pub check_function: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub is_accepted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SectionQuery {
    pub section_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UnitQuery {
    pub unit_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub activity_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LessonQuery {
    pub lesson_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    pub quiz_id: Option<Uuid>,
}

// ============================================================================
// Helpers
// ============================================================================

/// The public channel id is the channel_infos primary key.
async fn verify_channel(pool: &sqlx::PgPool, channel_id: Uuid) -> Result<(), ApiError> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM channel_infos WHERE id = $1")
        .bind(channel_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound("Channel".to_string()))
}

fn require_parent(id: Option<Uuid>, field: &str) -> Result<Uuid, ApiError> {
    id.ok_or_else(|| ApiError::Validation(field.to_string()))
}

fn deleted_msg(what: &str, fr: &str) -> Msg {
    Msg::new(
        &format!("{} deleted successfully", what),
        &format!("{} supprimé avec succès", fr),
    )
}

// ============================================================================
// Section outlines
// ============================================================================

/// POST /studio/channel/content/{channel_id}/sections/outline/{order}
pub async fn create_section_outline(
    headers: HeaderMap,
    Path((channel_id, order)): Path<(Uuid, i32)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<SectionOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let outline = sqlx::query_as::<_, SectionOutline>(
        "INSERT INTO section_outlines (id, channel_id, name, ord) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(channel_id)
    .bind(&payload.name)
    .bind(order)
    .fetch_one(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(created(
        outline,
        Msg::new("Section outline created", "Plan de section créé"),
    ))
}

/// PUT /studio/channel/content/{channel_id}/sections/outline/{section_outline_id}
pub async fn update_section_outline(
    headers: HeaderMap,
    Path((channel_id, section_outline_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<SectionOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let outline = sqlx::query_as::<_, SectionOutline>(
        "UPDATE section_outlines SET name = $1, ord = $2 WHERE id = $3 AND channel_id = $4 RETURNING *",
    )
    .bind(&payload.name)
    .bind(payload.order)
    .bind(section_outline_id)
    .bind(channel_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Section outline".to_string()))?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(
        outline,
        Msg::new("Section outline updated", "Plan de section mis à jour"),
    ))
}

/// DELETE /studio/channel/content/{channel_id}/sections/outline/{section_outline_id}
/// Cascades through every descendant reachable from the channel snapshot
/// before dropping the outline itself. Descendants created after the last
/// aggregation are not in the snapshot and are left behind.
pub async fn delete_section_outline(
    headers: HeaderMap,
    Path((channel_id, section_outline_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let snapshot: Option<Value> =
        sqlx::query_scalar("SELECT outline_content FROM channels WHERE channel_id = $1")
            .bind(channel_id)
            .fetch_optional(pool.as_ref())
            .await?;
    let descendants = section_descendants(&snapshot.unwrap_or(Value::Null), section_outline_id);

    sqlx::query("DELETE FROM questions WHERE quiz_outline_id = ANY($1)")
        .bind(&descendants.quiz_outline_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM quiz_outlines WHERE id = ANY($1)")
        .bind(&descendants.quiz_outline_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM lessons WHERE lesson_outline_id = ANY($1)")
        .bind(&descendants.lesson_outline_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM lesson_outlines WHERE id = ANY($1)")
        .bind(&descendants.lesson_outline_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM activities WHERE activity_outline_id = ANY($1)")
        .bind(&descendants.activity_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM activity_outlines WHERE id = ANY($1)")
        .bind(&descendants.activity_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM units WHERE unit_outline_id = ANY($1)")
        .bind(&descendants.unit_ids)
        .execute(pool.as_ref())
        .await?;
    sqlx::query("DELETE FROM unit_outlines WHERE id = ANY($1)")
        .bind(&descendants.unit_ids)
        .execute(pool.as_ref())
        .await?;

    sqlx::query("DELETE FROM sections WHERE section_outline_id = $1")
        .bind(section_outline_id)
        .execute(pool.as_ref())
        .await?;

    let result = sqlx::query("DELETE FROM section_outlines WHERE id = $1 AND channel_id = $2")
        .bind(section_outline_id)
        .bind(channel_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Section outline".to_string()));
    }

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Section outline", "Plan de section")))
}

// ============================================================================
// Section content
// ============================================================================

/// POST /studio/channel/content/{channel_id}/sections
/// Creates a section content row, or updates one when `section_id` is given.
pub async fn create_section(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<SectionQuery>,
    Json(payload): Json<SectionContentRequest>,
) -> Result<(StatusCode, Json<Envelope<Section>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let section = match query.section_id {
        Some(section_id) => sqlx::query_as::<_, Section>(
            "UPDATE sections SET name = $1, description = $2, file_id = $3 WHERE id = $4 RETURNING *",
        )
        .bind(&payload.name)
        .bind(&payload.description)
        .bind(&payload.file_id)
        .bind(section_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Section".to_string()))?,
        None => {
            let outline_id = require_parent(payload.section_outline_id, "section_outline_id")?;
            sqlx::query_as::<_, Section>(
                "INSERT INTO sections (id, section_outline_id, name, description, file_id) VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(outline_id)
            .bind(&payload.name)
            .bind(&payload.description)
            .bind(&payload.file_id)
            .fetch_one(pool.as_ref())
            .await?
        }
    };

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(section, Msg::new("Section saved", "Section enregistrée")))
}

// ============================================================================
// Unit outlines
// ============================================================================

/// POST /studio/channel/content/{channel_id}/units/outline/{order}
pub async fn create_unit_outline(
    headers: HeaderMap,
    Path((channel_id, order)): Path<(Uuid, i32)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<UnitOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let parent = require_parent(payload.section_outline_id, "section_outline_id")?;
    let outline = sqlx::query_as::<_, UnitOutline>(
        "INSERT INTO unit_outlines (id, section_outline_id, name, ord) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(parent)
    .bind(&payload.name)
    .bind(order)
    .fetch_one(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(created(
        outline,
        Msg::new("Unit outline created", "Plan d'unité créé"),
    ))
}

/// PUT /studio/channel/content/{channel_id}/units/outline/{unit_outline_id}
pub async fn update_unit_outline(
    headers: HeaderMap,
    Path((channel_id, unit_outline_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<UnitOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let outline = sqlx::query_as::<_, UnitOutline>(
        "UPDATE unit_outlines SET name = $1, ord = $2 WHERE id = $3 RETURNING *",
    )
    .bind(&payload.name)
    .bind(payload.order)
    .bind(unit_outline_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Unit outline".to_string()))?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(
        outline,
        Msg::new("Unit outline updated", "Plan d'unité mis à jour"),
    ))
}

/// DELETE /studio/channel/content/{channel_id}/units/outline/{unit_outline_id}
pub async fn delete_unit_outline(
    headers: HeaderMap,
    Path((channel_id, unit_outline_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    sqlx::query("DELETE FROM units WHERE unit_outline_id = $1")
        .bind(unit_outline_id)
        .execute(pool.as_ref())
        .await?;

    let result = sqlx::query("DELETE FROM unit_outlines WHERE id = $1")
        .bind(unit_outline_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Unit outline".to_string()));
    }

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Unit outline", "Plan d'unité")))
}

// ============================================================================
// Unit content
// ============================================================================

/// POST /studio/channel/content/{channel_id}/units
pub async fn create_unit(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<UnitQuery>,
    Json(payload): Json<UnitContentRequest>,
) -> Result<(StatusCode, Json<Envelope<Unit>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let unit = match query.unit_id {
        Some(unit_id) => sqlx::query_as::<_, Unit>(
            "UPDATE units SET name = $1, description = $2, file_id = $3 WHERE id = $4 RETURNING *",
        )
        .bind(&payload.name)
        .bind(&payload.description)
        .bind(&payload.file_id)
        .bind(unit_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Unit".to_string()))?,
        None => {
            let outline_id = require_parent(payload.unit_outline_id, "unit_outline_id")?;
            let duplicate: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM units WHERE unit_outline_id = $1 AND name = $2",
            )
            .bind(outline_id)
            .bind(&payload.name)
            .fetch_optional(pool.as_ref())
            .await?;
            if duplicate.is_some() {
                return Err(ApiError::domain(
                    "A unit with this name already exists in this section",
                    "Une unité portant ce nom existe déjà dans cette section",
                ));
            }

            sqlx::query_as::<_, Unit>(
                "INSERT INTO units (id, unit_outline_id, name, description, file_id) VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(outline_id)
            .bind(&payload.name)
            .bind(&payload.description)
            .bind(&payload.file_id)
            .fetch_one(pool.as_ref())
            .await?
        }
    };

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(unit, Msg::new("Unit saved", "Unité enregistrée")))
}

// ============================================================================
// Activity outlines
// ============================================================================

/// POST /studio/channel/content/{channel_id}/activities/outline/{order}
pub async fn create_activity_outline(
    headers: HeaderMap,
    Path((channel_id, order)): Path<(Uuid, i32)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<ActivityOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let parent = require_parent(payload.unit_outline_id, "unit_outline_id")?;
    let outline = sqlx::query_as::<_, ActivityOutline>(
        r#"
        INSERT INTO activity_outlines (id, unit_outline_id, name, ord, lesson_quiz_count, percentage)
        VALUES ($1, $2, $3, $4, 0, 0)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(parent)
    .bind(&payload.name)
    .bind(order)
    .fetch_one(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(created(
        outline,
        Msg::new("Activity outline created", "Plan d'activité créé"),
    ))
}

/// PUT /studio/channel/content/{channel_id}/activities/outline/{activity_outline_id}
/// Renames and reorders; the count and percentage columns are owned by the
/// free-access calculator and left untouched.
pub async fn update_activity_outline(
    headers: HeaderMap,
    Path((channel_id, activity_outline_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<ActivityOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let outline = sqlx::query_as::<_, ActivityOutline>(
        "UPDATE activity_outlines SET name = $1, ord = $2 WHERE id = $3 RETURNING *",
    )
    .bind(&payload.name)
    .bind(payload.order)
    .bind(activity_outline_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Activity outline".to_string()))?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(
        outline,
        Msg::new("Activity outline updated", "Plan d'activité mis à jour"),
    ))
}

/// DELETE /studio/channel/content/{channel_id}/activities/outline/{activity_outline_id}
pub async fn delete_activity_outline(
    headers: HeaderMap,
    Path((channel_id, activity_outline_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    sqlx::query("DELETE FROM activities WHERE activity_outline_id = $1")
        .bind(activity_outline_id)
        .execute(pool.as_ref())
        .await?;

    let result = sqlx::query("DELETE FROM activity_outlines WHERE id = $1")
        .bind(activity_outline_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Activity outline".to_string()));
    }

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Activity outline", "Plan d'activité")))
}

// ============================================================================
// Activity content
// ============================================================================

/// POST /studio/channel/content/{channel_id}/activities
pub async fn create_activity(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
    Json(payload): Json<ActivityContentRequest>,
) -> Result<(StatusCode, Json<Envelope<Activity>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let activity = match query.activity_id {
        Some(activity_id) => sqlx::query_as::<_, Activity>(
            r#"
            UPDATE activities SET
                description = $1, file_id = $2, difficulty_level = $3, is_launched = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&payload.description)
        .bind(&payload.file_id)
        .bind(&payload.difficulty_level)
        .bind(payload.is_launched)
        .bind(activity_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Activity".to_string()))?,
        None => {
            let outline_id = require_parent(payload.activity_outline_id, "activity_outline_id")?;
            sqlx::query_as::<_, Activity>(
                r#"
                INSERT INTO activities (id, activity_outline_id, name, description, file_id, difficulty_level, is_launched)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(outline_id)
            .bind(&payload.name)
            .bind(&payload.description)
            .bind(&payload.file_id)
            .bind(&payload.difficulty_level)
            .bind(payload.is_launched)
            .fetch_one(pool.as_ref())
            .await?
        }
    };

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(activity, Msg::new("Activity saved", "Activité enregistrée")))
}

// ============================================================================
// Lesson outlines
// ============================================================================

/// POST /studio/channel/content/{channel_id}/lessons/outline/{order}
pub async fn create_lesson_outline(
    headers: HeaderMap,
    Path((channel_id, order)): Path<(Uuid, i32)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<LessonOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let parent = require_parent(payload.activity_outline_id, "activity_outline_id")?;
    let outline = sqlx::query_as::<_, LessonOutline>(
        r#"
        INSERT INTO lesson_outlines (id, activity_outline_id, name, ord, lesson_count)
        VALUES ($1, $2, $3, $4, 0)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(parent)
    .bind(&payload.name)
    .bind(order)
    .fetch_one(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(created(
        outline,
        Msg::new("Lesson outline created", "Plan de leçon créé"),
    ))
}

/// PUT /studio/channel/content/{channel_id}/lessons/outline/{lesson_outline_id}
pub async fn update_lesson_outline(
    headers: HeaderMap,
    Path((channel_id, lesson_outline_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<OutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<LessonOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let outline = sqlx::query_as::<_, LessonOutline>(
        "UPDATE lesson_outlines SET name = $1, ord = $2 WHERE id = $3 RETURNING *",
    )
    .bind(&payload.name)
    .bind(payload.order)
    .bind(lesson_outline_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Lesson outline".to_string()))?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(
        outline,
        Msg::new("Lesson outline updated", "Plan de leçon mis à jour"),
    ))
}

/// DELETE /studio/channel/content/{channel_id}/lessons/outline/{lesson_outline_id}
/// Drops the outline together with its lesson bodies.
pub async fn delete_lesson_outline(
    headers: HeaderMap,
    Path((channel_id, lesson_outline_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    sqlx::query("DELETE FROM lessons WHERE lesson_outline_id = $1")
        .bind(lesson_outline_id)
        .execute(pool.as_ref())
        .await?;

    let result = sqlx::query("DELETE FROM lesson_outlines WHERE id = $1")
        .bind(lesson_outline_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Lesson outline".to_string()));
    }

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Lesson outline", "Plan de leçon")))
}

// ============================================================================
// Lesson content
// ============================================================================

/// POST /studio/channel/content/{channel_id}/lessons
/// Takes the full lesson list for one outline; with `lesson_id` only the
/// first payload entry is applied as an update. On create the outline's
/// lesson_count becomes the payload length.
pub async fn create_lessons(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<LessonQuery>,
    Json(payload): Json<Vec<LessonRequest>>,
) -> Result<(StatusCode, Json<Envelope<Vec<Lesson>>>), ApiError> {
    if payload.is_empty() {
        return Err(ApiError::Validation("payload".to_string()));
    }

    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let lessons = match query.lesson_id {
        Some(lesson_id) => {
            let first = &payload[0];
            let lesson = sqlx::query_as::<_, Lesson>(
                r#"
                UPDATE lessons SET
                    lesson_type = $1, text = $2, file_ids = $3, question_lesson = $4,
                    ord = $5, is_launched = $6, is_free = $7
                WHERE id = $8
                RETURNING *
                "#,
            )
            .bind(&first.lesson_type)
            .bind(&first.text)
            .bind(&first.file_ids)
            .bind(&first.question_lesson)
            .bind(first.order)
            .bind(first.is_launched)
            .bind(first.is_free)
            .bind(lesson_id)
            .fetch_optional(pool.as_ref())
            .await?
            .ok_or_else(|| ApiError::NotFound("Lesson".to_string()))?;
            vec![lesson]
        }
        None => {
            let outline_id = require_parent(payload[0].lesson_outline_id, "lesson_outline_id")?;
            let outline_exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM lesson_outlines WHERE id = $1")
                    .bind(outline_id)
                    .fetch_optional(pool.as_ref())
                    .await?;
            if outline_exists.is_none() {
                return Err(ApiError::NotFound("Lesson outline".to_string()));
            }

            let mut created_rows = Vec::with_capacity(payload.len());
            for lesson in &payload {
                let row = sqlx::query_as::<_, Lesson>(
                    r#"
                    INSERT INTO lessons (
                        id, lesson_outline_id, lesson_type, text, file_ids,
                        question_lesson, ord, is_launched, is_free
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(outline_id)
                .bind(&lesson.lesson_type)
                .bind(&lesson.text)
                .bind(&lesson.file_ids)
                .bind(&lesson.question_lesson)
                .bind(lesson.order)
                .bind(lesson.is_launched)
                .bind(lesson.is_free)
                .fetch_one(pool.as_ref())
                .await?;
                created_rows.push(row);
            }

            sqlx::query("UPDATE lesson_outlines SET lesson_count = $1 WHERE id = $2")
                .bind(payload.len() as i32)
                .bind(outline_id)
                .execute(pool.as_ref())
                .await?;

            created_rows
        }
    };

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(lessons, Msg::new("Lessons saved", "Leçons enregistrées")))
}

/// DELETE /studio/channel/content/{channel_id}/lessons/{lesson_id}
pub async fn delete_lesson(
    headers: HeaderMap,
    Path((channel_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let result = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(lesson_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Lesson".to_string()));
    }

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Lesson", "Leçon")))
}

// ============================================================================
// Quiz outlines
// ============================================================================

/// POST /studio/channel/content/{channel_id}/quizzes/outline/{order}
pub async fn create_quiz_outline(
    headers: HeaderMap,
    Path((channel_id, order)): Path<(Uuid, i32)>,
    Json(payload): Json<QuizOutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<QuizOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let parent = require_parent(payload.activity_outline_id, "activity_outline_id")?;
    let outline = sqlx::query_as::<_, QuizOutline>(
        r#"
        INSERT INTO quiz_outlines (id, activity_outline_id, name, ord, quiz_count, is_launched, is_free)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(parent)
    .bind(&payload.name)
    .bind(order)
    .bind(payload.quiz_count)
    .bind(payload.is_launched)
    .bind(payload.is_free)
    .fetch_one(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(created(
        outline,
        Msg::new("Quiz outline created", "Plan de quiz créé"),
    ))
}

/// PUT /studio/channel/content/{channel_id}/quizzes/outline/{quiz_outline_id}
pub async fn update_quiz_outline(
    headers: HeaderMap,
    Path((channel_id, quiz_outline_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<QuizOutlineRequest>,
) -> Result<(StatusCode, Json<Envelope<QuizOutline>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let outline = sqlx::query_as::<_, QuizOutline>(
        r#"
        UPDATE quiz_outlines SET
            name = $1, ord = $2, quiz_count = $3, is_launched = $4, is_free = $5
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(payload.order)
    .bind(payload.quiz_count)
    .bind(payload.is_launched)
    .bind(payload.is_free)
    .bind(quiz_outline_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Quiz outline".to_string()))?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(
        outline,
        Msg::new("Quiz outline updated", "Plan de quiz mis à jour"),
    ))
}

/// DELETE /studio/channel/content/{channel_id}/quizzes/outline/{quiz_outline_id}
/// Drops the outline together with its questions.
pub async fn delete_quiz_outline(
    headers: HeaderMap,
    Path((channel_id, quiz_outline_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let result = sqlx::query("DELETE FROM quiz_outlines WHERE id = $1")
        .bind(quiz_outline_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Quiz outline".to_string()));
    }

    sqlx::query("DELETE FROM questions WHERE quiz_outline_id = $1")
        .bind(quiz_outline_id)
        .execute(pool.as_ref())
        .await?;

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Quiz outline", "Plan de quiz")))
}

// ============================================================================
// Questions
// ============================================================================

/// POST /studio/channel/content/{channel_id}/questions
/// Same list semantics as lessons; on create the quiz outline's quiz_count
/// becomes the payload length.
pub async fn create_questions(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<QuestionQuery>,
    Json(payload): Json<Vec<QuestionRequest>>,
) -> Result<(StatusCode, Json<Envelope<Vec<Question>>>), ApiError> {
    if payload.is_empty() {
        return Err(ApiError::Validation("payload".to_string()));
    }

    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let questions = match query.quiz_id {
        Some(question_id) => {
            let first = &payload[0];
            let question = sqlx::query_as::<_, Question>(
                r#"
                UPDATE questions SET
                    time_limit = $1, points = $2, template = $3, generated_question = $4,
                    file_id = $5, check_function = $6, ord = $7, is_accepted = $8
                WHERE id = $9
                RETURNING *
                "#,
            )
            .bind(first.time_limit)
            .bind(first.points)
            .bind(&first.template)
            .bind(&first.generated_question)
            .bind(&first.file_id)
            .bind(&first.check_function)
            .bind(first.order)
            .bind(first.is_accepted)
            .bind(question_id)
            .fetch_optional(pool.as_ref())
            .await?
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;
            vec![question]
        }
        None => {
            let outline_id = require_parent(payload[0].quiz_outline_id, "quiz_outline_id")?;
            let outline_exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM quiz_outlines WHERE id = $1")
                    .bind(outline_id)
                    .fetch_optional(pool.as_ref())
                    .await?;
            if outline_exists.is_none() {
                return Err(ApiError::NotFound("Quiz outline".to_string()));
            }

            let mut created_rows = Vec::with_capacity(payload.len());
            for question in &payload {
                let row = sqlx::query_as::<_, Question>(
                    r#"
                    INSERT INTO questions (
                        id, quiz_outline_id, time_limit, points, template,
                        generated_question, file_id, check_function, ord, is_accepted
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(outline_id)
                .bind(question.time_limit)
                .bind(question.points)
                .bind(&question.template)
                .bind(&question.generated_question)
                .bind(&question.file_id)
                .bind(&question.check_function)
                .bind(question.order)
                .bind(question.is_accepted)
                .fetch_one(pool.as_ref())
                .await?;
                created_rows.push(row);
            }

            sqlx::query("UPDATE quiz_outlines SET quiz_count = $1 WHERE id = $2")
                .bind(payload.len() as i32)
                .bind(outline_id)
                .execute(pool.as_ref())
                .await?;

            created_rows
        }
    };

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(
        questions,
        Msg::new("Questions saved", "Questions enregistrées"),
    ))
}

/// DELETE /studio/channel/content/{channel_id}/questions/{question_id}
pub async fn delete_question(
    headers: HeaderMap,
    Path((channel_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    verify_channel(pool.as_ref(), channel_id).await?;

    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(question_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Question".to_string()));
    }

    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;
    Ok(ok(Value::Null, deleted_msg("Question", "Question")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn content_router() -> Router {
        Router::new()
            .route("/studio/channel/content/{channel_id}/lessons", post(create_lessons))
            .route(
                "/studio/channel/content/{channel_id}/questions",
                post(create_questions),
            )
            .route(
                "/studio/channel/content/{channel_id}/sections/outline/{order}",
                post(create_section_outline),
            )
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> StatusCode {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_empty_lesson_payload_is_rejected() {
        let uri = format!("/studio/channel/content/{}/lessons", Uuid::new_v4());
        let payload: Vec<LessonRequest> = vec![];
        let status = post_json(content_router(), &uri, &payload).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_empty_question_payload_is_rejected() {
        let uri = format!("/studio/channel/content/{}/questions", Uuid::new_v4());
        let payload: Vec<QuestionRequest> = vec![];
        let status = post_json(content_router(), &uri, &payload).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_outline_create_requires_auth() {
        let uri = format!("/studio/channel/content/{}/sections/outline/0", Uuid::new_v4());
        let payload = OutlineRequest {
            name: "Basics".to_string(),
            order: 0,
            section_outline_id: None,
            unit_outline_id: None,
            activity_outline_id: None,
        };
        let status = post_json(content_router(), &uri, &payload).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_lesson_request_defaults() {
        let json = r#"{"lesson_type": "text"}"#;
        let req: LessonRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.order, 0);
        assert!(req.file_ids.is_empty());
        assert!(!req.is_free);
    }
}
