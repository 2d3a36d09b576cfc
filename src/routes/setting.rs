/**
 * Studio Settings Routes
 * Channel lifecycle (create, duplicate, publish, update, delete) and the
 * monetization settings: tiers, free access, coupons.
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::{
    self,
    models::{Channel, ChannelInfo, Coupon, FreeAccess, Tier},
};
use crate::outline::{activity_percentages, aggregate_channel, percentage_outline};
use crate::response::{created, ok, ApiError, Envelope, Msg};
use crate::routes::auth::authenticate;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct ChannelInfoRequest {
    pub name: String,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    pub target_language: Option<String>,
    pub avatar_file_id: Option<String>,
    pub cover_image_file_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PublishRequest {
    pub published: bool,
    pub channel_link: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishState {
    pub channel_id: Uuid,
    pub published: bool,
    pub channel_link: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TierRequest {
    pub name: String,
    #[serde(default)]
    pub price: f64,
    pub capacity: Option<i32>,
    #[serde(default = "default_billing_cycle")]
    pub billing_cycle: String,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_billing_cycle() -> String {
    "Monthly".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FreeAccessRequest {
    pub percentage: i32,
    #[serde(default = "empty_array")]
    pub free_activities: Value,
}

fn empty_array() -> Value {
    json!([])
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CouponRequest {
    pub code: String,
    pub discount_type: String,
    #[serde(default)]
    pub discount_value: f64,
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Helpers
// ============================================================================

async fn fetch_channel_info(pool: &sqlx::PgPool, channel_id: Uuid) -> Result<ChannelInfo, ApiError> {
    sqlx::query_as::<_, ChannelInfo>("SELECT * FROM channel_infos WHERE id = $1")
        .bind(channel_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel".to_string()))
}

async fn fetch_owned_channel(
    pool: &sqlx::PgPool,
    channel_id: Uuid,
    user_id: Uuid,
) -> Result<Channel, ApiError> {
    sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE channel_id = $1 AND user_id = $2",
    )
    .bind(channel_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Channel".to_string()))
}

fn map_unique_violation(err: sqlx::Error, en: &str, fr: &str) -> ApiError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return ApiError::Conflict(Msg::new(en, fr));
        }
    }
    err.into()
}

/// Inserts an empty channel row pair for a new or duplicated channel.
async fn insert_channel_row(
    pool: &sqlx::PgPool,
    info: &ChannelInfo,
    stats_source: Option<&Channel>,
) -> Result<Channel, ApiError> {
    let (sections, units, activities, lessons, quizzes, questions, total) = match stats_source {
        Some(c) => (
            c.section_count,
            c.unit_count,
            c.activity_count,
            c.lesson_count,
            c.quiz_count,
            c.question_count,
            c.total_lesson_quiz_count,
        ),
        None => (0, 0, 0, 0, 0, 0, 0),
    };

    let channel = sqlx::query_as::<_, Channel>(
        r#"
        INSERT INTO channels (
            id, channel_id, user_id, name, description,
            section_count, unit_count, activity_count, lesson_count,
            quiz_count, question_count, total_lesson_quiz_count,
            primary_language, target_language, avatar_file_id, cover_image_file_id,
            published, channel_link
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, false, NULL)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(info.id)
    .bind(info.user_id)
    .bind(&info.name)
    .bind(&info.description)
    .bind(sections)
    .bind(units)
    .bind(activities)
    .bind(lessons)
    .bind(quizzes)
    .bind(questions)
    .bind(total)
    .bind(&info.primary_language)
    .bind(&info.target_language)
    .bind(&info.avatar_file_id)
    .bind(&info.cover_image_file_id)
    .fetch_one(pool)
    .await?;

    Ok(channel)
}

/// Id remapping for one channel duplication. Each entry pairs a source
/// outline id with the fresh id the copy will use and the already-remapped
/// parent id, grouped by level.
#[derive(Debug, Default)]
struct CopyPlan {
    sections: Vec<CopyNode>,
    units: Vec<CopyNode>,
    activities: Vec<CopyNode>,
    lesson_outlines: Vec<CopyNode>,
    quiz_outlines: Vec<CopyNode>,
}

#[derive(Debug)]
struct CopyNode {
    source_id: Uuid,
    new_id: Uuid,
    new_parent_id: Uuid,
}

fn node_id(value: &Value) -> Option<Uuid> {
    value["id"].as_str().and_then(|s| Uuid::parse_str(s).ok())
}

fn plan_node(level: &mut Vec<CopyNode>, source_id: Uuid, new_parent_id: Uuid) -> Uuid {
    let new_id = Uuid::new_v4();
    level.push(CopyNode {
        source_id,
        new_id,
        new_parent_id,
    });
    new_id
}

/// Walks the denormalized outline snapshot (not the live tables) and assigns
/// a fresh id to every outline node it references. Rows the snapshot does not
/// reference are not copied; entries with malformed ids are skipped.
fn snapshot_copy_plan(outline_content: &Value, new_channel_id: Uuid) -> CopyPlan {
    let empty = Vec::new();
    let mut plan = CopyPlan::default();

    for section in outline_content["sections"].as_array().unwrap_or(&empty) {
        let Some(section_id) = node_id(section) else {
            continue;
        };
        let new_section_id = plan_node(&mut plan.sections, section_id, new_channel_id);

        for unit in section["units"].as_array().unwrap_or(&empty) {
            let Some(unit_id) = node_id(unit) else {
                continue;
            };
            let new_unit_id = plan_node(&mut plan.units, unit_id, new_section_id);

            for activity in unit["activities"].as_array().unwrap_or(&empty) {
                let Some(activity_id) = node_id(activity) else {
                    continue;
                };
                let new_activity_id = plan_node(&mut plan.activities, activity_id, new_unit_id);

                for entry in activity["content"].as_array().unwrap_or(&empty) {
                    let Some(entry_id) = node_id(entry) else {
                        continue;
                    };
                    if entry["type"].as_str() == Some("quiz") {
                        plan_node(&mut plan.quiz_outlines, entry_id, new_activity_id);
                    } else {
                        plan_node(&mut plan.lesson_outlines, entry_id, new_activity_id);
                    }
                }
            }
        }
    }

    plan
}

/// Re-creates every authoring row the plan references, re-fetching each
/// source row live and rewiring parent ids to the remapped ones. Rows that
/// vanished since the snapshot was built insert nothing and are skipped.
async fn copy_channel_tree(pool: &sqlx::PgPool, plan: &CopyPlan) -> Result<(), ApiError> {
    for node in &plan.sections {
        sqlx::query(
            r#"
            INSERT INTO section_outlines (id, channel_id, name, ord)
            SELECT $1, $2, name, ord FROM section_outlines WHERE id = $3
            "#,
        )
        .bind(node.new_id)
        .bind(node.new_parent_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO sections (id, section_outline_id, name, description, file_id)
            SELECT gen_random_uuid(), $1, name, description, file_id
            FROM sections WHERE section_outline_id = $2
            "#,
        )
        .bind(node.new_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;
    }

    for node in &plan.units {
        sqlx::query(
            r#"
            INSERT INTO unit_outlines (id, section_outline_id, name, ord)
            SELECT $1, $2, name, ord FROM unit_outlines WHERE id = $3
            "#,
        )
        .bind(node.new_id)
        .bind(node.new_parent_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO units (id, unit_outline_id, name, description, file_id)
            SELECT gen_random_uuid(), $1, name, description, file_id
            FROM units WHERE unit_outline_id = $2
            "#,
        )
        .bind(node.new_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;
    }

    for node in &plan.activities {
        sqlx::query(
            r#"
            INSERT INTO activity_outlines (id, unit_outline_id, name, ord, lesson_quiz_count, percentage)
            SELECT $1, $2, name, ord, lesson_quiz_count, percentage
            FROM activity_outlines WHERE id = $3
            "#,
        )
        .bind(node.new_id)
        .bind(node.new_parent_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO activities (id, activity_outline_id, name, description, file_id, difficulty_level, is_launched)
            SELECT gen_random_uuid(), $1, name, description, file_id, difficulty_level, is_launched
            FROM activities WHERE activity_outline_id = $2
            "#,
        )
        .bind(node.new_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;
    }

    for node in &plan.lesson_outlines {
        sqlx::query(
            r#"
            INSERT INTO lesson_outlines (id, activity_outline_id, name, ord, lesson_count, is_free, is_launched)
            SELECT $1, $2, name, ord, lesson_count, is_free, is_launched
            FROM lesson_outlines WHERE id = $3
            "#,
        )
        .bind(node.new_id)
        .bind(node.new_parent_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO lessons (
                id, lesson_outline_id, lesson_type, text, file_ids,
                question_lesson, ord, is_launched, is_free
            )
            SELECT gen_random_uuid(), $1, lesson_type, text, file_ids,
                   question_lesson, ord, is_launched, is_free
            FROM lessons WHERE lesson_outline_id = $2
            "#,
        )
        .bind(node.new_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;
    }

    for node in &plan.quiz_outlines {
        sqlx::query(
            r#"
            INSERT INTO quiz_outlines (id, activity_outline_id, name, ord, quiz_count, is_free, is_launched)
            SELECT $1, $2, name, ord, quiz_count, is_free, is_launched
            FROM quiz_outlines WHERE id = $3
            "#,
        )
        .bind(node.new_id)
        .bind(node.new_parent_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO questions (
                id, quiz_outline_id, time_limit, points, template,
                generated_question, file_id, check_function, ord, is_accepted
            )
            SELECT gen_random_uuid(), $1, time_limit, points, template,
                   generated_question, file_id, check_function, ord, is_accepted
            FROM questions WHERE quiz_outline_id = $2
            "#,
        )
        .bind(node.new_id)
        .bind(node.source_id)
        .execute(pool)
        .await?;
    }

    Ok(())
}

// ============================================================================
// Channel lifecycle
// ============================================================================

/// POST /studio/channel/setting
/// Create a channel: settings record, channel row, default free access.
pub async fn create_channel(
    headers: HeaderMap,
    Json(payload): Json<ChannelInfoRequest>,
) -> Result<(StatusCode, Json<Envelope<ChannelInfo>>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name".to_string()));
    }

    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let info = sqlx::query_as::<_, ChannelInfo>(
        r#"
        INSERT INTO channel_infos (
            id, user_id, name, description,
            primary_language, target_language, avatar_file_id, cover_image_file_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.primary_language)
    .bind(&payload.target_language)
    .bind(&payload.avatar_file_id)
    .bind(&payload.cover_image_file_id)
    .fetch_one(pool.as_ref())
    .await?;

    insert_channel_row(pool.as_ref(), &info, None).await?;

    sqlx::query(
        "INSERT INTO free_access (id, channel_id, percentage, percentage_outline, free_activities) VALUES ($1, $2, 0, '{}', '[]')",
    )
    .bind(Uuid::new_v4())
    .bind(info.id)
    .execute(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), info.id, user.id).await?;

    Ok(created(info, Msg::new("Channel created", "Chaîne créée")))
}

/// POST /studio/channel/setting/{channel_id}/duplicate
/// Deep copy: settings, channel row, free access, tiers and coupons (codes
/// prefixed to stay unique). Authoring rows are copied by walking the stored
/// outline snapshot, so nodes created after the last aggregation are left out.
pub async fn duplicate_channel(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<ChannelInfo>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let source_info = fetch_channel_info(pool.as_ref(), channel_id).await?;
    let source_channel = fetch_owned_channel(pool.as_ref(), channel_id, user.id).await?;

    let new_info = sqlx::query_as::<_, ChannelInfo>(
        r#"
        INSERT INTO channel_infos (
            id, user_id, name, description,
            primary_language, target_language, avatar_file_id, cover_image_file_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(format!("Copy of {}", source_info.name))
    .bind(&source_info.description)
    .bind(&source_info.primary_language)
    .bind(&source_info.target_language)
    .bind(&source_info.avatar_file_id)
    .bind(&source_info.cover_image_file_id)
    .fetch_one(pool.as_ref())
    .await?;

    insert_channel_row(pool.as_ref(), &new_info, Some(&source_channel)).await?;

    let plan = snapshot_copy_plan(&source_channel.outline_content, new_info.id);
    copy_channel_tree(pool.as_ref(), &plan).await?;

    sqlx::query(
        r#"
        INSERT INTO free_access (id, channel_id, percentage, percentage_outline, free_activities)
        SELECT $1, $2, percentage, percentage_outline, free_activities
        FROM free_access WHERE channel_id = $3
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new_info.id)
    .bind(channel_id)
    .execute(pool.as_ref())
    .await?;

    sqlx::query(
        r#"
        INSERT INTO tiers (id, channel_id, name, price, capacity, billing_cycle, features)
        SELECT gen_random_uuid(), $1, name, price, capacity, billing_cycle, features
        FROM tiers WHERE channel_id = $2
        "#,
    )
    .bind(new_info.id)
    .bind(channel_id)
    .execute(pool.as_ref())
    .await?;

    sqlx::query(
        r#"
        INSERT INTO coupons (id, channel_id, code, discount_type, discount_value, max_uses, expires_at, is_active)
        SELECT gen_random_uuid(), $1, 'COPY_' || code, discount_type, discount_value, max_uses, expires_at, is_active
        FROM coupons WHERE channel_id = $2
        "#,
    )
    .bind(new_info.id)
    .bind(channel_id)
    .execute(pool.as_ref())
    .await?;

    aggregate_channel(pool.as_ref(), new_info.id, user.id).await?;

    Ok(created(
        new_info,
        Msg::new("Channel duplicated", "Chaîne dupliquée"),
    ))
}

/// PATCH /studio/channel/setting/{channel_id}/publish
pub async fn publish_channel(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<PublishRequest>,
) -> Result<(StatusCode, Json<Envelope<PublishState>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    fetch_channel_info(pool.as_ref(), channel_id).await?;

    sqlx::query("UPDATE channels SET published = $1, channel_link = $2 WHERE channel_id = $3")
        .bind(payload.published)
        .bind(&payload.channel_link)
        .bind(channel_id)
        .execute(pool.as_ref())
        .await?;

    let channel = aggregate_channel(pool.as_ref(), channel_id, user.id).await?;

    Ok(ok(
        PublishState {
            channel_id,
            published: channel.published,
            channel_link: channel.channel_link,
        },
        Msg::new("Publish state updated", "État de publication mis à jour"),
    ))
}

/// GET /studio/channel/setting/{channel_id}/publish
pub async fn get_publish_channel(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<PublishState>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    fetch_channel_info(pool.as_ref(), channel_id).await?;

    let channel = fetch_owned_channel(pool.as_ref(), channel_id, user.id).await?;

    Ok(ok(
        PublishState {
            channel_id,
            published: channel.published,
            channel_link: channel.channel_link,
        },
        Msg::new("Publish state retrieved", "État de publication récupéré"),
    ))
}

/// PUT /studio/channel/setting/{channel_id}/info
pub async fn update_channel_info(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<ChannelInfoRequest>,
) -> Result<(StatusCode, Json<Envelope<ChannelInfo>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let info = sqlx::query_as::<_, ChannelInfo>(
        r#"
        UPDATE channel_infos SET
            name = $1,
            description = COALESCE($2, description),
            primary_language = COALESCE($3, primary_language),
            target_language = COALESCE($4, target_language),
            avatar_file_id = COALESCE($5, avatar_file_id),
            cover_image_file_id = COALESCE($6, cover_image_file_id)
        WHERE id = $7 AND user_id = $8
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.primary_language)
    .bind(&payload.target_language)
    .bind(&payload.avatar_file_id)
    .bind(&payload.cover_image_file_id)
    .bind(channel_id)
    .bind(user.id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Channel".to_string()))?;

    // Mirror the new display fields onto the channel read-model.
    aggregate_channel(pool.as_ref(), channel_id, user.id).await?;

    Ok(ok(
        info,
        Msg::new("Channel info updated", "Informations de chaîne mises à jour"),
    ))
}

/// DELETE /studio/channel/setting/{channel_id}/info
/// Removes the channel and everything hanging off it: the authoring tree,
/// monetization settings and player subscriptions.
pub async fn delete_channel(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let info: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM channel_infos WHERE id = $1 AND user_id = $2")
            .bind(channel_id)
            .bind(user.id)
            .fetch_optional(pool.as_ref())
            .await?;
    if info.is_none() {
        return Err(ApiError::NotFound("Channel".to_string()));
    }
    fetch_owned_channel(pool.as_ref(), channel_id, user.id).await?;

    // Leaf tables first, walking up the outline hierarchy.
    sqlx::query(
        r#"
        DELETE FROM questions WHERE quiz_outline_id IN (
            SELECT qo.id FROM quiz_outlines qo
            JOIN activity_outlines ao ON qo.activity_outline_id = ao.id
            JOIN unit_outlines uo ON ao.unit_outline_id = uo.id
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
    )
    .bind(channel_id)
    .execute(pool.as_ref())
    .await?;

    sqlx::query(
        r#"
        DELETE FROM lessons WHERE lesson_outline_id IN (
            SELECT lo.id FROM lesson_outlines lo
            JOIN activity_outlines ao ON lo.activity_outline_id = ao.id
            JOIN unit_outlines uo ON ao.unit_outline_id = uo.id
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
    )
    .bind(channel_id)
    .execute(pool.as_ref())
    .await?;

    let cascade_deletes = [
        r#"
        DELETE FROM quiz_outlines WHERE activity_outline_id IN (
            SELECT ao.id FROM activity_outlines ao
            JOIN unit_outlines uo ON ao.unit_outline_id = uo.id
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
        r#"
        DELETE FROM lesson_outlines WHERE activity_outline_id IN (
            SELECT ao.id FROM activity_outlines ao
            JOIN unit_outlines uo ON ao.unit_outline_id = uo.id
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
        r#"
        DELETE FROM activities WHERE activity_outline_id IN (
            SELECT ao.id FROM activity_outlines ao
            JOIN unit_outlines uo ON ao.unit_outline_id = uo.id
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
        r#"
        DELETE FROM activity_outlines WHERE unit_outline_id IN (
            SELECT uo.id FROM unit_outlines uo
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
        r#"
        DELETE FROM units WHERE unit_outline_id IN (
            SELECT uo.id FROM unit_outlines uo
            JOIN section_outlines so ON uo.section_outline_id = so.id
            WHERE so.channel_id = $1
        )
        "#,
        "DELETE FROM unit_outlines WHERE section_outline_id IN (SELECT id FROM section_outlines WHERE channel_id = $1)",
        "DELETE FROM sections WHERE section_outline_id IN (SELECT id FROM section_outlines WHERE channel_id = $1)",
        "DELETE FROM section_outlines WHERE channel_id = $1",
        "DELETE FROM tiers WHERE channel_id = $1",
        "DELETE FROM coupons WHERE channel_id = $1",
        "DELETE FROM free_access WHERE channel_id = $1",
        "DELETE FROM player_progress WHERE channel_id = $1",
        "DELETE FROM channels WHERE channel_id = $1",
        "DELETE FROM channel_infos WHERE id = $1",
    ];

    for statement in cascade_deletes {
        sqlx::query(statement)
            .bind(channel_id)
            .execute(pool.as_ref())
            .await?;
    }

    Ok(ok(
        Value::Null,
        Msg::new(
            "Channel and all related content deleted successfully",
            "Chaîne et tout le contenu associé supprimés avec succès",
        ),
    ))
}

// ============================================================================
// Tiers
// ============================================================================

/// POST /studio/channel/setting/{channel_id}/tier
pub async fn create_tier(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<TierRequest>,
) -> Result<(StatusCode, Json<Envelope<Tier>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let owned: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM channel_infos WHERE id = $1 AND user_id = $2")
            .bind(channel_id)
            .bind(user.id)
            .fetch_optional(pool.as_ref())
            .await?;
    if owned.is_none() {
        return Err(ApiError::NotFound("Channel".to_string()));
    }

    let tier = sqlx::query_as::<_, Tier>(
        r#"
        INSERT INTO tiers (id, channel_id, name, price, capacity, billing_cycle, features)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(channel_id)
    .bind(&payload.name)
    .bind(payload.price)
    .bind(payload.capacity)
    .bind(&payload.billing_cycle)
    .bind(&payload.features)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(created(tier, Msg::new("Tier created", "Palier créé")))
}

/// GET /studio/channel/setting/{channel_id}/tier
pub async fn get_all_tiers(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Vec<Tier>>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;
    fetch_channel_info(pool.as_ref(), channel_id).await?;

    let tiers = sqlx::query_as::<_, Tier>(
        "SELECT * FROM tiers WHERE channel_id = $1 ORDER BY price",
    )
    .bind(channel_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(ok(tiers, Msg::new("Tiers retrieved", "Paliers récupérés")))
}

/// PUT /studio/channel/setting/{channel_id}/tier/{tier_id}
pub async fn update_tier(
    headers: HeaderMap,
    Path((channel_id, tier_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TierRequest>,
) -> Result<(StatusCode, Json<Envelope<Tier>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let tier = sqlx::query_as::<_, Tier>(
        r#"
        UPDATE tiers SET
            name = $1, price = $2, capacity = $3, billing_cycle = $4, features = $5
        WHERE id = $6 AND channel_id = $7
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(payload.price)
    .bind(payload.capacity)
    .bind(&payload.billing_cycle)
    .bind(&payload.features)
    .bind(tier_id)
    .bind(channel_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| ApiError::NotFound("Tier".to_string()))?;

    Ok(ok(tier, Msg::new("Tier updated", "Palier mis à jour")))
}

/// DELETE /studio/channel/setting/{channel_id}/tier/{tier_id}
pub async fn delete_tier(
    headers: HeaderMap,
    Path((channel_id, tier_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let result = sqlx::query("DELETE FROM tiers WHERE id = $1 AND channel_id = $2")
        .bind(tier_id)
        .bind(channel_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Tier".to_string()));
    }

    Ok(ok(
        Value::Null,
        Msg::new("Tier deleted successfully", "Palier supprimé avec succès"),
    ))
}

// ============================================================================
// Free access
// ============================================================================

/// GET /studio/channel/setting/{channel_id}/free-access/percentage
/// Recompute the cumulative share of each activity from the channel
/// snapshot, push the counts back onto the activity outlines and store the
/// result on the free-access record.
pub async fn get_activity_percentage(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<FreeAccess>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE channel_id = $1")
        .bind(channel_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel".to_string()))?;

    let shares = activity_percentages(&channel.outline_content, channel.total_lesson_quiz_count);

    for share in &shares {
        if let Ok(activity_id) = Uuid::parse_str(&share.id) {
            sqlx::query(
                "UPDATE activity_outlines SET lesson_quiz_count = $1, percentage = $2 WHERE id = $3",
            )
            .bind(share.count as i32)
            .bind(share.percentage as i32)
            .bind(activity_id)
            .execute(pool.as_ref())
            .await?;
        }
    }

    let outline = percentage_outline(&shares);
    let free_access = sqlx::query_as::<_, FreeAccess>(
        r#"
        INSERT INTO free_access (id, channel_id, percentage, percentage_outline, free_activities)
        VALUES ($1, $2, 0, $3, '[]')
        ON CONFLICT (channel_id) DO UPDATE SET percentage_outline = EXCLUDED.percentage_outline
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(channel_id)
    .bind(&outline)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ok(
        free_access,
        Msg::new(
            "Activity percentages computed",
            "Pourcentages d'activité calculés",
        ),
    ))
}

/// PUT /studio/channel/setting/{channel_id}/free-access
pub async fn update_free_access(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<FreeAccessRequest>,
) -> Result<(StatusCode, Json<Envelope<FreeAccess>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;
    fetch_owned_channel(pool.as_ref(), channel_id, user.id).await?;

    let free_access = sqlx::query_as::<_, FreeAccess>(
        r#"
        INSERT INTO free_access (id, channel_id, percentage, percentage_outline, free_activities)
        VALUES ($1, $2, $3, '{}', $4)
        ON CONFLICT (channel_id) DO UPDATE SET
            percentage = EXCLUDED.percentage,
            free_activities = EXCLUDED.free_activities
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(channel_id)
    .bind(payload.percentage)
    .bind(&payload.free_activities)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ok(
        free_access,
        Msg::new("Free access updated", "Accès gratuit mis à jour"),
    ))
}

/// GET /studio/channel/setting/{channel_id}/free-access
pub async fn get_free_access(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<FreeAccess>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let free_access = sqlx::query_as::<_, FreeAccess>(
        r#"
        INSERT INTO free_access (id, channel_id, percentage, percentage_outline, free_activities)
        VALUES ($1, $2, 0, '{}', '[]')
        ON CONFLICT (channel_id) DO UPDATE SET channel_id = EXCLUDED.channel_id
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(channel_id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ok(
        free_access,
        Msg::new("Free access retrieved", "Accès gratuit récupéré"),
    ))
}

// ============================================================================
// Coupons
// ============================================================================

/// POST /studio/channel/setting/{channel_id}/coupon
pub async fn create_coupon(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<CouponRequest>,
) -> Result<(StatusCode, Json<Envelope<Coupon>>), ApiError> {
    if payload.code.trim().is_empty() {
        return Err(ApiError::Validation("code".to_string()));
    }

    authenticate(&headers).await?;
    let pool = db::require_pool()?;
    fetch_channel_info(pool.as_ref(), channel_id).await?;

    let coupon = sqlx::query_as::<_, Coupon>(
        r#"
        INSERT INTO coupons (id, channel_id, code, discount_type, discount_value, max_uses, expires_at, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(channel_id)
    .bind(&payload.code)
    .bind(&payload.discount_type)
    .bind(payload.discount_value)
    .bind(payload.max_uses)
    .bind(payload.expires_at)
    .bind(payload.is_active)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        map_unique_violation(
            e,
            "A coupon with this code already exists",
            "Un coupon avec ce code existe déjà",
        )
    })?;

    Ok(created(coupon, Msg::new("Coupon created", "Coupon créé")))
}

/// GET /studio/channel/setting/{channel_id}/coupon
pub async fn get_coupons(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Vec<Coupon>>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let coupons = sqlx::query_as::<_, Coupon>(
        "SELECT * FROM coupons WHERE channel_id = $1 ORDER BY created_at",
    )
    .bind(channel_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(ok(coupons, Msg::new("Coupons retrieved", "Coupons récupérés")))
}

/// PUT /studio/channel/setting/{channel_id}/coupon/{coupon_id}
pub async fn update_coupon(
    headers: HeaderMap,
    Path((channel_id, coupon_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<CouponRequest>,
) -> Result<(StatusCode, Json<Envelope<Coupon>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let coupon = sqlx::query_as::<_, Coupon>(
        r#"
        UPDATE coupons SET
            code = $1, discount_type = $2, discount_value = $3,
            max_uses = $4, expires_at = $5, is_active = $6
        WHERE id = $7 AND channel_id = $8
        RETURNING *
        "#,
    )
    .bind(&payload.code)
    .bind(&payload.discount_type)
    .bind(payload.discount_value)
    .bind(payload.max_uses)
    .bind(payload.expires_at)
    .bind(payload.is_active)
    .bind(coupon_id)
    .bind(channel_id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| {
        map_unique_violation(
            e,
            "A coupon with this code already exists",
            "Un coupon avec ce code existe déjà",
        )
    })?
    .ok_or_else(|| ApiError::NotFound("Coupon".to_string()))?;

    Ok(ok(coupon, Msg::new("Coupon updated", "Coupon mis à jour")))
}

/// DELETE /studio/channel/setting/{channel_id}/coupon/{coupon_id}
pub async fn delete_coupon(
    headers: HeaderMap,
    Path((channel_id, coupon_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let result = sqlx::query("DELETE FROM coupons WHERE id = $1 AND channel_id = $2")
        .bind(coupon_id)
        .bind(channel_id)
        .execute(pool.as_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Coupon".to_string()));
    }

    Ok(ok(
        Value::Null,
        Msg::new("Coupon deleted successfully", "Coupon supprimé avec succès"),
    ))
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

    fn setting_router() -> Router {
        Router::new()
            .route("/studio/channel/setting", post(create_channel))
            .route("/studio/channel/setting/{channel_id}/coupon", post(create_coupon))
    }

    async fn post_json(app: Router, uri: &str, json: &impl serde::Serialize) -> StatusCode {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_create_channel_requires_name() {
        let status = post_json(
            setting_router(),
            "/studio/channel/setting",
            &ChannelInfoRequest {
                name: "  ".to_string(),
                description: None,
                primary_language: None,
                target_language: None,
                avatar_file_id: None,
                cover_image_file_id: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_create_coupon_requires_code() {
        let uri = format!("/studio/channel/setting/{}/coupon", Uuid::new_v4());
        let status = post_json(
            setting_router(),
            &uri,
            &CouponRequest {
                code: "".to_string(),
                discount_type: "percentage".to_string(),
                discount_value: 10.0,
                max_uses: None,
                expires_at: None,
                is_active: true,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    fn sample_snapshot() -> (Value, Vec<Uuid>) {
        let ids: Vec<Uuid> = (0..7).map(|_| Uuid::new_v4()).collect();
        let snapshot = json!({
            "sections": [
                {
                    "id": ids[0],
                    "units": [
                        {
                            "id": ids[1],
                            "activities": [
                                {
                                    "id": ids[2],
                                    "content": [
                                        { "id": ids[3], "type": "lesson" },
                                        { "id": ids[4], "type": "quiz" },
                                    ],
                                },
                                { "id": ids[5], "content": [] },
                            ],
                        },
                    ],
                },
                { "id": ids[6], "units": [] },
            ],
        });
        (snapshot, ids)
    }

    #[test]
    fn test_copy_plan_matches_snapshot_counts() {
        let (snapshot, _) = sample_snapshot();
        let plan = snapshot_copy_plan(&snapshot, Uuid::new_v4());
        assert_eq!(plan.sections.len(), 2);
        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.activities.len(), 2);
        assert_eq!(plan.lesson_outlines.len(), 1);
        assert_eq!(plan.quiz_outlines.len(), 1);
    }

    #[test]
    fn test_copy_plan_assigns_fresh_distinct_ids() {
        let (snapshot, source_ids) = sample_snapshot();
        let plan = snapshot_copy_plan(&snapshot, Uuid::new_v4());

        let levels = [
            &plan.sections,
            &plan.units,
            &plan.activities,
            &plan.lesson_outlines,
            &plan.quiz_outlines,
        ];
        let new_ids: Vec<Uuid> = levels
            .iter()
            .flat_map(|level| level.iter().map(|node| node.new_id))
            .collect();

        assert_eq!(new_ids.len(), source_ids.len());
        for new_id in &new_ids {
            assert!(!source_ids.contains(new_id));
        }
        let unique: std::collections::HashSet<_> = new_ids.iter().collect();
        assert_eq!(unique.len(), new_ids.len());
    }

    #[test]
    fn test_copy_plan_rewires_parents_to_new_ids() {
        let (snapshot, _) = sample_snapshot();
        let new_channel_id = Uuid::new_v4();
        let plan = snapshot_copy_plan(&snapshot, new_channel_id);

        for section in &plan.sections {
            assert_eq!(section.new_parent_id, new_channel_id);
        }
        assert_eq!(plan.units[0].new_parent_id, plan.sections[0].new_id);
        for activity in &plan.activities {
            assert_eq!(activity.new_parent_id, plan.units[0].new_id);
        }
        assert_eq!(plan.lesson_outlines[0].new_parent_id, plan.activities[0].new_id);
        assert_eq!(plan.quiz_outlines[0].new_parent_id, plan.activities[0].new_id);
    }

    #[test]
    fn test_copy_plan_skips_malformed_ids() {
        let snapshot = json!({
            "sections": [
                { "id": "not-a-uuid", "units": [] },
                { "id": Uuid::new_v4(), "units": [] },
            ],
        });
        let plan = snapshot_copy_plan(&snapshot, Uuid::new_v4());
        assert_eq!(plan.sections.len(), 1);
    }

    #[test]
    fn test_tier_request_defaults() {
        let req: TierRequest = serde_json::from_str(r#"{"name": "Basic"}"#).unwrap();
        assert_eq!(req.billing_cycle, "Monthly");
        assert_eq!(req.price, 0.0);
        assert!(req.features.is_empty());
    }

    #[test]
    fn test_coupon_request_defaults_active() {
        let req: CouponRequest =
            serde_json::from_str(r#"{"code": "SAVE10", "discount_type": "percentage"}"#).unwrap();
        assert!(req.is_active);
        assert!(req.expires_at.is_none());
    }
}
