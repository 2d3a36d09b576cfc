//! Database Models - structs representing database tables (used by sqlx/serde).
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Platform user. One row per (email, role) pair: the same address may hold
/// both a creator and a player account.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub provider: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    #[serde(skip_serializing)]
    pub verification_code_created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub verification_code_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// The channel read-model. Stats columns and `outline_content` are rewritten
/// wholesale by the aggregation routine; `version` guards concurrent saves.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    /// Public channel identifier; equals the owning ChannelInfo id.
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub section_count: i32,
    pub unit_count: i32,
    pub activity_count: i32,
    pub lesson_count: i32,
    pub quiz_count: i32,
    pub question_count: i32,
    pub total_lesson_quiz_count: i32,
    pub enrolled_students: i32,
    pub outline_content: serde_json::Value,
    pub published: bool,
    pub channel_link: Option<String>,
    pub primary_language: Option<String>,
    pub target_language: Option<String>,
    pub avatar_file_id: Option<String>,
    pub cover_image_file_id: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Channel settings record, created alongside the channel.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    pub target_language: Option<String>,
    pub avatar_file_id: Option<String>,
    pub cover_image_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SectionOutline {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub ord: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub section_outline_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UnitOutline {
    pub id: Uuid,
    pub section_outline_id: Uuid,
    pub name: String,
    pub ord: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub unit_outline_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
}

/// Activity outline; `lesson_quiz_count` and `percentage` are maintained by
/// the free-access calculator.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityOutline {
    pub id: Uuid,
    pub unit_outline_id: Uuid,
    pub name: String,
    pub ord: i32,
    pub lesson_quiz_count: i32,
    pub percentage: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub activity_outline_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_id: Option<String>,
    pub difficulty_level: Option<String>,
    pub is_launched: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LessonOutline {
    pub id: Uuid,
    pub activity_outline_id: Uuid,
    pub name: String,
    pub ord: i32,
    pub lesson_count: i32,
    pub is_free: bool,
    pub is_launched: bool,
    pub created_at: DateTime<Utc>,
}

/// One authored lesson body. A lesson outline can own several, ordered.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub lesson_outline_id: Uuid,
    pub lesson_type: String,
    pub text: Option<String>,
    pub file_ids: Vec<String>,
    pub question_lesson: Option<serde_json::Value>,
    pub ord: i32,
    pub is_launched: bool,
    pub is_free: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizOutline {
    pub id: Uuid,
    pub activity_outline_id: Uuid,
    pub name: String,
    pub ord: i32,
    pub quiz_count: i32,
    pub is_free: bool,
    pub is_launched: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub quiz_outline_id: Uuid,
    pub time_limit: Option<i32>,
    pub points: Option<i32>,
    pub template: Option<serde_json::Value>,
    pub generated_question: Option<serde_json::Value>,
    pub file_id: Option<String>,
    pub check_function: Option<String>,
    pub ord: i32,
    pub is_accepted: bool,
}

/// Subscription + progress record, one per (player, channel).
/// `progress_level` mirrors the channel outline shape with per-node
/// `completed` flags, seeded false at subscribe time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlayerProgress {
    pub id: Uuid,
    pub player_id: Uuid,
    pub channel_id: Uuid,
    pub full_access: bool,
    pub hearts_earned: i32,
    pub needs_review: serde_json::Value,
    pub progress_level: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tier {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub name: String,
    pub price: f64,
    pub capacity: Option<i32>,
    pub billing_cycle: String,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: f64,
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Free-access settings; `percentage_outline` is the per-activity summary map
/// produced by the percentage calculator.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FreeAccess {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub percentage: i32,
    pub percentage_outline: serde_json::Value,
    pub free_activities: serde_json::Value,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SpaceFile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub directory_id: Option<Uuid>,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    /// On-disk filename under the space upload directory.
    pub stored_name: String,
    pub thumbnail_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SpaceDir {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
