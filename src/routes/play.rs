/**
 * Player Routes
 * Channel discovery for players, subscriptions and per-channel progress
 * tracking. Subscribing clones the channel outline into an empty progress
 * tree the player completes node by node.
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::{
    self,
    models::{Channel, Coupon, PlayerProgress, Tier},
};
use crate::outline::build_progress_level;
use crate::response::{created, ok, ApiError, Envelope, Msg};
use crate::routes::auth::authenticate;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub full_access: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProgressUpdateRequest {
    pub progress_level: Value,
    #[serde(default)]
    pub hearts_earned: i32,
}

// ============================================================================
// Helpers
// ============================================================================

fn channel_card(channel: &Channel) -> Value {
    json!({
        "channel_id": channel.channel_id,
        "name": channel.name,
        "description": channel.description,
        "avatar_file_id": channel.avatar_file_id,
        "cover_image_file_id": channel.cover_image_file_id,
        "section_count": channel.section_count,
        "lesson_count": channel.lesson_count,
        "quiz_count": channel.quiz_count,
        "enrolled_students": channel.enrolled_students,
    })
}

async fn fetch_progress(
    pool: &sqlx::PgPool,
    player_id: Uuid,
    channel_id: Uuid,
) -> Result<Option<PlayerProgress>, sqlx::Error> {
    sqlx::query_as::<_, PlayerProgress>(
        "SELECT * FROM player_progress WHERE player_id = $1 AND channel_id = $2",
    )
    .bind(player_id)
    .bind(channel_id)
    .fetch_optional(pool)
    .await
}

// ============================================================================
// Discovery
// ============================================================================

/// GET /play/user/channels/{creator_id}
/// Published channels of one creator.
pub async fn get_creator_channels(
    headers: HeaderMap,
    Path(creator_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Vec<Value>>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let channels = sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE user_id = $1 AND published = true ORDER BY created_at",
    )
    .bind(creator_id)
    .fetch_all(pool.as_ref())
    .await?;

    let cards = channels.iter().map(channel_card).collect();

    Ok(ok(
        cards,
        Msg::new("Channels fetched successfully", "Chaînes récupérées avec succès"),
    ))
}

/// GET /play/user/channels_tier_coupons/{creator_id}
/// One creator's published channels, each with its tiers and coupons.
/// Backs the subscription page.
pub async fn get_channel_subscription_info(
    headers: HeaderMap,
    Path(creator_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Vec<Value>>>), ApiError> {
    authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let channels = sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE user_id = $1 AND published = true ORDER BY created_at",
    )
    .bind(creator_id)
    .fetch_all(pool.as_ref())
    .await?;

    let mut result = Vec::with_capacity(channels.len());
    for channel in &channels {
        let tiers = sqlx::query_as::<_, Tier>(
            "SELECT * FROM tiers WHERE channel_id = $1 ORDER BY price",
        )
        .bind(channel.channel_id)
        .fetch_all(pool.as_ref())
        .await?;

        let coupons = sqlx::query_as::<_, Coupon>(
            "SELECT * FROM coupons WHERE channel_id = $1 AND is_active = true",
        )
        .bind(channel.channel_id)
        .fetch_all(pool.as_ref())
        .await?;

        result.push(json!({
            "channel": {
                "id": channel.channel_id,
                "name": channel.name,
                "description": channel.description,
                "creator_id": creator_id,
            },
            "tiers": tiers,
            "coupons": coupons,
        }));
    }

    Ok(ok(
        result,
        Msg::new(
            "Channels and subscription info fetched successfully",
            "Chaînes et informations d'abonnement récupérées avec succès",
        ),
    ))
}

// ============================================================================
// Subscriptions
// ============================================================================

/// GET /play/user/subscriptions
/// Every published channel the player is subscribed to, with subscription
/// details attached.
pub async fn get_subscriptions(
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Envelope<Vec<Value>>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let subscriptions = sqlx::query_as::<_, PlayerProgress>(
        "SELECT * FROM player_progress WHERE player_id = $1",
    )
    .bind(user.id)
    .fetch_all(pool.as_ref())
    .await?;

    let mut result = Vec::with_capacity(subscriptions.len());
    for subscription in &subscriptions {
        let channel = sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE channel_id = $1 AND published = true",
        )
        .bind(subscription.channel_id)
        .fetch_optional(pool.as_ref())
        .await?;

        if let Some(channel) = channel {
            let mut card = channel_card(&channel);
            card["subscription_details"] = json!({
                "full_access": subscription.full_access,
                "hearts_earned": subscription.hearts_earned,
                "subscribed_at": subscription.created_at,
            });
            result.push(card);
        }
    }

    let count = result.len();
    Ok(ok(
        result,
        Msg::new(
            &format!("Found {count} subscribed channels"),
            &format!("{count} chaînes abonnées trouvées"),
        ),
    ))
}

/// POST /play/user/subscribe/{channel_id}
/// Creates the player's progress record for the channel, cloned from the
/// published outline with every node uncompleted. Subscribing again only
/// refreshes the access level.
pub async fn subscribe_to_channel(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    if user.role != "player" {
        return Err(ApiError::NotFound("Player".to_string()));
    }
    let pool = db::require_pool()?;

    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE channel_id = $1")
        .bind(channel_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel".to_string()))?;

    let progress = match fetch_progress(pool.as_ref(), user.id, channel_id).await? {
        Some(existing) => {
            sqlx::query_as::<_, PlayerProgress>(
                "UPDATE player_progress SET full_access = $1, updated_at = $2 WHERE id = $3 RETURNING *",
            )
            .bind(payload.full_access)
            .bind(Utc::now())
            .bind(existing.id)
            .fetch_one(pool.as_ref())
            .await?
        }
        None => {
            let progress_level = build_progress_level(&channel.outline_content);
            let inserted = sqlx::query_as::<_, PlayerProgress>(
                r#"
                INSERT INTO player_progress (id, player_id, channel_id, full_access, progress_level, hearts_earned)
                VALUES ($1, $2, $3, $4, $5, 0)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(channel_id)
            .bind(payload.full_access)
            .bind(&progress_level)
            .fetch_one(pool.as_ref())
            .await?;

            sqlx::query(
                "UPDATE channels SET enrolled_students = enrolled_students + 1 WHERE channel_id = $1",
            )
            .bind(channel_id)
            .execute(pool.as_ref())
            .await?;

            inserted
        }
    };

    Ok(created(
        json!({
            "subscription": {
                "subscription_id": progress.id,
                "player_id": progress.player_id,
                "channel_id": progress.channel_id,
                "full_access": progress.full_access,
                "created_at": progress.created_at,
            },
            "progress_id": progress.id,
        }),
        Msg::new(
            "User subscribed to channel successfully",
            "Utilisateur abonné à la chaîne avec succès",
        ),
    ))
}

// ============================================================================
// Progress
// ============================================================================

/// GET /play/user/content_progress/{channel_id}
pub async fn get_content_progress(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<PlayerProgress>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let progress = fetch_progress(pool.as_ref(), user.id, channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User progress".to_string()))?;

    Ok(ok(
        progress,
        Msg::new(
            "User progress fetched successfully",
            "Progression de l'utilisateur récupérée avec succès",
        ),
    ))
}

/// POST /play/user/content_progress/{channel_id}
/// Replaces the stored progress tree with the client's copy.
pub async fn update_content_progress(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Json(payload): Json<ProgressUpdateRequest>,
) -> Result<(StatusCode, Json<Envelope<PlayerProgress>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let existing = fetch_progress(pool.as_ref(), user.id, channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User progress".to_string()))?;

    let progress = sqlx::query_as::<_, PlayerProgress>(
        r#"
        UPDATE player_progress
        SET progress_level = $1, hearts_earned = $2, updated_at = $3
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(&payload.progress_level)
    .bind(payload.hearts_earned)
    .bind(Utc::now())
    .bind(existing.id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ok(
        progress,
        Msg::new(
            "User progress updated successfully",
            "Progression de l'utilisateur mise à jour avec succès",
        ),
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
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn play_router() -> Router {
        Router::new()
            .route("/play/user/subscriptions", get(get_subscriptions))
            .route("/play/user/subscribe/{channel_id}", post(subscribe_to_channel))
    }

    #[tokio::test]
    async fn test_subscriptions_require_auth() {
        let req = Request::get("/play/user/subscriptions").body(Body::empty()).unwrap();
        let res = play_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_subscribe_rejects_garbage_token() {
        let uri = format!("/play/user/subscribe/{}", Uuid::new_v4());
        let req = Request::post(uri)
            .header("authorization", "Bearer not-a-token")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"full_access": true}"#))
            .unwrap();
        let res = play_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_subscribe_request_defaults_to_limited_access() {
        let req: SubscribeRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.full_access);
    }

    #[test]
    fn test_progress_update_defaults_hearts() {
        let req: ProgressUpdateRequest =
            serde_json::from_str(r#"{"progress_level": {"sections": []}}"#).unwrap();
        assert_eq!(req.hearts_earned, 0);
    }
}
