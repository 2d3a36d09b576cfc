pub mod models;

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tokio::sync::OnceCell;

static DB_POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/learnhub".to_string()),
            max_connections: std::env::var("DB_POOL_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_POOL_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

pub async fn init_pool(config: Option<DbConfig>) -> Result<Arc<PgPool>, sqlx::Error> {
    let config = config.unwrap_or_default();

    tracing::info!("Initializing database connection pool...");
    tracing::debug!(
        "Database URL: {}",
        config.url.replace(
            |c: char| !c.is_ascii_alphanumeric() && c != ':' && c != '/' && c != '@' && c != '.',
            "*"
        )
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(3))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");

    let pool = Arc::new(pool);
    let _ = DB_POOL.set(pool.clone());

    Ok(pool)
}

pub fn get_pool() -> Option<Arc<PgPool>> {
    DB_POOL.get().cloned()
}

/// Pool accessor for handlers; maps the missing-pool case into the envelope.
pub fn require_pool() -> Result<Arc<PgPool>, crate::response::ApiError> {
    get_pool().ok_or_else(|| {
        crate::response::ApiError::Internal("Database pool not initialized".to_string())
    })
}

pub async fn health_check() -> Result<std::time::Duration, sqlx::Error> {
    let pool = get_pool()
        .ok_or_else(|| sqlx::Error::Configuration("Database pool not initialized".into()))?;

    let start = std::time::Instant::now();
    sqlx::query("SELECT 1").fetch_one(pool.as_ref()).await?;

    Ok(start.elapsed())
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'player',
            provider TEXT NOT NULL DEFAULT 'local',
            password_hash TEXT,
            google_id TEXT,
            first_name TEXT,
            last_name TEXT,
            bio TEXT,
            avatar_url TEXT,
            is_email_verified BOOLEAN NOT NULL DEFAULT false,
            verification_code TEXT,
            verification_code_created_at TIMESTAMPTZ,
            verification_code_expires_at TIMESTAMPTZ,
            access_token TEXT,
            access_token_expires_at TIMESTAMPTZ,
            refresh_token TEXT,
            refresh_token_expires_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_login TIMESTAMPTZ,
            UNIQUE (email, role)
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_google_id
            ON users(google_id) WHERE provider = 'google';
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS channel_infos (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            primary_language TEXT,
            target_language TEXT,
            avatar_file_id TEXT,
            cover_image_file_id TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            id UUID PRIMARY KEY,
            channel_id UUID UNIQUE NOT NULL,
            user_id UUID NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            section_count INTEGER NOT NULL DEFAULT 0,
            unit_count INTEGER NOT NULL DEFAULT 0,
            activity_count INTEGER NOT NULL DEFAULT 0,
            lesson_count INTEGER NOT NULL DEFAULT 0,
            quiz_count INTEGER NOT NULL DEFAULT 0,
            question_count INTEGER NOT NULL DEFAULT 0,
            total_lesson_quiz_count INTEGER NOT NULL DEFAULT 0,
            enrolled_students INTEGER NOT NULL DEFAULT 0,
            outline_content JSONB NOT NULL DEFAULT '{"sections": []}',
            published BOOLEAN NOT NULL DEFAULT false,
            channel_link TEXT,
            primary_language TEXT,
            target_language TEXT,
            avatar_file_id TEXT,
            cover_image_file_id TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE INDEX IF NOT EXISTS idx_channels_user_id ON channels(user_id);
        CREATE INDEX IF NOT EXISTS idx_channels_published ON channels(published)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS section_outlines (
            id UUID PRIMARY KEY,
            channel_id UUID NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS sections (
            id UUID PRIMARY KEY,
            section_outline_id UUID NOT NULL,
            name TEXT,
            description TEXT,
            file_id TEXT
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS unit_outlines (
            id UUID PRIMARY KEY,
            section_outline_id UUID NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS units (
            id UUID PRIMARY KEY,
            unit_outline_id UUID NOT NULL,
            name TEXT,
            description TEXT,
            file_id TEXT
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS activity_outlines (
            id UUID PRIMARY KEY,
            unit_outline_id UUID NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            lesson_quiz_count INTEGER NOT NULL DEFAULT 0,
            percentage INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS activities (
            id UUID PRIMARY KEY,
            activity_outline_id UUID NOT NULL,
            name TEXT,
            description TEXT,
            file_id TEXT,
            difficulty_level TEXT,
            is_launched BOOLEAN NOT NULL DEFAULT false
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS lesson_outlines (
            id UUID PRIMARY KEY,
            activity_outline_id UUID NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            lesson_count INTEGER NOT NULL DEFAULT 0,
            is_free BOOLEAN NOT NULL DEFAULT false,
            is_launched BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS lessons (
            id UUID PRIMARY KEY,
            lesson_outline_id UUID NOT NULL,
            lesson_type TEXT NOT NULL,
            text TEXT,
            file_ids TEXT[] NOT NULL DEFAULT '{}',
            question_lesson JSONB,
            ord INTEGER NOT NULL DEFAULT 0,
            is_launched BOOLEAN NOT NULL DEFAULT false,
            is_free BOOLEAN NOT NULL DEFAULT false
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS quiz_outlines (
            id UUID PRIMARY KEY,
            activity_outline_id UUID NOT NULL,
            name TEXT NOT NULL,
            ord INTEGER NOT NULL,
            quiz_count INTEGER NOT NULL DEFAULT 0,
            is_free BOOLEAN NOT NULL DEFAULT false,
            is_launched BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS questions (
            id UUID PRIMARY KEY,
            quiz_outline_id UUID NOT NULL,
            time_limit INTEGER,
            points INTEGER,
            template JSONB,
            generated_question JSONB,
            file_id TEXT,
            check_function TEXT,
            ord INTEGER NOT NULL DEFAULT 0,
            is_accepted BOOLEAN NOT NULL DEFAULT false
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE INDEX IF NOT EXISTS idx_section_outlines_channel ON section_outlines(channel_id, ord);
        CREATE INDEX IF NOT EXISTS idx_unit_outlines_parent ON unit_outlines(section_outline_id, ord);
        CREATE INDEX IF NOT EXISTS idx_activity_outlines_parent ON activity_outlines(unit_outline_id, ord);
        CREATE INDEX IF NOT EXISTS idx_lesson_outlines_parent ON lesson_outlines(activity_outline_id, ord);
        CREATE INDEX IF NOT EXISTS idx_quiz_outlines_parent ON quiz_outlines(activity_outline_id, ord);
        CREATE INDEX IF NOT EXISTS idx_lessons_parent ON lessons(lesson_outline_id, ord);
        CREATE INDEX IF NOT EXISTS idx_questions_parent ON questions(quiz_outline_id, ord)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS player_progress (
            id UUID PRIMARY KEY,
            player_id UUID NOT NULL,
            channel_id UUID NOT NULL,
            full_access BOOLEAN NOT NULL DEFAULT false,
            hearts_earned INTEGER NOT NULL DEFAULT 0,
            needs_review JSONB NOT NULL DEFAULT '[]',
            progress_level JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (player_id, channel_id)
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS tiers (
            id UUID PRIMARY KEY,
            channel_id UUID NOT NULL,
            name TEXT NOT NULL,
            price DOUBLE PRECISION NOT NULL DEFAULT 0,
            capacity INTEGER,
            billing_cycle TEXT NOT NULL DEFAULT 'Monthly',
            features TEXT[] NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS coupons (
            id UUID PRIMARY KEY,
            channel_id UUID NOT NULL,
            code TEXT NOT NULL,
            discount_type TEXT NOT NULL,
            discount_value DOUBLE PRECISION NOT NULL DEFAULT 0,
            max_uses INTEGER,
            expires_at TIMESTAMPTZ,
            is_active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (channel_id, code)
        );
        CREATE TABLE IF NOT EXISTS free_access (
            id UUID PRIMARY KEY,
            channel_id UUID UNIQUE NOT NULL,
            percentage INTEGER NOT NULL DEFAULT 0,
            percentage_outline JSONB NOT NULL DEFAULT '{}',
            free_activities JSONB NOT NULL DEFAULT '[]'
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS space_dirs (
            id UUID PRIMARY KEY,
            owner_id UUID NOT NULL,
            parent_id UUID,
            name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS space_files (
            id UUID PRIMARY KEY,
            owner_id UUID NOT NULL,
            directory_id UUID,
            name TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size BIGINT NOT NULL,
            stored_name TEXT NOT NULL,
            thumbnail_name TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_space_files_owner ON space_files(owner_id, directory_id);
        CREATE INDEX IF NOT EXISTS idx_space_dirs_owner ON space_dirs(owner_id, parent_id)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default_uses_env_or_fallback() {
        let config = DbConfig::default();
        assert!(config.max_connections >= 1);
        assert!(config.connect_timeout_secs >= 1);
        assert!(config.idle_timeout_secs >= 1);
        assert!(!config.url.is_empty());
    }

    #[test]
    fn test_get_pool_none_before_init() {
        let pool = get_pool();
        assert!(pool.is_none());
    }

    #[tokio::test]
    async fn test_health_check_fails_without_pool() {
        let result = health_check().await;
        assert!(result.is_err());
    }
}
