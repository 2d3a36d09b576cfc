/**
 * Public Authentication Routes
 * Email/password accounts with verification codes, Google sign-in,
 * JWT access/refresh tokens stored on the user row.
 */
use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, models::User};
use crate::response::{created, ok, ApiError, Envelope, Msg};

// ============================================================================
// Configuration
// ============================================================================

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());

    /// Expected audience for Google ID tokens
    pub static ref GOOGLE_CLIENT_ID: String = std::env::var("GOOGLE_CLIENT_ID")
        .unwrap_or_default();

    static ref EMAIL_REGEX: regex::Regex =
        regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Access token expiry in minutes
const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 30;

/// Refresh token expiry in days
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Refresh token expiry when the client asked to be remembered
const REMEMBER_ME_EXPIRY_DAYS: i64 = 30;

/// Email verification codes live for 24 hours
const VERIFICATION_CODE_EXPIRY_HOURS: i64 = 24;

/// Password reset codes live for one hour
const RESET_CODE_EXPIRY_HOURS: i64 = 1;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,        // User ID
    pub role: String,       // player | creator | admin
    pub token_type: String, // access | refresh
    pub exp: i64,           // Expiry timestamp
    pub iat: i64,           // Issued at timestamp
}

/// Token block returned inside auth envelopes
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub token_type: String,
}

impl TokenData {
    /// Placeholder block for responses issued before the email is verified.
    fn empty() -> Self {
        Self {
            access_token: String::new(),
            access_token_expires_at: Utc::now(),
            refresh_token: String::new(),
            refresh_token_expires_at: Utc::now(),
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthData {
    pub token: TokenData,
    pub user: User,
}

// ============================================================================
// Request Types
// ============================================================================

fn default_role() -> String {
    "player".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub verification_code: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResendVerificationRequest {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SignInRequest {
    pub username_or_email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GoogleAuthRequest {
    pub client_id: String,
    pub credential: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PasswordResetRequest {
    pub username_or_email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdatePasswordRequest {
    pub username_or_email: String,
    pub verification_code: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// Shape of Google's tokeninfo answer, only the fields we read.
#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    sub: String,
    email: String,
    exp: String,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn valid_role(role: &str) -> bool {
    matches!(role, "player" | "creator" | "admin")
}

/// Six decimal digits, zero-padded.
fn generate_verification_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

fn create_token(
    user: &User,
    token_type: &str,
    ttl: Duration,
) -> Result<(String, DateTime<Utc>), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + ttl;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        token_type: token_type.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )?;
    Ok((token, exp))
}

pub fn decode_claims(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Resolves the caller from the Authorization header. The token must be a
/// live access token and must match the one stored on the user row, so a
/// logout invalidates it immediately.
pub async fn authenticate(headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = decode_claims(&token)?;
    if claims.token_type != "access" {
        return Err(ApiError::Unauthorized("Not an access token".to_string()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthorized("Malformed token subject".to_string()))?;

    let pool = db::require_pool()?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    if user.access_token.as_deref() != Some(token.as_str()) {
        return Err(ApiError::Unauthorized("Token has been revoked".to_string()));
    }

    Ok(user)
}

/// Hash a password off the async executor; bcrypt is CPU-intensive.
async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)
}

async fn verify_password(password: String, hashed: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify(&password, &hashed))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)
}

/// Issues a fresh access/refresh pair, stores it on the user row and stamps
/// the login time.
async fn issue_tokens(
    pool: &sqlx::PgPool,
    user: &User,
    remember_me: bool,
) -> Result<TokenData, ApiError> {
    let refresh_days = if remember_me {
        REMEMBER_ME_EXPIRY_DAYS
    } else {
        REFRESH_TOKEN_EXPIRY_DAYS
    };

    let (access_token, access_expires) =
        create_token(user, "access", Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES))?;
    let (refresh_token, refresh_expires) =
        create_token(user, "refresh", Duration::days(refresh_days))?;

    sqlx::query(
        r#"
        UPDATE users SET
            access_token = $1, access_token_expires_at = $2,
            refresh_token = $3, refresh_token_expires_at = $4,
            last_login = now()
        WHERE id = $5
        "#,
    )
    .bind(&access_token)
    .bind(access_expires)
    .bind(&refresh_token)
    .bind(refresh_expires)
    .bind(user.id)
    .execute(pool)
    .await?;

    Ok(TokenData {
        access_token,
        access_token_expires_at: access_expires,
        refresh_token,
        refresh_token_expires_at: refresh_expires,
        token_type: "bearer".to_string(),
    })
}

async fn find_by_email_and_role(
    pool: &sqlx::PgPool,
    email: &str,
    role: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND role = $2")
        .bind(email)
        .bind(role)
        .fetch_optional(pool)
        .await
}

async fn fetch_user(pool: &sqlx::PgPool, id: Uuid) -> Result<User, ApiError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /public/auth/sign-up
/// Create a local account and store a verification code on it.
pub async fn sign_up(
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    if !EMAIL_REGEX.is_match(&payload.email) {
        return Err(ApiError::Validation("email".to_string()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation("password".to_string()));
    }
    if !valid_role(&payload.role) {
        return Err(ApiError::Validation("role".to_string()));
    }

    let pool = db::require_pool()?;

    if find_by_email_and_role(pool.as_ref(), &payload.email, &payload.role)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(Msg::new(
            "User already exists",
            "L'utilisateur existe déjà",
        )));
    }

    let password_hash = hash_password(payload.password.clone()).await?;
    let verification_code = generate_verification_code();
    let code_expires = Utc::now() + Duration::hours(VERIFICATION_CODE_EXPIRY_HOURS);

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (
            id, email, role, provider, password_hash, first_name, last_name,
            is_email_verified, verification_code,
            verification_code_created_at, verification_code_expires_at
        )
        VALUES ($1, $2, $3, 'local', $4, $5, $6, false, $7, now(), $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.email)
    .bind(&payload.role)
    .bind(&password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&verification_code)
    .bind(code_expires)
    .fetch_one(pool.as_ref())
    .await?;

    // Mail delivery is handled out of band; the code is only traced for
    // local development.
    tracing::debug!(email = %user.email, code = %verification_code, "verification code issued");

    Ok(created(
        AuthData {
            token: TokenData::empty(),
            user,
        },
        Msg::new(
            "Account created. Please check your email for verification code.",
            "Compte créé. Veuillez vérifier votre email pour le code de vérification.",
        ),
    ))
}

/// POST /public/auth/verify-email
/// Consume the verification code; on success the user is signed in.
pub async fn verify_email(
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    let pool = db::require_pool()?;

    let user = find_by_email_and_role(pool.as_ref(), &payload.email, &payload.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    if user.is_email_verified {
        return Err(ApiError::Conflict(Msg::new(
            "Email is already verified",
            "L'email est déjà vérifié",
        )));
    }

    let (code, expires_at) = match (&user.verification_code, user.verification_code_expires_at) {
        (Some(code), Some(expires)) => (code, expires),
        _ => {
            return Err(ApiError::domain(
                "No verification code found. Please request a new one.",
                "Aucun code de vérification trouvé. Veuillez en demander un nouveau.",
            ))
        }
    };

    if Utc::now() > expires_at {
        return Err(ApiError::domain(
            "Verification code has expired. Please request a new one.",
            "Le code de vérification a expiré. Veuillez en demander un nouveau.",
        ));
    }

    if code != &payload.verification_code {
        return Err(ApiError::Unauthorized(
            "Invalid verification code".to_string(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE users SET
            is_email_verified = true,
            verification_code = NULL,
            verification_code_created_at = NULL,
            verification_code_expires_at = NULL
        WHERE id = $1
        "#,
    )
    .bind(user.id)
    .execute(pool.as_ref())
    .await?;

    let token = issue_tokens(pool.as_ref(), &user, false).await?;
    let user = fetch_user(pool.as_ref(), user.id).await?;

    Ok(ok(
        AuthData { token, user },
        Msg::new(
            "Email verified successfully. You are now signed in.",
            "Email vérifié avec succès. Vous êtes maintenant connecté.",
        ),
    ))
}

/// POST /public/auth/resend-verification
pub async fn resend_verification(
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    let pool = db::require_pool()?;

    let user = find_by_email_and_role(pool.as_ref(), &payload.email, &payload.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    let verification_code = generate_verification_code();
    let code_expires = Utc::now() + Duration::hours(VERIFICATION_CODE_EXPIRY_HOURS);

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            verification_code = $1,
            verification_code_created_at = now(),
            verification_code_expires_at = $2
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(&verification_code)
    .bind(code_expires)
    .bind(user.id)
    .fetch_one(pool.as_ref())
    .await?;

    tracing::debug!(email = %user.email, code = %verification_code, "verification code reissued");

    Ok(ok(
        AuthData {
            token: TokenData::empty(),
            user,
        },
        Msg::new(
            "A new verification code was sent to your email.",
            "Un nouveau code de vérification a été envoyé à votre email.",
        ),
    ))
}

/// POST /public/auth/sign-in
pub async fn sign_in(
    Json(payload): Json<SignInRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    if payload.username_or_email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("credentials".to_string()));
    }

    let pool = db::require_pool()?;

    let user = find_by_email_and_role(pool.as_ref(), &payload.username_or_email, &payload.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    let hashed = user
        .password_hash
        .clone()
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;
    if !verify_password(payload.password, hashed).await? {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    if !user.is_email_verified {
        return Err(ApiError::Forbidden(Msg::new(
            "Please verify your email first",
            "Veuillez d'abord vérifier votre email",
        )));
    }

    let token = issue_tokens(pool.as_ref(), &user, payload.remember_me).await?;
    let user = fetch_user(pool.as_ref(), user.id).await?;

    Ok(ok(
        AuthData { token, user },
        Msg::new("Logged in successfully", "Connexion réussie"),
    ))
}

/// POST /public/auth/google-token
/// Validate a Google ID token against the tokeninfo endpoint and sign the
/// user in, creating an auto-verified account on first contact.
pub async fn google_token(
    Json(payload): Json<GoogleAuthRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    if !valid_role(&payload.role) {
        return Err(ApiError::Validation("role".to_string()));
    }

    let client = reqwest::Client::new();
    let info: GoogleTokenInfo = client
        .get(GOOGLE_TOKENINFO_URL)
        .query(&[("id_token", payload.credential.as_str())])
        .send()
        .await
        .map_err(|e| ApiError::Unauthorized(format!("Google token verification failed: {}", e)))?
        .error_for_status()
        .map_err(|_| ApiError::Unauthorized("Invalid Google token".to_string()))?
        .json()
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid Google token".to_string()))?;

    let expected_audience = if GOOGLE_CLIENT_ID.is_empty() {
        payload.client_id.as_str()
    } else {
        GOOGLE_CLIENT_ID.as_str()
    };
    if info.aud != expected_audience {
        return Err(ApiError::Unauthorized(
            "Google token audience mismatch".to_string(),
        ));
    }
    let exp: i64 = info.exp.parse().unwrap_or(0);
    if exp < Utc::now().timestamp() {
        return Err(ApiError::Unauthorized("Google token expired".to_string()));
    }

    let pool = db::require_pool()?;

    let existing = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE (LOWER(email) = LOWER($1) AND role = $2) OR google_id = $3
        LIMIT 1
        "#,
    )
    .bind(&info.email)
    .bind(&payload.role)
    .bind(&info.sub)
    .fetch_optional(pool.as_ref())
    .await?;

    let user = match existing {
        Some(user) => user,
        None => {
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (
                    id, email, role, provider, google_id,
                    first_name, last_name, avatar_url, is_email_verified
                )
                VALUES ($1, $2, $3, 'google', $4, $5, $6, $7, true)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&info.email)
            .bind(&payload.role)
            .bind(&info.sub)
            .bind(&info.given_name)
            .bind(&info.family_name)
            .bind(&info.picture)
            .fetch_one(pool.as_ref())
            .await?
        }
    };

    let token = issue_tokens(pool.as_ref(), &user, false).await?;
    let user = fetch_user(pool.as_ref(), user.id).await?;

    Ok(ok(
        AuthData { token, user },
        Msg::new("Logged in successfully", "Connexion réussie"),
    ))
}

/// POST /public/auth/refresh-token
/// Exchange a live refresh token for a new access token. The refresh token
/// itself is kept.
pub async fn refresh_token(
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    let pool = db::require_pool()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE refresh_token = $1")
        .bind(&payload.refresh_token)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

    let claims = decode_claims(&payload.refresh_token)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token".to_string()))?;
    if claims.token_type != "refresh" {
        return Err(ApiError::Unauthorized("Invalid refresh token".to_string()));
    }

    let (access_token, access_expires) =
        create_token(&user, "access", Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES))?;

    sqlx::query("UPDATE users SET access_token = $1, access_token_expires_at = $2 WHERE id = $3")
        .bind(&access_token)
        .bind(access_expires)
        .bind(user.id)
        .execute(pool.as_ref())
        .await?;

    let refresh_expires = user.refresh_token_expires_at.unwrap_or_else(Utc::now);
    let token = TokenData {
        access_token,
        access_token_expires_at: access_expires,
        refresh_token: payload.refresh_token,
        refresh_token_expires_at: refresh_expires,
        token_type: "bearer".to_string(),
    };
    let user = fetch_user(pool.as_ref(), user.id).await?;

    Ok(ok(
        AuthData { token, user },
        Msg::new(
            "Access token refreshed successfully",
            "Token d'accès actualisé avec succès",
        ),
    ))
}

/// POST /public/auth/logout
pub async fn logout(
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    sqlx::query(
        r#"
        UPDATE users SET
            access_token = NULL, access_token_expires_at = NULL,
            refresh_token = NULL, refresh_token_expires_at = NULL
        WHERE id = $1
        "#,
    )
    .bind(user.id)
    .execute(pool.as_ref())
    .await?;

    Ok(ok(
        serde_json::Value::Null,
        Msg::new("Logged out successfully", "Déconnexion réussie"),
    ))
}

/// POST /public/auth/send-password-reset-code
pub async fn send_password_reset_code(
    Json(payload): Json<PasswordResetRequest>,
) -> Result<(StatusCode, Json<Envelope<serde_json::Value>>), ApiError> {
    let pool = db::require_pool()?;

    let user = find_by_email_and_role(pool.as_ref(), &payload.username_or_email, &payload.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    let reset_code = generate_verification_code();
    let code_expires = Utc::now() + Duration::hours(RESET_CODE_EXPIRY_HOURS);

    sqlx::query(
        r#"
        UPDATE users SET
            verification_code = $1,
            verification_code_created_at = now(),
            verification_code_expires_at = $2
        WHERE id = $3
        "#,
    )
    .bind(&reset_code)
    .bind(code_expires)
    .bind(user.id)
    .execute(pool.as_ref())
    .await?;

    tracing::debug!(email = %user.email, code = %reset_code, "password reset code issued");

    Ok(ok(
        serde_json::Value::Null,
        Msg::new(
            "Password reset verification code sent to your email",
            "Code de vérification de réinitialisation envoyé à votre email",
        ),
    ))
}

/// POST /public/auth/update-password
/// Set a new password using a reset code, then sign the user in.
pub async fn update_password(
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>), ApiError> {
    if payload.password.len() < 8 {
        return Err(ApiError::Validation("password".to_string()));
    }

    let pool = db::require_pool()?;

    let user = find_by_email_and_role(pool.as_ref(), &payload.username_or_email, &payload.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User".to_string()))?;

    let (code, expires_at) = match (&user.verification_code, user.verification_code_expires_at) {
        (Some(code), Some(expires)) => (code, expires),
        _ => {
            return Err(ApiError::domain(
                "No reset code found. Please request a new one.",
                "Aucun code de réinitialisation trouvé. Veuillez en demander un nouveau.",
            ))
        }
    };

    if Utc::now() > expires_at {
        return Err(ApiError::domain(
            "Reset code has expired. Please request a new one.",
            "Le code de réinitialisation a expiré. Veuillez en demander un nouveau.",
        ));
    }

    if code != &payload.verification_code {
        return Err(ApiError::domain(
            "Invalid reset code",
            "Code de réinitialisation invalide",
        ));
    }

    let password_hash = hash_password(payload.password).await?;

    sqlx::query(
        r#"
        UPDATE users SET
            password_hash = $1,
            verification_code = NULL,
            verification_code_created_at = NULL,
            verification_code_expires_at = NULL
        WHERE id = $2
        "#,
    )
    .bind(&password_hash)
    .bind(user.id)
    .execute(pool.as_ref())
    .await?;

    let token = issue_tokens(pool.as_ref(), &user, false).await?;
    let user = fetch_user(pool.as_ref(), user.id).await?;

    Ok(ok(
        AuthData { token, user },
        Msg::new(
            "Password updated successfully.",
            "Mot de passe mis à jour avec succès.",
        ),
    ))
}

/// GET /public/auth/me
pub async fn get_current_user(
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Envelope<User>>), ApiError> {
    let user = authenticate(&headers).await?;
    Ok(ok(
        user,
        Msg::new("User profile retrieved", "Profil utilisateur récupéré"),
    ))
}

/// PATCH /public/auth/me
pub async fn update_current_user(
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<(StatusCode, Json<Envelope<User>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            first_name = COALESCE($1, first_name),
            last_name = COALESCE($2, last_name),
            bio = COALESCE($3, bio),
            avatar_url = COALESCE($4, avatar_url)
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.bio)
    .bind(&payload.avatar_url)
    .bind(user.id)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ok(
        user,
        Msg::new(
            "Profile updated successfully",
            "Profil mis à jour avec succès",
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
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn auth_router() -> Router {
        Router::new()
            .route("/public/auth/sign-up", post(sign_up))
            .route("/public/auth/sign-in", post(sign_in))
            .route("/public/auth/google-token", post(google_token))
            .route("/public/auth/update-password", post(update_password))
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            role: "creator".to_string(),
            provider: "local".to_string(),
            password_hash: None,
            google_id: None,
            first_name: None,
            last_name: None,
            bio: None,
            avatar_url: None,
            is_email_verified: true,
            verification_code: None,
            verification_code_created_at: None,
            verification_code_expires_at: None,
            access_token: None,
            access_token_expires_at: None,
            refresh_token: None,
            refresh_token_expires_at: None,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_verification_code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_token_round_trip_keeps_claims() {
        let user = test_user();
        let (token, _) = create_token(&user, "access", Duration::minutes(5)).unwrap();
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "creator");
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn test_decode_claims_rejects_garbage() {
        assert!(decode_claims("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_decode_claims_rejects_expired_token() {
        let user = test_user();
        let (token, _) = create_token(&user, "access", Duration::minutes(-10)).unwrap();
        assert!(decode_claims(&token).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));

        headers.insert("authorization", "Basic abc123".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[tokio::test]
    async fn test_sign_up_rejects_invalid_email() {
        let (status, _) = post_json(
            auth_router(),
            "/public/auth/sign-up",
            &SignUpRequest {
                email: "not-an-email".to_string(),
                password: "longenough".to_string(),
                first_name: None,
                last_name: None,
                role: "player".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_sign_up_rejects_short_password() {
        let (status, _) = post_json(
            auth_router(),
            "/public/auth/sign-up",
            &SignUpRequest {
                email: "a@b.io".to_string(),
                password: "short".to_string(),
                first_name: None,
                last_name: None,
                role: "player".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_sign_up_rejects_unknown_role() {
        let (status, _) = post_json(
            auth_router(),
            "/public/auth/sign-up",
            &SignUpRequest {
                email: "a@b.io".to_string(),
                password: "longenough".to_string(),
                first_name: None,
                last_name: None,
                role: "superuser".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_sign_in_rejects_empty_credentials() {
        let (status, body) = post_json(
            auth_router(),
            "/public/auth/sign-in",
            &SignInRequest {
                username_or_email: "".to_string(),
                password: "".to_string(),
                role: "player".to_string(),
                remember_me: false,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["message"]["fr"].is_string());
    }

    #[tokio::test]
    async fn test_update_password_rejects_short_password() {
        let (status, _) = post_json(
            auth_router(),
            "/public/auth/update-password",
            &UpdatePasswordRequest {
                username_or_email: "a@b.io".to_string(),
                verification_code: "123456".to_string(),
                password: "short".to_string(),
                role: "player".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_google_token_rejects_unknown_role() {
        let (status, _) = post_json(
            auth_router(),
            "/public/auth/google-token",
            &GoogleAuthRequest {
                client_id: "cid".to_string(),
                credential: "cred".to_string(),
                role: "superuser".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
