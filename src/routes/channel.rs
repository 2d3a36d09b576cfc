/**
 * Studio Channel Routes
 * Channel listing, the aggregated channel view, and AI-assisted
 * question/text generation.
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::{self, models::Channel};
use crate::outline::aggregate_channel;
use crate::response::{ok, ApiError, Envelope, Msg};
use crate::routes::auth::authenticate;

lazy_static::lazy_static! {
    static ref OPENAI_API_URL: String = std::env::var("OPENAI_API_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    static ref OPENAI_API_KEY: String = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    static ref OPENAI_MODEL: String = std::env::var("OPENAI_MODEL")
        .unwrap_or_else(|_| "gpt-4o".to_string());
}

/// Generation and revision retry limit.
const MAX_GENERATION_ATTEMPTS: u32 = 3;

const MODULE_TYPES: [&str; 4] = ["lesson", "activity", "unit", "section"];

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateQuestionsRequest {
    pub initial_prompt: String,
    /// JSON template the generated questions must follow.
    pub template: Value,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
}

fn default_difficulty() -> String {
    "intermediate".to_string()
}

fn default_num_questions() -> usize {
    1
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GeneratePromptRequest {
    pub text: String,
    pub module_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Serializes a channel without its outline snapshot, for list views.
fn channel_summary(channel: &Channel) -> Value {
    json!({
        "name": channel.name,
        "channel_id": channel.channel_id,
        "description": channel.description,
        "section_count": channel.section_count,
        "unit_count": channel.unit_count,
        "activity_count": channel.activity_count,
        "lesson_count": channel.lesson_count,
        "quiz_count": channel.quiz_count,
        "question_count": channel.question_count,
        "enrolled_students": channel.enrolled_students,
        "last_updated": channel.updated_at,
        "published": channel.published,
        "channel_link": channel.channel_link,
        "primary_language": channel.primary_language,
        "target_language": channel.target_language,
        "avatar_file_id": channel.avatar_file_id,
        "cover_image_file_id": channel.cover_image_file_id,
    })
}

/// Strip ```json fences the model sometimes wraps its answer in.
fn clean_json_fences(raw: &str) -> String {
    let mut cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim().to_string()
}

/// Parses a model answer into exactly `expected` questions.
fn parse_question_array(raw: &str, expected: usize) -> Result<Vec<Value>, String> {
    let cleaned = clean_json_fences(raw);
    let parsed: Value =
        serde_json::from_str(&cleaned).map_err(|e| format!("invalid JSON: {}", e))?;
    let questions = parsed
        .as_array()
        .ok_or_else(|| "expected a JSON array".to_string())?;
    if questions.len() != expected {
        return Err(format!(
            "expected {} questions, got {}",
            expected,
            questions.len()
        ));
    }
    Ok(questions.clone())
}

async fn chat_completion(system_msg: &str, user_msg: &str) -> Result<String, ApiError> {
    let client = reqwest::Client::new();
    let response: ChatCompletionResponse = client
        .post(OPENAI_API_URL.as_str())
        .bearer_auth(OPENAI_API_KEY.as_str())
        .json(&json!({
            "model": OPENAI_MODEL.as_str(),
            "messages": [
                {"role": "system", "content": system_msg},
                {"role": "user", "content": user_msg}
            ],
            "temperature": 0.3
        }))
        .send()
        .await
        .map_err(ApiError::internal)?
        .error_for_status()
        .map_err(ApiError::internal)?
        .json()
        .await
        .map_err(ApiError::internal)?;

    response
        .choices
        .first()
        .map(|c| c.message.content.trim().to_string())
        .ok_or_else(|| ApiError::Internal("model returned no choices".to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /studio/channel/all_my_channels
pub async fn all_my_channels(
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Envelope<Vec<Value>>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let channels = sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE user_id = $1 ORDER BY created_at",
    )
    .bind(user.id)
    .fetch_all(pool.as_ref())
    .await?;

    let summaries = channels.iter().map(channel_summary).collect();

    Ok(ok(
        summaries,
        Msg::new("Channels retrieved", "Chaînes récupérées"),
    ))
}

/// GET /studio/channel/{channel_id}
/// Rebuilds the outline snapshot from the authoring rows before answering.
pub async fn get_channel_by_id(
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    let user = authenticate(&headers).await?;
    let pool = db::require_pool()?;

    let channel = aggregate_channel(pool.as_ref(), channel_id, user.id).await?;

    let mut body = channel_summary(&channel);
    body["id"] = json!(channel.id);
    body["outline_content"] = channel.outline_content.clone();

    Ok(ok(body, Msg::new("Channel retrieved", "Chaîne récupérée")))
}

/// POST /studio/channel/generate-questions
/// Ask the model for a question set matching the supplied template. Invalid
/// or miscounted answers are retried up to three times.
pub async fn generate_questions(
    headers: HeaderMap,
    Json(payload): Json<GenerateQuestionsRequest>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    authenticate(&headers).await?;

    if payload.initial_prompt.is_empty() {
        return Err(ApiError::Validation("initial_prompt".to_string()));
    }
    if payload.num_questions == 0 {
        return Err(ApiError::Validation("num_questions".to_string()));
    }

    let system_msg = "You are a question generator for an educational app. \
        ALWAYS output valid JSON matching the EXACT template. \
        Do NOT add any explanations or text outside the JSON.";
    let user_msg = format!(
        "Concept: {}\nDifficulty: {}\nNumber of questions: {}\n\
         Follow this JSON template exactly: {}\n\
         Return a JSON array of {} questions.",
        payload.initial_prompt,
        payload.difficulty,
        payload.num_questions,
        payload.template,
        payload.num_questions
    );

    let mut last_error = String::new();
    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        let raw = chat_completion(system_msg, &user_msg).await?;
        match parse_question_array(&raw, payload.num_questions) {
            Ok(questions) => {
                return Ok(ok(
                    json!({
                        "difficulty": payload.difficulty,
                        "initial_prompt": payload.initial_prompt,
                        "num_questions": questions.len(),
                        "questions": questions,
                    }),
                    Msg::new("Questions generated", "Questions générées"),
                ));
            }
            Err(err) => {
                tracing::warn!(attempt, %err, "question generation answer rejected");
                last_error = err;
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    Err(ApiError::Internal(format!(
        "Failed to generate valid output after {} attempts: {}",
        MAX_GENERATION_ATTEMPTS, last_error
    )))
}

/// POST /studio/channel/generate-prompt
/// Revise a piece of authored text for its surrounding module type.
pub async fn generate_prompt(
    headers: HeaderMap,
    Json(payload): Json<GeneratePromptRequest>,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiError> {
    authenticate(&headers).await?;

    if !MODULE_TYPES.contains(&payload.module_type.as_str()) {
        return Err(ApiError::Validation("module_type".to_string()));
    }
    if payload.text.is_empty() {
        return Err(ApiError::Validation("text".to_string()));
    }

    let system_msg = "You are an expert educational content editor and grammar specialist. \
        Your task is to revise text to be grammatically correct, contextually appropriate, \
        and optimized for educational use. \
        Return ONLY the revised text without any explanations or additional formatting.";
    let user_msg = format!(
        "Please revise the following text for use in a {} text box:\n\n\
         Original Text: \"{}\"\n\n\
         Requirements:\n\
         1. Correct all grammatical errors\n\
         2. Improve clarity and readability\n\
         3. Adjust tone and style to match the {} context\n\
         4. Maintain the original meaning and intent\n\n\
         Return only the revised text:",
        payload.module_type, payload.text, payload.module_type
    );

    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        let revised = chat_completion(system_msg, &user_msg).await?;
        let revised = revised.trim_matches(['"', '\'']).to_string();
        if revised.len() >= 10 {
            return Ok(ok(
                json!({
                    "original_text": payload.text,
                    "module_type": payload.module_type,
                    "revised_text": revised,
                }),
                Msg::new("Text revised", "Texte révisé"),
            ));
        }
        tracing::warn!(attempt, "revised text too short, retrying");
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    Err(ApiError::Internal(format!(
        "Failed to revise {} text after {} attempts",
        payload.module_type, MAX_GENERATION_ATTEMPTS
    )))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_clean_json_fences_variants() {
        assert_eq!(clean_json_fences("[1]"), "[1]");
        assert_eq!(clean_json_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(clean_json_fences("```\n[1]\n```"), "[1]");
        assert_eq!(clean_json_fences("  ```json [1] ```  "), "[1]");
    }

    #[test]
    fn test_parse_question_array_checks_cardinality() {
        let raw = r#"[{"q": 1}, {"q": 2}]"#;
        assert_eq!(parse_question_array(raw, 2).unwrap().len(), 2);
        assert!(parse_question_array(raw, 3).is_err());
    }

    #[test]
    fn test_parse_question_array_rejects_non_array() {
        assert!(parse_question_array(r#"{"q": 1}"#, 1).is_err());
        assert!(parse_question_array("not json", 1).is_err());
    }

    #[test]
    fn test_parse_question_array_accepts_fenced_answer() {
        let raw = "```json\n[{\"q\": 1}]\n```";
        assert_eq!(parse_question_array(raw, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_channel_summary_excludes_outline() {
        let channel = Channel {
            id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Spanish 101".to_string(),
            description: None,
            section_count: 1,
            unit_count: 2,
            activity_count: 3,
            lesson_count: 4,
            quiz_count: 5,
            question_count: 6,
            total_lesson_quiz_count: 9,
            enrolled_students: 7,
            outline_content: json!({"sections": [{"id": "x"}]}),
            published: true,
            channel_link: None,
            primary_language: Some("en".to_string()),
            target_language: Some("es".to_string()),
            avatar_file_id: None,
            cover_image_file_id: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let summary = channel_summary(&channel);
        assert_eq!(summary["name"], "Spanish 101");
        assert_eq!(summary["quiz_count"], 5);
        assert!(summary.get("outline_content").is_none());
    }
}
