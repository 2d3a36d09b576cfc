//! Channel outline aggregation.
//!
//! The authoring tables (section/unit/activity outlines plus their content
//! rows) are the write model; `channels.outline_content` is the denormalized
//! read model the players consume. [`aggregate_channel`] rebuilds the snapshot
//! and the stat counters from the live rows after every authoring mutation.
//!
//! The walk itself is pure ([`build_outline`]), so the counting and merge
//! rules can be tested on hand-built trees without a database. Persisting is
//! guarded by the channel `version` column: a concurrent rebuild bumps the
//! version, the stale writer loses and recomputes from fresh rows.

use serde_json::{json, Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{
    Activity, ActivityOutline, Channel, ChannelInfo, Lesson, LessonOutline, Question, QuizOutline,
    Section, SectionOutline, Unit, UnitOutline,
};
use crate::response::{ApiError, Msg};

/// Retries when a concurrent aggregation bumps the channel version first.
const MAX_SAVE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct SectionNode {
    pub outline: SectionOutline,
    pub content: Option<Section>,
    pub units: Vec<UnitNode>,
}

#[derive(Debug, Clone)]
pub struct UnitNode {
    pub outline: UnitOutline,
    pub content: Option<Unit>,
    pub activities: Vec<ActivityNode>,
}

#[derive(Debug, Clone)]
pub struct ActivityNode {
    pub outline: ActivityOutline,
    pub content: Option<Activity>,
    pub lessons: Vec<(LessonOutline, Vec<Lesson>)>,
    pub quizzes: Vec<(QuizOutline, Vec<Question>)>,
}

/// Everything under one channel, as loaded from the authoring tables.
#[derive(Debug, Clone, Default)]
pub struct ChannelTree {
    pub sections: Vec<SectionNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub section_count: i32,
    pub unit_count: i32,
    pub activity_count: i32,
    pub lesson_count: i32,
    pub quiz_count: i32,
    pub question_count: i32,
    pub total_lesson_quiz_count: i32,
}

#[derive(Debug, Clone)]
pub struct AggregateResult {
    pub outline_content: Value,
    pub stats: AggregateStats,
}

/// Builds the `{"sections": [...]}` snapshot and the stat counters from a
/// channel tree. Every level is sorted by its order column; lesson and quiz
/// entries under an activity are merged into one `content` list sorted by
/// order, each entry tagged with `type`.
pub fn build_outline(tree: &ChannelTree) -> AggregateResult {
    let mut stats = AggregateStats::default();

    let mut sections: Vec<&SectionNode> = tree.sections.iter().collect();
    sections.sort_by_key(|s| s.outline.ord);

    let mut section_values = Vec::with_capacity(sections.len());
    for section in sections {
        stats.section_count += 1;

        let mut units: Vec<&UnitNode> = section.units.iter().collect();
        units.sort_by_key(|u| u.outline.ord);

        let mut unit_values = Vec::with_capacity(units.len());
        for unit in units {
            stats.unit_count += 1;

            let mut activities: Vec<&ActivityNode> = unit.activities.iter().collect();
            activities.sort_by_key(|a| a.outline.ord);

            let mut activity_values = Vec::with_capacity(activities.len());
            for activity in activities {
                stats.activity_count += 1;
                activity_values.push(build_activity(activity, &mut stats));
            }

            unit_values.push(json!({
                "id": unit.outline.id,
                "name": unit.outline.name,
                "order": unit.outline.ord,
                "activities": activity_values,
                "description": unit.content.as_ref().and_then(|c| c.description.clone()),
                "file_id": unit.content.as_ref().and_then(|c| c.file_id.clone()),
            }));
        }

        section_values.push(json!({
            "id": section.outline.id,
            "name": section.outline.name,
            "order": section.outline.ord,
            "units": unit_values,
            "description": section.content.as_ref().and_then(|c| c.description.clone()),
            "file_id": section.content.as_ref().and_then(|c| c.file_id.clone()),
        }));
    }

    AggregateResult {
        outline_content: json!({ "sections": section_values }),
        stats,
    }
}

fn build_activity(activity: &ActivityNode, stats: &mut AggregateStats) -> Value {
    let mut content: Vec<Value> = Vec::new();

    let mut lessons: Vec<&(LessonOutline, Vec<Lesson>)> = activity.lessons.iter().collect();
    lessons.sort_by_key(|(o, _)| o.ord);
    for (outline, bodies) in lessons {
        stats.lesson_count += 1;
        stats.total_lesson_quiz_count += 1;

        let mut bodies: Vec<&Lesson> = bodies.iter().collect();
        bodies.sort_by_key(|l| l.ord);
        let body_values: Vec<Value> = bodies
            .iter()
            .map(|lesson| {
                json!({
                    "id": lesson.id,
                    "lesson_type": lesson.lesson_type,
                    "text": lesson.text,
                    "file_ids": lesson.file_ids,
                    "question_lesson": lesson.question_lesson,
                    "order": lesson.ord,
                    "is_launched": lesson.is_launched,
                    "is_free": lesson.is_free,
                })
            })
            .collect();

        content.push(json!({
            "id": outline.id,
            "name": outline.name,
            "order": outline.ord,
            "count": outline.lesson_count,
            "type": "lesson",
            "content": body_values,
        }));
    }

    let mut quizzes: Vec<&(QuizOutline, Vec<Question>)> = activity.quizzes.iter().collect();
    quizzes.sort_by_key(|(o, _)| o.ord);
    for (outline, questions) in quizzes {
        stats.quiz_count += 1;
        stats.total_lesson_quiz_count += 1;
        stats.question_count += questions.len() as i32;

        let mut questions: Vec<&Question> = questions.iter().collect();
        questions.sort_by_key(|q| q.ord);
        let question_values: Vec<Value> = questions
            .iter()
            .map(|q| {
                json!({
                    "id": q.id,
                    "time_limit": q.time_limit,
                    "points": q.points,
                    "template": q.template,
                    "generated_question": q.generated_question,
                    "file_id": q.file_id,
                    "check_function": q.check_function,
                    "order": q.ord,
                    "is_accepted": q.is_accepted,
                })
            })
            .collect();

        content.push(json!({
            "id": outline.id,
            "name": outline.name,
            "order": outline.ord,
            "count": outline.quiz_count,
            "type": "quiz",
            "is_launched": outline.is_launched,
            "is_free": outline.is_free,
            "content": question_values,
        }));
    }

    content.sort_by_key(|entry| entry["order"].as_i64().unwrap_or(0));

    json!({
        "id": activity.outline.id,
        "name": activity.outline.name,
        "order": activity.outline.ord,
        "count": activity.outline.lesson_quiz_count,
        "content": content,
        "description": activity.content.as_ref().and_then(|c| c.description.clone()),
        "file_id": activity.content.as_ref().and_then(|c| c.file_id.clone()),
        "difficulty_level": activity.content.as_ref().and_then(|c| c.difficulty_level.clone()),
        "is_launched": activity.content.as_ref().map(|c| c.is_launched).unwrap_or(false),
    })
}

/// Loads every authoring row under a channel, ordered by the order columns.
pub async fn fetch_channel_tree(pool: &PgPool, channel_id: Uuid) -> Result<ChannelTree, sqlx::Error> {
    let section_outlines = sqlx::query_as::<_, SectionOutline>(
        "SELECT * FROM section_outlines WHERE channel_id = $1 ORDER BY ord",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    let mut sections = Vec::with_capacity(section_outlines.len());
    for section_outline in section_outlines {
        let content = sqlx::query_as::<_, Section>(
            "SELECT * FROM sections WHERE section_outline_id = $1",
        )
        .bind(section_outline.id)
        .fetch_optional(pool)
        .await?;

        let unit_outlines = sqlx::query_as::<_, UnitOutline>(
            "SELECT * FROM unit_outlines WHERE section_outline_id = $1 ORDER BY ord",
        )
        .bind(section_outline.id)
        .fetch_all(pool)
        .await?;

        let mut units = Vec::with_capacity(unit_outlines.len());
        for unit_outline in unit_outlines {
            let unit_content =
                sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE unit_outline_id = $1")
                    .bind(unit_outline.id)
                    .fetch_optional(pool)
                    .await?;

            let activity_outlines = sqlx::query_as::<_, ActivityOutline>(
                "SELECT * FROM activity_outlines WHERE unit_outline_id = $1 ORDER BY ord",
            )
            .bind(unit_outline.id)
            .fetch_all(pool)
            .await?;

            let mut activities = Vec::with_capacity(activity_outlines.len());
            for activity_outline in activity_outlines {
                let activity_content = sqlx::query_as::<_, Activity>(
                    "SELECT * FROM activities WHERE activity_outline_id = $1",
                )
                .bind(activity_outline.id)
                .fetch_optional(pool)
                .await?;

                let lesson_outlines = sqlx::query_as::<_, LessonOutline>(
                    "SELECT * FROM lesson_outlines WHERE activity_outline_id = $1 ORDER BY ord",
                )
                .bind(activity_outline.id)
                .fetch_all(pool)
                .await?;

                let mut lessons = Vec::with_capacity(lesson_outlines.len());
                for lesson_outline in lesson_outlines {
                    let bodies = sqlx::query_as::<_, Lesson>(
                        "SELECT * FROM lessons WHERE lesson_outline_id = $1 ORDER BY ord",
                    )
                    .bind(lesson_outline.id)
                    .fetch_all(pool)
                    .await?;
                    lessons.push((lesson_outline, bodies));
                }

                let quiz_outlines = sqlx::query_as::<_, QuizOutline>(
                    "SELECT * FROM quiz_outlines WHERE activity_outline_id = $1 ORDER BY ord",
                )
                .bind(activity_outline.id)
                .fetch_all(pool)
                .await?;

                let mut quizzes = Vec::with_capacity(quiz_outlines.len());
                for quiz_outline in quiz_outlines {
                    let questions = sqlx::query_as::<_, Question>(
                        "SELECT * FROM questions WHERE quiz_outline_id = $1 ORDER BY ord",
                    )
                    .bind(quiz_outline.id)
                    .fetch_all(pool)
                    .await?;
                    quizzes.push((quiz_outline, questions));
                }

                activities.push(ActivityNode {
                    outline: activity_outline,
                    content: activity_content,
                    lessons,
                    quizzes,
                });
            }

            units.push(UnitNode {
                outline: unit_outline,
                content: unit_content,
                activities,
            });
        }

        sections.push(SectionNode {
            outline: section_outline,
            content,
            units,
        });
    }

    Ok(ChannelTree { sections })
}

/// Rebuilds the channel snapshot and stats from the authoring rows and
/// persists them, also refreshing the display fields mirrored from the
/// channel settings. Returns the saved channel.
///
/// The UPDATE only applies when the version read at fetch time is still
/// current; on a lost race the whole rebuild is retried from fresh rows.
pub async fn aggregate_channel(
    pool: &PgPool,
    channel_id: Uuid,
    user_id: Uuid,
) -> Result<Channel, ApiError> {
    for _ in 0..MAX_SAVE_ATTEMPTS {
        let channel = sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE channel_id = $1 AND user_id = $2",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel".to_string()))?;

        let info = sqlx::query_as::<_, ChannelInfo>("SELECT * FROM channel_infos WHERE id = $1")
            .bind(channel_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Channel".to_string()))?;

        let tree = fetch_channel_tree(pool, channel_id).await?;
        let result = build_outline(&tree);

        let rows = sqlx::query(
            r#"
            UPDATE channels SET
                outline_content = $1,
                section_count = $2,
                unit_count = $3,
                activity_count = $4,
                lesson_count = $5,
                quiz_count = $6,
                question_count = $7,
                total_lesson_quiz_count = $8,
                name = $9,
                description = $10,
                primary_language = $11,
                target_language = $12,
                avatar_file_id = $13,
                cover_image_file_id = $14,
                version = version + 1,
                updated_at = now()
            WHERE id = $15 AND version = $16
            "#,
        )
        .bind(&result.outline_content)
        .bind(result.stats.section_count)
        .bind(result.stats.unit_count)
        .bind(result.stats.activity_count)
        .bind(result.stats.lesson_count)
        .bind(result.stats.quiz_count)
        .bind(result.stats.question_count)
        .bind(result.stats.total_lesson_quiz_count)
        .bind(&info.name)
        .bind(&info.description)
        .bind(&info.primary_language)
        .bind(&info.target_language)
        .bind(&info.avatar_file_id)
        .bind(&info.cover_image_file_id)
        .bind(channel.id)
        .bind(channel.version)
        .execute(pool)
        .await?;

        if rows.rows_affected() == 1 {
            let saved = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
                .bind(channel.id)
                .fetch_one(pool)
                .await?;
            return Ok(saved);
        }

        tracing::debug!(%channel_id, "outline save lost a version race, recomputing");
    }

    Err(ApiError::Conflict(Msg::new(
        "The channel is being updated by another request. Please retry.",
        "La chaîne est en cours de mise à jour par une autre requête. Veuillez réessayer.",
    )))
}

/// Clones the outline snapshot into a fresh progress tree: same ids and
/// names at every level, `completed: false` everywhere, activity entries
/// keep only id, name, completion and type.
pub fn build_progress_level(outline_content: &Value) -> Value {
    let empty = Vec::new();
    let sections = outline_content["sections"].as_array().unwrap_or(&empty);

    let progress_sections: Vec<Value> = sections
        .iter()
        .map(|section| {
            let units: Vec<Value> = section["units"]
                .as_array()
                .unwrap_or(&empty)
                .iter()
                .map(|unit| {
                    let activities: Vec<Value> = unit["activities"]
                        .as_array()
                        .unwrap_or(&empty)
                        .iter()
                        .map(|activity| {
                            let content: Vec<Value> = activity["content"]
                                .as_array()
                                .unwrap_or(&empty)
                                .iter()
                                .map(|entry| {
                                    json!({
                                        "id": entry["id"],
                                        "name": entry.get("name").cloned().unwrap_or(json!("")),
                                        "completed": false,
                                        "type": entry.get("type").cloned().unwrap_or(json!("lesson")),
                                    })
                                })
                                .collect();
                            json!({
                                "id": activity["id"],
                                "name": activity.get("name").cloned().unwrap_or(json!("")),
                                "completed": false,
                                "content": content,
                            })
                        })
                        .collect();
                    json!({
                        "id": unit["id"],
                        "name": unit.get("name").cloned().unwrap_or(json!("")),
                        "completed": false,
                        "activities": activities,
                    })
                })
                .collect();
            json!({
                "id": section["id"],
                "name": section.get("name").cloned().unwrap_or(json!("")),
                "completed": false,
                "units": units,
            })
        })
        .collect();

    json!({ "sections": progress_sections })
}

/// Outline ids under one section of the snapshot, grouped by level.
/// Drives the section delete cascade; entries whose id is not a valid
/// UUID are skipped.
#[derive(Debug, Default, PartialEq)]
pub struct SectionDescendants {
    pub unit_ids: Vec<Uuid>,
    pub activity_ids: Vec<Uuid>,
    pub lesson_outline_ids: Vec<Uuid>,
    pub quiz_outline_ids: Vec<Uuid>,
}

/// Collects every descendant outline id reachable from the given section in
/// the snapshot. Rows created after the last aggregation are not in the
/// snapshot and stay behind as orphans.
pub fn section_descendants(outline_content: &Value, section_id: Uuid) -> SectionDescendants {
    let empty = Vec::new();
    let mut ids = SectionDescendants::default();
    let target = section_id.to_string();

    for section in outline_content["sections"].as_array().unwrap_or(&empty) {
        if section["id"].as_str() != Some(target.as_str()) {
            continue;
        }
        for unit in section["units"].as_array().unwrap_or(&empty) {
            push_id(&mut ids.unit_ids, &unit["id"]);
            for activity in unit["activities"].as_array().unwrap_or(&empty) {
                push_id(&mut ids.activity_ids, &activity["id"]);
                for entry in activity["content"].as_array().unwrap_or(&empty) {
                    if entry["type"].as_str() == Some("quiz") {
                        push_id(&mut ids.quiz_outline_ids, &entry["id"]);
                    } else {
                        push_id(&mut ids.lesson_outline_ids, &entry["id"]);
                    }
                }
            }
        }
    }

    ids
}

fn push_id(out: &mut Vec<Uuid>, value: &Value) {
    if let Some(id) = value.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
        out.push(id);
    }
}

/// One activity's slice of the free-access progression.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityShare {
    pub id: String,
    pub name: String,
    pub ord: i64,
    /// Sum of the `count` fields of the activity's lesson/quiz entries.
    pub count: i64,
    /// Cumulative share of the channel reached at the end of this activity.
    pub percentage: i64,
}

/// Walks the outline snapshot in display order and computes, per activity,
/// its content count and the cumulative percentage of the channel covered
/// once the activity is finished. `total` of zero yields zero percentages.
pub fn activity_percentages(outline_content: &Value, total: i32) -> Vec<ActivityShare> {
    let empty = Vec::new();
    let mut shares = Vec::new();
    let mut current_count: i64 = 0;

    for section in outline_content["sections"].as_array().unwrap_or(&empty) {
        for unit in section["units"].as_array().unwrap_or(&empty) {
            for activity in unit["activities"].as_array().unwrap_or(&empty) {
                let activity_count: i64 = activity["content"]
                    .as_array()
                    .unwrap_or(&empty)
                    .iter()
                    .map(|entry| entry.get("count").and_then(Value::as_i64).unwrap_or(1))
                    .sum();
                current_count += activity_count;

                let percentage = if total > 0 {
                    current_count * 100 / total as i64
                } else {
                    0
                };

                shares.push(ActivityShare {
                    id: activity["id"].as_str().unwrap_or_default().to_string(),
                    name: activity["name"].as_str().unwrap_or_default().to_string(),
                    ord: activity["order"].as_i64().unwrap_or(0),
                    count: activity_count,
                    percentage,
                });
            }
        }
    }

    shares
}

/// Maps the shares into the `percentage_outline` object keyed by activity id.
pub fn percentage_outline(shares: &[ActivityShare]) -> Value {
    let mut map = Map::new();
    for share in shares {
        map.insert(
            share.id.clone(),
            json!({
                "name": share.name,
                "order": share.ord,
                "percentage": share.percentage,
                "count": share.count,
            }),
        );
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn section_outline(ord: i32) -> SectionOutline {
        SectionOutline {
            id: Uuid::new_v4(),
            channel_id: Uuid::new_v4(),
            name: format!("Section {}", ord),
            ord,
            created_at: Utc::now(),
        }
    }

    fn unit_outline(ord: i32) -> UnitOutline {
        UnitOutline {
            id: Uuid::new_v4(),
            section_outline_id: Uuid::new_v4(),
            name: format!("Unit {}", ord),
            ord,
            created_at: Utc::now(),
        }
    }

    fn activity_outline(ord: i32) -> ActivityOutline {
        ActivityOutline {
            id: Uuid::new_v4(),
            unit_outline_id: Uuid::new_v4(),
            name: format!("Activity {}", ord),
            ord,
            lesson_quiz_count: 0,
            percentage: 0,
            created_at: Utc::now(),
        }
    }

    fn lesson_outline(ord: i32) -> LessonOutline {
        LessonOutline {
            id: Uuid::new_v4(),
            activity_outline_id: Uuid::new_v4(),
            name: format!("Lesson {}", ord),
            ord,
            lesson_count: 1,
            is_free: false,
            is_launched: false,
            created_at: Utc::now(),
        }
    }

    fn quiz_outline(ord: i32) -> QuizOutline {
        QuizOutline {
            id: Uuid::new_v4(),
            activity_outline_id: Uuid::new_v4(),
            name: format!("Quiz {}", ord),
            ord,
            quiz_count: 1,
            is_free: false,
            is_launched: false,
            created_at: Utc::now(),
        }
    }

    fn question(ord: i32) -> Question {
        Question {
            id: Uuid::new_v4(),
            quiz_outline_id: Uuid::new_v4(),
            time_limit: Some(30),
            points: Some(10),
            template: None,
            generated_question: Some(json!({"q": "?"})),
            file_id: None,
            check_function: None,
            ord,
            is_accepted: false,
        }
    }

    fn lesson(ord: i32) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            lesson_outline_id: Uuid::new_v4(),
            lesson_type: "text".to_string(),
            text: Some("hello".to_string()),
            file_ids: vec![],
            question_lesson: None,
            ord,
            is_launched: false,
            is_free: false,
        }
    }

    fn activity_node(
        ord: i32,
        lessons: Vec<(LessonOutline, Vec<Lesson>)>,
        quizzes: Vec<(QuizOutline, Vec<Question>)>,
    ) -> ActivityNode {
        ActivityNode {
            outline: activity_outline(ord),
            content: None,
            lessons,
            quizzes,
        }
    }

    fn one_activity_tree(activity: ActivityNode) -> ChannelTree {
        ChannelTree {
            sections: vec![SectionNode {
                outline: section_outline(0),
                content: None,
                units: vec![UnitNode {
                    outline: unit_outline(0),
                    content: None,
                    activities: vec![activity],
                }],
            }],
        }
    }

    #[test]
    fn counts_one_of_each_node() {
        let tree = one_activity_tree(activity_node(
            0,
            vec![(lesson_outline(0), vec![lesson(0)])],
            vec![],
        ));
        let result = build_outline(&tree);

        assert_eq!(
            result.stats,
            AggregateStats {
                section_count: 1,
                unit_count: 1,
                activity_count: 1,
                lesson_count: 1,
                quiz_count: 0,
                question_count: 0,
                total_lesson_quiz_count: 1,
            }
        );
    }

    #[test]
    fn question_count_sums_question_rows() {
        let tree = one_activity_tree(activity_node(
            0,
            vec![],
            vec![
                (quiz_outline(0), vec![question(0), question(1)]),
                (quiz_outline(1), vec![question(0)]),
            ],
        ));
        let result = build_outline(&tree);

        assert_eq!(result.stats.quiz_count, 2);
        assert_eq!(result.stats.question_count, 3);
        assert_eq!(result.stats.total_lesson_quiz_count, 2);
    }

    #[test]
    fn lessons_and_quizzes_merge_sorted_by_order() {
        let tree = one_activity_tree(activity_node(
            0,
            vec![(lesson_outline(1), vec![])],
            vec![(quiz_outline(0), vec![]), (quiz_outline(2), vec![])],
        ));
        let result = build_outline(&tree);

        let content = &result.outline_content["sections"][0]["units"][0]["activities"][0]["content"];
        let types: Vec<&str> = content
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["quiz", "lesson", "quiz"]);

        let orders: Vec<i64> = content
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["order"].as_i64().unwrap())
            .collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn sections_sorted_even_when_input_is_not() {
        let tree = ChannelTree {
            sections: vec![
                SectionNode {
                    outline: section_outline(2),
                    content: None,
                    units: vec![],
                },
                SectionNode {
                    outline: section_outline(0),
                    content: None,
                    units: vec![],
                },
                SectionNode {
                    outline: section_outline(1),
                    content: None,
                    units: vec![],
                },
            ],
        };
        let result = build_outline(&tree);
        let orders: Vec<i64> = result.outline_content["sections"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["order"].as_i64().unwrap())
            .collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn lesson_entry_carries_bodies_and_shape() {
        let mut outline = lesson_outline(0);
        outline.lesson_count = 2;
        let tree = one_activity_tree(activity_node(
            0,
            vec![(outline, vec![lesson(1), lesson(0)])],
            vec![],
        ));
        let result = build_outline(&tree);

        let entry = &result.outline_content["sections"][0]["units"][0]["activities"][0]["content"][0];
        assert_eq!(entry["type"], "lesson");
        assert_eq!(entry["count"], 2);
        let bodies = entry["content"].as_array().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["order"], 0);
        assert_eq!(bodies[1]["order"], 1);
        assert_eq!(bodies[0]["lesson_type"], "text");
    }

    #[test]
    fn empty_tree_serializes_empty_sections() {
        let result = build_outline(&ChannelTree::default());
        assert_eq!(result.outline_content, json!({"sections": []}));
        assert_eq!(result.stats, AggregateStats::default());
    }

    #[test]
    fn progress_clone_marks_everything_incomplete() {
        let tree = one_activity_tree(activity_node(
            0,
            vec![(lesson_outline(0), vec![lesson(0)])],
            vec![(quiz_outline(1), vec![question(0)])],
        ));
        let snapshot = build_outline(&tree).outline_content;
        let progress = build_progress_level(&snapshot);

        let section = &progress["sections"][0];
        assert_eq!(section["completed"], false);
        assert_eq!(section["id"], snapshot["sections"][0]["id"]);

        let activity = &section["units"][0]["activities"][0];
        assert_eq!(activity["completed"], false);
        let content = activity["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "lesson");
        assert_eq!(content[1]["type"], "quiz");
        assert!(content.iter().all(|c| c["completed"] == false));
        // No lesson bodies or questions leak into the progress tree.
        assert!(content[0].get("count").is_none());
    }

    #[test]
    fn section_descendants_collects_only_the_target_section() {
        let tree = ChannelTree {
            sections: vec![
                SectionNode {
                    outline: section_outline(0),
                    content: None,
                    units: vec![UnitNode {
                        outline: unit_outline(0),
                        content: None,
                        activities: vec![activity_node(
                            0,
                            vec![(lesson_outline(0), vec![])],
                            vec![(quiz_outline(1), vec![question(0)])],
                        )],
                    }],
                },
                SectionNode {
                    outline: section_outline(1),
                    content: None,
                    units: vec![UnitNode {
                        outline: unit_outline(0),
                        content: None,
                        activities: vec![],
                    }],
                },
            ],
        };
        let target = tree.sections[0].outline.id;
        let snapshot = build_outline(&tree).outline_content;

        let ids = section_descendants(&snapshot, target);
        assert_eq!(ids.unit_ids, vec![tree.sections[0].units[0].outline.id]);
        assert_eq!(ids.activity_ids.len(), 1);
        assert_eq!(ids.lesson_outline_ids.len(), 1);
        assert_eq!(ids.quiz_outline_ids.len(), 1);

        let missing = section_descendants(&snapshot, Uuid::new_v4());
        assert_eq!(missing, SectionDescendants::default());
    }

    #[test]
    fn percentages_accumulate_in_outline_order() {
        let first = activity_node(0, vec![(lesson_outline(0), vec![])], vec![]);
        let mut tree = one_activity_tree(first);
        tree.sections[0].units[0].activities.push(activity_node(
            1,
            vec![],
            vec![(quiz_outline(0), vec![]), (quiz_outline(1), vec![])],
        ));
        // count per entry defaults from the outline counts (1 each)
        let result = build_outline(&tree);
        let shares = activity_percentages(&result.outline_content, result.stats.total_lesson_quiz_count);

        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].count, 1);
        assert_eq!(shares[0].percentage, 33);
        assert_eq!(shares[1].count, 2);
        assert_eq!(shares[1].percentage, 100);
    }

    #[test]
    fn zero_total_yields_zero_percentages() {
        let tree = one_activity_tree(activity_node(0, vec![], vec![]));
        let result = build_outline(&tree);
        let shares = activity_percentages(&result.outline_content, 0);
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].percentage, 0);
        assert_eq!(shares[0].count, 0);
    }

    #[test]
    fn percentage_outline_keys_by_activity_id() {
        let tree = one_activity_tree(activity_node(
            3,
            vec![(lesson_outline(0), vec![])],
            vec![],
        ));
        let result = build_outline(&tree);
        let shares = activity_percentages(&result.outline_content, 1);
        let outline = percentage_outline(&shares);

        let entry = &outline[&shares[0].id];
        assert_eq!(entry["order"], 3);
        assert_eq!(entry["percentage"], 100);
        assert_eq!(entry["count"], 1);
        assert_eq!(entry["name"], shares[0].name);
    }
}
